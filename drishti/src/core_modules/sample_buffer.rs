// THEORY:
// The `SampleBuffer` is the rolling memory behind the threat chart. It keeps the
// most recent `capacity` observations and nothing else, so the chart always shows
// a fixed-width window that slides forward one point per detection cycle.
//
// Key architectural principles:
// 1.  **Fixed Capacity**: The capacity is chosen at construction and never changes.
//     A push at capacity evicts the oldest observation before appending.
// 2.  **Display Order**: Insertion order is display order. Index 0 is always the
//     oldest sample, which is what a left-to-right line chart expects.
// 3.  **Snapshot Reads**: Consumers only ever get a cloned snapshot. The chart's
//     labels and values are both derived from that one snapshot, so their indices
//     line up.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::VecDeque;

pub const DEFAULT_CHART_CAPACITY: usize = 50;

/// One `(time, threat level)` sample in the rolling window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    /// Wall-clock time the sample was recorded.
    pub timestamp: DateTime<Local>,
    /// Threat level in percent, `0..=100`.
    pub value: u32,
}

impl Observation {
    pub fn new(timestamp: DateTime<Local>, value: u32) -> Self {
        Self { timestamp, value }
    }

    /// The wall-clock label shown on the chart's x axis.
    pub fn label(&self) -> String {
        self.timestamp.format("%H:%M:%S").to_string()
    }
}

/// Fixed-capacity FIFO window of the most recent observations.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    samples: VecDeque<Observation>,
    capacity: usize,
}

impl SampleBuffer {
    /// Creates an empty buffer. A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, observation: Observation) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(observation);
    }

    /// Returns the observations oldest first without touching the buffer.
    pub fn snapshot(&self) -> Vec<Observation> {
        self.samples.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(value: u32) -> Observation {
        Observation::new(Local::now(), value)
    }

    fn values(buffer: &SampleBuffer) -> Vec<u32> {
        buffer.snapshot().iter().map(|o| o.value).collect()
    }

    #[test]
    fn length_never_exceeds_capacity() {
        for capacity in 1..=8 {
            let mut buffer = SampleBuffer::new(capacity);
            for i in 0..20u32 {
                buffer.push(obs(i));
                assert!(buffer.len() <= capacity);
                assert_eq!(buffer.len(), (i as usize + 1).min(capacity));
            }
        }
    }

    #[test]
    fn overflow_keeps_most_recent_in_order() {
        for capacity in 1..=8usize {
            let mut buffer = SampleBuffer::new(capacity);
            let pushed = 13u32;
            for i in 0..pushed {
                buffer.push(obs(i));
            }
            let expected: Vec<u32> = (pushed - capacity as u32..pushed).collect();
            assert_eq!(values(&buffer), expected, "capacity {capacity}");
        }
    }

    #[test]
    fn snapshot_does_not_mutate() {
        let mut buffer = SampleBuffer::new(3);
        buffer.push(obs(10));
        buffer.push(obs(20));
        let first = buffer.snapshot();
        let second = buffer.snapshot();
        assert_eq!(first, second);
        assert_eq!(buffer.len(), 2);
        assert_eq!(first.last().map(|o| o.value), Some(20));
    }

    #[test]
    fn label_is_wall_clock_time() {
        let timestamp = Local::now();
        let label = Observation::new(timestamp, 5).label();
        assert_eq!(label, timestamp.format("%H:%M:%S").to_string());
        assert_eq!(label.len(), 8);
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let mut buffer = SampleBuffer::new(0);
        buffer.push(obs(1));
        buffer.push(obs(2));
        assert_eq!(buffer.len(), 1);
        assert_eq!(values(&buffer), vec![2]);
    }
}
