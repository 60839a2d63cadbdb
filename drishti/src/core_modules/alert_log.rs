// THEORY:
// The `AlertLog` is the bounded feed of notable events raised by the aggregator.
// Unlike the chart window, the feed is newest first: the latest alert sits at the
// head and the oldest one falls off the tail once the log is full.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;

pub const DEFAULT_ALERT_CAPACITY: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// Raised for weapon detections.
    High,
    /// Raised for violent behavior.
    Elevated,
}

impl Severity {
    pub fn label(&self) -> &'static str {
        match self {
            Severity::High => "HIGH THREAT",
            Severity::Elevated => "ELEVATED",
        }
    }
}

/// A single entry in the alert feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub time: DateTime<Local>,
    pub severity: Severity,
    pub message: String,
}

impl Alert {
    pub fn new(time: DateTime<Local>, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            time,
            severity,
            message: message.into(),
        }
    }

    pub fn time_label(&self) -> String {
        self.time.format("%H:%M:%S").to_string()
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {}: {}",
            self.time_label(),
            self.severity.label(),
            self.message
        )
    }
}

/// Newest-first log of alerts with a fixed capacity.
#[derive(Debug, Clone)]
pub struct AlertLog {
    alerts: VecDeque<Alert>,
    capacity: usize,
}

impl AlertLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            alerts: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Inserts at the head, evicting from the tail on overflow.
    pub fn push(&mut self, alert: Alert) {
        self.alerts.push_front(alert);
        if self.alerts.len() > self.capacity {
            self.alerts.pop_back();
        }
    }

    pub fn snapshot(&self) -> Vec<Alert> {
        self.alerts.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(i: usize) -> Alert {
        Alert::new(Local::now(), Severity::Elevated, format!("alert {i}"))
    }

    #[test]
    fn newest_first_with_tail_eviction() {
        for capacity in 1..=6 {
            let mut log = AlertLog::new(capacity);
            for i in 0..15 {
                log.push(numbered(i));
                assert!(log.len() <= capacity);
                assert_eq!(log.snapshot()[0].message, format!("alert {i}"));
            }
            let messages: Vec<String> = log.snapshot().into_iter().map(|a| a.message).collect();
            let expected: Vec<String> = (15 - capacity..15).rev().map(|i| format!("alert {i}")).collect();
            assert_eq!(messages, expected, "capacity {capacity}");
        }
    }

    #[test]
    fn display_matches_feed_format() {
        let alert = Alert::new(Local::now(), Severity::High, "2 weapon(s) detected");
        let line = alert.to_string();
        assert!(line.ends_with(" - HIGH THREAT: 2 weapon(s) detected"));
        assert!(line.starts_with(&alert.time_label()));
    }

    #[test]
    fn severity_serializes_upper_case() {
        let json = serde_json::to_string(&Severity::Elevated).unwrap();
        assert_eq!(json, "\"ELEVATED\"");
    }
}
