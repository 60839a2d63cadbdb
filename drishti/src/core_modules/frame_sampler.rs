// THEORY:
// The `FrameSampler` decouples the frame rate from the detection rate. Frames
// arrive at display refresh speed (~60Hz), but the detection service is only
// asked about one frame per interval. It behaves like a leaky bucket of size one:
// the first frame after the interval has elapsed is let through, every other
// frame is dropped on the floor.

use std::time::{Duration, Instant};

pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct FrameSampler {
    interval: Duration,
    /// When the last detection cycle was let through. `None` until the first frame.
    last_invocation: Option<Instant>,
}

impl FrameSampler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_invocation: None,
        }
    }

    /// Called once per frame event. Returns `true` when a detection cycle should run.
    ///
    /// A cycle fires only if strictly more than `interval` has passed since the
    /// previous one. The very first frame always fires.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.last_invocation {
            Some(last) if now.saturating_duration_since(last) <= self.interval => false,
            _ => {
                self.last_invocation = Some(now);
                true
            }
        }
    }
}

impl Default for FrameSampler {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_INTERVAL)
    }
}
