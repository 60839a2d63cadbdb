// THEORY:
// The `detection` module owns the one external question the pipeline asks per
// cycle: "how threatening is this frame?". It hides the two ways of answering it
// behind a single `DetectionAdapter` and a single result shape.
//
// Key architectural principles:
// 1.  **Uniform Result**: Remote inference and local simulation both produce a
//     `DetectionResult`. Downstream code never needs to know which one ran.
// 2.  **Explicit Strategy Tag**: The adapter returns a `DetectionOutcome` that says
//     which strategy produced the result and, for a fallback, why the remote call
//     failed. Fallback happens at exactly one decision point (`resolve`).
// 3.  **Never Fails**: A remote failure is logged and replaced by a local draw for
//     that cycle only. Nothing propagates to the frame loop.
// 4.  **Detached Futures**: `cycle` returns a `'static` future so the frame loop can
//     run it as its own task and keep ticking while the network call is pending.

use crate::config::{DetectionConfig, DetectionMode};
use crate::core_modules::capture::Frame;
use crate::core_modules::local_detector::LocalDetector;
use crate::core_modules::remote_detector::RemoteDetector;
use futures::FutureExt;
use futures::future::{self, BoxFuture};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

/// A single dangerous object reported by the detector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeaponTag {
    pub name: String,
    pub confidence: Option<f32>,
    /// Bounding box as `[x1, y1, x2, y2]` in frame pixels.
    pub bbox: Option<[i32; 4]>,
}

impl WeaponTag {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            confidence: None,
            bbox: None,
        }
    }
}

/// The threat signals extracted from one frame. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionResult {
    /// Threat level in percent, `0.0..=100.0`.
    pub threat_level: f64,
    /// Number of people seen, or `None` when this cycle did not report a fresh count.
    pub people_count: Option<u32>,
    pub weapons_detected: Vec<WeaponTag>,
    pub violence_detected: bool,
}

impl DetectionResult {
    pub fn new(
        threat_level: f64,
        people_count: u32,
        weapons_detected: Vec<WeaponTag>,
        violence_detected: bool,
    ) -> Self {
        Self {
            threat_level,
            people_count: Some(people_count),
            weapons_detected,
            violence_detected,
        }
    }
}

#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("failed to encode frame: {0}")]
    Encode(#[from] image::ImageError),
    #[error("invalid detection endpoint `{endpoint}`: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
    #[error("detection request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("detection service answered {status}")]
    Status { status: reqwest::StatusCode },
    #[error("malformed detection response: {0}")]
    Malformed(#[source] serde_json::Error),
}

/// Which strategy answered a cycle.
#[derive(Debug)]
pub enum DetectionOutcome {
    Remote(DetectionResult),
    Local {
        result: DetectionResult,
        /// Set when the remote strategy was attempted and failed this cycle.
        fallback: Option<DetectionError>,
    },
}

impl DetectionOutcome {
    pub fn result(&self) -> &DetectionResult {
        match self {
            DetectionOutcome::Remote(result) => result,
            DetectionOutcome::Local { result, .. } => result,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, DetectionOutcome::Local { fallback: Some(_), .. })
    }

    pub fn strategy(&self) -> &'static str {
        match self {
            DetectionOutcome::Remote(_) => "remote",
            DetectionOutcome::Local { fallback: None, .. } => "local",
            DetectionOutcome::Local { fallback: Some(_), .. } => "local-fallback",
        }
    }
}

/// A request/response detection backend.
pub trait DetectionService: Send + Sync {
    fn detect(&self, frame: Frame) -> BoxFuture<'static, Result<DetectionResult, DetectionError>>;
}

/// Runs one detection cycle with the configured strategy, falling back to the
/// local strategy when the remote one fails.
#[derive(Clone)]
pub struct DetectionAdapter {
    remote: Option<Arc<dyn DetectionService>>,
    local: Arc<LocalDetector>,
}

impl DetectionAdapter {
    pub fn local(local: LocalDetector) -> Self {
        Self {
            remote: None,
            local: Arc::new(local),
        }
    }

    pub fn remote(service: Arc<dyn DetectionService>, local: LocalDetector) -> Self {
        Self {
            remote: Some(service),
            local: Arc::new(local),
        }
    }

    pub fn from_config(config: &DetectionConfig) -> Result<Self, DetectionError> {
        let local = match config.seed {
            Some(seed) => LocalDetector::seeded(seed),
            None => LocalDetector::new(),
        };
        match config.mode {
            DetectionMode::Local => Ok(Self::local(local)),
            DetectionMode::Remote => {
                let remote = RemoteDetector::new(
                    &config.endpoint,
                    config.jpeg_quality,
                    config.request_timeout(),
                )?;
                Ok(Self::remote(Arc::new(remote), local))
            }
        }
    }

    pub fn is_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// Starts one detection cycle for `frame`.
    pub fn cycle(&self, frame: Frame) -> BoxFuture<'static, DetectionOutcome> {
        match &self.remote {
            None => {
                let result = self.local.detect();
                future::ready(DetectionOutcome::Local {
                    result,
                    fallback: None,
                })
                .boxed()
            }
            Some(service) => {
                let call = service.detect(frame);
                let local = Arc::clone(&self.local);
                async move { Self::resolve(call.await, &local) }.boxed()
            }
        }
    }

    fn resolve(
        remote: Result<DetectionResult, DetectionError>,
        local: &LocalDetector,
    ) -> DetectionOutcome {
        match remote {
            Ok(result) => DetectionOutcome::Remote(result),
            Err(error) => {
                warn!(%error, "remote detection failed, using local fallback for this cycle");
                DetectionOutcome::Local {
                    result: local.detect(),
                    fallback: Some(error),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    struct Failing;

    impl DetectionService for Failing {
        fn detect(&self, _frame: Frame) -> BoxFuture<'static, Result<DetectionResult, DetectionError>> {
            let error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
            future::ready(Err(DetectionError::Malformed(error))).boxed()
        }
    }

    struct Fixed(DetectionResult);

    impl DetectionService for Fixed {
        fn detect(&self, _frame: Frame) -> BoxFuture<'static, Result<DetectionResult, DetectionError>> {
            future::ready(Ok(self.0.clone())).boxed()
        }
    }

    fn frame() -> Frame {
        Frame::new(Arc::new(RgbImage::new(2, 2)), 0)
    }

    #[tokio::test]
    async fn remote_success_is_tagged_remote() {
        let expected = DetectionResult::new(42.0, 3, vec![], false);
        let adapter = DetectionAdapter::remote(Arc::new(Fixed(expected.clone())), LocalDetector::seeded(1));
        let outcome = adapter.cycle(frame()).await;
        assert_eq!(outcome.strategy(), "remote");
        assert_eq!(outcome.result(), &expected);
    }

    #[tokio::test]
    async fn remote_failure_falls_back_to_local() {
        let adapter = DetectionAdapter::remote(Arc::new(Failing), LocalDetector::seeded(7));
        let outcome = adapter.cycle(frame()).await;
        assert!(outcome.is_fallback());
        assert!(matches!(
            outcome,
            DetectionOutcome::Local { fallback: Some(DetectionError::Malformed(_)), .. }
        ));
        let level = outcome.result().threat_level;
        assert!((0.0..100.0).contains(&level));
    }

    #[tokio::test]
    async fn local_mode_never_attempts_remote() {
        let adapter = DetectionAdapter::local(LocalDetector::seeded(3));
        assert!(!adapter.is_remote());
        let outcome = adapter.cycle(frame()).await;
        assert_eq!(outcome.strategy(), "local");
        assert!(!outcome.is_fallback());
    }

    #[test]
    fn unparsable_endpoint_is_rejected() {
        let config = DetectionConfig {
            mode: DetectionMode::Remote,
            endpoint: "not a url".to_string(),
            ..DetectionConfig::default()
        };
        assert!(matches!(
            DetectionAdapter::from_config(&config),
            Err(DetectionError::InvalidEndpoint { .. })
        ));
    }
}
