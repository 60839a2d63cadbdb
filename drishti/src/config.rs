// THEORY:
// `MonitorConfig` gathers every tunable of a monitoring session in one
// serializable struct. The defaults reproduce the reference dashboard: one
// detection every 500ms, frame events at ~60Hz, a 50-point chart and a
// 10-entry alert feed, remote inference against a local service.
//
// The library never reads files or the environment; the binary decides where a
// config comes from and hands the result in.

use crate::core_modules::alert_log::DEFAULT_ALERT_CAPACITY;
use crate::core_modules::frame_sampler::DEFAULT_SAMPLE_INTERVAL;
use crate::core_modules::sample_buffer::DEFAULT_CHART_CAPACITY;
use crate::core_modules::utils::image_helper::DEFAULT_JPEG_QUALITY;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_ENDPOINT: &str = "http://localhost:5000/api/detect";
const DEFAULT_FRAME_PERIOD_MS: u64 = 16;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMode {
    /// Submit frames to the detection service, falling back to simulation on failure.
    Remote,
    /// Simulation only.
    Local,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub mode: DetectionMode,
    pub endpoint: String,
    /// JPEG quality for submitted frames, `1..=100`.
    pub jpeg_quality: u8,
    pub request_timeout_ms: u64,
    /// Seeds the local strategy for reproducible runs.
    pub seed: Option<u64>,
}

impl DetectionConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            mode: DetectionMode::Remote,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Minimum time between two detection cycles.
    pub sample_interval_ms: u64,
    /// Period of the frame-event loop.
    pub frame_period_ms: u64,
    pub chart_capacity: usize,
    pub alert_capacity: usize,
    pub detection: DetectionConfig,
}

impl MonitorConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frame_period_ms == 0 {
            return Err(ConfigError::Invalid("frame_period_ms must be positive".into()));
        }
        if self.chart_capacity == 0 {
            return Err(ConfigError::Invalid("chart_capacity must be positive".into()));
        }
        if self.alert_capacity == 0 {
            return Err(ConfigError::Invalid("alert_capacity must be positive".into()));
        }
        if !(1..=100).contains(&self.detection.jpeg_quality) {
            return Err(ConfigError::Invalid(format!(
                "jpeg_quality must be within 1..=100, got {}",
                self.detection.jpeg_quality
            )));
        }
        if self.detection.mode == DetectionMode::Remote && self.detection.endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid("remote detection needs an endpoint".into()));
        }
        Ok(())
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn frame_period(&self) -> Duration {
        Duration::from_millis(self.frame_period_ms)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: DEFAULT_SAMPLE_INTERVAL.as_millis() as u64,
            frame_period_ms: DEFAULT_FRAME_PERIOD_MS,
            chart_capacity: DEFAULT_CHART_CAPACITY,
            alert_capacity: DEFAULT_ALERT_CAPACITY,
            detection: DetectionConfig::default(),
        }
    }
}
