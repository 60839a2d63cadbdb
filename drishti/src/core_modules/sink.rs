// THEORY:
// The `PresentationSink` is the write-only surface the pipeline draws on. After
// every applied cycle the session pushes the full state through its four
// methods; the pipeline never reads anything back. What a sink does with the
// data, whether logging it or broadcasting it to dashboard clients, is up to the sink.

use crate::core_modules::aggregator::ThreatStatus;
use crate::core_modules::alert_log::Alert;
use crate::core_modules::sample_buffer::Observation;
use std::sync::Arc;
use tracing::{debug, info};

pub trait PresentationSink: Send + Sync {
    fn render_metrics(&self, threat_level: u32, incidents: u64, weapons: u64, people: u32);

    fn render_status_band(&self, status: ThreatStatus);

    /// Alerts arrive newest first.
    fn render_alerts(&self, alerts: &[Alert]);

    /// Observations arrive oldest first.
    fn render_chart(&self, samples: &[Observation]);
}

/// Writes every render to the log. Handy for headless runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl PresentationSink for TracingSink {
    fn render_metrics(&self, threat_level: u32, incidents: u64, weapons: u64, people: u32) {
        info!(threat_level, incidents, weapons, people, "metrics");
    }

    fn render_status_band(&self, status: ThreatStatus) {
        debug!(status = status.label(), "status band");
    }

    fn render_alerts(&self, alerts: &[Alert]) {
        if let Some(latest) = alerts.first() {
            debug!(count = alerts.len(), latest = %latest, "alert feed");
        }
    }

    fn render_chart(&self, samples: &[Observation]) {
        debug!(points = samples.len(), "chart");
    }
}

/// Forwards every render to each inner sink in order.
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn PresentationSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn PresentationSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl PresentationSink for FanoutSink {
    fn render_metrics(&self, threat_level: u32, incidents: u64, weapons: u64, people: u32) {
        for sink in &self.sinks {
            sink.render_metrics(threat_level, incidents, weapons, people);
        }
    }

    fn render_status_band(&self, status: ThreatStatus) {
        for sink in &self.sinks {
            sink.render_status_band(status);
        }
    }

    fn render_alerts(&self, alerts: &[Alert]) {
        for sink in &self.sinks {
            sink.render_alerts(alerts);
        }
    }

    fn render_chart(&self, samples: &[Observation]) {
        for sink in &self.sinks {
            sink.render_chart(samples);
        }
    }
}
