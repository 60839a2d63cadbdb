// THEORY:
// The `StatsAggregator` is the single owner of everything a monitoring session
// accumulates: the cumulative counters, the alert feed and the chart window.
// Each detection result is folded in by `apply`, which runs the same fixed
// sequence of rules every cycle:
//
// 1.  Overwrite the last threat level (floored) and, when reported, the people count.
// 2.  Weapons present: add them to the weapon counter and raise a HIGH alert.
// 3.  Violence present: bump the incident counter and raise an ELEVATED alert.
// 4.  Record the threat level in the chart window.
// 5.  Classify the overall status from the threat level.
//
// `apply` takes `&mut self`, so a reader holding a snapshot never sees a cycle
// halfway through.

use crate::core_modules::alert_log::{Alert, AlertLog, Severity};
use crate::core_modules::detection::DetectionResult;
use crate::core_modules::sample_buffer::{Observation, SampleBuffer};
use crate::core_modules::sink::PresentationSink;
use chrono::{DateTime, Local};
use serde::Serialize;

/// The threat level the chart draws its threshold line at.
pub const ALERT_THRESHOLD: u32 = 70;
const ELEVATED_THRESHOLD: u32 = 50;
const MAX_THREAT_LEVEL: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThreatStatus {
    Normal,
    Elevated,
    High,
}

impl ThreatStatus {
    /// `>= 70` is HIGH, `50..=69` is ELEVATED, anything lower is NORMAL.
    pub fn classify(threat_level: u32) -> Self {
        if threat_level >= ALERT_THRESHOLD {
            ThreatStatus::High
        } else if threat_level >= ELEVATED_THRESHOLD {
            ThreatStatus::Elevated
        } else {
            ThreatStatus::Normal
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ThreatStatus::High => "HIGH THREAT",
            ThreatStatus::Elevated => "ELEVATED",
            ThreatStatus::Normal => "NORMAL",
        }
    }

    pub fn detail(&self, threat_level: u32) -> String {
        match self {
            ThreatStatus::Normal => "No threats detected".to_string(),
            _ => format!("Threat Level: {threat_level}%"),
        }
    }
}

/// Session counters. `incidents` and `weapons` only grow within a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CumulativeStats {
    pub incidents: u64,
    pub weapons: u64,
    pub last_people_count: u32,
    pub last_threat_level: u32,
}

/// Everything a presentation layer needs to draw the dashboard once.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub stats: CumulativeStats,
    pub status: ThreatStatus,
    pub alerts: Vec<Alert>,
    pub chart: Vec<Observation>,
    pub threshold: u32,
}

pub struct StatsAggregator {
    stats: CumulativeStats,
    alerts: AlertLog,
    samples: SampleBuffer,
}

impl StatsAggregator {
    pub fn new(chart_capacity: usize, alert_capacity: usize) -> Self {
        Self {
            stats: CumulativeStats::default(),
            alerts: AlertLog::new(alert_capacity),
            samples: SampleBuffer::new(chart_capacity),
        }
    }

    /// Folds one detection result into the session state.
    pub fn apply(&mut self, result: &DetectionResult, now: DateTime<Local>) -> ThreatStatus {
        // --- 1. Overwrite last readings ---
        self.stats.last_threat_level = threat_percent(result.threat_level);
        if let Some(people) = result.people_count {
            self.stats.last_people_count = people;
        }

        // --- 2. Weapons ---
        let weapon_count = result.weapons_detected.len();
        if weapon_count > 0 {
            self.stats.weapons += weapon_count as u64;
            self.alerts.push(Alert::new(
                now,
                Severity::High,
                format!("{weapon_count} weapon(s) detected"),
            ));
        }

        // --- 3. Violence ---
        if result.violence_detected {
            self.stats.incidents += 1;
            self.alerts
                .push(Alert::new(now, Severity::Elevated, "Violent behavior detected"));
        }

        // --- 4. Chart window ---
        self.samples
            .push(Observation::new(now, self.stats.last_threat_level));

        // --- 5. Classification ---
        self.status()
    }

    pub fn status(&self) -> ThreatStatus {
        ThreatStatus::classify(self.stats.last_threat_level)
    }

    pub fn stats(&self) -> CumulativeStats {
        self.stats
    }

    pub fn alerts(&self) -> &AlertLog {
        &self.alerts
    }

    pub fn samples(&self) -> &SampleBuffer {
        &self.samples
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            stats: self.stats,
            status: self.status(),
            alerts: self.alerts.snapshot(),
            chart: self.samples.snapshot(),
            threshold: ALERT_THRESHOLD,
        }
    }

    /// Pushes the current state through every surface of `sink`.
    pub fn render_to(&self, sink: &dyn PresentationSink) {
        let stats = self.stats;
        sink.render_metrics(
            stats.last_threat_level,
            stats.incidents,
            stats.weapons,
            stats.last_people_count,
        );
        sink.render_status_band(self.status());
        sink.render_alerts(&self.alerts.snapshot());
        sink.render_chart(&self.samples.snapshot());
    }
}

/// Floors a raw threat level into a whole percentage in `0..=100`.
fn threat_percent(threat_level: f64) -> u32 {
    if threat_level.is_nan() {
        return 0;
    }
    threat_level.floor().clamp(0.0, MAX_THREAT_LEVEL) as u32
}
