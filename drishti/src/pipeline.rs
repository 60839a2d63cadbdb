// THEORY:
// The `pipeline` module is the top-level API of the monitoring engine. A
// `Monitor` is a two-state machine (IDLE / ACTIVE). Starting it moves a capture
// source into a fresh session and spawns that session's frame loop; stopping it
// tears the session down and throws its state away.
//
// Key architectural principles:
// 1.  **One Loop Per Session**: A single task ticks at frame rate, asks the
//     `FrameSampler` whether a cycle is due, grabs a frame and hands it to the
//     `DetectionAdapter`. Nothing else drives the session.
// 2.  **Single-Flight**: The detection call runs as its own task and reports back
//     over a channel. While it is outstanding every tick is skipped (not queued),
//     so results are applied strictly in issue order.
// 3.  **Synchronous Stop**: The session core (active flag, capture source,
//     aggregator) sits behind one mutex. `stop` clears the flag and drops the
//     source under that lock before returning, so a detection that resolves
//     afterwards finds the session inactive and is discarded. A call is only
//     spawned while holding the lock with the flag still set, so none can be
//     issued once `stop` has returned. The loop and the outstanding call are
//     aborted as well.
// 4.  **No Globals**: All session state is created in `start` and owned by the
//     session. A restart always begins from zero.

use crate::config::{ConfigError, MonitorConfig};
use crate::core_modules::aggregator::{CumulativeStats, SessionSnapshot, StatsAggregator};
use crate::core_modules::capture::{self, CaptureError, FrameSource, SourceKind};
use crate::core_modules::detection::{DetectionAdapter, DetectionError, DetectionOutcome};
use crate::core_modules::frame_sampler::FrameSampler;
use crate::core_modules::sink::PresentationSink;
use chrono::Local;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    SourceUnavailable(#[from] CaptureError),
    #[error("a monitoring session is already active")]
    AlreadyActive,
    #[error("monitoring requires a running tokio runtime")]
    NoRuntime,
    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),
    #[error(transparent)]
    Detection(#[from] DetectionError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Active,
}

/// Counters describing how a session's cycles went, beyond the threat stats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleCounters {
    pub applied: u64,
    pub fallbacks: u64,
    pub skipped_busy: u64,
    pub grab_failures: u64,
}

/// State shared between a session's frame loop and its `Monitor`.
struct SessionCore {
    active: bool,
    source: Option<Box<dyn FrameSource>>,
    aggregator: StatsAggregator,
    sink: Arc<dyn PresentationSink>,
    in_flight: Option<AbortHandle>,
    counters: CycleCounters,
}

impl SessionCore {
    fn apply(&mut self, outcome: DetectionOutcome) {
        if outcome.is_fallback() {
            self.counters.fallbacks += 1;
        }
        let strategy = outcome.strategy();
        let status = self.aggregator.apply(outcome.result(), Local::now());
        self.counters.applied += 1;
        self.aggregator.render_to(self.sink.as_ref());
        debug!(
            strategy,
            status = status.label(),
            threat_level = self.aggregator.stats().last_threat_level,
            chart_points = self.aggregator.samples().len(),
            alerts = self.aggregator.alerts().len(),
            "detection cycle applied"
        );
    }
}

fn lock(core: &Mutex<SessionCore>) -> MutexGuard<'_, SessionCore> {
    core.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Session {
    id: u64,
    source_label: String,
    core: Arc<Mutex<SessionCore>>,
    stop_tx: watch::Sender<bool>,
    frame_loop: JoinHandle<()>,
}

/// The monitoring engine: owns the detection strategy and the sink, and at most
/// one running session.
pub struct Monitor {
    config: MonitorConfig,
    adapter: DetectionAdapter,
    sink: Arc<dyn PresentationSink>,
    session: Option<Session>,
    sessions_started: u64,
}

impl Monitor {
    /// Builds a monitor whose detection strategy comes from `config`.
    pub fn new(config: MonitorConfig, sink: Arc<dyn PresentationSink>) -> Result<Self, MonitorError> {
        config.validate()?;
        let adapter = DetectionAdapter::from_config(&config.detection)?;
        Ok(Self::with_adapter(config, adapter, sink))
    }

    pub fn with_adapter(
        config: MonitorConfig,
        adapter: DetectionAdapter,
        sink: Arc<dyn PresentationSink>,
    ) -> Self {
        Self {
            config,
            adapter,
            sink,
            session: None,
            sessions_started: 0,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn state(&self) -> MonitorState {
        match self.session {
            Some(_) => MonitorState::Active,
            None => MonitorState::Idle,
        }
    }

    /// Acquires one of the built-in sources and starts a session on it.
    pub fn start_with(&mut self, kind: &SourceKind) -> Result<(), MonitorError> {
        if self.session.is_some() {
            return Err(MonitorError::AlreadyActive);
        }
        let source = capture::acquire(kind)?;
        self.start(source)
    }

    /// IDLE -> ACTIVE. Must be called from within a tokio runtime.
    pub fn start(&mut self, source: Box<dyn FrameSource>) -> Result<(), MonitorError> {
        if self.session.is_some() {
            return Err(MonitorError::AlreadyActive);
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| MonitorError::NoRuntime)?;

        self.sessions_started += 1;
        let id = self.sessions_started;
        let source_label = source.describe();

        let core = Arc::new(Mutex::new(SessionCore {
            active: true,
            source: Some(source),
            aggregator: StatsAggregator::new(self.config.chart_capacity, self.config.alert_capacity),
            sink: Arc::clone(&self.sink),
            in_flight: None,
            counters: CycleCounters::default(),
        }));
        let (stop_tx, stop_rx) = watch::channel(false);

        let frame_loop = runtime.spawn(run_frame_loop(
            id,
            Arc::clone(&core),
            self.adapter.clone(),
            FrameSampler::new(self.config.sample_interval()),
            self.config.frame_period(),
            stop_rx,
        ));

        info!(
            session = id,
            source = %source_label,
            remote = self.adapter.is_remote(),
            interval_ms = self.config.sample_interval_ms,
            "monitoring started"
        );

        self.session = Some(Session {
            id,
            source_label,
            core,
            stop_tx,
            frame_loop,
        });
        Ok(())
    }

    /// ACTIVE -> IDLE. Returns the final stats of the stopped session.
    ///
    /// When this returns the capture source has been released and no further
    /// cycle of the session can be applied or rendered.
    pub fn stop(&mut self) -> Option<CumulativeStats> {
        let session = self.session.take()?;

        let (final_stats, counters) = {
            let mut core = lock(&session.core);
            core.active = false;
            core.source = None;
            if let Some(call) = core.in_flight.take() {
                call.abort();
            }
            (core.aggregator.stats(), core.counters)
        };

        let _ = session.stop_tx.send(true);
        session.frame_loop.abort();

        info!(
            session = session.id,
            source = %session.source_label,
            cycles = counters.applied,
            fallbacks = counters.fallbacks,
            incidents = final_stats.incidents,
            weapons = final_stats.weapons,
            "monitoring stopped"
        );
        Some(final_stats)
    }

    pub fn stats(&self) -> Option<CumulativeStats> {
        self.session.as_ref().map(|s| lock(&s.core).aggregator.stats())
    }

    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        self.session.as_ref().map(|s| lock(&s.core).aggregator.snapshot())
    }

    pub fn counters(&self) -> Option<CycleCounters> {
        self.session.as_ref().map(|s| lock(&s.core).counters)
    }

    /// Tab visibility has no effect on a running session; sampling continues
    /// while hidden.
    pub fn on_visibility_change(&mut self, hidden: bool) {
        debug!(hidden, "visibility change ignored");
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_frame_loop(
    session: u64,
    core: Arc<Mutex<SessionCore>>,
    adapter: DetectionAdapter,
    mut sampler: FrameSampler,
    frame_period: Duration,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(frame_period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let (outcome_tx, mut outcome_rx) = mpsc::channel::<DetectionOutcome>(1);

    loop {
        tokio::select! {
            biased;

            _ = stop_rx.changed() => break,

            Some(outcome) = outcome_rx.recv() => {
                let mut core = lock(&core);
                core.in_flight = None;
                if !core.active {
                    debug!(session, "discarding detection cycle resolved after stop");
                    break;
                }
                core.apply(outcome);
            }

            tick = ticker.tick() => {
                let frame = {
                    let mut core = lock(&core);
                    if !core.active {
                        break;
                    }
                    if core.in_flight.is_some() {
                        core.counters.skipped_busy += 1;
                        continue;
                    }
                    if !sampler.poll(tick.into_std()) {
                        continue;
                    }
                    let grabbed = match core.source.as_mut() {
                        Some(source) => source.grab(),
                        None => break,
                    };
                    match grabbed {
                        Ok(frame) => frame,
                        Err(error) => {
                            core.counters.grab_failures += 1;
                            warn!(session, %error, "frame grab failed, skipping cycle");
                            continue;
                        }
                    }
                };

                // Encoding happens here, outside the lock, so `stop` may land
                // before the call is spawned.
                let cycle = adapter.cycle(frame);
                let mut core = lock(&core);
                if !core.active {
                    debug!(session, "session stopped while the cycle was being prepared");
                    break;
                }
                let tx = outcome_tx.clone();
                let call = tokio::spawn(async move {
                    let _ = tx.send(cycle.await).await;
                });
                core.in_flight = Some(call.abort_handle());
            }
        }
    }
    debug!(session, "frame loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DetectionMode;
    use crate::core_modules::capture::StillImageSource;
    use crate::core_modules::local_detector::LocalDetector;
    use crate::core_modules::sink::TracingSink;
    use image::RgbImage;

    fn local_monitor() -> Monitor {
        let config = MonitorConfig {
            sample_interval_ms: 5,
            frame_period_ms: 1,
            ..MonitorConfig::default()
        };
        Monitor::with_adapter(config, DetectionAdapter::local(LocalDetector::seeded(5)), Arc::new(TracingSink))
    }

    fn still() -> Box<dyn FrameSource> {
        Box::new(StillImageSource::from_image(RgbImage::new(8, 8)))
    }

    #[tokio::test]
    async fn start_and_stop_move_between_states() {
        let mut monitor = local_monitor();
        assert_eq!(monitor.state(), MonitorState::Idle);
        monitor.start(still()).unwrap();
        assert_eq!(monitor.state(), MonitorState::Active);
        assert!(matches!(monitor.start(still()), Err(MonitorError::AlreadyActive)));
        assert!(monitor.stop().is_some());
        assert_eq!(monitor.state(), MonitorState::Idle);
        assert!(monitor.stop().is_none());
        assert!(monitor.stats().is_none());
    }

    #[tokio::test]
    async fn local_session_accumulates_samples() {
        let mut monitor = local_monitor();
        monitor.start(still()).unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;
        let snapshot = monitor.snapshot().unwrap();
        assert!(!snapshot.chart.is_empty());
        assert!(snapshot.chart.len() <= 50);
        assert!(monitor.counters().unwrap().applied >= 1);
        monitor.stop();
    }

    #[tokio::test]
    async fn unsupported_source_keeps_monitor_idle() {
        let mut monitor = local_monitor();
        let result = monitor.start_with(&SourceKind::NetworkStream("rtsp://cam/1".into()));
        assert!(matches!(result, Err(MonitorError::SourceUnavailable(_))));
        assert_eq!(monitor.state(), MonitorState::Idle);
    }

    #[test]
    fn start_outside_runtime_is_rejected() {
        let mut monitor = local_monitor();
        assert!(matches!(monitor.start(still()), Err(MonitorError::NoRuntime)));
        assert_eq!(monitor.state(), MonitorState::Idle);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = MonitorConfig::default();
        config.detection.mode = DetectionMode::Local;
        config.alert_capacity = 0;
        assert!(matches!(
            Monitor::new(config, Arc::new(TracingSink)),
            Err(MonitorError::InvalidConfig(_))
        ));
    }
}
