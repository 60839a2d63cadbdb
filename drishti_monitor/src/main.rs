mod capture;
mod settings;

use clap::Parser;
use drishti::core_modules::remote_detector::RemoteDetector;
use drishti::core_modules::sink::{FanoutSink, TracingSink};
use drishti::{DetectionMode, Monitor, MonitorConfig};
use drishti_dashboard::{BroadcastSink, DashboardBus, ServerConfig, start_server};
use settings::Cli;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "drishti=info,drishti_monitor=info,drishti_dashboard=info";
const DASHBOARD_BUS_CAPACITY: usize = 64;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Logging & Argument Parsing ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let cli = Cli::parse();
    let env = |key: &str| std::env::var(key).ok();
    let config = settings::load_config(&cli, env)?;
    let kind = settings::source_kind(&cli)?;

    // --- 2. Presentation ---
    let dashboard = Arc::new(BroadcastSink::new(DashboardBus::new(DASHBOARD_BUS_CAPACITY)));
    let sink = Arc::new(
        FanoutSink::new()
            .with(Arc::new(TracingSink))
            .with(dashboard.clone()),
    );
    if cli.serve {
        let server = ServerConfig {
            bind_addr: settings::bind_addr(&cli, env),
        };
        start_server(dashboard.clone(), server).await?;
    }

    // --- 3. Detection Service Probe ---
    if config.detection.mode == DetectionMode::Remote {
        probe_service(&config).await;
    }

    // --- 4. Capture ---
    let source = match capture::open_source(&kind) {
        Ok(source) => source,
        Err(e) => {
            error!(source = %kind, error = %e, "could not start monitoring");
            return Err(e.into());
        }
    };

    // --- 5. Monitoring Session ---
    let mut monitor = Monitor::new(config, sink)?;
    monitor.start(source)?;

    match cli.duration_secs {
        Some(secs) => {
            tokio::select! {
                res = tokio::signal::ctrl_c() => res?,
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
            }
        }
        None => tokio::signal::ctrl_c().await?,
    }

    // --- 6. Shutdown ---
    let counters = monitor.counters();
    if let Some(stats) = monitor.stop() {
        if let Some(counters) = counters {
            info!(
                applied = counters.applied,
                fallbacks = counters.fallbacks,
                skipped_busy = counters.skipped_busy,
                grab_failures = counters.grab_failures,
                "session finished"
            );
        }
        println!("{}", serde_json::to_string_pretty(&stats)?);
    }
    Ok(())
}

/// Reports whether the detection service is up. Monitoring proceeds either way;
/// failed calls fall back to simulated results.
async fn probe_service(config: &MonitorConfig) {
    let detection = &config.detection;
    let remote = match RemoteDetector::new(
        &detection.endpoint,
        detection.jpeg_quality,
        detection.request_timeout(),
    ) {
        Ok(remote) => remote,
        Err(e) => {
            warn!(error = %e, "detection endpoint is unusable");
            return;
        }
    };
    match remote.health().await {
        Ok(report) if report.models_loaded => {
            info!(endpoint = %remote.endpoint(), status = %report.status, "detection service ready");
        }
        Ok(report) => {
            warn!(endpoint = %remote.endpoint(), status = %report.status, "detection service has not loaded its models");
        }
        Err(e) => {
            warn!(endpoint = %remote.endpoint(), error = %e, "detection service unreachable, results will be simulated until it answers");
        }
    }
}
