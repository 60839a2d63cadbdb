use anyhow::{Context, bail};
use clap::{Parser, ValueEnum};
use drishti::core_modules::capture::SourceKind;
use drishti::{DetectionMode, MonitorConfig};
use std::path::PathBuf;

pub const ENV_ENDPOINT: &str = "DRISHTI_ENDPOINT";
pub const ENV_INTERVAL_MS: &str = "DRISHTI_INTERVAL_MS";
pub const ENV_BIND: &str = "DRISHTI_BIND";
const DEFAULT_BIND: &str = "127.0.0.1:3001";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SourceArg {
    Camera,
    Video,
    Images,
    Still,
    Stream,
}

#[derive(Debug, Parser)]
#[command(
    name = "drishti_monitor",
    version,
    about = "Samples frames from a camera or video and reports live threat levels"
)]
pub struct Cli {
    /// Where frames come from.
    #[arg(long, value_enum, default_value_t = SourceArg::Camera)]
    pub source: SourceArg,

    /// Video file, image directory, still image, or stream address, depending on --source.
    #[arg(long)]
    pub input: Option<String>,

    #[arg(long, default_value_t = 0)]
    pub camera_index: i32,

    /// JSON configuration file. Environment and flags override it.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Detection service URL.
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Simulate detections locally instead of calling the service.
    #[arg(long)]
    pub local: bool,

    /// Minimum milliseconds between detection cycles.
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// Seed for the simulated detector.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Serve the dashboard over HTTP (needs the `web` feature).
    #[arg(long)]
    pub serve: bool,

    #[arg(long)]
    pub bind: Option<String>,

    /// Stop after this many seconds instead of waiting for ctrl-c.
    #[arg(long)]
    pub duration_secs: Option<u64>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Builds the config from, in rising priority: the config file, the environment, the flags.
pub fn load_config(cli: &Cli, env: impl Fn(&str) -> Option<String>) -> anyhow::Result<MonitorConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            MonitorConfig::from_json_str(&text)
                .with_context(|| format!("invalid config file {}", path.display()))?
        }
        None => MonitorConfig::default(),
    };

    if let Some(endpoint) = non_empty(env(ENV_ENDPOINT)) {
        config.detection.endpoint = endpoint;
    }
    if let Some(interval) = non_empty(env(ENV_INTERVAL_MS)) {
        config.sample_interval_ms = interval
            .trim()
            .parse()
            .with_context(|| format!("{ENV_INTERVAL_MS} must be a number of milliseconds, got `{interval}`"))?;
    }

    if let Some(endpoint) = &cli.endpoint {
        config.detection.endpoint = endpoint.clone();
    }
    if let Some(interval) = cli.interval_ms {
        config.sample_interval_ms = interval;
    }
    if let Some(seed) = cli.seed {
        config.detection.seed = Some(seed);
    }
    if cli.local {
        config.detection.mode = DetectionMode::Local;
    }

    config.validate()?;
    Ok(config)
}

pub fn bind_addr(cli: &Cli, env: impl Fn(&str) -> Option<String>) -> String {
    cli.bind
        .clone()
        .or_else(|| non_empty(env(ENV_BIND)))
        .unwrap_or_else(|| DEFAULT_BIND.to_string())
}

pub fn source_kind(cli: &Cli) -> anyhow::Result<SourceKind> {
    let input = |what: &str| -> anyhow::Result<String> {
        match non_empty(cli.input.clone()) {
            Some(input) => Ok(input),
            None => bail!("no {what} given, pass --input"),
        }
    };
    Ok(match cli.source {
        SourceArg::Camera => SourceKind::Camera {
            index: cli.camera_index,
        },
        SourceArg::Video => SourceKind::VideoFile(PathBuf::from(input("video file")?)),
        SourceArg::Images => SourceKind::ImageSequence(PathBuf::from(input("image directory")?)),
        SourceArg::Still => SourceKind::StillImage(PathBuf::from(input("image file")?)),
        SourceArg::Stream => SourceKind::NetworkStream(input("stream address")?),
    })
}
