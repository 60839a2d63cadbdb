// THEORY:
// This file is the main entry point for the `drishti` library crate.
// It follows the standard Rust convention of using `lib.rs` to define the public
// API that will be exposed to external consumers (the `drishti_monitor` binary
// and the `drishti_dashboard` presentation layer).
//
// The primary goal is to export the `Monitor` and its associated data
// structures (`MonitorConfig`, `SessionSnapshot`, etc.) as the clean, high-level
// interface for the monitoring engine. The sampling, detection and aggregation
// machinery lives in `core_modules` and is reached through the pipeline.

pub mod config;
pub mod core_modules;
pub mod pipeline;

pub use config::{ConfigError, DetectionConfig, DetectionMode, MonitorConfig};
pub use pipeline::{Monitor, MonitorError, MonitorState};
