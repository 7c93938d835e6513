//! Tracing initialization
//!
//! Installs the global `tracing` subscriber. Text output by default, one JSON
//! object per event with `LOG_FORMAT=json`.

mod init_basic;

pub use init_basic::{init_telemetry, shutdown_telemetry, TelemetryOptions};
