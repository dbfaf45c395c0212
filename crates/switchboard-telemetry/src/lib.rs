//! Switchboard Telemetry - Logging setup for the broker.
//!
//! This crate provides configurable `tracing` subscriber setup: level and
//! per-crate directives, four output formats, and stdout, stderr or
//! rotating-file targets.
//!
//! # Example
//!
//! ```rust,no_run
//! use switchboard_telemetry::{LogConfig, LogFormat, setup_logging};
//!
//! # fn main() -> Result<(), switchboard_telemetry::TelemetryError> {
//! let config = LogConfig::new("debug")
//!     .with_format(LogFormat::Compact)
//!     .with_directive("switchboard_catalog=trace");
//!
//! setup_logging(&config)?;
//! tracing::info!("Broker starting");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod error;
mod logging;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{
    FileLogConfig, FileRotation, LogConfig, LogFormat, LogTarget, setup_default_logging,
    setup_logging,
};
