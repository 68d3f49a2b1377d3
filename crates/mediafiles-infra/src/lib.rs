//! Mediafiles Infrastructure Library
//!
//! Process-level plumbing shared by the binaries:
//! - Telemetry initialization (tracing subscriber, plain or JSON output)
//! - Bootstrap of the processing pipeline from [`mediafiles_core::Config`]

pub mod bootstrap;

#[cfg(feature = "observability-basic")]
pub mod telemetry;

pub use bootstrap::{bootstrap, Runtime};

#[cfg(feature = "observability-basic")]
pub use telemetry::{init_telemetry, shutdown_telemetry};
