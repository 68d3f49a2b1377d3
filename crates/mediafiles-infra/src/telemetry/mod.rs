//! Tracing initialization
//!
//! `RUST_LOG` overrides the default filter.

mod init_basic;

pub use init_basic::{default_filter, init_telemetry, shutdown_telemetry};
