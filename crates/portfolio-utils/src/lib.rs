//! Shared utilities for portfolio-rs
//!
//! Logging setup and its configuration, used by the tracker library and the
//! `portfolio` binary.

pub mod config;
pub mod logging;

pub use config::{LogConfig, LogFormat};
pub use logging::{init_tracing, init_tracing_with};
