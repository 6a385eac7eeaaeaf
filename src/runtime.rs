//! Runtime glue: configuration, telemetry, fatal-error reporting, and the
//! runner that owns the shutdown token.

pub mod config;
pub mod fatal;
pub mod runner;
pub mod telemetry;
