//! `mqttwatch` library crate.
//!
//! Re-exports internal modules for integration testing. The binary
//! entrypoint lives in `main.rs`.

pub mod cli;
pub mod config;
pub mod notify;
pub mod report;
pub mod session;
pub mod watch;
