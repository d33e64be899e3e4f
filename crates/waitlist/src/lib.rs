//! Waitlist - equipment queue service
//!
//! HTTP API, expiry sweeper, webhook notifications and an admin CLI on top
//! of `waitlist-core`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

pub mod api;
pub mod app;
pub mod cli;
pub mod config;
pub mod server;
pub mod shutdown;
pub mod sweeper;
pub mod telemetry;
pub mod webhook;

pub use config::{load_config, Config};
