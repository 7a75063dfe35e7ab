pub mod apis;
pub mod common;
pub mod config;
pub mod pipeline;

// Ports and their adapters
pub mod app;
pub mod infra;

pub mod observability;

pub use common::error::{IntegratorError, Result};
pub use config::Config;
