//! Tranche CLI - operator commands and scheduled entry points
//!
//! This crate provides the `tranche` binary and command orchestration.

pub mod commands;
pub mod config;
pub mod context;

pub use config::{ConfigError, EngineConfig};
pub use context::AppContext;
