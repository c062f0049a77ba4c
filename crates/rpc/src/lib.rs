//! Tradeflow RPC - API/CLI orchestrator
//!
//! This crate provides the `tradeflow` binary, its configuration and the
//! context that wires store, workflow engine, verifier and risk views.

pub mod commands;
pub mod config;
pub mod context;

pub use config::{AppConfig, ConfigError};
pub use context::{AppContext, TimelineEntry};
