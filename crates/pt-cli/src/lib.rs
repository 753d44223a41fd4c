//! Playtime tracker CLI library.
//!
//! This crate provides the configuration, the application context, and the
//! CLI commands for the playtime tracker.

mod app;
mod cli;
pub mod commands;
mod config;

pub use app::{AppContext, ReloadOutcome, StatusReport, open_backend};
pub use cli::{Cli, Commands};
pub use config::{Config, StoreConfig};
