//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use pt_core::Identity;

/// Playtime tracker.
///
/// Accumulates connected time per user and keeps it reconciled between a
/// local cache and a durable store shared by several instances.
#[derive(Debug, Parser)]
#[command(name = "pt", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show durable store status.
    Status,

    /// Show the accumulated playtime of a user.
    Playtime {
        /// User identity (UUID).
        id: Identity,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Reconcile every user known to the durable store.
    Sync,

    /// Copy local file data into the durable store.
    Migrate,

    /// Replay connect/disconnect events (JSON lines) from stdin.
    Replay,
}
