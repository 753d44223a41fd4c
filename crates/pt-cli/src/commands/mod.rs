//! CLI subcommand implementations.

pub mod migrate;
pub mod playtime;
pub mod replay;
pub mod status;
pub mod sync;
