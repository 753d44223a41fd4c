//! Playtime command for querying one user's total.

use std::io::Write;

use anyhow::Result;
use pt_core::Identity;
use serde::Serialize;

use crate::AppContext;

#[derive(Debug, Serialize)]
struct PlaytimeOutput {
    id: Identity,
    playtime_ms: u64,
    formatted: String,
}

pub fn run<W: Write>(writer: &mut W, app: &AppContext, id: Identity, json: bool) -> Result<()> {
    let tracker = app.tracker();
    let playtime_ms = tracker.current_duration(id);
    let formatted = tracker.format(playtime_ms);

    if json {
        let output = PlaytimeOutput {
            id,
            playtime_ms,
            formatted,
        };
        writeln!(writer, "{}", serde_json::to_string(&output)?)?;
    } else {
        writeln!(writer, "Playtime of {id}: {formatted}")?;
    }
    Ok(())
}
