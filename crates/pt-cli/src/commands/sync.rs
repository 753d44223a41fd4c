//! Sync command for reconciling every user with the durable store.

use std::io::Write;

use anyhow::{Result, bail};

use crate::AppContext;

pub fn run<W: Write>(writer: &mut W, app: &AppContext) -> Result<()> {
    let tracker = app.tracker();
    if !tracker.is_store_enabled() {
        bail!("durable store is not enabled; nothing to sync");
    }

    let report = tracker.full_sync();
    if !report.reachable {
        bail!("durable store is unreachable; local totals were kept");
    }

    writeln!(
        writer,
        "Synced {} users: {} updated from store, {} pushed to store, {} failed",
        report.examined, report.adopted, report.pushed, report.failed
    )?;
    Ok(())
}
