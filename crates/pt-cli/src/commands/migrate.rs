//! Migrate command for copying local file data into the durable store.

use std::io::Write;

use anyhow::{Result, bail};

use crate::AppContext;

pub fn run<W: Write>(writer: &mut W, app: &AppContext) -> Result<()> {
    let report = app.tracker().migrate_local_to_store();
    if !report.attempted {
        bail!("durable store is not enabled; enable [store] before migrating");
    }
    if !report.is_success() {
        bail!(
            "migration incomplete: {} migrated, {} failed; check the logs",
            report.migrated,
            report.failed
        );
    }
    writeln!(writer, "Migrated {} users to the durable store", report.migrated)?;
    Ok(())
}
