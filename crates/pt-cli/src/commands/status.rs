//! Status command for showing durable store health.

use std::io::Write;

use anyhow::Result;

use crate::AppContext;

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

pub fn run<W: Write>(writer: &mut W, app: &AppContext) -> Result<()> {
    let status = app.status();

    writeln!(writer, "Playtime status")?;
    writeln!(writer, "Store enabled: {}", yes_no(status.store_enabled))?;
    if status.store_enabled {
        writeln!(writer, "Store: {}", status.backend)?;
        writeln!(writer, "Store connected: {}", yes_no(status.store_healthy))?;
        if !status.store_healthy {
            writeln!(
                writer,
                "Check the store configuration and logs; totals are kept locally until it recovers."
            )?;
        }
    } else {
        writeln!(writer, "Using local file for storage.")?;
    }
    writeln!(writer, "Local file: {}", status.local_file)?;
    writeln!(writer, "Known users: {}", status.known_identities)?;
    writeln!(writer, "Active sessions: {}", status.active_sessions)?;

    Ok(())
}
