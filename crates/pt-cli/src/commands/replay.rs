//! Replay command: a stand-in host that feeds recorded connect/disconnect
//! events through the tracker.
//!
//! Input is JSON lines:
//!
//! ```text
//! {"timestamp":"2025-01-01T12:00:00Z","type":"connect","id":"6f9619ff-8b86-d011-b42d-00c04fc964ff"}
//! {"timestamp":"2025-01-01T12:30:00Z","type":"disconnect","id":"6f9619ff-8b86-d011-b42d-00c04fc964ff"}
//! ```
//!
//! Time is driven by the event timestamps. At end of input every remaining
//! session is flushed, as on host shutdown.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{BufRead, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use pt_core::{Clock, Identity, ManualClock};
use serde::Deserialize;

use crate::{AppContext, Config};

/// Host event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Connect,
    Disconnect,
}

/// One recorded host event.
#[derive(Debug, Clone, Deserialize)]
pub struct HostEvent {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub id: Identity,
}

impl HostEvent {
    fn timestamp_ms(&self) -> Result<u64> {
        u64::try_from(self.timestamp.timestamp_millis())
            .with_context(|| format!("timestamp before 1970: {}", self.timestamp))
    }
}

pub fn run<R: BufRead, W: Write>(reader: R, writer: &mut W, config: Config) -> Result<()> {
    let events = parse_events(reader)?;
    let start_ms = match events.first() {
        Some(event) => event.timestamp_ms()?,
        None => 0,
    };
    let clock = ManualClock::new(start_ms);
    let app = AppContext::start_with_clock(config, Arc::new(clock.clone()))?;

    let totals = apply(&app, &clock, &events)?;

    writeln!(writer, "Replayed {} events", events.len())?;
    for (id, total_ms) in totals {
        writeln!(writer, "{id}  {}", app.tracker().format(total_ms))?;
    }
    Ok(())
}

/// Feeds `events` to the tracker, then shuts it down. Returns the final total
/// of every identity that appeared in the events.
pub fn apply(
    app: &AppContext,
    clock: &ManualClock,
    events: &[HostEvent],
) -> Result<BTreeMap<Identity, u64>> {
    let tracker = app.tracker();
    let mut seen = BTreeSet::new();

    for event in events {
        let at_ms = event.timestamp_ms()?;
        if at_ms < clock.now_ms() {
            tracing::warn!(id = %event.id, timestamp = %event.timestamp, "event out of order, using previous time");
        }
        clock.set(at_ms);
        seen.insert(event.id);
        match event.kind {
            EventKind::Connect => tracker.on_connect(event.id),
            EventKind::Disconnect => {
                tracker.on_disconnect(event.id);
            }
        }
    }

    app.shutdown();
    let cache = tracker.engine().cache();
    Ok(seen
        .into_iter()
        .map(|id| (id, cache.stored_total(id)))
        .collect())
}

fn parse_events<R: BufRead>(reader: R) -> Result<Vec<HostEvent>> {
    let mut events = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read line {}", idx + 1))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let event: HostEvent = serde_json::from_str(trimmed)
            .with_context(|| format!("invalid event on line {}", idx + 1))?;
        events.push(event);
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Cursor;

    use insta::assert_snapshot;

    const U1: &str = "00000000-0000-0000-0000-000000000001";
    const U2: &str = "00000000-0000-0000-0000-000000000002";

    fn config(temp: &tempfile::TempDir) -> Config {
        Config {
            data_dir: temp.path().to_path_buf(),
            ..Config::default()
        }
    }

    #[test]
    fn replay_accumulates_sessions() {
        let temp = tempfile::tempdir().unwrap();
        let input = format!(
            r#"{{"timestamp":"2025-01-01T12:00:00Z","type":"connect","id":"{U1}"}}
{{"timestamp":"2025-01-01T12:00:05Z","type":"disconnect","id":"{U1}"}}
{{"timestamp":"2025-01-01T12:00:05Z","type":"disconnect","id":"{U1}"}}

{{"timestamp":"2025-01-01T13:00:00Z","type":"connect","id":"{U1}"}}
{{"timestamp":"2025-01-01T13:10:00Z","type":"connect","id":"{U2}"}}
{{"timestamp":"2025-01-01T14:00:00Z","type":"disconnect","id":"{U1}"}}
{{"timestamp":"2025-01-02T15:10:00Z","type":"connect","id":"{U1}"}}
"#
        );

        let mut output = Vec::new();
        run(Cursor::new(input), &mut output, config(&temp)).unwrap();

        assert_snapshot!(String::from_utf8(output).unwrap(), @r"
        Replayed 7 events
        00000000-0000-0000-0000-000000000001  1h 5s
        00000000-0000-0000-0000-000000000002  1d 2h
        ");
    }

    #[test]
    fn replay_persists_to_local_file() {
        let temp = tempfile::tempdir().unwrap();
        let input = format!(
            r#"{{"timestamp":"2025-01-01T12:00:00Z","type":"connect","id":"{U1}"}}
{{"timestamp":"2025-01-01T12:00:05Z","type":"disconnect","id":"{U1}"}}
"#
        );
        run(Cursor::new(input), &mut Vec::new(), config(&temp)).unwrap();

        let content = std::fs::read_to_string(temp.path().join("playtime.json")).unwrap();
        let document: BTreeMap<String, u64> = serde_json::from_str(&content).unwrap();
        assert_eq!(document.get(U1), Some(&5_000));
    }

    #[test]
    fn rejects_malformed_line() {
        let err = parse_events(Cursor::new("{\"type\":\"connect\"}\n")).unwrap_err();
        assert!(err.to_string().contains("invalid event on line 1"));
    }

    #[test]
    fn rejects_invalid_identity() {
        let input = r#"{"timestamp":"2025-01-01T12:00:00Z","type":"connect","id":"nope"}"#;
        assert!(parse_events(Cursor::new(input)).is_err());
    }
}
