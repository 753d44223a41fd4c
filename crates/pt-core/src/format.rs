//! Human-readable durations.

use serde::{Deserialize, Serialize};

const SECONDS_PER_DAY: u64 = 86_400;
const SECONDS_PER_HOUR: u64 = 3_600;
const SECONDS_PER_MINUTE: u64 = 60;

/// Which units the formatter may print.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct FormatOptions {
    pub show_days: bool,
    pub show_hours: bool,
    pub show_minutes: bool,
    pub show_seconds: bool,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            show_days: true,
            show_hours: true,
            show_minutes: true,
            show_seconds: true,
        }
    }
}

/// Formats `duration_ms` as e.g. `1d 2h 3m 4s`.
///
/// Units are printed in fixed order, only when enabled and nonzero. Units are
/// not carried over: with hours disabled, `1h 5m` prints as `5m`. Sub-second
/// remainders are dropped. When nothing would be printed the result is `0s`.
pub fn format_duration(duration_ms: u64, options: &FormatOptions) -> String {
    let seconds = duration_ms / 1000;
    let units = [
        (options.show_days, seconds / SECONDS_PER_DAY, 'd'),
        (
            options.show_hours,
            (seconds % SECONDS_PER_DAY) / SECONDS_PER_HOUR,
            'h',
        ),
        (
            options.show_minutes,
            (seconds % SECONDS_PER_HOUR) / SECONDS_PER_MINUTE,
            'm',
        ),
        (options.show_seconds, seconds % SECONDS_PER_MINUTE, 's'),
    ];

    let parts: Vec<String> = units
        .into_iter()
        .filter(|(enabled, value, _)| *enabled && *value > 0)
        .map(|(_, value, suffix)| format!("{value}{suffix}"))
        .collect();

    if parts.is_empty() {
        "0s".to_string()
    } else {
        parts.join(" ")
    }
}
