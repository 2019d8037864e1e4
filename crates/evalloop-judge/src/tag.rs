//! Artifact tags derived from monitoring window timestamps.

use chrono::{DateTime, FixedOffset, Local, Timelike};

/// Replaces every space, colon, plus and period with `-`.
pub fn sanitize_tag(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            ' ' | ':' | '+' | '.' => '-',
            other => other,
        })
        .collect()
}

/// Renders `YYYY-MM-DD HH:MM:SS[.ffffff]+HH:MM`. The fraction is only
/// present when the microseconds are non-zero.
pub fn format_infer_time(time: &DateTime<FixedOffset>) -> String {
    let micros = (time.nanosecond() % 1_000_000_000) / 1_000;
    let fraction = if micros == 0 { String::new() } else { format!(".{:06}", micros) };
    format!(
        "{}{}{}",
        time.format("%Y-%m-%d %H:%M:%S"),
        fraction,
        time.format("%:z")
    )
}

/// The current local time as a monitoring window end.
pub fn now_infer_time() -> String {
    format_infer_time(&Local::now().fixed_offset())
}
