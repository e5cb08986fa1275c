//! Time utilities: wall-clock helpers and scoreboard clock formatting

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Format a number of seconds as an `m:ss` countdown display
pub fn format_clock(seconds: u32) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

/// Parse an `m:ss` display back into seconds
pub fn parse_clock(display: &str) -> Option<u32> {
    let (minutes, seconds) = display.split_once(':')?;
    let minutes: u32 = minutes.parse().ok()?;
    let seconds: u32 = seconds.parse().ok()?;
    if seconds >= 60 {
        return None;
    }
    Some(minutes * 60 + seconds)
}

/// Format a played-at timestamp (unix millis) for the scoreboard
pub fn format_played_at(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "----".to_string())
}

/// Format a unix-millis instant as a wall-clock time of day
pub fn format_time_of_day(millis: u64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis as i64)
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_formats_minutes_and_padded_seconds() {
        assert_eq!(format_clock(150), "2:30");
        assert_eq!(format_clock(61), "1:01");
        assert_eq!(format_clock(0), "0:00");
    }

    #[test]
    fn clock_parse_inverts_format() {
        for secs in [0, 59, 60, 150, 3601] {
            assert_eq!(parse_clock(&format_clock(secs)), Some(secs));
        }
    }

    #[test]
    fn clock_parse_rejects_garbage() {
        assert_eq!(parse_clock("230"), None);
        assert_eq!(parse_clock("2:xx"), None);
        assert_eq!(parse_clock("2:75"), None);
    }

    #[test]
    fn played_at_handles_out_of_range_timestamps() {
        assert_eq!(format_played_at(i64::MAX), "----");
    }
}
