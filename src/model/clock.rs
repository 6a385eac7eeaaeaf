use chrono::{DateTime, FixedOffset, Utc};

/// `scannedAt` layout: year/month/day without zero padding, then a 24-hour time.
const SCANNED_AT_FORMAT: &str = "%Y/%-m/%-d %-H:%M:%S";

/// Source of wall-clock time for `scannedAt` stamps.
pub trait WallClock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl WallClock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Renders a reconciliation timestamp in the configured fixed offset.
pub fn format_scanned_at(now: DateTime<Utc>, offset: FixedOffset) -> String {
    now.with_timezone(&offset)
        .format(SCANNED_AT_FORMAT)
        .to_string()
}
