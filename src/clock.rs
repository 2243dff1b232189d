//! Wall and monotonic time helpers
//!
//! Used only for log timestamps and latency measurement; trading decisions
//! key off exchange timestamps carried in the market feed.

use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use std::time::Instant;

/// IST offset (UTC+5:30) used for all rendered log timestamps
const IST_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;

/// Timestamp render format: `YYYY-MM-DD HH:mm:ss.SSS`
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// The fixed IST offset
pub fn ist_offset() -> FixedOffset {
    FixedOffset::east_opt(IST_OFFSET_SECS).expect("static offset is in range")
}

/// Current wall time in IST
pub fn ist_now() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&ist_offset())
}

/// Render a UTC instant as an IST timestamp string
pub fn format_ist(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&ist_offset())
        .format(TIMESTAMP_FORMAT)
        .to_string()
}

/// Render an epoch-milliseconds exchange timestamp as IST
pub fn format_epoch_ms(ms: i64) -> String {
    match Utc.timestamp_millis_opt(ms).single() {
        Some(ts) => format_ist(ts),
        None => format!("invalid-ts({ms})"),
    }
}

/// Monotonic stopwatch for latency measurement
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch(Instant);

impl Stopwatch {
    pub fn start() -> Self {
        Self(Instant::now())
    }

    pub fn elapsed_ms(&self) -> u128 {
        self.0.elapsed().as_millis()
    }
}
