//! Wall-clock timestamps shared by telemetry, row records and beam samples.

use chrono::Utc;

/// Current UNIX time in seconds with microsecond resolution.
///
/// Row events and beam samples must be stamped from the same clock for the
/// reconstruction to line them up, so every producer in the crate uses this.
pub fn now_timestamp() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1e6
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamps_advance() {
        let a = now_timestamp();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = now_timestamp();
        assert!(b > a);
    }
}
