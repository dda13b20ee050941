//! Time and timestamp helpers.

use chrono::{DateTime, Utc};

/// UTC timestamp used for `last_seen`, command frames, nacks, etc.
pub type Timestamp = DateTime<Utc>;

/// Return the current UTC time.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now()
}

/// Render a timestamp the way the bus bridges do: seconds since the epoch
/// with six fractional digits.
#[must_use]
pub fn bus_timestamp(ts: Timestamp) -> String {
    format!("{}.{:06}", ts.timestamp(), ts.timestamp_subsec_micros())
}

/// Seconds since the epoch as a float, used in negative acknowledgements.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn epoch_secs(ts: Timestamp) -> f64 {
    ts.timestamp_millis() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn should_return_current_utc_time() {
        let before = Utc::now();
        let ts = now();
        let after = Utc::now();
        assert!(ts >= before);
        assert!(ts <= after);
    }

    #[test]
    fn should_render_bus_timestamp_with_microseconds() {
        let ts = Utc.timestamp_opt(1_700_000_000, 1_500_000).unwrap();
        assert_eq!(bus_timestamp(ts), "1700000000.001500");
    }

    #[test]
    fn should_render_epoch_seconds() {
        let ts = Utc.timestamp_opt(10, 250_000_000).unwrap();
        assert!((epoch_secs(ts) - 10.25).abs() < f64::EPSILON);
    }
}
