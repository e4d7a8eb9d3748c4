// =============================================================================
// Validator (C2) — schema, market-hours, and field-range rules
// =============================================================================
//
// Sequential filter chain returning the first failure reason, in the same
// style as `SmartFilterEngine::evaluate`: each rule is checked in order and
// short-circuits with `Some(reason)` on failure; `None` means every rule
// passed. Never panics — every check is a plain comparison.
// =============================================================================

use chrono::{NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::debug;

use crate::config::ValidationConfig;
use crate::types::Signal;

/// Validate a normalized `Signal` against schema and market constraints.
/// `vix`, when `Some`, is checked against the configured bound (only present
/// on the context-enriched path).
pub fn validate(signal: &Signal, config: &ValidationConfig, vix: Option<f64>) -> Option<String> {
    if signal.timeframe.trim().is_empty() {
        return Some("timeframe must not be empty".to_string());
    }

    let now = Utc::now();
    let skew_minutes = (now - signal.timestamp).num_minutes().abs();
    if skew_minutes > config.max_timestamp_skew_minutes {
        return Some(format!(
            "timestamp skew {skew_minutes}m exceeds allowed {}m",
            config.max_timestamp_skew_minutes
        ));
    }

    if let Some(reason) = check_market_hours(signal, config) {
        return Some(reason);
    }

    if let Some(vix) = vix {
        if !(0.0..=200.0).contains(&vix) {
            return Some(format!("VIX {vix} outside acceptable bounds"));
        }
    }

    debug!(signal_id = %signal.id, "validator passed");
    None
}

fn check_market_hours(signal: &Signal, config: &ValidationConfig) -> Option<String> {
    let tz: Tz = match config.timezone.parse() {
        Ok(tz) => tz,
        Err(_) => {
            return Some(format!("invalid configured timezone '{}'", config.timezone));
        }
    };

    let local_time = tz.from_utc_datetime(&signal.timestamp.naive_utc());

    let start = parse_hhmm(&config.market_hours_start)?;
    let end = parse_hhmm(&config.market_hours_end)?;

    let local_clock = local_time.time();
    if local_clock < start || local_clock > end {
        return Some(format!(
            "signal timestamp {} ({}) is outside market hours {}-{}",
            local_time.format("%H:%M"),
            config.timezone,
            config.market_hours_start,
            config.market_hours_end
        ));
    }

    None
}

fn parse_hhmm(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Direction, SignalSource};
    use chrono::DateTime;
    use std::collections::HashMap;

    fn signal_at(hour_utc: u32, minute_utc: u32) -> Signal {
        let timestamp: DateTime<Utc> = Utc
            .with_ymd_and_hms(2026, 7, 28, hour_utc, minute_utc, 0)
            .unwrap();
        Signal {
            id: "sig-1".to_string(),
            source: SignalSource::TradingView,
            symbol: "SPX".to_string(),
            direction: Direction::Call,
            timeframe: "5m".to_string(),
            timestamp,
            metadata: HashMap::new(),
            price: 5000.0,
        }
    }

    fn config() -> ValidationConfig {
        ValidationConfig {
            market_hours_start: "09:30".to_string(),
            market_hours_end: "16:00".to_string(),
            timezone: "America/New_York".to_string(),
            max_timestamp_skew_minutes: 5,
        }
    }

    #[test]
    fn rejects_empty_timeframe() {
        let mut signal = signal_at(18, 0); // 14:00 ET — inside market hours
        signal.timeframe = "".to_string();
        signal.timestamp = Utc::now();
        let reason = validate(&signal, &config(), None);
        assert!(reason.unwrap().contains("timeframe"));
    }

    #[test]
    fn rejects_stale_timestamp() {
        let mut signal = signal_at(18, 0);
        signal.timestamp = Utc::now() - chrono::Duration::minutes(30);
        let reason = validate(&signal, &config(), None);
        assert!(reason.unwrap().contains("skew"));
    }

    #[test]
    fn rejects_outside_market_hours() {
        // 02:00 UTC = 22:00 ET previous day (outside 09:30-16:00 ET). Checked
        // directly against `check_market_hours` so the test is independent of
        // the skew-to-now rule exercised separately above.
        let signal = signal_at(2, 0);
        let reason = check_market_hours(&signal, &config());
        assert!(reason.unwrap().contains("market hours"));
    }

    /// Market hours wide open so these tests only exercise the skew/VIX
    /// rules, independent of the real wall-clock time at test run.
    fn always_open_hours_config() -> ValidationConfig {
        ValidationConfig {
            market_hours_start: "00:00".to_string(),
            market_hours_end: "23:59".to_string(),
            ..config()
        }
    }

    #[test]
    fn rejects_out_of_bounds_vix() {
        let mut signal = signal_at(18, 0);
        signal.timestamp = Utc::now();
        let reason = validate(&signal, &always_open_hours_config(), Some(500.0));
        assert!(reason.unwrap().contains("VIX"));
    }

    #[test]
    fn accepts_well_formed_signal_during_market_hours() {
        let mut signal = signal_at(18, 0);
        signal.timestamp = Utc::now();
        let reason = validate(&signal, &always_open_hours_config(), Some(18.0));
        assert!(reason.is_none());
    }
}
