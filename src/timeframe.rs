use std::fmt;
use std::str::FromStr;

use chrono::Utc;

const HOUR_MS: i64 = 3_600_000;
const DAY_MS: i64 = 86_400_000;

/// Symbolic query interval. All windows are resolved relative to "now" in
/// canonical milliseconds; per-exchange unit conversion happens in [`TimeUnit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeframe {
    OneHour,
    OneDay,
    SevenDays,
    OneMonth,
    OneYear,
}

impl Timeframe {
    pub const ALL: [Timeframe; 5] = [
        Timeframe::OneHour,
        Timeframe::OneDay,
        Timeframe::SevenDays,
        Timeframe::OneMonth,
        Timeframe::OneYear,
    ];

    pub fn duration_ms(self) -> i64 {
        match self {
            Timeframe::OneHour => HOUR_MS,
            Timeframe::OneDay => DAY_MS,
            Timeframe::SevenDays => 7 * DAY_MS,
            // Calendar approximations, same as the upstream APIs use.
            Timeframe::OneMonth => 30 * DAY_MS,
            Timeframe::OneYear => 365 * DAY_MS,
        }
    }

    /// `[since, until]` window ending at the given instant (canonical ms).
    pub fn window_ending_at(self, now_ms: i64) -> (i64, i64) {
        (now_ms - self.duration_ms(), now_ms)
    }

    /// `[since, until]` window ending now.
    pub fn resolve_window(self) -> (i64, i64) {
        self.window_ending_at(Utc::now().timestamp_millis())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Timeframe::OneHour => "1h",
            Timeframe::OneDay => "1d",
            Timeframe::SevenDays => "7d",
            Timeframe::OneMonth => "1M",
            Timeframe::OneYear => "1y",
        }
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1h" => Ok(Timeframe::OneHour),
            "1d" => Ok(Timeframe::OneDay),
            "7d" => Ok(Timeframe::SevenDays),
            "1M" => Ok(Timeframe::OneMonth),
            "1y" => Ok(Timeframe::OneYear),
            other => Err(format!(
                "unsupported timeframe '{other}', use '1h', '1d', '7d', '1M' or '1y'"
            )),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Native timestamp unit of one exchange's table. Cross-exchange comparisons
/// must go through [`TimeUnit::from_canonical_ms`] first — raw timestamps from
/// different exchanges are not comparable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Seconds,
    Millis,
    Micros,
}

impl TimeUnit {
    /// Convert a canonical-millisecond timestamp into this unit.
    pub fn from_canonical_ms(self, ms: i64) -> i64 {
        match self {
            TimeUnit::Seconds => ms / 1000,
            TimeUnit::Millis => ms,
            TimeUnit::Micros => ms * 1000,
        }
    }

    /// Convert a native timestamp in this unit back to canonical milliseconds.
    pub fn to_canonical_ms(self, native: i64) -> i64 {
        match self {
            TimeUnit::Seconds => native * 1000,
            TimeUnit::Millis => native,
            TimeUnit::Micros => native / 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_have_expected_durations() {
        let expected = [
            (Timeframe::OneHour, 3_600_000),
            (Timeframe::OneDay, 86_400_000),
            (Timeframe::SevenDays, 604_800_000),
            (Timeframe::OneMonth, 2_592_000_000),
            (Timeframe::OneYear, 31_536_000_000),
        ];
        let now = 1_700_000_000_000;
        for (tf, duration) in expected {
            let (since, until) = tf.window_ending_at(now);
            assert!(since < until, "{tf}: since must precede until");
            assert_eq!(until - since, duration, "{tf}");
        }
    }

    #[test]
    fn parses_all_symbolic_names() {
        for tf in Timeframe::ALL {
            assert_eq!(tf.as_str().parse::<Timeframe>().unwrap(), tf);
        }
        assert!("2w".parse::<Timeframe>().is_err());
        // Case matters: '1M' is a month, '1m' is nothing.
        assert!("1m".parse::<Timeframe>().is_err());
    }

    #[test]
    fn unit_conversions_round_trip() {
        let ms = 1_700_000_000_000;
        assert_eq!(TimeUnit::Seconds.from_canonical_ms(ms), 1_700_000_000);
        assert_eq!(TimeUnit::Millis.from_canonical_ms(ms), ms);
        assert_eq!(TimeUnit::Micros.from_canonical_ms(ms), 1_700_000_000_000_000);
        for unit in [TimeUnit::Seconds, TimeUnit::Millis, TimeUnit::Micros] {
            assert_eq!(unit.to_canonical_ms(unit.from_canonical_ms(ms)), ms);
        }
    }
}
