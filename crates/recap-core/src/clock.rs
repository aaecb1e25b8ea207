//! Wall-clock time and time-of-day triggers.
//!
//! The scheduler asks a [`Clock`] for "now" instead of calling
//! [`Utc::now`] directly so restart and catch-up behavior can be driven
//! deterministically from tests with [`ManualClock`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveTime, Timelike, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::ConfigError;

/// Source of wall-clock time.
pub trait Clock: Send + Sync {
    /// Current instant in UTC.
    fn now(&self) -> DateTime<Utc>;
}

/// The real system clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Start at the given instant.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Jump to an absolute instant.
    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }

    /// Move forward by `by`.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// A daily trigger time at minute resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay {
    hour: u8,
    minute: u8,
}

impl TimeOfDay {
    /// Build from hour (0-23) and minute (0-59).
    pub fn new(hour: u8, minute: u8) -> Result<Self, ConfigError> {
        if hour > 23 || minute > 59 {
            return Err(ConfigError::InvalidTime(format!("{hour:02}:{minute:02}")));
        }
        Ok(Self { hour, minute })
    }

    /// Parse `H:MM` or `HH:MM`.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidTime(s.to_owned());
        let (h, m) = s.trim().split_once(':').ok_or_else(invalid)?;
        if m.len() != 2 || h.is_empty() || h.len() > 2 {
            return Err(invalid());
        }
        let hour: u8 = h.parse().map_err(|_| invalid())?;
        let minute: u8 = m.parse().map_err(|_| invalid())?;
        Self::new(hour, minute).map_err(|_| invalid())
    }

    /// Hour component.
    pub fn hour(self) -> u8 {
        self.hour
    }

    /// Minute component.
    pub fn minute(self) -> u8 {
        self.minute
    }

    /// Truncate a wall-clock time to its minute.
    pub fn of<T: Timelike>(t: &T) -> Self {
        Self {
            hour: t.hour() as u8,
            minute: t.minute() as u8,
        }
    }

    /// As a `NaiveTime` at second zero.
    pub fn to_naive(self) -> NaiveTime {
        NaiveTime::from_hms_opt(u32::from(self.hour), u32::from(self.minute), 0)
            .unwrap_or_default()
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for TimeOfDay {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::TimeZone;

    #[test]
    fn parse_valid_times() {
        assert_eq!(TimeOfDay::parse("22:00").unwrap(), TimeOfDay::new(22, 0).unwrap());
        assert_eq!(TimeOfDay::parse("7:05").unwrap().to_string(), "07:05");
        assert_eq!(TimeOfDay::parse(" 00:00 ").unwrap(), TimeOfDay::new(0, 0).unwrap());
    }

    #[test]
    fn parse_invalid_times() {
        for bad in ["24:00", "12:60", "12", "12:5", "ab:cd", "123:00", ""] {
            assert_matches!(TimeOfDay::parse(bad), Err(ConfigError::InvalidTime(_)), "{bad}");
        }
    }

    #[test]
    fn ordering_follows_the_day() {
        let morning = TimeOfDay::new(8, 30).unwrap();
        let evening = TimeOfDay::new(22, 0).unwrap();
        assert!(morning < evening);
    }

    #[test]
    fn of_truncates_seconds() {
        let t = Utc.with_ymd_and_hms(2026, 3, 1, 22, 0, 59).unwrap();
        assert_eq!(TimeOfDay::of(&t), TimeOfDay::new(22, 0).unwrap());
    }

    #[test]
    fn manual_clock_moves_only_when_told() {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);
        clock.advance(Duration::minutes(5));
        assert_eq!(clock.now(), start + Duration::minutes(5));
    }

    #[test]
    fn serde_round_trip() {
        let t = TimeOfDay::new(9, 15).unwrap();
        assert_eq!(serde_json::to_string(&t).unwrap(), "\"09:15\"");
        assert!(serde_json::from_str::<TimeOfDay>("\"25:00\"").is_err());
    }
}
