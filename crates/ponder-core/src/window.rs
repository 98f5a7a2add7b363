//! Window clock: maps instants onto fixed, timezone-aligned windows.
//!
//! Every instance computes boundaries independently, so the arithmetic here
//! is a pure function of the instant, the reference zone and the
//! granularity. Local times are resolved in the reference zone:
//!
//! - an ambiguous local midnight (clocks fall back) starts the day at the
//!   earlier instant;
//! - an ambiguous top-of-hour starts the hour at the latest candidate that
//!   is not after `now`;
//! - a non-existent local time (clocks spring forward) resolves to the
//!   transition instant.
//!
//! Hour windows assume whole-hour DST shifts in the reference zone.

use std::fmt;
use std::str::FromStr;

use chrono::{
    DateTime, Datelike, Days, LocalResult, NaiveDateTime, NaiveTime, Offset, TimeDelta, TimeZone,
    Timelike, Utc,
};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// `NaiveDate::num_days_from_ce` of 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Upper bound for `windows_between`, which only feeds diagnostics.
const MAX_COUNTED_WINDOWS: u32 = 100_000;

/// Length of one rotation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// One window per local hour.
    Hour,
    /// One window per local calendar day.
    Day,
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hour => write!(f, "hour"),
            Self::Day => write!(f, "day"),
        }
    }
}

impl FromStr for Granularity {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hour" | "hourly" => Ok(Self::Hour),
            "day" | "daily" => Ok(Self::Day),
            other => Err(DomainError::Validation(format!(
                "unknown window granularity '{other}', expected 'hour' or 'day'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Ambiguity {
    Earliest,
    LatestNotAfter(DateTime<Utc>),
}

/// Computes window boundaries in a fixed reference timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowClock {
    zone: Tz,
    granularity: Granularity,
}

impl WindowClock {
    /// Creates a window clock for `zone` and `granularity`.
    #[must_use]
    pub fn new(zone: Tz, granularity: Granularity) -> Self {
        Self { zone, granularity }
    }

    /// Creates a window clock from an IANA zone name.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the zone name is unknown.
    pub fn from_zone_name(zone: &str, granularity: Granularity) -> Result<Self, DomainError> {
        let zone: Tz = zone
            .trim()
            .parse()
            .map_err(|e| DomainError::Validation(format!("unknown timezone '{zone}': {e}")))?;
        Ok(Self::new(zone, granularity))
    }

    /// The reference timezone.
    #[must_use]
    pub fn zone(&self) -> Tz {
        self.zone
    }

    /// The window length.
    #[must_use]
    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// Start of the window containing `now`.
    #[must_use]
    pub fn current_window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let local = now.with_timezone(&self.zone).naive_local();
        let midnight = local.date().and_time(NaiveTime::default());
        match self.granularity {
            Granularity::Hour => {
                let top_of_hour = midnight + TimeDelta::hours(i64::from(local.hour()));
                self.resolve(top_of_hour, Ambiguity::LatestNotAfter(now))
            }
            Granularity::Day => self.resolve(midnight, Ambiguity::Earliest),
        }
    }

    /// Start of the window after the one containing `now`.
    #[must_use]
    pub fn next_window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let current = self.current_window_start(now);
        match self.granularity {
            Granularity::Hour => current + TimeDelta::hours(1),
            Granularity::Day => now
                .with_timezone(&self.zone)
                .date_naive()
                .checked_add_days(Days::new(1))
                .map_or_else(
                    || current + TimeDelta::days(1),
                    |tomorrow| {
                        self.resolve(tomorrow.and_time(NaiveTime::default()), Ambiguity::Earliest)
                    },
                ),
        }
    }

    /// Time left until the next boundary.
    #[must_use]
    pub fn time_until_next_window(&self, now: DateTime<Utc>) -> TimeDelta {
        self.next_window_start(now) - now
    }

    /// Whether a record activated at `activated_at` belongs to a window that
    /// ended before the window containing `now`.
    #[must_use]
    pub fn is_stale(&self, activated_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        self.current_window_start(activated_at) < self.current_window_start(now)
    }

    /// Number of boundaries crossed between the window of `from` and `now`.
    #[must_use]
    pub fn windows_between(&self, from: DateTime<Utc>, now: DateTime<Utc>) -> u32 {
        let mut cursor = self.current_window_start(from);
        let target = self.current_window_start(now);
        let mut crossed = 0;
        while cursor < target && crossed < MAX_COUNTED_WINDOWS {
            cursor = self.next_window_start(cursor);
            crossed += 1;
        }
        crossed
    }

    /// A stable number identifying the window that starts at `window_start`:
    /// hours since the Unix epoch for hourly windows, days since the epoch
    /// of the local date for daily windows.
    #[must_use]
    pub fn window_seed(&self, window_start: DateTime<Utc>) -> i64 {
        match self.granularity {
            Granularity::Hour => window_start.timestamp().div_euclid(3_600),
            Granularity::Day => {
                let date = window_start.with_timezone(&self.zone).date_naive();
                i64::from(date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE)
            }
        }
    }

    fn resolve(&self, local: NaiveDateTime, ambiguity: Ambiguity) -> DateTime<Utc> {
        match self.zone.from_local_datetime(&local) {
            LocalResult::Single(instant) => instant.with_timezone(&Utc),
            LocalResult::Ambiguous(earliest, latest) => {
                let chosen = match ambiguity {
                    Ambiguity::Earliest => earliest,
                    Ambiguity::LatestNotAfter(now) if latest.with_timezone(&Utc) <= now => latest,
                    Ambiguity::LatestNotAfter(_) => earliest,
                };
                chosen.with_timezone(&Utc)
            }
            LocalResult::None => {
                // Inside a spring-forward gap: read the local time with the
                // offset in force before the gap.
                let before_gap = self
                    .zone
                    .offset_from_utc_datetime(&(local - TimeDelta::days(1)))
                    .fix();
                let utc = local - TimeDelta::seconds(i64::from(before_gap.local_minus_utc()));
                Utc.from_utc_datetime(&utc)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn new_york(granularity: Granularity) -> WindowClock {
        WindowClock::from_zone_name("America/New_York", granularity).unwrap()
    }

    #[test]
    fn test_daily_window_in_utc() {
        let clock = WindowClock::new(Tz::UTC, Granularity::Day);
        let now = utc(2026, 1, 15, 10, 30);

        assert_eq!(clock.current_window_start(now), utc(2026, 1, 15, 0, 0));
        assert_eq!(clock.next_window_start(now), utc(2026, 1, 16, 0, 0));
        assert_eq!(clock.time_until_next_window(now), TimeDelta::minutes(13 * 60 + 30));
    }

    #[test]
    fn test_hourly_window_in_utc() {
        let clock = WindowClock::new(Tz::UTC, Granularity::Hour);
        let now = utc(2026, 1, 15, 10, 59);

        assert_eq!(clock.current_window_start(now), utc(2026, 1, 15, 10, 0));
        assert_eq!(clock.time_until_next_window(now), TimeDelta::minutes(1));
    }

    #[test]
    fn test_daily_window_follows_reference_zone_not_utc_date() {
        // 03:00 UTC on the 16th is still the 15th in New York.
        let clock = new_york(Granularity::Day);
        let now = utc(2026, 1, 16, 3, 0);

        assert_eq!(clock.current_window_start(now), utc(2026, 1, 15, 5, 0));
    }

    #[test]
    fn test_spring_forward_day_is_23_hours() {
        // 2026-03-08: New York moves from EST (-5) to EDT (-4) at 02:00.
        let clock = new_york(Granularity::Day);
        let now = utc(2026, 3, 8, 12, 0);

        let start = clock.current_window_start(now);
        let next = clock.next_window_start(now);

        assert_eq!(start, utc(2026, 3, 8, 5, 0));
        assert_eq!(next, utc(2026, 3, 9, 4, 0));
        assert_eq!(next - start, TimeDelta::hours(23));
        assert_eq!(clock.time_until_next_window(now), TimeDelta::hours(16));
    }

    #[test]
    fn test_fall_back_day_is_25_hours() {
        // 2026-11-01: New York moves from EDT (-4) back to EST (-5) at 02:00.
        let clock = new_york(Granularity::Day);
        let now = utc(2026, 11, 1, 12, 0);

        let start = clock.current_window_start(now);
        let next = clock.next_window_start(now);

        assert_eq!(start, utc(2026, 11, 1, 4, 0));
        assert_eq!(next, utc(2026, 11, 2, 5, 0));
        assert_eq!(next - start, TimeDelta::hours(25));
    }

    #[test]
    fn test_repeated_hour_on_fall_back_is_two_windows() {
        let clock = new_york(Granularity::Hour);

        // 01:30 EDT, then 01:30 EST one real hour later.
        let first = utc(2026, 11, 1, 5, 30);
        let second = utc(2026, 11, 1, 6, 30);

        assert_eq!(clock.current_window_start(first), utc(2026, 11, 1, 5, 0));
        assert_eq!(clock.next_window_start(first), utc(2026, 11, 1, 6, 0));
        assert_eq!(clock.current_window_start(second), utc(2026, 11, 1, 6, 0));
    }

    #[test]
    fn test_hour_after_spring_forward_gap() {
        let clock = new_york(Granularity::Hour);
        // 03:15 EDT, the first hour after the gap.
        let now = utc(2026, 3, 8, 7, 15);

        assert_eq!(clock.current_window_start(now), utc(2026, 3, 8, 7, 0));
        assert_eq!(clock.time_until_next_window(now), TimeDelta::minutes(45));
    }

    #[test]
    fn test_midnight_gap_resolves_to_transition_instant() {
        // Santiago springs forward at local midnight: 2026-09-06 00:00 does not exist.
        let clock = WindowClock::from_zone_name("America/Santiago", Granularity::Day).unwrap();
        let now = utc(2026, 9, 6, 12, 0);

        let start = clock.current_window_start(now);

        assert!(start <= now);
        assert_eq!(clock.current_window_start(start), start);
        assert_eq!(
            start.with_timezone(&clock.zone()).date_naive(),
            now.with_timezone(&clock.zone()).date_naive()
        );
    }

    #[test]
    fn test_is_stale_compares_whole_windows() {
        let clock = new_york(Granularity::Day);
        let activated = utc(2026, 1, 15, 5, 0);

        assert!(!clock.is_stale(activated, utc(2026, 1, 16, 4, 59)));
        assert!(clock.is_stale(activated, utc(2026, 1, 16, 5, 0)));
        assert!(!clock.is_stale(utc(2026, 1, 17, 5, 0), utc(2026, 1, 16, 12, 0)));
    }

    #[test]
    fn test_windows_between_counts_missed_boundaries() {
        let clock = WindowClock::new(Tz::UTC, Granularity::Hour);

        assert_eq!(clock.windows_between(utc(2026, 1, 15, 10, 0), utc(2026, 1, 15, 10, 59)), 0);
        assert_eq!(clock.windows_between(utc(2026, 1, 15, 10, 0), utc(2026, 1, 15, 13, 5)), 3);
    }

    #[test]
    fn test_window_seed_is_stable_per_window() {
        let daily = WindowClock::new(Tz::UTC, Granularity::Day);
        let hourly = WindowClock::new(Tz::UTC, Granularity::Hour);

        assert_eq!(daily.window_seed(utc(1970, 1, 2, 0, 0)), 1);
        assert_eq!(hourly.window_seed(utc(1970, 1, 2, 0, 0)), 24);
        let epoch = chrono::NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
        let date = chrono::NaiveDate::from_ymd_opt(2026, 1, 15).unwrap();
        assert_eq!(daily.window_seed(utc(2026, 1, 15, 0, 0)), (date - epoch).num_days());
    }

    #[test]
    fn test_granularity_parses_aliases() {
        assert_eq!("Daily".parse::<Granularity>().unwrap(), Granularity::Day);
        assert_eq!("hour".parse::<Granularity>().unwrap(), Granularity::Hour);
        assert!("weekly".parse::<Granularity>().is_err());
    }

    #[test]
    fn test_unknown_zone_is_rejected() {
        let result = WindowClock::from_zone_name("Mars/Olympus_Mons", Granularity::Day);
        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    fn zones() -> impl Strategy<Value = Tz> {
        prop::sample::select(vec![
            Tz::UTC,
            Tz::America__New_York,
            Tz::Europe__London,
            Tz::Asia__Kolkata,
            Tz::Australia__Sydney,
        ])
    }

    fn granularities() -> impl Strategy<Value = Granularity> {
        prop::sample::select(vec![Granularity::Hour, Granularity::Day])
    }

    proptest! {
        #[test]
        fn prop_now_lies_inside_its_window(
            zone in zones(),
            granularity in granularities(),
            secs in 946_684_800_i64..4_102_444_800_i64,
        ) {
            let clock = WindowClock::new(zone, granularity);
            let now = DateTime::from_timestamp(secs, 0).unwrap();

            let start = clock.current_window_start(now);
            let next = clock.next_window_start(now);

            prop_assert!(start <= now);
            prop_assert!(now < next);
            prop_assert_eq!(clock.current_window_start(start), start);
            prop_assert_eq!(clock.current_window_start(next), next);
            prop_assert!(!clock.is_stale(start, now));
        }
    }
}
