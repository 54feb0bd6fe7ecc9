//! Quiet Hours
//!
//! Decides whether "now" falls inside a subject's night window. Both window
//! boundaries get a jitter of up to ±15 minutes that is stable for one
//! subject on one calendar day and changes from day to day.

use chrono::{Datelike, Duration, Local, NaiveDateTime, Timelike};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

const MINUTES_PER_DAY: i64 = 1440;
const MAX_JITTER_MINUTES: i64 = 15;

/// Source of the current local time
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Local wall clock shifted by a fixed number of hours
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock {
    offset_hours: i64,
}

impl SystemClock {
    pub fn new(offset_hours: i64) -> Self {
        Self { offset_hours }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local() + Duration::hours(self.offset_hours)
    }
}

/// Clock frozen at one instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

/// Configured window `[start_hour, end_hour)`; may wrap past midnight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuietWindow {
    pub start_hour: u8,
    pub end_hour: u8,
}

impl QuietWindow {
    pub fn new(start_hour: u8, end_hour: u8) -> Self {
        Self {
            start_hour,
            end_hour,
        }
    }
}

/// Result of one evaluation, with the offsets actually applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuietCheck {
    pub inside: bool,
    pub offset_start: i64,
    pub offset_end: i64,
}

/// Per-day, per-subject seed: proleptic Gregorian ordinal + subject id
fn day_seed(subject_id: i64, now: &NaiveDateTime) -> u64 {
    let ordinal = i64::from(now.date().num_days_from_ce());
    ordinal.wrapping_add(subject_id) as u64
}

/// Evaluate the window for `subject_id` at `now`
pub fn evaluate(subject_id: i64, window: QuietWindow, now: NaiveDateTime) -> QuietCheck {
    let mut rng = StdRng::seed_from_u64(day_seed(subject_id, &now));
    let offset_start = rng.gen_range(-MAX_JITTER_MINUTES..=MAX_JITTER_MINUTES);
    let offset_end = rng.gen_range(-MAX_JITTER_MINUTES..=MAX_JITTER_MINUTES);

    let start = (i64::from(window.start_hour) * 60 + offset_start).rem_euclid(MINUTES_PER_DAY);
    let end = (i64::from(window.end_hour) * 60 + offset_end).rem_euclid(MINUTES_PER_DAY);
    let current = i64::from(now.hour()) * 60 + i64::from(now.minute());

    let inside = if start > end {
        current >= start || current < end
    } else {
        start <= current && current < end
    };

    QuietCheck {
        inside,
        offset_start,
        offset_end,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    #[test]
    fn test_deterministic_per_day_and_subject() {
        let window = QuietWindow::new(23, 7);
        let first = evaluate(42, window, at(10, 14, 0));
        let second = evaluate(42, window, at(10, 14, 0));
        assert_eq!(first, second);

        // same day, different time: same jitter
        let later = evaluate(42, window, at(10, 20, 30));
        assert_eq!(
            (first.offset_start, first.offset_end),
            (later.offset_start, later.offset_end)
        );
    }

    #[test]
    fn test_offsets_bounded() {
        let window = QuietWindow::new(0, 7);
        for subject in 0..200 {
            for day in 1..=28 {
                let check = evaluate(subject, window, at(day, 12, 0));
                assert!((-15..=15).contains(&check.offset_start));
                assert!((-15..=15).contains(&check.offset_end));
            }
        }
    }

    #[test]
    fn test_jitter_varies() {
        let window = QuietWindow::new(23, 7);
        let offsets: std::collections::HashSet<_> = (1..=28)
            .map(|day| {
                let c = evaluate(7, window, at(day, 12, 0));
                (c.offset_start, c.offset_end)
            })
            .collect();
        assert!(offsets.len() > 1);
    }

    #[test]
    fn test_wrapping_window() {
        let window = QuietWindow::new(23, 7);
        for day in 1..=28 {
            assert!(evaluate(1, window, at(day, 2, 0)).inside);
            assert!(evaluate(1, window, at(day, 23, 45)).inside);
            assert!(!evaluate(1, window, at(day, 12, 0)).inside);
            assert!(!evaluate(1, window, at(day, 22, 0)).inside);
            assert!(!evaluate(1, window, at(day, 8, 0)).inside);
        }
    }

    #[test]
    fn test_daytime_window() {
        let window = QuietWindow::new(9, 17);
        for day in 1..=28 {
            assert!(evaluate(5, window, at(day, 12, 0)).inside);
            assert!(!evaluate(5, window, at(day, 20, 0)).inside);
            assert!(!evaluate(5, window, at(day, 3, 0)).inside);
        }
    }

    #[test]
    fn test_negative_jitter_wraps_midnight() {
        // start at 00:00 with negative jitter lands before midnight
        let window = QuietWindow::new(0, 7);
        for subject in 0..50 {
            let check = evaluate(subject, window, at(4, 3, 0));
            assert!(check.inside);
        }
    }

    #[test]
    fn test_fixed_clock() {
        let clock = FixedClock(at(1, 6, 30));
        assert_eq!(clock.now(), at(1, 6, 30));
    }
}
