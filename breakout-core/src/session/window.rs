//! Local time-of-day windows, including windows that cross midnight.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone};

/// A time-of-day window in the strategy's local timezone.
///
/// `start > end` means the window crosses midnight (e.g. 19:00 → 00:55).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    pub fn crosses_midnight(&self) -> bool {
        self.start > self.end
    }

    /// Closed-interval test `[start, end]`.
    pub fn contains(&self, t: NaiveTime) -> bool {
        if self.crosses_midnight() {
            t >= self.start || t <= self.end
        } else {
            self.start <= t && t <= self.end
        }
    }

    /// Half-open test `[start, end)`.
    pub fn contains_half_open(&self, t: NaiveTime) -> bool {
        if self.crosses_midnight() {
            t >= self.start || t < self.end
        } else {
            self.start <= t && t < self.end
        }
    }

    /// True once the window has fully finished for the current trading day.
    ///
    /// For a midnight-crossing window the "after" stretch is `[end, start)`;
    /// otherwise it is everything from `end` until midnight.
    pub fn has_ended(&self, t: NaiveTime) -> bool {
        if self.contains_half_open(t) {
            return false;
        }
        if self.crosses_midnight() {
            t >= self.end && t < self.start
        } else {
            t >= self.end
        }
    }

    /// Trading-day key for a local timestamp, anchored on this (Asian) window.
    ///
    /// The key is the local date on which the window ends, so a window that
    /// opens at 19:00 keeps accumulating across midnight into the same day.
    pub fn trading_day<Tz: TimeZone>(&self, local: &DateTime<Tz>) -> NaiveDate {
        let date = local.date_naive();
        if self.crosses_midnight() && local.time() >= self.start {
            date.succ_opt().unwrap_or(date)
        } else {
            date
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn overnight() -> TimeWindow {
        TimeWindow::new(t(19, 0), t(0, 55))
    }

    fn daytime() -> TimeWindow {
        TimeWindow::new(t(2, 0), t(5, 0))
    }

    #[test]
    fn overnight_contains_both_sides_of_midnight() {
        let w = overnight();
        assert!(w.crosses_midnight());
        assert!(w.contains_half_open(t(19, 0)));
        assert!(w.contains_half_open(t(23, 59)));
        assert!(w.contains_half_open(t(0, 54)));
        assert!(!w.contains_half_open(t(0, 55)));
        assert!(w.contains(t(0, 55)));
        assert!(!w.contains_half_open(t(18, 59)));
    }

    #[test]
    fn daytime_window_bounds() {
        let w = daytime();
        assert!(!w.crosses_midnight());
        assert!(w.contains(t(2, 0)));
        assert!(w.contains(t(5, 0)));
        assert!(!w.contains_half_open(t(5, 0)));
        assert!(!w.contains(t(1, 59)));
    }

    #[test]
    fn overnight_has_ended_only_between_end_and_start() {
        let w = overnight();
        assert!(!w.has_ended(t(23, 0)));
        assert!(!w.has_ended(t(0, 30)));
        assert!(w.has_ended(t(0, 55)));
        assert!(w.has_ended(t(12, 0)));
        assert!(w.has_ended(t(18, 59)));
        assert!(!w.has_ended(t(19, 0)));
    }

    #[test]
    fn daytime_has_ended_after_end_only() {
        let w = daytime();
        assert!(!w.has_ended(t(1, 0)));
        assert!(!w.has_ended(t(3, 0)));
        assert!(w.has_ended(t(5, 0)));
        assert!(w.has_ended(t(23, 59)));
    }

    #[test]
    fn trading_day_rolls_at_overnight_start() {
        let w = overnight();
        let evening = Utc.with_ymd_and_hms(2024, 3, 4, 19, 0, 0).unwrap();
        let after_midnight = Utc.with_ymd_and_hms(2024, 3, 5, 0, 30, 0).unwrap();
        let morning = Utc.with_ymd_and_hms(2024, 3, 5, 8, 0, 0).unwrap();
        let expected = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        assert_eq!(w.trading_day(&evening), expected);
        assert_eq!(w.trading_day(&after_midnight), expected);
        assert_eq!(w.trading_day(&morning), expected);
    }

    #[test]
    fn trading_day_is_calendar_date_for_daytime_window() {
        let w = daytime();
        let late = Utc.with_ymd_and_hms(2024, 3, 4, 23, 0, 0).unwrap();
        assert_eq!(
            w.trading_day(&late),
            NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()
        );
    }
}
