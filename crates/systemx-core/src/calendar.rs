//! Market-session oracle: pure functions of time.
//!
//! Answers "is the market open now" and "when is the next session boundary"
//! from a computed NYSE calendar (weekends, US market holidays, 09:30-16:00
//! Eastern with DST). Callers treat any oracle error as market CLOSED.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};

use crate::{Error, Result};

const EST_OFFSET_SECS: i32 = 5 * 3600;
const EDT_OFFSET_SECS: i32 = 4 * 3600;

/// How far ahead `next_boundary` will scan for a trading day before giving
/// up. Exchange closures never run this long.
const MAX_SCAN_DAYS: i64 = 30;

/// Answers session questions for a trading venue.
pub trait SessionOracle: Send + Sync {
    fn is_market_open(&self, now: DateTime<Utc>) -> Result<bool>;
    fn next_boundary(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>>;
}

/// Computed NYSE trading calendar. No side effects, no external data source.
#[derive(Debug, Clone, Default)]
pub struct MarketCalendar;

impl MarketCalendar {
    pub fn new() -> Self {
        Self
    }

    fn open_time() -> NaiveTime {
        NaiveTime::from_hms_opt(9, 30, 0).unwrap()
    }

    fn close_time() -> NaiveTime {
        NaiveTime::from_hms_opt(16, 0, 0).unwrap()
    }

    /// Eastern offset for a given local date (EDT inside the DST window,
    /// EST outside). DST runs from the second Sunday of March to the first
    /// Sunday of November.
    fn eastern_offset(date: NaiveDate) -> FixedOffset {
        let dst_start = nth_weekday(date.year(), 3, Weekday::Sun, 2);
        let dst_end = nth_weekday(date.year(), 11, Weekday::Sun, 1);
        let secs = if date >= dst_start && date < dst_end {
            EDT_OFFSET_SECS
        } else {
            EST_OFFSET_SECS
        };
        FixedOffset::west_opt(secs).unwrap()
    }

    /// Convert a UTC instant to Eastern wall-clock time.
    fn to_eastern(now: DateTime<Utc>) -> DateTime<FixedOffset> {
        // Resolve the date with the standard offset first, then re-apply the
        // DST-aware offset for that date. The one-hour ambiguity windows fall
        // in the small hours, well outside the trading session.
        let est = FixedOffset::west_opt(EST_OFFSET_SECS).unwrap();
        let approx_date = now.with_timezone(&est).date_naive();
        now.with_timezone(&Self::eastern_offset(approx_date))
    }

    fn is_trading_day(date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !is_market_holiday(date)
    }

    fn session_open(date: NaiveDate) -> Result<DateTime<Utc>> {
        Self::local_to_utc(date, Self::open_time())
    }

    fn session_close(date: NaiveDate) -> Result<DateTime<Utc>> {
        Self::local_to_utc(date, Self::close_time())
    }

    fn local_to_utc(date: NaiveDate, time: NaiveTime) -> Result<DateTime<Utc>> {
        let offset = Self::eastern_offset(date);
        offset
            .from_local_datetime(&date.and_time(time))
            .single()
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| Error::Calendar(format!("ambiguous local time {date} {time}")))
    }
}

impl SessionOracle for MarketCalendar {
    fn is_market_open(&self, now: DateTime<Utc>) -> Result<bool> {
        let eastern = Self::to_eastern(now);
        let date = eastern.date_naive();
        if !Self::is_trading_day(date) {
            return Ok(false);
        }
        let time = eastern.time();
        Ok(time >= Self::open_time() && time < Self::close_time())
    }

    fn next_boundary(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        if self.is_market_open(now)? {
            let date = Self::to_eastern(now).date_naive();
            return Self::session_close(date);
        }

        let mut date = Self::to_eastern(now).date_naive();
        for _ in 0..MAX_SCAN_DAYS {
            if Self::is_trading_day(date) {
                let open = Self::session_open(date)?;
                if open > now {
                    return Ok(open);
                }
            }
            date += Duration::days(1);
        }
        Err(Error::Calendar(format!(
            "no trading day within {MAX_SCAN_DAYS} days of {now}"
        )))
    }
}

/// Nth occurrence of a weekday within a month (1-based).
fn nth_weekday(year: i32, month: u32, weekday: Weekday, n: u32) -> NaiveDate {
    let first = NaiveDate::from_ymd_opt(year, month, 1).unwrap();
    let offset = (7 + weekday.num_days_from_monday() - first.weekday().num_days_from_monday()) % 7;
    first + Duration::days(offset as i64 + 7 * (n as i64 - 1))
}

/// Last occurrence of a weekday within a month.
fn last_weekday(year: i32, month: u32, weekday: Weekday) -> NaiveDate {
    let next_month = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1).unwrap()
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1).unwrap()
    };
    let mut date = next_month - Duration::days(1);
    while date.weekday() != weekday {
        date -= Duration::days(1);
    }
    date
}

/// Weekend holidays shift to the adjacent weekday, per exchange practice.
fn observed(date: NaiveDate) -> NaiveDate {
    match date.weekday() {
        Weekday::Sat => date - Duration::days(1),
        Weekday::Sun => date + Duration::days(1),
        _ => date,
    }
}

/// Easter Sunday via the anonymous Gregorian computus.
fn easter_sunday(year: i32) -> NaiveDate {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = (h + l - 7 * m + 114) % 31 + 1;
    NaiveDate::from_ymd_opt(year, month as u32, day as u32).unwrap()
}

/// Full-day NYSE market holidays for the given date's year.
fn is_market_holiday(date: NaiveDate) -> bool {
    let year = date.year();
    let fixed = |month: u32, day: u32| {
        observed(NaiveDate::from_ymd_opt(year, month, day).unwrap())
    };

    let holidays = [
        fixed(1, 1),                               // New Year's Day
        nth_weekday(year, 1, Weekday::Mon, 3),     // Martin Luther King Jr. Day
        nth_weekday(year, 2, Weekday::Mon, 3),     // Washington's Birthday
        easter_sunday(year) - Duration::days(2),   // Good Friday
        last_weekday(year, 5, Weekday::Mon),       // Memorial Day
        fixed(6, 19),                              // Juneteenth
        fixed(7, 4),                               // Independence Day
        nth_weekday(year, 9, Weekday::Mon, 1),     // Labor Day
        nth_weekday(year, 11, Weekday::Thu, 4),    // Thanksgiving
        fixed(12, 25),                             // Christmas
    ];

    holidays.contains(&date)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn open_midday_on_regular_weekday() {
        // Wednesday 2026-01-07 15:00 UTC = 10:00 EST.
        let cal = MarketCalendar::new();
        assert!(cal.is_market_open(utc(2026, 1, 7, 15, 0)).unwrap());
    }

    #[test]
    fn closed_before_open_and_after_close() {
        let cal = MarketCalendar::new();
        // 14:00 UTC = 09:00 EST, before the bell.
        assert!(!cal.is_market_open(utc(2026, 1, 7, 14, 0)).unwrap());
        // 21:30 UTC = 16:30 EST.
        assert!(!cal.is_market_open(utc(2026, 1, 7, 21, 30)).unwrap());
    }

    #[test]
    fn closed_on_weekends() {
        let cal = MarketCalendar::new();
        // Saturday 2026-01-10.
        assert!(!cal.is_market_open(utc(2026, 1, 10, 15, 0)).unwrap());
    }

    #[test]
    fn dst_shifts_the_open() {
        let cal = MarketCalendar::new();
        // Monday 2026-06-15: EDT, so 13:30 UTC is exactly the open.
        assert!(cal.is_market_open(utc(2026, 6, 15, 13, 30)).unwrap());
        assert!(!cal.is_market_open(utc(2026, 6, 15, 13, 29)).unwrap());
        // Monday 2026-01-05: EST, so 13:30 UTC is still pre-market.
        assert!(!cal.is_market_open(utc(2026, 1, 5, 13, 30)).unwrap());
        assert!(cal.is_market_open(utc(2026, 1, 5, 14, 30)).unwrap());
    }

    #[test]
    fn known_holidays_closed() {
        let cal = MarketCalendar::new();
        // Thanksgiving 2025 (Thursday 2025-11-27).
        assert!(!cal.is_market_open(utc(2025, 11, 27, 16, 0)).unwrap());
        // Good Friday 2026 (Easter is 2026-04-05, so 2026-04-03).
        assert!(!cal.is_market_open(utc(2026, 4, 3, 15, 0)).unwrap());
        // Independence Day 2026 falls on Saturday, observed Friday 2026-07-03.
        assert!(!cal.is_market_open(utc(2026, 7, 3, 15, 0)).unwrap());
    }

    #[test]
    fn next_boundary_is_close_while_open() {
        let cal = MarketCalendar::new();
        let now = utc(2026, 1, 7, 15, 0);
        let boundary = cal.next_boundary(now).unwrap();
        // 16:00 EST = 21:00 UTC.
        assert_eq!(boundary, utc(2026, 1, 7, 21, 0));
    }

    #[test]
    fn next_boundary_skips_weekend_to_monday_open() {
        let cal = MarketCalendar::new();
        // Friday 2026-01-09 after the close.
        let now = utc(2026, 1, 9, 22, 0);
        let boundary = cal.next_boundary(now).unwrap();
        // Monday 2026-01-12 09:30 EST = 14:30 UTC.
        assert_eq!(boundary, utc(2026, 1, 12, 14, 30));
    }

    #[test]
    fn easter_computus_known_years() {
        assert_eq!(easter_sunday(2025), NaiveDate::from_ymd_opt(2025, 4, 20).unwrap());
        assert_eq!(easter_sunday(2026), NaiveDate::from_ymd_opt(2026, 4, 5).unwrap());
        assert_eq!(easter_sunday(2027), NaiveDate::from_ymd_opt(2027, 3, 28).unwrap());
    }
}
