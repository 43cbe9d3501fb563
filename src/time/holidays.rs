/// Pluggable holiday calendar. The holiday calendar's data is explicitly
/// out of scope (§1 non-goals); the mechanism — weekday check plus an
/// injectable holiday set — is kept.
use chrono::{Datelike, NaiveDate, Weekday};
use std::collections::HashSet;

pub trait HolidayCalendar: Send + Sync {
    fn is_trading_day(&self, date: NaiveDate) -> bool;

    fn next_trading_day(&self, from_date: NaiveDate) -> NaiveDate {
        let mut date = from_date + chrono::Duration::days(1);
        while !self.is_trading_day(date) {
            date += chrono::Duration::days(1);
        }
        date
    }
}

/// Weekends only; no named holidays. Useful as a baseline or for tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct WeekdayCalendar;

impl HolidayCalendar for WeekdayCalendar {
    fn is_trading_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
    }
}

/// Weekday calendar plus an explicit set of named holidays.
#[derive(Debug, Clone, Default)]
pub struct FixedHolidayCalendar {
    holidays: HashSet<NaiveDate>,
}

impl FixedHolidayCalendar {
    pub fn new(holidays: HashSet<NaiveDate>) -> Self {
        Self { holidays }
    }
}

impl HolidayCalendar for FixedHolidayCalendar {
    fn is_trading_day(&self, date: NaiveDate) -> bool {
        WeekdayCalendar.is_trading_day(date) && !self.holidays.contains(&date)
    }
}
