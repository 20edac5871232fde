//! Payout date arithmetic: closing periods and business-day adjustment.

use chrono::{Datelike, NaiveDate, Weekday};

/// Add whole months to a (year, month) pair.
fn add_months(year: i32, month: u32, offset: u32) -> (i32, u32) {
    let total = (month - 1) + offset;
    (year + (total / 12) as i32, total % 12 + 1)
}

pub fn end_of_month(year: i32, month: u32) -> NaiveDate {
    let (ny, nm) = add_months(year, month, 1);
    // month is always 1..=12 here
    NaiveDate::from_ymd_opt(ny, nm, 1)
        .and_then(|d| d.pred_opt())
        .unwrap_or(NaiveDate::MAX)
}

pub fn start_of_month(year: i32, month: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(NaiveDate::MAX)
}

/// First and last day of the calendar month containing `date`.
pub fn month_bounds(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    (
        start_of_month(date.year(), date.month()),
        end_of_month(date.year(), date.month()),
    )
}

pub fn closing_month_label(period_end: NaiveDate) -> String {
    format!("{:04}-{:02}", period_end.year(), period_end.month())
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Scheduled payout date: `period_end + offset_months`, pinned to end of
/// month, then walked backward day-by-day off weekends when business-day
/// adjustment is on.
pub fn scheduled_payout_date(
    period_end: NaiveDate,
    offset_months: u32,
    business_day_adjustment: bool,
) -> NaiveDate {
    let (y, m) = add_months(period_end.year(), period_end.month(), offset_months);
    let mut date = end_of_month(y, m);
    if business_day_adjustment {
        while is_weekend(date) {
            match date.pred_opt() {
                Some(prev) => date = prev,
                None => break,
            }
        }
    }
    date
}
