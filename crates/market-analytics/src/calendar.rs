//! Calendar arithmetic for anchor dates and report periods.
//!
//! Everything here is pure: anchors are computed from an injected "today" and
//! only later resolved against the trading sessions actually present in a table.

use chrono::{Datelike, Days, Months, NaiveDate};
use market_core::{MarketError, WindowSpec, WindowUnit};

/// Calendar targets behind a [`market_core::SessionDateSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTargets {
    pub last_quarter_end: NaiveDate,
    pub first_of_year: NaiveDate,
    pub one_year_back: NaiveDate,
}

pub fn session_targets(today: NaiveDate) -> SessionTargets {
    SessionTargets {
        last_quarter_end: period_end(today, WindowUnit::Quarter, 1),
        first_of_year: NaiveDate::from_ymd_opt(today.year(), 1, 1).unwrap_or(today),
        one_year_back: today.checked_sub_months(Months::new(12)).unwrap_or(today),
    }
}

/// Last calendar day of the period `k` units before `today`; `k = 0` is `today` itself.
pub fn period_end(today: NaiveDate, unit: WindowUnit, k: u32) -> NaiveDate {
    if k == 0 {
        return today;
    }
    match unit {
        WindowUnit::Day => today.checked_sub_days(Days::new(k as u64)).unwrap_or(today),
        WindowUnit::Week => {
            let day = today.checked_sub_days(Days::new(7 * k as u64)).unwrap_or(today);
            let to_sunday = 6 - day.weekday().num_days_from_monday() as u64;
            day.checked_add_days(Days::new(to_sunday)).unwrap_or(day)
        }
        WindowUnit::Month => {
            let index = month_index(today) - k as i32;
            month_end(index.div_euclid(12), index.rem_euclid(12) as u32 + 1)
        }
        WindowUnit::Quarter => {
            let index = quarter_index(today) - k as i32;
            month_end(index.div_euclid(4), index.rem_euclid(4) as u32 * 3 + 3)
        }
        WindowUnit::Year => month_end(today.year() - k as i32, 12),
    }
}

/// Anchors for `order` units back, newest first: `today`, then one period end per unit.
pub fn sample_anchors(today: NaiveDate, window: WindowSpec) -> Vec<NaiveDate> {
    (0..=window.order)
        .map(|k| period_end(today, window.unit, k))
        .collect()
}

/// Liquidity comparison anchors: today, one quarter back, four quarters back, four years back.
pub fn liquidity_anchors(today: NaiveDate) -> [NaiveDate; 4] {
    [
        today,
        period_end(today, WindowUnit::Quarter, 1),
        period_end(today, WindowUnit::Quarter, 4),
        today.checked_sub_months(Months::new(48)).unwrap_or(today),
    ]
}

/// The `count` most recently completed report periods, oldest first.
///
/// Quarters are labelled `YYYYQn`, years `YYYY`.
pub fn report_periods(
    today: NaiveDate,
    unit: WindowUnit,
    count: u32,
) -> Result<Vec<String>, MarketError> {
    let mut periods: Vec<String> = match unit {
        WindowUnit::Quarter => (1..=count as i32)
            .map(|k| {
                let index = quarter_index(today) - k;
                quarter_label(index.div_euclid(4), index.rem_euclid(4) as u32 + 1)
            })
            .collect(),
        WindowUnit::Year => (1..=count as i32)
            .map(|k| (today.year() - k).to_string())
            .collect(),
        other => {
            return Err(MarketError::Validation(format!(
                "financial reports are published per quarter or year, not per {}",
                other
            )))
        }
    };
    periods.reverse();
    Ok(periods)
}

pub fn quarter_label(year: i32, quarter: u32) -> String {
    format!("{}Q{}", year, quarter)
}

fn month_index(date: NaiveDate) -> i32 {
    date.year() * 12 + date.month0() as i32
}

fn quarter_index(date: NaiveDate) -> i32 {
    date.year() * 4 + (date.month0() / 3) as i32
}

fn month_end(year: i32, month: u32) -> NaiveDate {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .unwrap_or(NaiveDate::MIN)
}
