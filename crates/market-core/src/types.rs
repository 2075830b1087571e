use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::MarketError;

/// Exchange a ticker is listed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Exchange {
    Hose,
    Hnx,
    Upcom,
}

impl Exchange {
    pub const ALL: [Exchange; 3] = [Exchange::Hose, Exchange::Hnx, Exchange::Upcom];

    pub fn as_str(&self) -> &'static str {
        match self {
            Exchange::Hose => "HOSE",
            Exchange::Hnx => "HNX",
            Exchange::Upcom => "UPCOM",
        }
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized exchange/industry filter.
///
/// Built by the filter builder; both sets are sorted and de-duplicated so the
/// same logical filter always renders the same cache key fragments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub exchanges: Vec<Exchange>,
    pub industries: Vec<String>,
}

impl FilterSpec {
    pub fn exchange_fragment(&self) -> String {
        self.exchanges
            .iter()
            .map(Exchange::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn industry_fragment(&self) -> String {
        self.industries.join(",")
    }
}

/// Unit of a comparison window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowUnit {
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl WindowUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            WindowUnit::Day => "day",
            WindowUnit::Week => "week",
            WindowUnit::Month => "month",
            WindowUnit::Quarter => "quarter",
            WindowUnit::Year => "year",
        }
    }
}

impl FromStr for WindowUnit {
    type Err = MarketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "0" | "day" => Ok(WindowUnit::Day),
            "1" | "week" => Ok(WindowUnit::Week),
            "2" | "month" => Ok(WindowUnit::Month),
            "3" | "quarter" => Ok(WindowUnit::Quarter),
            "4" | "year" => Ok(WindowUnit::Year),
            other => Err(MarketError::Validation(format!("unknown window type '{}'", other))),
        }
    }
}

impl fmt::Display for WindowUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// (type, order) pair: compare against `order` units back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowSpec {
    pub unit: WindowUnit,
    pub order: u32,
}

impl WindowSpec {
    pub const MAX_ORDER: u32 = 20;

    pub fn new(unit: WindowUnit, order: u32) -> Result<Self, MarketError> {
        if order == 0 || order > Self::MAX_ORDER {
            return Err(MarketError::Validation(format!(
                "window order must be between 1 and {}, got {}",
                Self::MAX_ORDER,
                order
            )));
        }
        Ok(Self { unit, order })
    }

    pub fn cache_fragment(&self) -> String {
        format!("{}:{}", self.order, self.unit)
    }
}

/// Five named trading-session anchors for one fact table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDateSet {
    pub latest_date: NaiveDate,
    pub last_five_date: NaiveDate,
    pub last_quarter_date: NaiveDate,
    pub first_year_date: NaiveDate,
    pub last_year_date: NaiveDate,
}

/// Latest session and the fifth most recent one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentSessions {
    pub latest_date: NaiveDate,
    pub last_five_date: NaiveDate,
}

/// One current-vs-prior comparison for an entity (ticker or industry).
///
/// `date` is the current side; `prior_date` names the baseline it was compared
/// against. `report` is set for analytics partitioned by report line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub date: String,
    pub entity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prior_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<String>,
    pub prior_value: Option<f64>,
    pub current_value: Option<f64>,
    pub percent_change: Option<f64>,
}

impl ChangeRecord {
    pub fn new(
        date: impl Into<String>,
        entity: impl Into<String>,
        prior_value: Option<f64>,
        current_value: Option<f64>,
    ) -> Self {
        Self {
            date: date.into(),
            entity: entity.into(),
            prior_date: None,
            report: None,
            prior_value,
            current_value,
            percent_change: percent_change(prior_value, current_value),
        }
    }

    pub fn with_prior_date(mut self, prior_date: Option<String>) -> Self {
        self.prior_date = prior_date;
        self
    }

    pub fn with_report(mut self, report: Option<String>) -> Self {
        self.report = report;
        self
    }
}

/// `(current - prior) / |prior| * 100`, `None` when no comparison is possible.
pub fn percent_change(prior: Option<f64>, current: Option<f64>) -> Option<f64> {
    let (prior, current) = (prior?, current?);
    if prior == 0.0 {
        return None;
    }
    let change = (current - prior) / prior.abs() * 100.0;
    change.is_finite().then_some(change)
}

/// A single bound parameter or result cell.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Int(i64),
    Double(f64),
    Text(String),
    Date(NaiveDate),
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(value: NaiveDate) -> Self {
        SqlValue::Date(value)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Double(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int(value)
    }
}

/// Result row keyed by column name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: HashMap<String, SqlValue>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: &str, value: impl Into<SqlValue>) -> Self {
        self.insert(column, value.into());
        self
    }

    pub fn insert(&mut self, column: &str, value: SqlValue) {
        self.columns.insert(column.to_string(), value);
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns.get(column)
    }

    /// Numeric cell; integers widen, NULL and missing columns are `None`.
    pub fn f64(&self, column: &str) -> Option<f64> {
        match self.columns.get(column)? {
            SqlValue::Double(v) => Some(*v),
            SqlValue::Int(v) => Some(*v as f64),
            SqlValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn i64(&self, column: &str) -> Option<i64> {
        match self.columns.get(column)? {
            SqlValue::Int(v) => Some(*v),
            SqlValue::Double(v) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn text(&self, column: &str) -> Option<String> {
        match self.columns.get(column)? {
            SqlValue::Text(s) => Some(s.clone()),
            SqlValue::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            SqlValue::Int(v) => Some(v.to_string()),
            _ => None,
        }
    }

    /// Date cell stored either natively or as ISO text (optionally with a time part).
    pub fn date(&self, column: &str) -> Option<NaiveDate> {
        match self.columns.get(column)? {
            SqlValue::Date(d) => Some(*d),
            SqlValue::Text(s) => NaiveDate::parse_from_str(s.get(..10)?, "%Y-%m-%d").ok(),
            _ => None,
        }
    }
}
