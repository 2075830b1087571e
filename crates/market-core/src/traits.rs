use std::time::Duration;

use async_trait::async_trait;
use chrono::{FixedOffset, NaiveDate, Offset, Utc};

use crate::{MarketError, Row, SqlValue};

/// How bound parameters are written into statement text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    /// `?` (SQLite, MySQL, MSSQL drivers)
    Question,
    /// `$1, $2, ...` (Postgres)
    Dollar,
}

/// Runs parametrized statements against the relational store
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    fn placeholder(&self) -> Placeholder {
        Placeholder::Question
    }

    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, MarketError>;
}

/// String-keyed store for serialized results
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, MarketError>;

    /// `ttl = None` keeps the entry until the store evicts it.
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<(), MarketError>;
}

/// Source of "today" in the market's timezone
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// Wall clock shifted to the exchange's UTC offset
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    pub fn with_utc_offset_hours(hours: i32) -> Self {
        let offset = FixedOffset::east_opt(hours * 3600).unwrap_or_else(|| Utc.fix());
        Self { offset }
    }
}

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.offset).date_naive()
    }
}

/// Always returns the same day; used for replaying a date and in tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}
