//! Trading-session date resolution.
//!
//! Markets are closed on weekends and holidays, so every calendar anchor has
//! to be mapped onto a date that actually exists in the fact table.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use market_core::{Clock, MarketError, MarketResult, QueryExecutor, RecentSessions, SessionDateSet};

use crate::cache::{CacheGateway, CacheKey};
use crate::calendar::session_targets;
use crate::sql::SqlBuilder;

const SESSION_DATE_KEY: &str = "session-date";
const RECENT_SESSIONS_KEY: &str = "recent-sessions";
const NEAREST_DATE_KEY: &str = "nearest-date";

/// Fact tables that carry a trading-session date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FactTable {
    TickerTrade,
    Ratio,
}

impl FactTable {
    pub fn table(&self) -> &'static str {
        match self {
            FactTable::TickerTrade => "ticker_trade",
            FactTable::Ratio => "ratio",
        }
    }

    pub fn date_column(&self) -> &'static str {
        match self {
            FactTable::TickerTrade => "trade_date",
            FactTable::Ratio => "report_date",
        }
    }
}

pub struct DateResolver {
    executor: Arc<dyn QueryExecutor>,
    cache: Arc<CacheGateway>,
    clock: Arc<dyn Clock>,
    session_ttl: Option<Duration>,
}

impl DateResolver {
    pub fn new(
        executor: Arc<dyn QueryExecutor>,
        cache: Arc<CacheGateway>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let session_ttl = cache.default_ttl();
        Self {
            executor,
            cache,
            clock,
            session_ttl,
        }
    }

    /// TTL for [`SessionDateSet`] entries; `None` keeps them until the cache evicts them.
    pub fn with_session_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.session_ttl = ttl;
        self
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    /// Resolve the five named session anchors for `table`.
    pub async fn resolve_session_dates(&self, table: FactTable) -> MarketResult<SessionDateSet> {
        let key = CacheKey::new(SESSION_DATE_KEY)
            .part(table.table())
            .part(table.date_column());

        self.cache
            .get_or_compute_with_ttl(&key, self.session_ttl, || self.query_session_dates(table))
            .await
    }

    async fn query_session_dates(&self, table: FactTable) -> MarketResult<SessionDateSet> {
        let targets = session_targets(self.today());
        let (name, col) = (table.table(), table.date_column());

        let mut b = SqlBuilder::new(self.executor.placeholder());
        push_recent(&mut b, table);
        b.push(&format!(
            " UNION ALL SELECT 'last_quarter' AS anchor, q.d AS session_date FROM (\
             SELECT {col} AS d FROM {name} WHERE {col} IS NOT NULL AND {col} <= "
        ))
        .push_bind(targets.last_quarter_end)
        .push(" ORDER BY d DESC LIMIT 1) AS q");
        b.push(&format!(
            " UNION ALL SELECT 'first_year' AS anchor, y.d AS session_date FROM (\
             SELECT {col} AS d FROM {name} WHERE {col} IS NOT NULL AND {col} >= "
        ))
        .push_bind(targets.first_of_year)
        .push(" ORDER BY d ASC LIMIT 1) AS y");
        b.push(&format!(
            " UNION ALL SELECT 'last_year' AS anchor, b.d AS session_date FROM (\
             SELECT {col} AS d FROM {name} WHERE {col} IS NOT NULL AND {col} >= "
        ))
        .push_bind(targets.one_year_back)
        .push(" ORDER BY d ASC LIMIT 1) AS b");

        let rows = self.executor.query(b.sql(), b.params()).await?;

        let mut recent: Vec<NaiveDate> = Vec::with_capacity(5);
        let mut anchors: HashMap<String, NaiveDate> = HashMap::new();
        for row in &rows {
            let (Some(anchor), Some(date)) = (row.text("anchor"), row.date("session_date")) else {
                continue;
            };
            if anchor == "recent" {
                recent.push(date);
            } else {
                anchors.insert(anchor, date);
            }
        }

        let named = |label: &str| {
            anchors
                .get(label)
                .copied()
                .ok_or_else(|| MarketError::missing_anchor(name, label))
        };

        let RecentSessions {
            latest_date,
            last_five_date,
        } = pick_recent(recent, table)?;
        let dates = SessionDateSet {
            latest_date,
            last_five_date,
            last_quarter_date: named("last_quarter")?,
            first_year_date: named("first_year")?,
            last_year_date: named("last_year")?,
        };

        tracing::info!(
            "Resolved session dates for {}: latest={} five={} quarter={} ytd={} year={}",
            name,
            dates.latest_date,
            dates.last_five_date,
            dates.last_quarter_date,
            dates.first_year_date,
            dates.last_year_date
        );
        Ok(dates)
    }

    /// Latest session and the fifth most recent one, without the calendar anchors.
    ///
    /// Succeeds whenever five sessions exist, including the days of a new year
    /// before its first session.
    pub async fn resolve_recent_sessions(&self, table: FactTable) -> MarketResult<RecentSessions> {
        let key = CacheKey::new(RECENT_SESSIONS_KEY)
            .part(table.table())
            .part(table.date_column());

        self.cache
            .get_or_compute_with_ttl(&key, self.session_ttl, || async move {
                let mut b = SqlBuilder::new(self.executor.placeholder());
                push_recent(&mut b, table);
                let rows = self.executor.query(b.sql(), b.params()).await?;
                let recent: Vec<NaiveDate> =
                    rows.iter().filter_map(|row| row.date("session_date")).collect();
                pick_recent(recent, table)
            })
            .await
    }

    /// Latest session in `table` on or before `target`.
    pub async fn resolve_nearest_date(
        &self,
        table: FactTable,
        target: NaiveDate,
    ) -> MarketResult<NaiveDate> {
        let key = CacheKey::new(NEAREST_DATE_KEY)
            .part(table.table())
            .part(&target.format("%Y-%m-%d").to_string());

        self.cache
            .get_or_compute(&key, || async move {
                let col = table.date_column();
                let mut b = SqlBuilder::new(self.executor.placeholder());
                b.push(&format!(
                    "SELECT {col} AS session_date FROM {} WHERE {col} IS NOT NULL AND {col} <= ",
                    table.table()
                ))
                .push_bind(target)
                .push(" ORDER BY session_date DESC LIMIT 1");

                let rows = self.executor.query(b.sql(), b.params()).await?;
                rows.first()
                    .and_then(|row| row.date("session_date"))
                    .ok_or_else(|| {
                        MarketError::Resolution(format!(
                            "no trading session on or before {} in {}",
                            target,
                            table.table()
                        ))
                    })
            })
            .await
    }

    /// Resolve each target to its nearest session, newest first, duplicates removed.
    pub async fn resolve_samples(
        &self,
        table: FactTable,
        targets: &[NaiveDate],
    ) -> MarketResult<Vec<NaiveDate>> {
        let mut dates = Vec::with_capacity(targets.len());
        for target in targets {
            dates.push(self.resolve_nearest_date(table, *target).await?);
        }
        dates.sort_unstable_by(|a, b| b.cmp(a));
        dates.dedup();
        Ok(dates)
    }
}

/// Five most recent distinct sessions, tagged `recent`.
fn push_recent(b: &mut SqlBuilder, table: FactTable) {
    let (name, col) = (table.table(), table.date_column());
    b.push(&format!(
        "SELECT 'recent' AS anchor, r.d AS session_date FROM (\
         SELECT DISTINCT {col} AS d FROM {name} WHERE {col} IS NOT NULL ORDER BY d DESC LIMIT 5) AS r"
    ));
}

fn pick_recent(mut recent: Vec<NaiveDate>, table: FactTable) -> MarketResult<RecentSessions> {
    recent.sort_unstable_by(|a, b| b.cmp(a));
    recent.dedup();
    Ok(RecentSessions {
        latest_date: recent
            .first()
            .copied()
            .ok_or_else(|| MarketError::missing_anchor(table.table(), "latest"))?,
        last_five_date: recent
            .get(4)
            .copied()
            .ok_or_else(|| MarketError::missing_anchor(table.table(), "last_five"))?,
    })
}
