//! Aggregation engine: resolves windows, runs the comparison or lag query and
//! reshapes the records for each analytic, caching every typed result.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Days, Months, NaiveDate};
use market_core::{
    industry_color, percent_change, ChangeRecord, Clock, FilterSpec, MarketError, MarketResult,
    QueryExecutor, Row, WindowSpec, WindowUnit,
};

use crate::cache::{CacheGateway, CacheKey};
use crate::calendar::{liquidity_anchors, report_periods, sample_anchors};
use crate::dates::{DateResolver, FactTable};
use crate::metrics::{Measure, Metric, WindowStrategy, DEBT_LINES, EQUITY_LINES};
use crate::models::{
    EquityChange, IndustryBreadth, IndustryChange, LiabilitiesChange, LiquidityChangePerformance,
    PriceChangePerformance, TopMover,
};
use crate::queries::{
    breadth_counts_query, closes_query, comparison_query, decode_change, decode_point, series_query,
};
use crate::reshape::{pivot, rank_top, to_series, PivotMode, PivotRow};
use crate::series::{lag_changes, sort_point_in_time, sort_time_series, TOP_N};
use crate::sql::SqlBuilder;

const BREADTH_KEY: &str = "breadth";
const TOP_MOVERS_KEY: &str = "top-movers";
pub const DEFAULT_TOP_MOVERS: usize = 10;

/// Dates a metric is evaluated at
#[derive(Debug, Clone, PartialEq)]
enum Plan {
    Compare {
        current: Vec<String>,
        prior: Vec<String>,
        strict: bool,
    },
    Lag {
        dates: Vec<String>,
    },
}

impl Plan {
    fn prior(&self) -> &[String] {
        match self {
            Plan::Compare { prior, .. } => prior,
            Plan::Lag { .. } => &[],
        }
    }
}

fn iso(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub struct MarketAnalytics {
    executor: Arc<dyn QueryExecutor>,
    cache: Arc<CacheGateway>,
    dates: DateResolver,
}

impl MarketAnalytics {
    pub fn new(
        executor: Arc<dyn QueryExecutor>,
        cache: Arc<CacheGateway>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let dates = DateResolver::new(executor.clone(), cache.clone(), clock);
        Self { executor, cache, dates }
    }

    pub fn with_session_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.dates = self.dates.with_session_ttl(ttl);
        self
    }

    pub fn dates(&self) -> &DateResolver {
        &self.dates
    }

    /// Uncached change records for `metric`, sorted but not truncated.
    ///
    /// Windowed metrics require `window`; the fixed-anchor ones ignore it.
    pub async fn compute_change(
        &self,
        metric: Metric,
        filter: &FilterSpec,
        window: Option<WindowSpec>,
    ) -> MarketResult<Vec<ChangeRecord>> {
        let plan = self.plan(metric, window).await?;
        self.execute(metric, filter, &plan).await
    }

    async fn plan(&self, metric: Metric, window: Option<WindowSpec>) -> MarketResult<Plan> {
        let today = self.dates.today();

        let plan = match metric.strategy() {
            WindowStrategy::SessionAnchors => {
                let s = self.dates.resolve_session_dates(FactTable::TickerTrade).await?;
                Plan::Compare {
                    current: vec![iso(s.latest_date)],
                    prior: vec![
                        iso(s.last_five_date),
                        iso(s.last_quarter_date),
                        iso(s.first_year_date),
                        iso(s.last_year_date),
                    ],
                    strict: true,
                }
            }
            WindowStrategy::QuarterAnchors => {
                let mut resolved = Vec::with_capacity(4);
                for anchor in liquidity_anchors(today) {
                    let session = self
                        .dates
                        .resolve_nearest_date(FactTable::TickerTrade, anchor)
                        .await?;
                    resolved.push(iso(session));
                }
                let prior = resolved.split_off(1);
                Plan::Compare {
                    current: resolved,
                    prior,
                    strict: false,
                }
            }
            WindowStrategy::Offset => {
                let window = require_window(metric, window)?;
                let dates = self.sample_dates(metric.measure(), window).await?;
                let start = dates.iter().min().cloned().ok_or_else(|| {
                    MarketError::Resolution(format!("no sample dates for {}", metric))
                })?;
                Plan::Compare {
                    current: dates,
                    prior: vec![start],
                    strict: false,
                }
            }
            WindowStrategy::LatestQuarters => {
                let mut periods = report_periods(today, WindowUnit::Quarter, 2)?;
                let prior = periods.remove(0);
                Plan::Compare {
                    current: periods,
                    prior: vec![prior],
                    strict: false,
                }
            }
            WindowStrategy::Lag => Plan::Lag {
                dates: self.sample_dates(metric.measure(), require_window(metric, window)?).await?,
            },
        };

        tracing::debug!("Planned {}: {:?}", metric, plan);
        Ok(plan)
    }

    /// Trading sessions (newest first) or report periods (oldest first) covering `window`.
    async fn sample_dates(
        &self,
        measure: Measure,
        window: WindowSpec,
    ) -> MarketResult<Vec<String>> {
        let today = self.dates.today();
        match measure.sessions() {
            Some(table) => {
                let sessions = self
                    .dates
                    .resolve_samples(table, &sample_anchors(today, window))
                    .await?;
                Ok(sessions.into_iter().map(iso).collect())
            }
            None => report_periods(today, window.unit, window.order + 1),
        }
    }

    async fn execute(
        &self,
        metric: Metric,
        filter: &FilterSpec,
        plan: &Plan,
    ) -> MarketResult<Vec<ChangeRecord>> {
        let placeholder = self.executor.placeholder();
        let measure = metric.measure();

        let mut records = match plan {
            Plan::Compare {
                current,
                prior,
                strict,
            } => {
                let b = comparison_query(
                    placeholder,
                    measure,
                    metric.entity(),
                    filter,
                    current,
                    prior,
                    *strict,
                );
                let rows = self.run(&b).await?;
                rows.iter().filter_map(decode_change).collect::<Vec<_>>()
            }
            Plan::Lag { dates } => {
                let b = series_query(placeholder, measure, metric.entity(), filter, dates);
                let rows = self.run(&b).await?;
                lag_changes(rows.iter().filter_map(decode_point).collect())
            }
        };

        if metric.is_point_in_time() {
            sort_point_in_time(&mut records);
        } else {
            sort_time_series(&mut records);
        }

        tracing::info!("Computed {} change records for {}", records.len(), metric);
        Ok(records)
    }

    async fn run(&self, b: &SqlBuilder) -> MarketResult<Vec<Row>> {
        tracing::debug!("Executing: {} ({} params)", b.sql(), b.params().len());
        self.executor.query(b.sql(), b.params()).await
    }

    /// Anchored records pivoted into one row per ticker.
    async fn pivoted(
        &self,
        metric: Metric,
        filter: &FilterSpec,
        labels: Option<&[&str]>,
    ) -> MarketResult<Vec<PivotRow>> {
        let plan = self.plan(metric, None).await?;
        let records = self.execute(metric, filter, &plan).await?;
        let mode = match labels {
            Some(labels) => PivotMode::ByLabel(labels.iter().map(|l| l.to_string()).collect()),
            None => PivotMode::ByOffset(plan.prior().to_vec()),
        };
        Ok(pivot(&records, &mode))
    }

    pub async fn price_change(
        &self,
        filter: &FilterSpec,
    ) -> MarketResult<Vec<PriceChangePerformance>> {
        let key = CacheKey::for_filter(Metric::PriceChange.key(), filter);
        self.cache
            .get_or_compute(&key, || async {
                let rows = self.pivoted(Metric::PriceChange, filter, None).await?;
                let out: Vec<PriceChangePerformance> = rows
                    .into_iter()
                    .map(|r| PriceChangePerformance {
                        per_five: r.slot(0),
                        per_quarter: r.slot(1),
                        per_ytd: r.slot(2),
                        per_year: r.slot(3),
                        code: r.entity,
                    })
                    .collect();
                Ok(rank_top(out, TOP_N, |p| p.per_five, |p| p.code.as_str()))
            })
            .await
    }

    pub async fn liquidity_change(
        &self,
        filter: &FilterSpec,
    ) -> MarketResult<Vec<LiquidityChangePerformance>> {
        let key = CacheKey::for_filter(Metric::LiquidityChange.key(), filter);
        self.cache
            .get_or_compute(&key, || async {
                let rows = self.pivoted(Metric::LiquidityChange, filter, None).await?;
                let out: Vec<LiquidityChangePerformance> = rows
                    .into_iter()
                    .map(|r| LiquidityChangePerformance {
                        per_quarter: r.slot(0),
                        per_year: r.slot(1),
                        per_four_year: r.slot(2),
                        code: r.entity,
                    })
                    .collect();
                Ok(rank_top(out, TOP_N, |p| p.per_quarter, |p| p.code.as_str()))
            })
            .await
    }

    pub async fn equity_change(&self, filter: &FilterSpec) -> MarketResult<Vec<EquityChange>> {
        let key = CacheKey::for_filter(Metric::EquityChange.key(), filter);
        self.cache
            .get_or_compute(&key, || async {
                let rows = self
                    .pivoted(Metric::EquityChange, filter, Some(&EQUITY_LINES[..]))
                    .await?;
                let out: Vec<EquityChange> = rows
                    .into_iter()
                    .map(|r| EquityChange {
                        owner_equity: r.slot(0),
                        share_premium: r.slot(1),
                        non_controlling_interests: r.slot(2),
                        undistributed_earnings: r.slot(3),
                        code: r.entity,
                    })
                    .collect();
                Ok(rank_top(out, TOP_N, |e| e.owner_equity, |e| e.code.as_str()))
            })
            .await
    }

    pub async fn liabilities_change(
        &self,
        filter: &FilterSpec,
    ) -> MarketResult<Vec<LiabilitiesChange>> {
        let key = CacheKey::for_filter(Metric::LiabilitiesChange.key(), filter);
        self.cache
            .get_or_compute(&key, || async {
                let rows = self
                    .pivoted(Metric::LiabilitiesChange, filter, Some(&DEBT_LINES[..]))
                    .await?;
                let out: Vec<LiabilitiesChange> = rows
                    .into_iter()
                    .map(|r| LiabilitiesChange {
                        short_term_debt: r.slot(0),
                        long_term_debt: r.slot(1),
                        code: r.entity,
                    })
                    .collect();
                Ok(rank_top(out, TOP_N, |l| l.short_term_debt, |l| l.code.as_str()))
            })
            .await
    }

    /// Industry time series for any windowed metric.
    pub async fn industry_series(
        &self,
        metric: Metric,
        filter: &FilterSpec,
        window: WindowSpec,
    ) -> MarketResult<Vec<IndustryChange>> {
        if !metric.is_windowed() {
            return Err(MarketError::Validation(format!(
                "{} is not an industry time series",
                metric
            )));
        }

        let key = CacheKey::for_filter(metric.key(), filter).part(&window.cache_fragment());
        self.cache
            .get_or_compute(&key, || async {
                let records = self.compute_change(metric, filter, Some(window)).await?;
                Ok(to_series(&records))
            })
            .await
    }

    /// Advance/decline breadth per industry at the latest session.
    pub async fn market_breadth(&self, filter: &FilterSpec) -> MarketResult<Vec<IndustryBreadth>> {
        let key = CacheKey::for_filter(BREADTH_KEY, filter);
        self.cache
            .get_or_compute(&key, || self.compute_breadth(filter))
            .await
    }

    async fn compute_breadth(&self, filter: &FilterSpec) -> MarketResult<Vec<IndustryBreadth>> {
        let s = self.dates.resolve_recent_sessions(FactTable::TickerTrade).await?;
        let latest = s.latest_date;
        let day_before = latest.checked_sub_days(Days::new(1)).unwrap_or(latest);
        let month_before = latest.checked_sub_months(Months::new(1)).unwrap_or(latest);
        let previous = self.dates.resolve_nearest_date(FactTable::TickerTrade, day_before).await?;
        let month = self.dates.resolve_nearest_date(FactTable::TickerTrade, month_before).await?;

        let (latest, previous, week, month) =
            (iso(latest), iso(previous), iso(s.last_five_date), iso(month));
        let placeholder = self.executor.placeholder();

        let mut by_industry: BTreeMap<String, IndustryBreadth> = BTreeMap::new();
        let counts = self
            .run(&breadth_counts_query(placeholder, filter, &latest, &previous))
            .await?;
        for row in &counts {
            let Some(industry) = row.text("industry") else { continue };
            let entry = breadth_entry(&mut by_industry, &industry);
            entry.increase = row.i64("increase").unwrap_or(0);
            entry.decrease = row.i64("decrease").unwrap_or(0);
            entry.equal = row.i64("equal").unwrap_or(0);
            entry.high = row.i64("high").unwrap_or(0);
            entry.low = row.i64("low").unwrap_or(0);
        }

        // code -> (industry, date -> close)
        let mut closes: HashMap<String, (String, HashMap<String, f64>)> = HashMap::new();
        let dates = [latest.clone(), previous.clone(), week.clone(), month.clone()];
        for row in self.run(&closes_query(placeholder, filter, &dates)).await? {
            let (Some(code), Some(industry), Some(date), Some(close)) =
                (row.text("code"), row.text("industry"), row.text("d"), row.f64("v"))
            else {
                continue;
            };
            closes
                .entry(code)
                .or_insert_with(|| (industry, HashMap::new()))
                .1
                .insert(date, close);
        }

        let mut changes: BTreeMap<String, [Vec<f64>; 3]> = BTreeMap::new();
        for (industry, by_date) in closes.values() {
            let current = by_date.get(&latest).copied();
            let slot = changes.entry(industry.clone()).or_default();
            for (i, baseline) in [&previous, &week, &month].into_iter().enumerate() {
                if let Some(change) = percent_change(by_date.get(baseline).copied(), current) {
                    slot[i].push(change);
                }
            }
        }
        for (industry, [day, five, month]) in changes {
            let entry = breadth_entry(&mut by_industry, &industry);
            entry.day_change = mean(&day);
            entry.week_change = mean(&five);
            entry.month_change = mean(&month);
        }

        tracing::info!("Computed breadth for {} industries at {}", by_industry.len(), latest);
        Ok(by_industry.into_values().collect())
    }

    /// Tickers ranked by five-session rate of change. `limit` is clamped to `1..=50`.
    pub async fn top_movers(
        &self,
        filter: &FilterSpec,
        limit: usize,
    ) -> MarketResult<Vec<TopMover>> {
        let limit = limit.clamp(1, TOP_N);
        let key = CacheKey::for_filter(TOP_MOVERS_KEY, filter).part(&limit.to_string());

        self.cache
            .get_or_compute(&key, || async move {
                let s = self.dates.resolve_recent_sessions(FactTable::TickerTrade).await?;
                let b = comparison_query(
                    self.executor.placeholder(),
                    Metric::PriceChange.measure(),
                    Metric::PriceChange.entity(),
                    filter,
                    &[iso(s.latest_date)],
                    &[iso(s.last_five_date)],
                    true,
                );
                let movers: Vec<TopMover> = self
                    .run(&b)
                    .await?
                    .iter()
                    .filter_map(decode_change)
                    .map(|r| TopMover {
                        code: r.entity,
                        close_price: r.current_value,
                        roc_5: r.percent_change,
                    })
                    .collect();
                Ok(rank_top(movers, limit, |m| m.roc_5, |m| m.code.as_str()))
            })
            .await
    }
}

fn require_window(metric: Metric, window: Option<WindowSpec>) -> MarketResult<WindowSpec> {
    window.ok_or_else(|| {
        MarketError::Validation(format!("{} requires a (type, order) window", metric))
    })
}

fn breadth_entry<'a>(
    map: &'a mut BTreeMap<String, IndustryBreadth>,
    industry: &str,
) -> &'a mut IndustryBreadth {
    map.entry(industry.to_string()).or_insert_with(|| IndustryBreadth {
        industry: industry.to_string(),
        color: industry_color(industry).to_string(),
        increase: 0,
        decrease: 0,
        equal: 0,
        high: 0,
        low: 0,
        day_change: None,
        week_change: None,
        month_change: None,
    })
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}
