//! End-to-end tests against an in-memory SQLite store.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use market_core::{FixedClock, MarketError, QueryExecutor, Row, SqlValue, WindowSpec, WindowUnit};

use crate::{
    build_filter, CacheGateway, CacheKey, FactTable, MarketAnalytics, MemoryCache, Metric,
    SqlxExecutor,
};

const SESSIONS: [&str; 10] = [
    "2020-03-27",
    "2023-03-29",
    "2023-12-29",
    "2024-01-02",
    "2024-02-15",
    "2024-03-25",
    "2024-03-26",
    "2024-03-27",
    "2024-03-28",
    "2024-03-29",
];

const VCB_CLOSE: [f64; 10] = [60.0, 80.0, 90.0, 100.0, 98.0, 95.0, 96.0, 97.0, 99.0, 100.0];
const VCB_VALUE: [f64; 10] = [
    1000.0, 2000.0, 2500.0, 3000.0, 3000.0, 4000.0, 4000.0, 4000.0, 4000.0, 5000.0,
];
const HPG_CLOSE: [f64; 10] = [10.0, 20.0, 25.0, 25.0, 26.0, 30.0, 29.0, 28.0, 28.0, 27.0];
const HPG_VALUE: [f64; 10] = [100.0, 200.0, 250.0, 250.0, 260.0, 300.0, 290.0, 280.0, 280.0, 540.0];

const SEED: &str = "
INSERT INTO ticker_info (code, exchange, security_type, industry) VALUES ('VCB', 'HOSE', 'STOCK', 'Banking');
INSERT INTO ticker_info (code, exchange, security_type, industry) VALUES ('ACB', 'HNX', 'STOCK', 'Banking');
INSERT INTO ticker_info (code, exchange, security_type, industry) VALUES ('HPG', 'HOSE', 'STOCK', 'Basic Resources');
INSERT INTO ticker_info (code, exchange, security_type, industry) VALUES ('CVCB2401', 'HOSE', 'COVERED_WARRANT', 'Banking');
INSERT INTO ticker_trade (code, trade_date, close_price, total_val) VALUES ('ACB', '2024-03-25', 20, 100);
INSERT INTO ticker_trade (code, trade_date, close_price, total_val) VALUES ('ACB', '2024-03-29', 22, 100);
INSERT INTO ticker_trade (code, trade_date, close_price, total_val) VALUES ('CVCB2401', '2024-03-25', 1, 10);
INSERT INTO ticker_trade (code, trade_date, close_price, total_val) VALUES ('CVCB2401', '2024-03-29', 5, 10);
INSERT INTO ratio (code, report_date, ratio_code, value) VALUES ('VCB', '2023-12-29', 'MARKETCAP', 400);
INSERT INTO ratio (code, report_date, ratio_code, value) VALUES ('VCB', '2024-03-29', 'MARKETCAP', 500);
INSERT INTO ratio (code, report_date, ratio_code, value) VALUES ('ACB', '2023-12-29', 'MARKETCAP', 100);
INSERT INTO ratio (code, report_date, ratio_code, value) VALUES ('ACB', '2024-03-29', 'MARKETCAP', 150);
INSERT INTO ratio (code, report_date, ratio_code, value) VALUES ('VCB', '2023-12-29', 'EPS_TR', 4000);
INSERT INTO ratio (code, report_date, ratio_code, value) VALUES ('VCB', '2024-03-29', 'EPS_TR', 5000);
INSERT INTO financial_report (code, period, report_name, value) VALUES ('VCB', '2023Q2', 'Gross profit', 100);
INSERT INTO financial_report (code, period, report_name, value) VALUES ('VCB', '2023Q3', 'Gross profit', 0);
INSERT INTO financial_report (code, period, report_name, value) VALUES ('VCB', '2023Q4', 'Gross profit', 50);
INSERT INTO financial_report (code, period, report_name, value) VALUES ('VCB', '2023Q3', 'Net interest income', 80);
INSERT INTO financial_report (code, period, report_name, value) VALUES ('VCB', '2023Q4', 'Net interest income', 100);
INSERT INTO financial_report (code, period, report_name, value) VALUES ('VCB', '2023Q3', 'Owner''s equity', 1000);
INSERT INTO financial_report (code, period, report_name, value) VALUES ('VCB', '2023Q4', 'Owner''s equity', 1200);
INSERT INTO financial_report (code, period, report_name, value) VALUES ('VCB', '2023Q3', 'Share premium', 100);
INSERT INTO financial_report (code, period, report_name, value) VALUES ('VCB', '2023Q4', 'Share premium', 100);
INSERT INTO financial_report (code, period, report_name, value) VALUES ('VCB', '2023Q3', 'UNDISTRIBUTED EARNINGS', 50);
INSERT INTO financial_report (code, period, report_name, value) VALUES ('VCB', '2023Q4', 'UNDISTRIBUTED EARNINGS', 0);
INSERT INTO financial_report (code, period, report_name, value) VALUES ('HPG', '2023Q3', 'Owner''s equity', 500);
INSERT INTO financial_report (code, period, report_name, value) VALUES ('HPG', '2023Q4', 'Owner''s equity', 450);
INSERT INTO financial_report (code, period, report_name, value) VALUES ('HPG', '2023Q3', 'Short-term debt', 200);
INSERT INTO financial_report (code, period, report_name, value) VALUES ('HPG', '2023Q4', 'Short-term debt', 300);
INSERT INTO financial_report (code, period, report_name, value) VALUES ('HPG', '2023Q3', 'Long-term debt', 0);
INSERT INTO financial_report (code, period, report_name, value) VALUES ('HPG', '2023Q4', 'Long-term debt', 100)
";

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn approx(actual: Option<f64>, expected: f64) -> bool {
    actual.is_some_and(|v| (v - expected).abs() < 1e-9)
}

async fn execute(exec: &SqlxExecutor, sql: &str) {
    sqlx::query(sql).execute(exec.pool()).await.unwrap();
}

async fn trade(
    exec: &SqlxExecutor,
    code: &str,
    date: &str,
    close: f64,
    value: f64,
    ceiling: Option<f64>,
    floor: Option<f64>,
) {
    sqlx::query(
        "INSERT INTO ticker_trade (code, trade_date, close_price, total_val, ceiling_price, floor_price) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(code)
    .bind(date)
    .bind(close)
    .bind(value)
    .bind(ceiling)
    .bind(floor)
    .execute(exec.pool())
    .await
    .unwrap();
}

async fn seeded_executor() -> Arc<SqlxExecutor> {
    let exec = SqlxExecutor::connect("sqlite::memory:", 1).await.unwrap();
    exec.init_schema().await.unwrap();

    for statement in SEED.split(';') {
        let stmt = statement.trim();
        if !stmt.is_empty() {
            execute(&exec, stmt).await;
        }
    }
    for (i, date) in SESSIONS.iter().enumerate() {
        let last = i == SESSIONS.len() - 1;
        trade(&exec, "VCB", date, VCB_CLOSE[i], VCB_VALUE[i], last.then_some(100.0), None).await;
        trade(&exec, "HPG", date, HPG_CLOSE[i], HPG_VALUE[i], None, last.then_some(27.0)).await;
    }

    Arc::new(exec)
}

fn analytics(exec: Arc<dyn QueryExecutor>) -> MarketAnalytics {
    let cache = Arc::new(CacheGateway::new(Arc::new(MemoryCache::new())));
    MarketAnalytics::new(exec, cache, Arc::new(FixedClock(d(2024, 3, 29))))
}

/// Counts statements before delegating.
struct RecordingExecutor {
    inner: Arc<SqlxExecutor>,
    calls: AtomicUsize,
}

#[async_trait]
impl QueryExecutor for RecordingExecutor {
    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, MarketError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.query(sql, params).await
    }
}

#[tokio::test]
async fn test_session_dates_from_store() {
    let market = analytics(seeded_executor().await);

    let s = market.dates().resolve_session_dates(FactTable::TickerTrade).await.unwrap();
    assert_eq!(s.latest_date, d(2024, 3, 29));
    assert_eq!(s.last_five_date, d(2024, 3, 25));
    assert_eq!(s.last_quarter_date, d(2023, 12, 29));
    assert_eq!(s.first_year_date, d(2024, 1, 2));
    assert_eq!(s.last_year_date, d(2023, 3, 29));
}

#[tokio::test]
async fn test_nearest_date_over_weekday_sessions() {
    let exec = SqlxExecutor::connect("sqlite::memory:", 1).await.unwrap();
    exec.init_schema().await.unwrap();
    let mut day = d(2024, 1, 2);
    while day <= d(2024, 3, 29) {
        if chrono::Datelike::weekday(&day).number_from_monday() <= 5 {
            trade(&exec, "VCB", &day.to_string(), 90.0, 1000.0, None, None).await;
        }
        day = day.succ_opt().unwrap();
    }
    let market = analytics(Arc::new(exec));

    let dates = market.dates();
    let resolved = dates
        .resolve_nearest_date(FactTable::TickerTrade, d(2024, 2, 15))
        .await
        .unwrap();
    assert_eq!(resolved, d(2024, 2, 15));

    // Saturday falls back to Friday
    let resolved = dates
        .resolve_nearest_date(FactTable::TickerTrade, d(2024, 2, 17))
        .await
        .unwrap();
    assert_eq!(resolved, d(2024, 2, 16));

    let err = market
        .dates()
        .resolve_nearest_date(FactTable::TickerTrade, d(2023, 12, 31))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "RESOLUTION_ERROR");
}

#[tokio::test]
async fn test_price_change_against_session_anchors() {
    let market = analytics(seeded_executor().await);
    let filter = build_filter::<&str>("ALL", &[]).unwrap();

    let rows = market.price_change(&filter).await.unwrap();
    let codes: Vec<_> = rows.iter().map(|r| r.code.as_str()).collect();
    // covered warrants never participate
    assert_eq!(codes, vec!["ACB", "VCB", "HPG"]);

    assert!(approx(rows[0].per_five, 10.0));
    assert_eq!(rows[0].per_quarter, None);

    let vcb = &rows[1];
    assert!(approx(vcb.per_five, 5.0 / 95.0 * 100.0));
    assert!(approx(vcb.per_quarter, 10.0 / 90.0 * 100.0));
    assert!(approx(vcb.per_ytd, 0.0));
    assert!(approx(vcb.per_year, 25.0));

    let hpg = &rows[2];
    assert!(approx(hpg.per_five, -10.0));
    assert!(approx(hpg.per_ytd, 8.0));
    assert!(approx(hpg.per_year, 35.0));
}

#[tokio::test]
async fn test_price_change_exchange_filter() {
    let market = analytics(seeded_executor().await);
    let filter = build_filter("HOSE", &["Banking"]).unwrap();

    let rows = market.price_change(&filter).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].code, "VCB");
}

#[tokio::test]
async fn test_liquidity_change_quarter_anchors() {
    let market = analytics(seeded_executor().await);
    let filter = build_filter::<&str>("ALL", &[]).unwrap();

    let rows = market.liquidity_change(&filter).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].code, "HPG");
    assert!(approx(rows[0].per_quarter, 116.0));
    assert!(approx(rows[0].per_year, 170.0));
    assert!(approx(rows[0].per_four_year, 440.0));
    assert_eq!(rows[1].code, "VCB");
    assert!(approx(rows[1].per_four_year, 400.0));
}

#[tokio::test]
async fn test_banking_quarter_window_single_industry() {
    let market = analytics(seeded_executor().await);
    let filter = build_filter("ALL", &["Banking"]).unwrap();
    assert_eq!(filter.exchange_fragment(), "HOSE,HNX,UPCOM");

    let window = WindowSpec::new(WindowUnit::Quarter, 1).unwrap();
    let records = market
        .compute_change(Metric::MarketCapChange, &filter, Some(window))
        .await
        .unwrap();

    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.entity == "Banking"));
    assert_eq!(records[0].date, "2023-12-29");
    assert!(approx(records[0].percent_change, 0.0));
    assert_eq!(records[1].date, "2024-03-29");
    assert!(approx(records[1].percent_change, 30.0));
}

#[tokio::test]
async fn test_industry_liquidity_series_is_time_ordered() {
    let market = analytics(seeded_executor().await);
    let filter = build_filter::<&str>("ALL", &[]).unwrap();
    let window = WindowSpec::new(WindowUnit::Quarter, 1).unwrap();

    let series = market
        .industry_series(Metric::IndustryLiquidityChange, &filter, window)
        .await
        .unwrap();

    let keys: Vec<_> = series.iter().map(|s| (s.date.as_str(), s.industry.as_str())).collect();
    assert_eq!(
        keys,
        vec![
            ("2023-12-29", "Banking"),
            ("2023-12-29", "Basic Resources"),
            ("2024-03-29", "Banking"),
            ("2024-03-29", "Basic Resources"),
        ]
    );
    assert!(approx(series[2].per_change, 104.0));
    assert!(approx(series[3].per_change, 116.0));
    assert_eq!(series[2].color, market_core::industry_color("Banking"));
}

#[tokio::test]
async fn test_lag_series_over_report_periods() {
    let market = analytics(seeded_executor().await);
    let filter = build_filter("ALL", &["Banking"]).unwrap();

    let window = WindowSpec::new(WindowUnit::Quarter, 2).unwrap();
    let gross = market
        .industry_series(Metric::GrossProfit, &filter, window)
        .await
        .unwrap();
    let dates: Vec<_> = gross.iter().map(|g| g.date.as_str()).collect();
    assert_eq!(dates, vec!["2023Q2", "2023Q3", "2023Q4"]);
    assert_eq!(gross[0].per_change, None);
    assert!(approx(gross[1].per_change, -100.0));
    // prior of zero
    assert_eq!(gross[2].per_change, None);

    let window = WindowSpec::new(WindowUnit::Quarter, 1).unwrap();
    let revenue = market
        .industry_series(Metric::NetRevenue, &filter, window)
        .await
        .unwrap();
    assert_eq!(revenue.len(), 2);
    assert!(approx(revenue[1].per_change, 25.0));
}

#[tokio::test]
async fn test_lag_series_over_trading_dates() {
    let market = analytics(seeded_executor().await);
    let filter = build_filter("ALL", &["Banking"]).unwrap();

    let window = WindowSpec::new(WindowUnit::Quarter, 1).unwrap();
    let eps = market
        .industry_series(Metric::Eps, &filter, window)
        .await
        .unwrap();
    assert_eq!(eps.len(), 2);
    assert_eq!(eps[0].date, "2023-12-29");
    assert_eq!(eps[0].per_change, None);
    assert!(approx(eps[1].per_change, 25.0));
}

#[tokio::test]
async fn test_equity_industry_offset_over_periods() {
    let market = analytics(seeded_executor().await);
    let filter = build_filter::<&str>("ALL", &[]).unwrap();

    let window = WindowSpec::new(WindowUnit::Quarter, 1).unwrap();
    let series = market
        .industry_series(Metric::EquityIndustryChange, &filter, window)
        .await
        .unwrap();
    assert_eq!(series.len(), 4);
    assert_eq!(series[2].date, "2023Q4");
    assert_eq!(series[2].industry, "Banking");
    assert!(approx(series[2].per_change, 20.0));
    assert!(approx(series[3].per_change, -10.0));
}

#[tokio::test]
async fn test_equity_and_liabilities_route_report_lines() {
    let market = analytics(seeded_executor().await);
    let filter = build_filter::<&str>("ALL", &[]).unwrap();

    let equity = market.equity_change(&filter).await.unwrap();
    assert_eq!(equity.len(), 2);
    assert_eq!(equity[0].code, "VCB");
    assert!(approx(equity[0].owner_equity, 20.0));
    assert!(approx(equity[0].share_premium, 0.0));
    assert!(approx(equity[0].undistributed_earnings, -100.0));
    assert_eq!(equity[0].non_controlling_interests, None);
    assert!(approx(equity[1].owner_equity, -10.0));

    let liabilities = market.liabilities_change(&filter).await.unwrap();
    assert_eq!(liabilities.len(), 1);
    assert_eq!(liabilities[0].code, "HPG");
    assert!(approx(liabilities[0].short_term_debt, 50.0));
    assert_eq!(liabilities[0].long_term_debt, None);
}

#[tokio::test]
async fn test_market_breadth() {
    let market = analytics(seeded_executor().await);
    let filter = build_filter::<&str>("ALL", &[]).unwrap();

    let breadth = market.market_breadth(&filter).await.unwrap();
    assert_eq!(breadth.len(), 2);

    let banking = &breadth[0];
    assert_eq!(banking.industry, "Banking");
    assert_eq!((banking.increase, banking.decrease, banking.equal), (1, 0, 0));
    assert_eq!((banking.high, banking.low), (1, 0));
    assert!(approx(banking.day_change, 1.0 / 99.0 * 100.0));
    assert!(approx(banking.week_change, (5.0 / 95.0 * 100.0 + 10.0) / 2.0));
    assert!(approx(banking.month_change, 2.0 / 98.0 * 100.0));

    let basic = &breadth[1];
    assert_eq!(basic.industry, "Basic Resources");
    assert_eq!((basic.increase, basic.decrease, basic.low), (0, 1, 1));
}

#[tokio::test]
async fn test_top_movers_limit() {
    let market = analytics(seeded_executor().await);
    let filter = build_filter::<&str>("ALL", &[]).unwrap();

    let movers = market.top_movers(&filter, 2).await.unwrap();
    let codes: Vec<_> = movers.iter().map(|m| m.code.as_str()).collect();
    assert_eq!(codes, vec!["ACB", "VCB"]);
    assert_eq!(movers[0].close_price, Some(22.0));

    let clamped = market.top_movers(&filter, 0).await.unwrap();
    assert_eq!(clamped.len(), 1);
}

#[tokio::test]
async fn test_recent_session_analytics_before_first_session_of_year() {
    let exec = SqlxExecutor::connect("sqlite::memory:", 1).await.unwrap();
    exec.init_schema().await.unwrap();
    execute(
        &exec,
        "INSERT INTO ticker_info (code, exchange, security_type, industry) VALUES \
         ('VCB', 'HOSE', 'STOCK', 'Banking'), ('HPG', 'HOSE', 'STOCK', 'Basic Resources')",
    )
    .await;
    let sessions = [
        "2024-11-29",
        "2024-12-25",
        "2024-12-26",
        "2024-12-27",
        "2024-12-30",
        "2024-12-31",
    ];
    for (i, date) in sessions.iter().enumerate() {
        trade(&exec, "VCB", date, 90.0 + i as f64, 1000.0, None, None).await;
        trade(&exec, "HPG", date, 30.0 - i as f64, 1000.0, None, None).await;
    }
    let cache = Arc::new(CacheGateway::new(Arc::new(MemoryCache::new())));
    let market = MarketAnalytics::new(Arc::new(exec), cache, Arc::new(FixedClock(d(2025, 1, 1))));
    let filter = build_filter::<&str>("ALL", &[]).unwrap();

    // no session yet this year, so the year-to-date anchor is missing
    let err = market.dates().resolve_session_dates(FactTable::TickerTrade).await.unwrap_err();
    assert_eq!(err.code(), "RESOLUTION_ERROR");

    let movers = market.top_movers(&filter, 10).await.unwrap();
    let codes: Vec<_> = movers.iter().map(|m| m.code.as_str()).collect();
    assert_eq!(codes, vec!["VCB", "HPG"]);
    assert!(approx(movers[0].roc_5, 4.0 / 91.0 * 100.0));

    let breadth = market.market_breadth(&filter).await.unwrap();
    assert_eq!(breadth.len(), 2);
    assert_eq!(breadth[0].industry, "Banking");
    assert_eq!(breadth[0].increase, 1);
    assert!(approx(breadth[0].month_change, 5.0 / 90.0 * 100.0));
    assert_eq!(breadth[1].decrease, 1);
}

#[tokio::test]
async fn test_cache_hit_skips_executor() {
    let recording = Arc::new(RecordingExecutor {
        inner: seeded_executor().await,
        calls: AtomicUsize::new(0),
    });
    let market = analytics(recording.clone());
    let filter = build_filter("ALL", &["Banking", "Basic Resources"]).unwrap();

    let first = market.price_change(&filter).await.unwrap();
    let calls = recording.calls.load(Ordering::SeqCst);
    assert!(calls > 0);

    // same filter given in another order
    let reordered = build_filter("all", &["Basic Resources", " Banking", "Banking"]).unwrap();
    let second = market.price_change(&reordered).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(recording.calls.load(Ordering::SeqCst), calls);
}

#[test]
fn test_cache_key_ignores_industry_order() {
    let a = build_filter("ALL", &["Retail", "Banking"]).unwrap();
    let b = build_filter("", &["Banking", "Retail", "Retail"]).unwrap();
    assert_eq!(
        CacheKey::for_filter(Metric::Eps.key(), &a).as_str(),
        CacheKey::for_filter(Metric::Eps.key(), &b).as_str()
    );
    assert_eq!(
        CacheKey::for_filter("eps", &a).to_string(),
        "eps:HOSE,HNX,UPCOM:Banking,Retail"
    );
}

#[tokio::test]
async fn test_invalid_windows_are_rejected() {
    let market = analytics(seeded_executor().await);
    let filter = build_filter::<&str>("ALL", &[]).unwrap();

    let window = WindowSpec::new(WindowUnit::Day, 1).unwrap();
    let err = market
        .industry_series(Metric::PriceChange, &filter, window)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "VALIDATION_ERROR");

    let window = WindowSpec::new(WindowUnit::Month, 2).unwrap();
    let err = market
        .industry_series(Metric::GrossProfit, &filter, window)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "VALIDATION_ERROR");

    let err = market
        .compute_change(Metric::MarketCapChange, &filter, None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "VALIDATION_ERROR");
}
