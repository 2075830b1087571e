use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use market_analytics::engine::DEFAULT_TOP_MOVERS;
use market_analytics::{
    build_filter, EquityChange, IndustryBreadth, IndustryChange, LiabilitiesChange,
    LiquidityChangePerformance, Metric, PriceChangePerformance, TopMover,
};
use market_core::{FilterSpec, MarketError, WindowSpec, WindowUnit};
use serde::Deserialize;

use crate::{ApiResponse, AppError, AppState};

#[cfg(test)]
#[path = "market_routes_tests.rs"]
mod market_routes_tests;

const DEFAULT_WINDOW_ORDER: u32 = 4;

/// Query string shared by every market endpoint.
///
/// Numbers are taken as text so malformed values surface as validation errors
/// in the usual response envelope.
#[derive(Debug, Default, Deserialize)]
pub struct MarketQuery {
    pub exchange: Option<String>,
    /// Comma-separated industry labels
    pub industries: Option<String>,
    #[serde(rename = "type")]
    pub window_type: Option<String>,
    pub order: Option<String>,
    pub limit: Option<String>,
}

impl MarketQuery {
    pub fn filter(&self) -> Result<FilterSpec, MarketError> {
        let industries: Vec<&str> = self
            .industries
            .as_deref()
            .map(|s| s.split(',').filter(|i| !i.trim().is_empty()).collect())
            .unwrap_or_default();
        build_filter(self.exchange.as_deref().unwrap_or("ALL"), &industries)
    }

    pub fn window(&self) -> Result<WindowSpec, MarketError> {
        let unit = match self.window_type.as_deref() {
            Some(t) => t.parse()?,
            None => WindowUnit::Quarter,
        };
        let order = match self.order.as_deref() {
            Some(raw) => raw.trim().parse().map_err(|_| {
                MarketError::Validation(format!("order must be a positive integer, got '{}'", raw))
            })?,
            None => DEFAULT_WINDOW_ORDER,
        };
        WindowSpec::new(unit, order)
    }

    pub fn limit(&self) -> Result<usize, MarketError> {
        match self.limit.as_deref() {
            Some(raw) => raw.trim().parse().map_err(|_| {
                MarketError::Validation(format!(
                    "limit must be a non-negative integer, got '{}'",
                    raw
                ))
            }),
            None => Ok(DEFAULT_TOP_MOVERS),
        }
    }
}

pub fn market_routes() -> Router<AppState> {
    let mut router = Router::new()
        .route("/api/market/price-change", get(price_change))
        .route("/api/market/liquidity-change", get(liquidity_change))
        .route("/api/market/equity-change", get(equity_change))
        .route("/api/market/liabilities-change", get(liabilities_change))
        .route("/api/market/breadth", get(market_breadth))
        .route("/api/market/top-movers", get(top_movers));

    // industry time series share one handler
    for metric in Metric::ALL.into_iter().filter(Metric::is_windowed) {
        router = router.route(
            &format!("/api/market/{}", metric.key()),
            get(move |State(state): State<AppState>, Query(query): Query<MarketQuery>| {
                industry_series(metric, state, query)
            }),
        );
    }

    router
}

/// Close-price change against the five/quarter/year-to-date/year anchors
async fn price_change(
    State(state): State<AppState>,
    Query(query): Query<MarketQuery>,
) -> Result<Json<ApiResponse<Vec<PriceChangePerformance>>>, AppError> {
    let filter = query.filter()?;
    let data = state.analytics.price_change(&filter).await?;
    Ok(Json(ApiResponse::success(data)))
}

async fn liquidity_change(
    State(state): State<AppState>,
    Query(query): Query<MarketQuery>,
) -> Result<Json<ApiResponse<Vec<LiquidityChangePerformance>>>, AppError> {
    let filter = query.filter()?;
    let data = state.analytics.liquidity_change(&filter).await?;
    Ok(Json(ApiResponse::success(data)))
}

async fn equity_change(
    State(state): State<AppState>,
    Query(query): Query<MarketQuery>,
) -> Result<Json<ApiResponse<Vec<EquityChange>>>, AppError> {
    let filter = query.filter()?;
    let data = state.analytics.equity_change(&filter).await?;
    Ok(Json(ApiResponse::success(data)))
}

async fn liabilities_change(
    State(state): State<AppState>,
    Query(query): Query<MarketQuery>,
) -> Result<Json<ApiResponse<Vec<LiabilitiesChange>>>, AppError> {
    let filter = query.filter()?;
    let data = state.analytics.liabilities_change(&filter).await?;
    Ok(Json(ApiResponse::success(data)))
}

async fn industry_series(
    metric: Metric,
    state: AppState,
    query: MarketQuery,
) -> Result<Json<ApiResponse<Vec<IndustryChange>>>, AppError> {
    let filter = query.filter()?;
    let window = query.window()?;
    let data = state.analytics.industry_series(metric, &filter, window).await?;
    Ok(Json(ApiResponse::success(data)))
}

async fn market_breadth(
    State(state): State<AppState>,
    Query(query): Query<MarketQuery>,
) -> Result<Json<ApiResponse<Vec<IndustryBreadth>>>, AppError> {
    let filter = query.filter()?;
    let data = state.analytics.market_breadth(&filter).await?;
    Ok(Json(ApiResponse::success(data)))
}

/// Tickers ranked by five-session rate of change
async fn top_movers(
    State(state): State<AppState>,
    Query(query): Query<MarketQuery>,
) -> Result<Json<ApiResponse<Vec<TopMover>>>, AppError> {
    let filter = query.filter()?;
    let limit = query.limit()?;
    let data = state.analytics.top_movers(&filter, limit).await?;
    Ok(Json(ApiResponse::success(data)))
}
