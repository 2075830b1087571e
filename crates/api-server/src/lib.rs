pub mod config;
pub mod market_routes;
pub mod request_id;

use std::sync::Arc;

use axum::{
    extract::Request,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use market_analytics::{
    CacheGateway, CacheStrategy, MarketAnalytics, MemoryCache, RedisCache, SqlxExecutor,
};
use market_core::{CacheStore, MarketError, SystemClock};
use serde::Serialize;
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::request_id::FailedRequest;

#[derive(Clone)]
pub struct AppState {
    pub analytics: Arc<MarketAnalytics>,
}

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

#[derive(Debug)]
pub enum AppError {
    Market(MarketError),
    Internal(anyhow::Error),
}

impl From<MarketError> for AppError {
    fn from(err: MarketError) -> Self {
        AppError::Market(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Market(err) => {
                let status = match err {
                    MarketError::Validation(_) => StatusCode::BAD_REQUEST,
                    MarketError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, err.code(), err.to_string())
            }
            AppError::Internal(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                err.to_string(),
            ),
        };

        let mut response = (
            status,
            Json(json!({
                "success": false,
                "error": message,
                "code": code,
            })),
        )
            .into_response();
        response.extensions_mut().insert(FailedRequest { code, message });
        response
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(market_routes::market_routes())
        .layer(middleware::from_fn(request_id::request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = tracing::field::Empty,
                )
            }),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// `RUST_LOG` picks the filter; `LOG_FORMAT=json` switches to structured output.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("api_server=info,market_analytics=info,tower_http=info")
    });

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        let _ = registry.with(fmt::layer().json()).try_init();
    } else {
        let _ = registry.with(fmt::layer()).try_init();
    }
}

/// Connects the stores described by `config` and wires the analytics engine.
pub async fn build_state(config: &Config) -> anyhow::Result<AppState> {
    let executor = SqlxExecutor::connect(&config.database_url, config.database_max_connections)
        .await?
        .with_timeout(config.query_timeout);
    executor.init_schema().await?;
    tracing::info!("Connected to database");

    let store: Arc<dyn CacheStore> = match &config.redis_url {
        Some(url) => match RedisCache::connect(url).await {
            Ok(redis) => {
                tracing::info!("Connected to Redis");
                Arc::new(redis)
            }
            Err(e) => {
                tracing::warn!("Redis unavailable ({}), using in-memory cache", e);
                Arc::new(MemoryCache::new())
            }
        },
        None => {
            tracing::info!("REDIS_URL not set, using in-memory cache");
            Arc::new(MemoryCache::new())
        }
    };

    let strategy = if config.cache_single_flight {
        CacheStrategy::SingleFlight
    } else {
        CacheStrategy::CacheAside
    };
    let cache = CacheGateway::new(store)
        .with_default_ttl(Some(config.cache_ttl))
        .with_timeout(config.cache_timeout)
        .with_strategy(strategy);

    let analytics = MarketAnalytics::new(
        Arc::new(executor),
        Arc::new(cache),
        Arc::new(SystemClock::with_utc_offset_hours(config.utc_offset_hours)),
    )
    .with_session_ttl(config.session_date_ttl);

    Ok(AppState {
        analytics: Arc::new(analytics),
    })
}

pub async fn run_server() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = Config::from_env()?;
    let state = build_state(&config).await?;

    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Market analytics API listening on {}", addr);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
