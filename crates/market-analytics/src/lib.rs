//! Market analytics core: session-date resolution, filter building, cached
//! aggregation queries and result reshaping.

use std::future::Future;
use std::time::Duration;

use market_core::{MarketError, MarketResult};

pub mod cache;
pub mod calendar;
pub mod dates;
pub mod engine;
pub mod executor;
pub mod filter;
pub mod metrics;
pub mod models;
pub mod queries;
pub mod reshape;
pub mod series;
pub mod sql;

#[cfg(test)]
mod tests;

pub use cache::{CacheGateway, CacheKey, CacheStrategy, MemoryCache, RedisCache, DEFAULT_CACHE_TTL};
pub use dates::{DateResolver, FactTable};
pub use engine::MarketAnalytics;
pub use executor::SqlxExecutor;
pub use filter::{build_exchange_filter, build_filter, build_industry_filter};
pub use metrics::Metric;
pub use models::*;

/// Runs `fut`, failing with [`MarketError::Timeout`] once `after` elapses.
pub(crate) async fn bounded<T, F>(operation: &str, after: Duration, fut: F) -> MarketResult<T>
where
    F: Future<Output = MarketResult<T>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!("{} exceeded {}ms", operation, after.as_millis());
            Err(MarketError::Timeout {
                operation: operation.to_string(),
                after,
            })
        }
    }
}
