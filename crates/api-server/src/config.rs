use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Result};

/// Server configuration read from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
    /// Absent means the in-process cache is used.
    pub redis_url: Option<String>,
    pub cache_ttl: Duration,
    /// `None` keeps resolved session dates until evicted.
    pub session_date_ttl: Option<Duration>,
    pub query_timeout: Duration,
    pub cache_timeout: Duration,
    pub cache_single_flight: bool,
    pub utc_offset_hours: i32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let session_ttl_secs: u64 = parse(&get, "SESSION_DATE_TTL_SECS", 1800)?;

        Ok(Self {
            server_host: get("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            server_port: parse(&get, "SERVER_PORT", 3000)?,
            database_url: get("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://market.db?mode=rwc".to_string()),
            database_max_connections: parse(&get, "DATABASE_MAX_CONNECTIONS", 10)?,
            redis_url: get("REDIS_URL"),
            cache_ttl: Duration::from_secs(parse(&get, "CACHE_TTL_SECS", 1800)?),
            session_date_ttl: (session_ttl_secs > 0).then(|| Duration::from_secs(session_ttl_secs)),
            query_timeout: Duration::from_millis(parse(&get, "QUERY_TIMEOUT_MS", 10_000)?),
            cache_timeout: Duration::from_millis(parse(&get, "CACHE_TIMEOUT_MS", 2_000)?),
            cache_single_flight: parse_bool(&get, "CACHE_SINGLE_FLIGHT", false)?,
            utc_offset_hours: parse(&get, "MARKET_UTC_OFFSET_HOURS", 7)?,
        })
    }
}

fn parse<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| anyhow!("Invalid {}='{}': {}", key, raw, e)),
        None => Ok(default),
    }
}

fn parse_bool<G>(get: &G, key: &str, default: bool) -> Result<bool>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key).map(|v| v.to_lowercase()) {
        None => Ok(default),
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
        Some(v) => Err(anyhow!("Invalid {}='{}': expected true or false", key, v)),
    }
}
