use std::time::Duration;

use async_trait::async_trait;
use market_core::{MarketError, MarketResult, Placeholder, QueryExecutor, Row, SqlValue};
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{AnyPool, Column, Row as SqlxRow};

use crate::bounded;

const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// [`QueryExecutor`] over an sqlx `AnyPool` (SQLite or Postgres).
#[derive(Clone)]
pub struct SqlxExecutor {
    pool: AnyPool,
    placeholder: Placeholder,
    timeout: Duration,
}

impl SqlxExecutor {
    pub fn new(pool: AnyPool, placeholder: Placeholder) -> Self {
        Self {
            pool,
            placeholder,
            timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    /// Connect to `database_url`, picking the placeholder style from its scheme.
    pub async fn connect(database_url: &str, max_connections: u32) -> MarketResult<Self> {
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| MarketError::Query(format!("failed to connect to database: {}", e)))?;

        Ok(Self::new(pool, placeholder_for(database_url)))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    /// Create the fact tables if they do not exist yet.
    pub async fn init_schema(&self) -> MarketResult<()> {
        let schema = include_str!("../../../schema.sql");

        // one statement per call; the Any driver rejects multi-statement strings
        for statement in schema.split(';') {
            let stmt = statement.trim();
            if !stmt.is_empty() && !stmt.lines().all(|l| l.trim_start().starts_with("--")) {
                sqlx::query(stmt)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| MarketError::Query(format!("schema statement failed: {}", e)))?;
            }
        }

        Ok(())
    }
}

pub fn placeholder_for(database_url: &str) -> Placeholder {
    if database_url.starts_with("postgres") {
        Placeholder::Dollar
    } else {
        Placeholder::Question
    }
}

#[async_trait]
impl QueryExecutor for SqlxExecutor {
    fn placeholder(&self) -> Placeholder {
        self.placeholder
    }

    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, MarketError> {
        bounded("query", self.timeout, async {
            let mut query = sqlx::query(sql);
            for param in params {
                query = match param {
                    SqlValue::Null => query.bind(None::<String>),
                    SqlValue::Int(v) => query.bind(*v),
                    SqlValue::Double(v) => query.bind(*v),
                    SqlValue::Text(s) => query.bind(s.clone()),
                    SqlValue::Date(d) => query.bind(d.format("%Y-%m-%d").to_string()),
                };
            }

            let rows = query
                .fetch_all(&self.pool)
                .await
                .map_err(|e| MarketError::Query(e.to_string()))?;

            Ok(rows.iter().map(decode_row).collect())
        })
        .await
    }
}

fn decode_row(row: &AnyRow) -> Row {
    let mut out = Row::new();
    for (idx, column) in row.columns().iter().enumerate() {
        out.insert(column.name(), decode_cell(row, idx));
    }
    out
}

// The Any driver only decodes a cell into its exact runtime type, so try each in turn.
fn decode_cell(row: &AnyRow, idx: usize) -> SqlValue {
    if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
        return v.map(SqlValue::Double).unwrap_or(SqlValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
        return v.map(SqlValue::Int).unwrap_or(SqlValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<i32>, _>(idx) {
        return v.map(|v| SqlValue::Int(v as i64)).unwrap_or(SqlValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
        return v.map(SqlValue::Text).unwrap_or(SqlValue::Null);
    }
    SqlValue::Null
}
