//! Exchange / industry filter builder.

use market_core::{all_industries, Exchange, FilterSpec, MarketError};

use crate::sql::SqlBuilder;

/// Security types that participate in every analytic.
pub const SECURITY_TYPES: [&str; 2] = ["STOCK", "ETF"];

const MAX_INDUSTRY_LABEL_LEN: usize = 100;
// `,` and `:` separate cache key fragments
const FORBIDDEN_LABEL_CHARS: &[char] = &['\'', '"', ';', '\\', '`', ',', ':'];

pub fn build_exchange_filter(code: &str) -> Result<Vec<Exchange>, MarketError> {
    match code.trim().to_uppercase().as_str() {
        "" | "ALL" => Ok(Exchange::ALL.to_vec()),
        "HOSE" | "HSX" => Ok(vec![Exchange::Hose]),
        "HNX" => Ok(vec![Exchange::Hnx]),
        "UPCOM" => Ok(vec![Exchange::Upcom]),
        other => Err(MarketError::Validation(format!("unknown exchange '{}'", other))),
    }
}

/// Empty input or a wildcard entry expands to every known industry.
pub fn build_industry_filter<S: AsRef<str>>(industries: &[S]) -> Result<Vec<String>, MarketError> {
    let is_wildcard = industries.is_empty()
        || industries
            .iter()
            .any(|i| matches!(i.as_ref().trim(), "*" | "ALL" | "all"));
    if is_wildcard {
        return Ok(all_industries());
    }

    let mut labels = Vec::with_capacity(industries.len());
    for raw in industries {
        labels.push(validate_industry_label(raw.as_ref())?);
    }
    labels.sort();
    labels.dedup();
    Ok(labels)
}

pub fn build_filter<S: AsRef<str>>(
    exchange: &str,
    industries: &[S],
) -> Result<FilterSpec, MarketError> {
    Ok(FilterSpec {
        exchanges: build_exchange_filter(exchange)?,
        industries: build_industry_filter(industries)?,
    })
}

fn validate_industry_label(raw: &str) -> Result<String, MarketError> {
    let label = raw.trim();
    if label.is_empty() {
        return Err(MarketError::Validation("industry label must not be empty".to_string()));
    }
    if label.chars().count() > MAX_INDUSTRY_LABEL_LEN {
        return Err(MarketError::Validation(format!(
            "industry label exceeds {} characters",
            MAX_INDUSTRY_LABEL_LEN
        )));
    }
    if label
        .chars()
        .any(|c| c.is_control() || FORBIDDEN_LABEL_CHARS.contains(&c))
    {
        return Err(MarketError::Validation(format!(
            "industry label '{}' contains invalid characters",
            label.escape_default()
        )));
    }
    Ok(label.to_string())
}

/// Appends ` AND <info>.exchange IN (...) AND <info>.industry IN (...) AND <info>.security_type IN (...)`.
pub fn push_filter_predicates(b: &mut SqlBuilder, filter: &FilterSpec, info_alias: &str) {
    b.push(" AND ")
        .push(info_alias)
        .push(".exchange IN ")
        .push_in(filter.exchanges.iter().map(|e| e.as_str()));
    b.push(" AND ")
        .push(info_alias)
        .push(".industry IN ")
        .push_in(filter.industries.iter().map(String::as_str));
    b.push(" AND ")
        .push(info_alias)
        .push(".security_type IN ")
        .push_in(SECURITY_TYPES);
}
