use serde::{Deserialize, Serialize};

/// Close-price change of one ticker against the named session anchors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceChangePerformance {
    pub code: String,
    pub per_five: Option<f64>,
    pub per_quarter: Option<f64>,
    pub per_ytd: Option<f64>,
    pub per_year: Option<f64>,
}

/// Traded-value change of one ticker against the quarter anchors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidityChangePerformance {
    pub code: String,
    pub per_quarter: Option<f64>,
    pub per_year: Option<f64>,
    pub per_four_year: Option<f64>,
}

/// One point of an industry time series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndustryChange {
    pub date: String,
    pub industry: String,
    pub color: String,
    pub per_change: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityChange {
    pub code: String,
    pub owner_equity: Option<f64>,
    pub share_premium: Option<f64>,
    pub non_controlling_interests: Option<f64>,
    pub undistributed_earnings: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiabilitiesChange {
    pub code: String,
    pub short_term_debt: Option<f64>,
    pub long_term_debt: Option<f64>,
}

/// Advance/decline counts and mean price change for one industry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndustryBreadth {
    pub industry: String,
    pub color: String,
    pub increase: i64,
    pub decrease: i64,
    pub equal: i64,
    /// Closed at or above the ceiling price
    pub high: i64,
    /// Closed at or below the floor price
    pub low: i64,
    pub day_change: Option<f64>,
    pub week_change: Option<f64>,
    pub month_change: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopMover {
    pub code: String,
    pub close_price: Option<f64>,
    /// Percent change of close against five sessions ago
    pub roc_5: Option<f64>,
}
