//! Catalogue of analytics and the fact each one aggregates.

use std::fmt;
use std::str::FromStr;

use market_core::MarketError;

use crate::dates::FactTable;

pub const EQUITY_LINES: [&str; 4] = [
    "Owner's equity",
    "Share premium",
    "Non-controlling interests",
    "Undistributed earnings",
];

pub const DEBT_LINES: [&str; 2] = ["Short-term debt", "Long-term debt"];

const OWNER_EQUITY_LINE: [&str; 1] = ["Owner's equity"];
const LIABILITY_LINES: [&str; 2] = ["Liabilities", "Total liabilities"];
const REVENUE_LINES: [&str; 2] = ["Net revenue", "Net interest income"];
const GROSS_PROFIT_LINE: [&str; 1] = ["Gross profit"];
const OPERATING_PROFIT_LINE: [&str; 1] = ["Operating profit"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    PriceChange,
    LiquidityChange,
    MarketCapChange,
    IndustryLiquidityChange,
    EquityIndustryChange,
    LiabilitiesIndustryChange,
    EquityChange,
    LiabilitiesChange,
    NetRevenue,
    GrossProfit,
    OperatingProfit,
    Eps,
    Ebitda,
    CashDividend,
}

/// Where a metric's values come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Measure {
    /// A numeric column of `ticker_trade`
    Trade(&'static str),
    /// `ratio.value` for one ratio code
    Ratio(&'static str),
    /// `financial_report.value` for the given report lines (matched case-insensitively)
    Report(&'static [&'static str]),
}

impl Measure {
    pub fn table(&self) -> &'static str {
        match self {
            Measure::Trade(_) => "ticker_trade",
            Measure::Ratio(_) => "ratio",
            Measure::Report(_) => "financial_report",
        }
    }

    pub fn date_column(&self) -> &'static str {
        match self {
            Measure::Trade(_) => "trade_date",
            Measure::Ratio(_) => "report_date",
            Measure::Report(_) => "period",
        }
    }

    pub fn value_column(&self) -> &'static str {
        match self {
            Measure::Trade(column) => *column,
            Measure::Ratio(_) | Measure::Report(_) => "value",
        }
    }

    /// Table whose sessions date this measure, `None` for report periods.
    pub fn sessions(&self) -> Option<FactTable> {
        match self {
            Measure::Trade(_) => Some(FactTable::TickerTrade),
            Measure::Ratio(_) => Some(FactTable::Ratio),
            Measure::Report(_) => None,
        }
    }

    pub fn has_report_lines(&self) -> bool {
        matches!(self, Measure::Report(_))
    }
}

/// Grouping dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Ticker,
    Industry,
}

impl Entity {
    pub fn column(&self) -> &'static str {
        match self {
            Entity::Ticker => "t.code",
            Entity::Industry => "i.industry",
        }
    }
}

/// How the compared dates are chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowStrategy {
    /// Latest session against the other four named session anchors
    SessionAnchors,
    /// Latest session against one quarter, four quarters and four years back
    QuarterAnchors,
    /// Every sampled date against the oldest sample
    Offset,
    /// Latest completed quarter against the one before it
    LatestQuarters,
    /// Period-over-period change within each (entity, report line)
    Lag,
}

impl Metric {
    pub const ALL: [Metric; 14] = [
        Metric::PriceChange,
        Metric::LiquidityChange,
        Metric::MarketCapChange,
        Metric::IndustryLiquidityChange,
        Metric::EquityIndustryChange,
        Metric::LiabilitiesIndustryChange,
        Metric::EquityChange,
        Metric::LiabilitiesChange,
        Metric::NetRevenue,
        Metric::GrossProfit,
        Metric::OperatingProfit,
        Metric::Eps,
        Metric::Ebitda,
        Metric::CashDividend,
    ];

    /// Stable name used in routes and cache keys.
    pub fn key(&self) -> &'static str {
        match self {
            Metric::PriceChange => "price-change",
            Metric::LiquidityChange => "liquidity-change",
            Metric::MarketCapChange => "market-cap-change",
            Metric::IndustryLiquidityChange => "industry-liquidity-change",
            Metric::EquityIndustryChange => "equity-industry-change",
            Metric::LiabilitiesIndustryChange => "liabilities-industry-change",
            Metric::EquityChange => "equity-change",
            Metric::LiabilitiesChange => "liabilities-change",
            Metric::NetRevenue => "net-revenue",
            Metric::GrossProfit => "gross-profit",
            Metric::OperatingProfit => "operating-profit",
            Metric::Eps => "eps",
            Metric::Ebitda => "ebitda",
            Metric::CashDividend => "cash-dividend",
        }
    }

    pub fn measure(&self) -> Measure {
        match self {
            Metric::PriceChange => Measure::Trade("close_price"),
            Metric::LiquidityChange | Metric::IndustryLiquidityChange => {
                Measure::Trade("total_val")
            }
            Metric::MarketCapChange => Measure::Ratio("MARKETCAP"),
            Metric::EquityIndustryChange => Measure::Report(&OWNER_EQUITY_LINE),
            Metric::LiabilitiesIndustryChange => Measure::Report(&LIABILITY_LINES),
            Metric::EquityChange => Measure::Report(&EQUITY_LINES),
            Metric::LiabilitiesChange => Measure::Report(&DEBT_LINES),
            Metric::NetRevenue => Measure::Report(&REVENUE_LINES),
            Metric::GrossProfit => Measure::Report(&GROSS_PROFIT_LINE),
            Metric::OperatingProfit => Measure::Report(&OPERATING_PROFIT_LINE),
            Metric::Eps => Measure::Ratio("EPS_TR"),
            Metric::Ebitda => Measure::Ratio("OPERATING_EBIT_MARGIN_QR"),
            Metric::CashDividend => Measure::Ratio("DIVIDEND_PAID_TR"),
        }
    }

    pub fn entity(&self) -> Entity {
        match self {
            Metric::PriceChange
            | Metric::LiquidityChange
            | Metric::EquityChange
            | Metric::LiabilitiesChange => Entity::Ticker,
            _ => Entity::Industry,
        }
    }

    pub fn strategy(&self) -> WindowStrategy {
        match self {
            Metric::PriceChange => WindowStrategy::SessionAnchors,
            Metric::LiquidityChange => WindowStrategy::QuarterAnchors,
            Metric::MarketCapChange
            | Metric::IndustryLiquidityChange
            | Metric::EquityIndustryChange
            | Metric::LiabilitiesIndustryChange => WindowStrategy::Offset,
            Metric::EquityChange | Metric::LiabilitiesChange => WindowStrategy::LatestQuarters,
            Metric::NetRevenue
            | Metric::GrossProfit
            | Metric::OperatingProfit
            | Metric::Eps
            | Metric::Ebitda
            | Metric::CashDividend => WindowStrategy::Lag,
        }
    }

    /// Whether the metric takes a (type, order) window.
    pub fn is_windowed(&self) -> bool {
        matches!(self.strategy(), WindowStrategy::Offset | WindowStrategy::Lag)
    }

    /// Point-in-time metrics rank by change; the rest are time series.
    pub fn is_point_in_time(&self) -> bool {
        self.entity() == Entity::Ticker
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Metric {
    type Err = MarketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Metric::ALL
            .into_iter()
            .find(|m| m.key() == s)
            .ok_or_else(|| MarketError::Validation(format!("unknown metric '{}'", s)))
    }
}
