use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A named portfolio with its initial capital and initial date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portfolio {
    pub id: Option<i64>,
    pub name: String,
    pub initial_value: Decimal,
    pub initial_date: NaiveDate,
}

/// An asset referenced by weight rows, price rows, and trades.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub id: Option<i64>,
    pub name: String,
}

/// One observed closing price for an asset on a date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceObservation {
    pub id: Option<i64>,
    pub asset_id: i64,
    pub date: NaiveDate,
    pub price: Decimal,
}

/// One observed allocation weight for an asset on a date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightObservation {
    pub id: Option<i64>,
    pub portfolio_id: i64,
    pub asset_id: i64,
    pub date: NaiveDate,
    pub weight: Decimal,
}

/// Trade direction
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "BUY",
            TradeSide::Sell => "SELL",
        }
    }

    /// Sign applied to the unit delta stored for this side.
    pub fn sign(&self) -> Decimal {
        match self {
            TradeSide::Buy => Decimal::ONE,
            TradeSide::Sell => Decimal::NEGATIVE_ONE,
        }
    }
}

impl FromStr for TradeSide {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" | "B" => Ok(TradeSide::Buy),
            "SELL" | "S" => Ok(TradeSide::Sell),
            _ => Err(()),
        }
    }
}

/// A buy or sell event adjusting the held units of one asset from its
/// date onward. `delta_units` is already signed (negative for sells).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: Option<i64>,
    pub portfolio_id: i64,
    pub asset_id: i64,
    pub trade_date: NaiveDate,
    pub side: TradeSide,
    pub delta_units: Decimal,
}
