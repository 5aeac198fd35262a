//! Valuation engine
//!
//! Pure computations over series loaded once per request: initial
//! per-asset units, portfolio value over time, and per-asset weights
//! over time. A boolean flag folds recorded trades into the held
//! quantities; the value and weight formulas are shared by both paths.
//!
//! All arithmetic is `rust_decimal::Decimal`. Units quantize to 8
//! decimal places, portfolio values to 2, weights to 8, half-up.

use chrono::NaiveDate;
use rusqlite::Connection;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::db::{self, Portfolio, Trade};
use crate::error::{FolioError, Result};

pub const UNIT_DP: u32 = 8;
pub const VALUE_DP: u32 = 2;
pub const WEIGHT_DP: u32 = 8;

pub fn quantize_units(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(UNIT_DP, RoundingStrategy::MidpointAwayFromZero)
}

fn quantize_value(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(VALUE_DP, RoundingStrategy::MidpointAwayFromZero)
}

fn quantize_weight(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(WEIGHT_DP, RoundingStrategy::MidpointAwayFromZero)
}

/// Asset identity carried through a computation
#[derive(Debug, Clone)]
pub struct AssetRef {
    pub id: i64,
    pub name: String,
}

/// Everything one valuation pass needs, loaded from storage up front.
///
/// `assets` holds the assets weighted at the initial date, ordered by
/// name; `dates` the sorted distinct price dates inside the requested
/// range; `trades` the portfolio's trades in application order.
#[derive(Debug)]
pub struct ValuationInputs {
    pub portfolio_name: String,
    pub initial_date: NaiveDate,
    pub initial_value: Decimal,
    pub assets: Vec<AssetRef>,
    pub initial_weights: HashMap<i64, Decimal>,
    pub initial_prices: HashMap<i64, Decimal>,
    pub prices: HashMap<(i64, NaiveDate), Decimal>,
    pub dates: Vec<NaiveDate>,
    pub trades: Vec<Trade>,
}

/// Initial units of one asset
#[derive(Debug, Clone, Serialize)]
pub struct InitialUnit {
    pub asset: String,
    pub units: Decimal,
}

/// Portfolio value on one date
#[derive(Debug, Clone, Serialize)]
pub struct ValuePoint {
    pub date: NaiveDate,
    pub value: Decimal,
}

/// Per-asset weights on one date
#[derive(Debug, Clone, Serialize)]
pub struct WeightPoint {
    pub date: NaiveDate,
    pub weights: BTreeMap<String, Decimal>,
}

/// Load valuation inputs for a portfolio over [start, end].
pub fn load_inputs(
    conn: &Connection,
    portfolio: &Portfolio,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<ValuationInputs> {
    let portfolio_id = portfolio.id.ok_or_else(|| {
        FolioError::not_found("portfolio", portfolio.name.clone())
    })?;

    let weighted = db::weights_on_date(conn, portfolio_id, portfolio.initial_date)?;
    if weighted.is_empty() {
        return Err(FolioError::MissingWeights {
            portfolio: portfolio.name.clone(),
            date: portfolio.initial_date,
        });
    }

    let mut assets = Vec::with_capacity(weighted.len());
    let mut initial_weights = HashMap::new();
    let mut initial_prices = HashMap::new();
    for (asset, weight) in weighted {
        let id = asset.id.expect("asset loaded from db has id");
        if let Some(price) = db::get_price(conn, id, portfolio.initial_date)? {
            initial_prices.insert(id, price);
        }
        initial_weights.insert(id, weight);
        assets.push(AssetRef {
            id,
            name: asset.name,
        });
    }

    let (prices, dates) =
        db::prices_in_range(conn, portfolio_id, portfolio.initial_date, start, end)?;
    let trades = db::trades_through(conn, portfolio_id, end)?;

    Ok(ValuationInputs {
        portfolio_name: portfolio.name.clone(),
        initial_date: portfolio.initial_date,
        initial_value: portfolio.initial_value,
        assets,
        initial_weights,
        initial_prices,
        prices,
        dates,
        trades,
    })
}

/// Initial units per asset: C_{i,0} = V0 * w_{i,0} / P_{i,0}.
///
/// By construction these never depend on trades. Fails when a weighted
/// asset has no stored price at the initial date.
pub fn initial_units(inputs: &ValuationInputs) -> Result<Vec<InitialUnit>> {
    let by_id = initial_units_by_id(inputs)?;
    Ok(inputs
        .assets
        .iter()
        .map(|asset| InitialUnit {
            asset: asset.name.clone(),
            units: by_id[&asset.id],
        })
        .collect())
}

fn initial_units_by_id(inputs: &ValuationInputs) -> Result<HashMap<i64, Decimal>> {
    let mut units = HashMap::with_capacity(inputs.assets.len());
    for asset in &inputs.assets {
        let weight = inputs.initial_weights[&asset.id];
        let price = inputs
            .initial_prices
            .get(&asset.id)
            .ok_or(FolioError::MissingPrice {
                asset: asset.name.clone(),
                date: inputs.initial_date,
            })?;
        units.insert(
            asset.id,
            quantize_units(inputs.initial_value * weight / price),
        );
    }
    Ok(units)
}

/// Portfolio value per date: V_t = sum_i C_{i,t} * P_{i,t}.
pub fn value_series(inputs: &ValuationInputs, include_trades: bool) -> Result<Vec<ValuePoint>> {
    let exposures = exposures(inputs, include_trades)?;
    Ok(exposures
        .into_iter()
        .map(|day| ValuePoint {
            date: day.date,
            value: quantize_value(day.total),
        })
        .collect())
}

/// Per-asset weights per date: w_{i,t} = C_{i,t} * P_{i,t} / V_t.
///
/// A zero portfolio value is reported as an error, never emitted as an
/// empty or zeroed row.
pub fn weight_series(inputs: &ValuationInputs, include_trades: bool) -> Result<Vec<WeightPoint>> {
    let exposures = exposures(inputs, include_trades)?;
    let mut points = Vec::with_capacity(exposures.len());
    for day in exposures {
        if day.total.is_zero() {
            return Err(FolioError::ZeroPortfolioValue { date: day.date });
        }
        let mut weights = BTreeMap::new();
        for (idx, exposure) in day.by_asset.iter().enumerate() {
            weights.insert(
                inputs.assets[idx].name.clone(),
                quantize_weight(*exposure / day.total),
            );
        }
        points.push(WeightPoint {
            date: day.date,
            weights,
        });
    }
    Ok(points)
}

/// Per-asset exposure and total for one date
struct DayExposure {
    date: NaiveDate,
    /// Indexed like `ValuationInputs::assets`
    by_asset: Vec<Decimal>,
    total: Decimal,
}

/// The shared series pass: per date, held units times price per asset.
///
/// With trades enabled, held units are the initial units plus the
/// cumulative signed deltas of all trades dated on or before the day,
/// accumulated in (date, insertion) order.
fn exposures(inputs: &ValuationInputs, include_trades: bool) -> Result<Vec<DayExposure>> {
    let base_units = initial_units_by_id(inputs)?;

    let mut cumulative: HashMap<i64, Decimal> = HashMap::new();
    let mut trade_idx = 0;
    let mut days = Vec::with_capacity(inputs.dates.len());

    for &date in &inputs.dates {
        if include_trades {
            while trade_idx < inputs.trades.len()
                && inputs.trades[trade_idx].trade_date <= date
            {
                let trade = &inputs.trades[trade_idx];
                *cumulative.entry(trade.asset_id).or_insert(Decimal::ZERO) += trade.delta_units;
                trade_idx += 1;
            }
        }

        let mut by_asset = Vec::with_capacity(inputs.assets.len());
        let mut total = Decimal::ZERO;
        for asset in &inputs.assets {
            let units = base_units[&asset.id]
                + cumulative.get(&asset.id).copied().unwrap_or(Decimal::ZERO);
            let price =
                inputs
                    .prices
                    .get(&(asset.id, date))
                    .ok_or(FolioError::MissingPrice {
                        asset: asset.name.clone(),
                        date,
                    })?;
            let exposure = units * price;
            by_asset.push(exposure);
            total += exposure;
        }

        days.push(DayExposure {
            date,
            by_asset,
            total,
        });
    }

    Ok(days)
}
