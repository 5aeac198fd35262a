// Database module - SQLite connection, schema, and queries

pub mod models;

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::info;

use crate::error::{FolioError, Result};
pub use models::{Asset, Portfolio, PriceObservation, Trade, TradeSide, WeightObservation};

/// Get the default database path (~/.folio/data.db)
pub fn get_default_db_path() -> Result<PathBuf> {
    let home = std::env::var("HOME")
        .map_err(|_| FolioError::InvalidRequest("HOME environment variable not set".into()))?;
    let folio_dir = PathBuf::from(home).join(".folio");

    std::fs::create_dir_all(&folio_dir)?;

    Ok(folio_dir.join("data.db"))
}

/// Open database connection
pub fn open_db(db_path: Option<PathBuf>) -> Result<Connection> {
    let path = match db_path {
        Some(p) => p,
        None => get_default_db_path()?,
    };
    let conn = Connection::open(&path)?;

    // Enable foreign keys
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    Ok(conn)
}

/// Initialize the database with schema
///
/// Creates the database file if needed and runs the schema SQL to set up
/// all tables and indexes. Safe to call repeatedly.
pub fn init_database(db_path: Option<PathBuf>) -> Result<()> {
    let path = match db_path {
        Some(p) => p,
        None => get_default_db_path()?,
    };

    info!("Initializing database at: {:?}", path);

    let conn = open_db(Some(path))?;

    let schema_sql = include_str!("schema.sql");
    conn.execute_batch(schema_sql)?;

    Ok(())
}

/// Parse a TEXT column holding a decimal value.
pub(crate) fn decimal_column(row: &Row, idx: usize) -> rusqlite::Result<Decimal> {
    let text: String = row.get(idx)?;
    Decimal::from_str(&text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

// ---------- portfolios ----------

/// Insert or update a portfolio by name, returns portfolio_id.
///
/// Re-imports refresh the initial value and initial date in place.
pub fn upsert_portfolio(
    conn: &Connection,
    name: &str,
    initial_value: Decimal,
    initial_date: NaiveDate,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO portfolios (name, initial_value, initial_date)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(name) DO UPDATE SET
             initial_value = excluded.initial_value,
             initial_date = excluded.initial_date",
        params![name, initial_value.to_string(), initial_date],
    )?;

    let id: i64 = conn.query_row(
        "SELECT id FROM portfolios WHERE name = ?1",
        [name],
        |row| row.get(0),
    )?;
    Ok(id)
}

fn portfolio_from_row(row: &Row) -> rusqlite::Result<Portfolio> {
    Ok(Portfolio {
        id: Some(row.get(0)?),
        name: row.get(1)?,
        initial_value: decimal_column(row, 2)?,
        initial_date: row.get(3)?,
    })
}

pub fn get_portfolio(conn: &Connection, id: i64) -> Result<Option<Portfolio>> {
    let portfolio = conn
        .query_row(
            "SELECT id, name, initial_value, initial_date FROM portfolios WHERE id = ?1",
            [id],
            portfolio_from_row,
        )
        .optional()?;
    Ok(portfolio)
}

pub fn get_portfolio_by_name(conn: &Connection, name: &str) -> Result<Option<Portfolio>> {
    let portfolio = conn
        .query_row(
            "SELECT id, name, initial_value, initial_date FROM portfolios WHERE name = ?1",
            [name],
            portfolio_from_row,
        )
        .optional()?;
    Ok(portfolio)
}

pub fn list_portfolios(conn: &Connection) -> Result<Vec<Portfolio>> {
    let mut stmt = conn
        .prepare("SELECT id, name, initial_value, initial_date FROM portfolios ORDER BY name")?;
    let rows = stmt.query_map([], portfolio_from_row)?;
    let mut portfolios = Vec::new();
    for row in rows {
        portfolios.push(row?);
    }
    Ok(portfolios)
}

// ---------- assets ----------

/// Insert or get asset, returns asset_id
pub fn upsert_asset(conn: &Connection, name: &str) -> Result<i64> {
    let mut stmt = conn.prepare("SELECT id FROM assets WHERE name = ?1")?;
    let existing: Option<i64> = stmt.query_row([name], |row| row.get(0)).optional()?;

    if let Some(id) = existing {
        return Ok(id);
    }

    conn.execute("INSERT INTO assets (name) VALUES (?1)", [name])?;

    Ok(conn.last_insert_rowid())
}

pub fn get_asset_by_name(conn: &Connection, name: &str) -> Result<Option<Asset>> {
    let asset = conn
        .query_row(
            "SELECT id, name FROM assets WHERE name = ?1",
            [name],
            |row| {
                Ok(Asset {
                    id: Some(row.get(0)?),
                    name: row.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(asset)
}

// ---------- prices and weights ----------

/// Upsert a price observation keyed by (asset, date).
pub fn upsert_price(
    conn: &Connection,
    asset_id: i64,
    date: NaiveDate,
    price: Decimal,
) -> Result<()> {
    conn.execute(
        "INSERT INTO prices (asset_id, price_date, price)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(asset_id, price_date) DO UPDATE SET price = excluded.price",
        params![asset_id, date, price.to_string()],
    )?;
    Ok(())
}

/// Upsert a weight observation keyed by (portfolio, asset, date).
pub fn upsert_weight(
    conn: &Connection,
    portfolio_id: i64,
    asset_id: i64,
    date: NaiveDate,
    weight: Decimal,
) -> Result<()> {
    conn.execute(
        "INSERT INTO weights (portfolio_id, asset_id, weight_date, weight)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(portfolio_id, asset_id, weight_date) DO UPDATE SET
             weight = excluded.weight",
        params![portfolio_id, asset_id, date, weight.to_string()],
    )?;
    Ok(())
}

pub fn count_prices(conn: &Connection) -> Result<i64> {
    let count = conn.query_row("SELECT COUNT(*) FROM prices", [], |row| row.get(0))?;
    Ok(count)
}

pub fn count_weights(conn: &Connection) -> Result<i64> {
    let count = conn.query_row("SELECT COUNT(*) FROM weights", [], |row| row.get(0))?;
    Ok(count)
}

/// Get a stored price for one asset on one date
pub fn get_price(conn: &Connection, asset_id: i64, date: NaiveDate) -> Result<Option<Decimal>> {
    let price = conn
        .query_row(
            "SELECT price FROM prices WHERE asset_id = ?1 AND price_date = ?2",
            params![asset_id, date],
            |row| decimal_column(row, 0),
        )
        .optional()?;
    Ok(price)
}

/// Latest date with any stored price, across all assets
pub fn last_price_date(conn: &Connection) -> Result<Option<NaiveDate>> {
    let date = conn
        .query_row(
            "SELECT price_date FROM prices ORDER BY price_date DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?;
    Ok(date)
}

/// Weights stored for a portfolio on a given date, with their assets,
/// ordered by asset name.
pub fn weights_on_date(
    conn: &Connection,
    portfolio_id: i64,
    date: NaiveDate,
) -> Result<Vec<(Asset, Decimal)>> {
    let mut stmt = conn.prepare(
        "SELECT a.id, a.name, w.weight
         FROM weights w
         JOIN assets a ON a.id = w.asset_id
         WHERE w.portfolio_id = ?1 AND w.weight_date = ?2
         ORDER BY a.name",
    )?;

    let rows = stmt.query_map(params![portfolio_id, date], |row| {
        let asset = Asset {
            id: Some(row.get(0)?),
            name: row.get(1)?,
        };
        let weight = decimal_column(row, 2)?;
        Ok((asset, weight))
    })?;

    let mut weights = Vec::new();
    for row in rows {
        weights.push(row?);
    }
    Ok(weights)
}

/// All prices in [start, end] for the assets weighted in a portfolio at
/// its initial date, as a (asset_id, date) -> price map plus the sorted
/// distinct dates observed.
pub fn prices_in_range(
    conn: &Connection,
    portfolio_id: i64,
    initial_date: NaiveDate,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<(HashMap<(i64, NaiveDate), Decimal>, Vec<NaiveDate>)> {
    let mut stmt = conn.prepare(
        "SELECT p.asset_id, p.price_date, p.price
         FROM prices p
         WHERE p.price_date >= ?1 AND p.price_date <= ?2
           AND p.asset_id IN (
               SELECT asset_id FROM weights
               WHERE portfolio_id = ?3 AND weight_date = ?4
           )
         ORDER BY p.price_date, p.asset_id",
    )?;

    let rows = stmt.query_map(params![start, end, portfolio_id, initial_date], |row| {
        let asset_id: i64 = row.get(0)?;
        let date: NaiveDate = row.get(1)?;
        let price = decimal_column(row, 2)?;
        Ok((asset_id, date, price))
    })?;

    let mut price_map = HashMap::new();
    let mut dates: Vec<NaiveDate> = Vec::new();
    for row in rows {
        let (asset_id, date, price) = row?;
        if dates.last() != Some(&date) {
            dates.push(date);
        }
        price_map.insert((asset_id, date), price);
    }

    Ok((price_map, dates))
}

// ---------- trades ----------

fn trade_from_row(row: &Row) -> rusqlite::Result<Trade> {
    let side_text: String = row.get(4)?;
    let side = side_text.parse::<TradeSide>().map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            format!("unknown trade side '{}'", side_text).into(),
        )
    })?;
    Ok(Trade {
        id: Some(row.get(0)?),
        portfolio_id: row.get(1)?,
        asset_id: row.get(2)?,
        trade_date: row.get(3)?,
        side,
        delta_units: decimal_column(row, 5)?,
    })
}

/// All trades for a portfolio with trade_date <= end, in application
/// order: date first, then insertion order for same-day trades.
pub fn trades_through(conn: &Connection, portfolio_id: i64, end: NaiveDate) -> Result<Vec<Trade>> {
    let mut stmt = conn.prepare(
        "SELECT id, portfolio_id, asset_id, trade_date, side, delta_units
         FROM trades
         WHERE portfolio_id = ?1 AND trade_date <= ?2
         ORDER BY trade_date ASC, id ASC",
    )?;

    let rows = stmt.query_map(params![portfolio_id, end], trade_from_row)?;
    let mut trades = Vec::new();
    for row in rows {
        trades.push(row?);
    }
    Ok(trades)
}

/// All trades for a portfolio with their asset names, in application order.
pub fn list_trades(conn: &Connection, portfolio_id: i64) -> Result<Vec<(Trade, String)>> {
    let mut stmt = conn.prepare(
        "SELECT t.id, t.portfolio_id, t.asset_id, t.trade_date, t.side, t.delta_units, a.name
         FROM trades t
         JOIN assets a ON a.id = t.asset_id
         WHERE t.portfolio_id = ?1
         ORDER BY t.trade_date ASC, t.id ASC",
    )?;

    let rows = stmt.query_map([portfolio_id], |row| {
        let trade = trade_from_row(row)?;
        let asset_name: String = row.get(6)?;
        Ok((trade, asset_name))
    })?;
    let mut trades = Vec::new();
    for row in rows {
        trades.push(row?);
    }
    Ok(trades)
}

fn trade_exists(conn: &Connection, trade: &Trade) -> Result<bool> {
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM trades
             WHERE portfolio_id = ?1 AND asset_id = ?2 AND trade_date = ?3
               AND side = ?4 AND delta_units = ?5",
            params![
                trade.portfolio_id,
                trade.asset_id,
                trade.trade_date,
                trade.side.as_str(),
                trade.delta_units.to_string(),
            ],
            |row| row.get(0),
        )
        .optional()?;
    Ok(existing.is_some())
}

fn insert_trade(conn: &Connection, trade: &Trade) -> Result<i64> {
    conn.execute(
        "INSERT INTO trades (portfolio_id, asset_id, trade_date, side, delta_units)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            trade.portfolio_id,
            trade.asset_id,
            trade.trade_date,
            trade.side.as_str(),
            trade.delta_units.to_string(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// How a trade amount was expressed by the caller.
#[derive(Debug, Clone, Copy)]
pub enum TradeAmount {
    /// Explicit number of units
    Units(Decimal),
    /// Monetary amount converted at the stored price for the trade date
    Notional(Decimal),
}

/// Record a buy/sell trade against a portfolio.
///
/// Notional amounts convert to units at that day's stored price; a
/// missing price is an error rather than a silent skip. Recording an
/// identical trade twice is a no-op so retried requests stay idempotent.
pub fn record_trade(
    conn: &Connection,
    portfolio_id: i64,
    asset_name: &str,
    date: NaiveDate,
    side: TradeSide,
    amount: TradeAmount,
) -> Result<Trade> {
    let asset = get_asset_by_name(conn, asset_name)?
        .ok_or_else(|| FolioError::not_found("asset", asset_name))?;
    let asset_id = asset.id.expect("asset loaded from db has id");

    // Only assets in the portfolio's initial weights have a quantity
    // for a trade to adjust
    let weighted: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM weights w
             JOIN portfolios p ON p.id = w.portfolio_id AND w.weight_date = p.initial_date
             WHERE w.portfolio_id = ?1 AND w.asset_id = ?2",
            params![portfolio_id, asset_id],
            |row| row.get(0),
        )
        .optional()?;
    if weighted.is_none() {
        return Err(FolioError::InvalidRequest(format!(
            "asset '{}' is not in the portfolio's initial weights",
            asset_name
        )));
    }

    let units = match amount {
        TradeAmount::Units(units) => units,
        TradeAmount::Notional(notional) => {
            let price = get_price(conn, asset_id, date)?.ok_or(FolioError::MissingPrice {
                asset: asset_name.to_string(),
                date,
            })?;
            crate::valuation::quantize_units(notional / price)
        }
    };

    if units <= Decimal::ZERO {
        return Err(FolioError::InvalidRequest(
            "trade amount must be positive".into(),
        ));
    }

    let mut trade = Trade {
        id: None,
        portfolio_id,
        asset_id,
        trade_date: date,
        side,
        delta_units: side.sign() * units,
    };

    if !trade_exists(conn, &trade)? {
        let id = insert_trade(conn, &trade)?;
        trade.id = Some(id);
    }

    Ok(trade)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn test_conn() -> (TempDir, Connection) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.db");
        init_database(Some(path.clone())).unwrap();
        let conn = open_db(Some(path)).unwrap();
        (dir, conn)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_upsert_asset_is_idempotent() {
        let (_dir, conn) = test_conn();
        let first = upsert_asset(&conn, "EEUU").unwrap();
        let second = upsert_asset(&conn, "EEUU").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_upsert_portfolio_updates_in_place() {
        let (_dir, conn) = test_conn();
        let id = upsert_portfolio(&conn, "P1", dec!(1000), date(2022, 2, 15)).unwrap();
        let same = upsert_portfolio(&conn, "P1", dec!(2000), date(2022, 2, 16)).unwrap();
        assert_eq!(id, same);

        let portfolio = get_portfolio(&conn, id).unwrap().unwrap();
        assert_eq!(portfolio.initial_value, dec!(2000));
        assert_eq!(portfolio.initial_date, date(2022, 2, 16));
    }

    #[test]
    fn test_price_upsert_keeps_unique_key() {
        let (_dir, conn) = test_conn();
        let asset = upsert_asset(&conn, "EEUU").unwrap();
        upsert_price(&conn, asset, date(2022, 2, 15), dec!(10)).unwrap();
        upsert_price(&conn, asset, date(2022, 2, 15), dec!(11)).unwrap();

        assert_eq!(count_prices(&conn).unwrap(), 1);
        assert_eq!(
            get_price(&conn, asset, date(2022, 2, 15)).unwrap(),
            Some(dec!(11))
        );
    }

    #[test]
    fn test_record_trade_notional_converts_at_stored_price() {
        let (_dir, conn) = test_conn();
        let portfolio = upsert_portfolio(&conn, "P1", dec!(1000), date(2022, 2, 15)).unwrap();
        let asset = upsert_asset(&conn, "EEUU").unwrap();
        upsert_weight(&conn, portfolio, asset, date(2022, 2, 15), dec!(1)).unwrap();
        upsert_price(&conn, asset, date(2022, 3, 1), dec!(20)).unwrap();

        let trade = record_trade(
            &conn,
            portfolio,
            "EEUU",
            date(2022, 3, 1),
            TradeSide::Sell,
            TradeAmount::Notional(dec!(100)),
        )
        .unwrap();

        assert_eq!(trade.delta_units, dec!(-5));
    }

    #[test]
    fn test_record_trade_is_idempotent() {
        let (_dir, conn) = test_conn();
        let portfolio = upsert_portfolio(&conn, "P1", dec!(1000), date(2022, 2, 15)).unwrap();
        let asset = upsert_asset(&conn, "EEUU").unwrap();
        upsert_weight(&conn, portfolio, asset, date(2022, 2, 15), dec!(1)).unwrap();

        for _ in 0..2 {
            record_trade(
                &conn,
                portfolio,
                "EEUU",
                date(2022, 3, 1),
                TradeSide::Buy,
                TradeAmount::Units(dec!(5)),
            )
            .unwrap();
        }

        let trades = trades_through(&conn, portfolio, date(2022, 12, 31)).unwrap();
        assert_eq!(trades.len(), 1);
    }

    #[test]
    fn test_record_trade_missing_price_errors() {
        let (_dir, conn) = test_conn();
        let portfolio = upsert_portfolio(&conn, "P1", dec!(1000), date(2022, 2, 15)).unwrap();
        let asset = upsert_asset(&conn, "EEUU").unwrap();
        upsert_weight(&conn, portfolio, asset, date(2022, 2, 15), dec!(1)).unwrap();

        let err = record_trade(
            &conn,
            portfolio,
            "EEUU",
            date(2022, 3, 1),
            TradeSide::Buy,
            TradeAmount::Notional(dec!(100)),
        )
        .unwrap_err();

        assert!(matches!(err, FolioError::MissingPrice { .. }));
    }

    #[test]
    fn test_trades_through_orders_same_day_by_insertion() {
        let (_dir, conn) = test_conn();
        let portfolio = upsert_portfolio(&conn, "P1", dec!(1000), date(2022, 2, 15)).unwrap();
        let asset = upsert_asset(&conn, "EEUU").unwrap();
        upsert_weight(&conn, portfolio, asset, date(2022, 2, 15), dec!(1)).unwrap();

        record_trade(
            &conn,
            portfolio,
            "EEUU",
            date(2022, 3, 1),
            TradeSide::Buy,
            TradeAmount::Units(dec!(5)),
        )
        .unwrap();
        record_trade(
            &conn,
            portfolio,
            "EEUU",
            date(2022, 3, 1),
            TradeSide::Sell,
            TradeAmount::Units(dec!(2)),
        )
        .unwrap();

        let trades = trades_through(&conn, portfolio, date(2022, 3, 1)).unwrap();
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].delta_units, dec!(5));
        assert_eq!(trades[1].delta_units, dec!(-2));
    }

    #[test]
    fn test_record_trade_rejects_unweighted_asset() {
        let (_dir, conn) = test_conn();
        let portfolio = upsert_portfolio(&conn, "P1", dec!(1000), date(2022, 2, 15)).unwrap();
        upsert_asset(&conn, "EEUU").unwrap();

        let err = record_trade(
            &conn,
            portfolio,
            "EEUU",
            date(2022, 3, 1),
            TradeSide::Buy,
            TradeAmount::Units(dec!(5)),
        )
        .unwrap_err();

        assert!(matches!(err, FolioError::InvalidRequest(_)));
    }
}
