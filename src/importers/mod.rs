// Import module - workbook parsing and persistence

pub mod workbook;

use calamine::{open_workbook, Reader, Xlsx};
use chrono::NaiveDate;
use rusqlite::Connection;
use rust_decimal::Decimal;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use tracing::info;

use crate::db;
use crate::error::{ImportError, Result};
pub use workbook::{PriceRow, WeightRow};

/// Parameters of one import run
#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub portfolio: String,
    pub initial_date: NaiveDate,
    pub notional: Decimal,
    pub weights_sheet: String,
    pub prices_sheet: String,
}

/// Validated rows parsed from a workbook, not yet persisted
#[derive(Debug)]
pub struct ParsedWorkbook {
    pub weights: Vec<WeightRow>,
    pub prices: Vec<PriceRow>,
}

/// Row counts written by an import run
#[derive(Debug)]
pub struct ImportSummary {
    pub portfolio_id: i64,
    pub assets: usize,
    pub weight_rows: usize,
    pub price_rows: usize,
}

/// Parse and validate a workbook without touching the database.
///
/// Fails with `ImportError` on the first malformed sheet, header, or
/// cell. Cross-sheet checks mirror the persistence preconditions: the
/// weights sheet must carry rows at the initial date, and every
/// weighted asset must also appear in the prices sheet.
pub fn parse_workbook<P: AsRef<Path>>(path: P, options: &ImportOptions) -> Result<ParsedWorkbook> {
    let path = path.as_ref();
    info!("Parsing workbook: {:?}", path);

    let mut wb: Xlsx<_> = open_workbook(path).map_err(|e| {
        ImportError::sheet(
            "workbook",
            format!("could not open {}: {}", path.display(), e),
        )
    })?;

    let weights_name = resolve_sheet_name(&wb, &options.weights_sheet)?;
    let prices_name = resolve_sheet_name(&wb, &options.prices_sheet)?;

    let weights_range = wb.worksheet_range(&weights_name).map_err(|e| {
        ImportError::sheet(&weights_name, format!("could not read sheet: {}", e))
    })?;
    let prices_range = wb.worksheet_range(&prices_name).map_err(|e| {
        ImportError::sheet(&prices_name, format!("could not read sheet: {}", e))
    })?;

    let weights = workbook::parse_weight_sheet(&weights_name, &weights_range)?;
    let prices = workbook::parse_price_sheet(&prices_name, &prices_range)?;

    validate_workbook(&weights, &prices, options, &weights_name, &prices_name)?;

    info!(
        "Parsed {} weight rows and {} price rows",
        weights.len(),
        prices.len()
    );
    Ok(ParsedWorkbook { weights, prices })
}

/// Resolve a sheet name case-insensitively
fn resolve_sheet_name(
    wb: &Xlsx<std::io::BufReader<std::fs::File>>,
    wanted: &str,
) -> Result<String> {
    let names = wb.sheet_names();
    names
        .iter()
        .find(|name| name.eq_ignore_ascii_case(wanted))
        .cloned()
        .ok_or_else(|| {
            ImportError::sheet(
                wanted,
                format!("sheet not found. Available sheets: {}", names.join(", ")),
            )
            .into()
        })
}

fn validate_workbook(
    weights: &[WeightRow],
    prices: &[PriceRow],
    options: &ImportOptions,
    weights_name: &str,
    prices_name: &str,
) -> Result<()> {
    let at_initial = weights
        .iter()
        .any(|row| row.date == options.initial_date);
    if !at_initial {
        let available: BTreeSet<NaiveDate> = weights.iter().map(|r| r.date).collect();
        let preview: Vec<String> = available
            .iter()
            .take(10)
            .map(|d| d.to_string())
            .collect();
        let suffix = if available.len() > 10 { ", ..." } else { "" };
        return Err(ImportError::sheet(
            weights_name,
            format!(
                "no weight rows on initial date {}. Dates present: {}{}",
                options.initial_date,
                preview.join(", "),
                suffix
            ),
        )
        .into());
    }

    let priced_assets: BTreeSet<&str> = prices.iter().map(|r| r.asset.as_str()).collect();
    let unpriced: Vec<&str> = weights
        .iter()
        .map(|r| r.asset.as_str())
        .filter(|asset| !priced_assets.contains(asset))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if !unpriced.is_empty() {
        return Err(ImportError::sheet(
            prices_name,
            format!(
                "weighted asset(s) have no price rows: {}",
                unpriced.join(", ")
            ),
        )
        .into());
    }

    Ok(())
}

/// Persist a parsed workbook in one transaction.
///
/// Rows upsert by their natural keys, so re-running the same import
/// leaves row counts unchanged. Any failure rolls the whole run back;
/// there is no partial commit.
pub fn import_workbook(
    conn: &mut Connection,
    parsed: &ParsedWorkbook,
    options: &ImportOptions,
) -> Result<ImportSummary> {
    let tx = conn.transaction()?;

    let portfolio_id = db::upsert_portfolio(
        &tx,
        &options.portfolio,
        options.notional,
        options.initial_date,
    )?;

    let mut asset_ids: HashMap<&str, i64> = HashMap::new();
    for name in parsed
        .weights
        .iter()
        .map(|r| r.asset.as_str())
        .chain(parsed.prices.iter().map(|r| r.asset.as_str()))
    {
        if !asset_ids.contains_key(name) {
            let id = db::upsert_asset(&tx, name)?;
            asset_ids.insert(name, id);
        }
    }

    for row in &parsed.weights {
        let asset_id = asset_ids[row.asset.as_str()];
        db::upsert_weight(&tx, portfolio_id, asset_id, row.date, row.weight)?;
    }

    for row in &parsed.prices {
        let asset_id = asset_ids[row.asset.as_str()];
        db::upsert_price(&tx, asset_id, row.date, row.price)?;
    }

    tx.commit()?;

    info!(
        "Imported portfolio '{}': {} assets, {} weight rows, {} price rows",
        options.portfolio,
        asset_ids.len(),
        parsed.weights.len(),
        parsed.prices.len()
    );

    Ok(ImportSummary {
        portfolio_id,
        assets: asset_ids.len(),
        weight_rows: parsed.weights.len(),
        price_rows: parsed.prices.len(),
    })
}
