use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use colored::Colorize;
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::info;
use tracing_subscriber::EnvFilter;

use folio::api::{self, AppState};
use folio::cli::{Cli, Commands, TradeCommands};
use folio::db::{self, TradeAmount, TradeSide};
use folio::error::FolioError;
use folio::importers::{self, ImportOptions};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    if cli.no_color {
        colored::control::set_override(false);
    }

    match cli.command {
        Commands::Import {
            file,
            portfolio,
            initial_date,
            notional,
            weights_sheet,
            prices_sheet,
            dry_run,
        } => handle_import(
            cli.db,
            &file,
            ImportOptions {
                portfolio,
                initial_date: parse_day_month_year(&initial_date)?,
                notional: parse_decimal_arg(&notional, "--notional")?,
                weights_sheet,
                prices_sheet,
            },
            dry_run,
        ),

        Commands::Trade { action } => match action {
            TradeCommands::Add {
                portfolio,
                asset,
                date,
                side,
                units,
                notional,
            } => handle_trade_add(cli.db, &portfolio, &asset, &date, &side, units, notional),
            TradeCommands::List { portfolio } => handle_trade_list(cli.db, &portfolio),
        },

        Commands::Serve { listen } => serve(cli.db, &listen).await,
    }
}

/// Parse a dd-mm-yyyy argument
fn parse_day_month_year(text: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(text, "%d-%m-%Y")
        .or_else(|_| NaiveDate::parse_from_str(text, "%d/%m/%Y"))
        .with_context(|| format!("date '{}' must be dd-mm-yyyy (e.g. 15-02-2022)", text))
}

fn parse_decimal_arg(text: &str, flag: &str) -> Result<Decimal> {
    Decimal::from_str(text).with_context(|| format!("{} '{}' is not a valid number", flag, text))
}

/// Handle import command
fn handle_import(
    db_path: Option<PathBuf>,
    file: &str,
    options: ImportOptions,
    dry_run: bool,
) -> Result<()> {
    use tabled::{settings::Style, Table, Tabled};

    info!("Importing workbook from: {}", file);

    let parsed = importers::parse_workbook(file, &options)?;

    println!(
        "\n{} Parsed {} weight rows and {} price rows\n",
        "✓".green().bold(),
        parsed.weights.len(),
        parsed.prices.len()
    );

    #[derive(Tabled)]
    struct WeightPreview {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Asset")]
        asset: String,
        #[tabled(rename = "Weight")]
        weight: String,
    }

    let preview: Vec<WeightPreview> = parsed
        .weights
        .iter()
        .take(10)
        .map(|row| WeightPreview {
            date: row.date.format("%d-%m-%Y").to_string(),
            asset: row.asset.clone(),
            weight: row.weight.to_string(),
        })
        .collect();

    let table = Table::new(preview).with(Style::rounded()).to_string();
    println!("{}", table);

    if parsed.weights.len() > 10 {
        println!("... and {} more weight rows", parsed.weights.len() - 10);
    }

    if dry_run {
        println!("\n{} Dry run - no changes saved", "ℹ".blue().bold());
        return Ok(());
    }

    db::init_database(db_path.clone())?;
    let mut conn = db::open_db(db_path)?;

    let summary = importers::import_workbook(&mut conn, &parsed, &options)?;

    println!("\n{} Import complete!", "✓".green().bold());
    println!("  Portfolio: {} (id {})", options.portfolio, summary.portfolio_id);
    println!("  Assets: {}", summary.assets.to_string().green());
    println!("  Weight rows: {}", summary.weight_rows.to_string().green());
    println!("  Price rows: {}", summary.price_rows.to_string().green());

    Ok(())
}

fn open_portfolio(
    conn: &rusqlite::Connection,
    name: &str,
) -> Result<db::Portfolio, FolioError> {
    db::get_portfolio_by_name(conn, name)?.ok_or_else(|| FolioError::not_found("portfolio", name))
}

#[allow(clippy::too_many_arguments)]
fn handle_trade_add(
    db_path: Option<PathBuf>,
    portfolio: &str,
    asset: &str,
    date: &str,
    side: &str,
    units: Option<String>,
    notional: Option<String>,
) -> Result<()> {
    let date = parse_day_month_year(date)?;
    let side = TradeSide::from_str(side)
        .map_err(|_| anyhow::anyhow!("side '{}' must be 'buy' or 'sell'", side))?;
    let amount = match (units, notional) {
        (Some(units), None) => TradeAmount::Units(parse_decimal_arg(&units, "--units")?),
        (None, Some(notional)) => {
            TradeAmount::Notional(parse_decimal_arg(&notional, "--notional")?)
        }
        _ => anyhow::bail!("provide exactly one of --units and --notional"),
    };

    db::init_database(db_path.clone())?;
    let conn = db::open_db(db_path)?;
    let portfolio = open_portfolio(&conn, portfolio)?;

    let trade = db::record_trade(
        &conn,
        portfolio.id.expect("portfolio loaded from db has id"),
        asset,
        date,
        side,
        amount,
    )?;

    println!(
        "{} Recorded {} {} units of {} on {}",
        "✓".green().bold(),
        trade.side.as_str().to_lowercase(),
        trade.delta_units.abs(),
        asset,
        trade.trade_date.format("%d-%m-%Y"),
    );
    Ok(())
}

fn handle_trade_list(db_path: Option<PathBuf>, portfolio: &str) -> Result<()> {
    use tabled::{settings::Style, Table, Tabled};

    db::init_database(db_path.clone())?;
    let conn = db::open_db(db_path)?;
    let portfolio = open_portfolio(&conn, portfolio)?;
    let trades = db::list_trades(&conn, portfolio.id.expect("portfolio loaded from db has id"))?;

    if trades.is_empty() {
        println!("No trades recorded");
        return Ok(());
    }

    #[derive(Tabled)]
    struct TradeRow {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Asset")]
        asset: String,
        #[tabled(rename = "Side")]
        side: String,
        #[tabled(rename = "Units")]
        units: String,
    }

    let rows: Vec<TradeRow> = trades
        .iter()
        .map(|(trade, asset)| TradeRow {
            date: trade.trade_date.format("%d-%m-%Y").to_string(),
            asset: asset.clone(),
            side: trade.side.as_str().to_string(),
            units: trade.delta_units.to_string(),
        })
        .collect();

    println!("{}", Table::new(rows).with(Style::rounded()).to_string());
    Ok(())
}

async fn serve(db_path: Option<PathBuf>, listen: &str) -> Result<()> {
    db::init_database(db_path.clone())?;
    let db_path = match db_path {
        Some(path) => path,
        None => db::get_default_db_path()?,
    };

    let state = AppState::new(db_path);
    let router = api::app_router(state);

    info!("Listening on {}", listen);
    let listener = tokio::net::TcpListener::bind(listen).await?;
    axum::serve(listener, router).await?;
    Ok(())
}
