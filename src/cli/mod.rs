use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "folio")]
#[command(version, about = "Portfolio weights importer and valuation service")]
#[command(
    long_about = "Import a workbook of portfolio weights and asset prices into SQLite, record buy/sell trades, and serve the computed valuation series over HTTP."
)]
pub struct Cli {
    /// Disable colorized/ANSI output
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,

    /// Database file (defaults to ~/.folio/data.db)
    #[arg(long, global = true, env = "FOLIO_DB")]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Import weights and prices from an xlsx workbook
    ///
    /// Imports are an administrative operation: run them serially, never
    /// two at once against the same database.
    Import {
        /// Path to the workbook
        file: String,

        /// Portfolio the weights belong to
        #[arg(long, default_value = "Portfolio 1")]
        portfolio: String,

        /// Initial date, dd-mm-yyyy (e.g. 15-02-2022)
        #[arg(long = "initial-date")]
        initial_date: String,

        /// Initial notional allocated across assets at the initial date
        #[arg(long, default_value = "1000000000")]
        notional: String,

        /// Name of the weights sheet
        #[arg(long = "weights-sheet", default_value = "weights")]
        weights_sheet: String,

        /// Name of the prices sheet
        #[arg(long = "prices-sheet", default_value = "prices")]
        prices_sheet: String,

        /// Preview only, don't save to database
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Record and inspect buy/sell trades
    Trade {
        #[command(subcommand)]
        action: TradeCommands,
    },

    /// Serve the valuation API and charts pages
    Serve {
        /// Listen address
        #[arg(long, default_value = "127.0.0.1:8080", env = "FOLIO_LISTEN")]
        listen: String,
    },
}

#[derive(Subcommand)]
pub enum TradeCommands {
    /// Add a trade: `trade add <portfolio> <asset> <date> <buy|sell>`
    Add {
        /// Portfolio name
        portfolio: String,

        /// Asset name
        asset: String,

        /// Trade date, dd-mm-yyyy
        date: String,

        /// Direction: buy or sell
        side: String,

        /// Number of units
        #[arg(long, conflicts_with = "notional")]
        units: Option<String>,

        /// Monetary amount, converted at that day's stored price
        #[arg(long)]
        notional: Option<String>,
    },

    /// List all trades of a portfolio
    List {
        /// Portfolio name
        portfolio: String,
    },
}
