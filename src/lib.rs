//! Folio - portfolio weights importer and valuation service
//!
//! This library ingests a workbook of portfolio weights and asset prices,
//! stores the normalized series in SQLite, and computes portfolio metrics:
//! initial per-asset units, portfolio value over time, and per-asset
//! weights over time, optionally adjusted by recorded trades.

pub mod api;
pub mod cli;
pub mod db;
pub mod error;
pub mod importers;
pub mod valuation;
