//! Error handling for Folio
//!
//! Defines the error taxonomy shared by the importer, the valuation
//! engine, and the API layer. Import failures carry the offending
//! sheet/row/column so the operator can fix the workbook.

use chrono::NaiveDate;
use thiserror::Error;

/// A malformed workbook, sheet, or cell found during import.
///
/// `row` is 1-indexed as shown in spreadsheet applications; it is `None`
/// for sheet-level problems such as a missing sheet or header column.
#[derive(Debug, Clone)]
pub struct ImportError {
    pub sheet: String,
    pub row: Option<usize>,
    pub column: Option<String>,
    pub reason: String,
}

impl ImportError {
    pub fn sheet(sheet: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            sheet: sheet.into(),
            row: None,
            column: None,
            reason: reason.into(),
        }
    }

    pub fn cell(
        sheet: impl Into<String>,
        row: usize,
        column: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            sheet: sheet.into(),
            row: Some(row),
            column: Some(column.into()),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for ImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sheet '{}'", self.sheet)?;
        if let Some(row) = self.row {
            write!(f, ", row {}", row)?;
        }
        if let Some(col) = &self.column {
            write!(f, ", column '{}'", col)?;
        }
        write!(f, ": {}", self.reason)
    }
}

impl std::error::Error for ImportError {}

/// Core error types for portfolio operations
#[derive(Error, Debug)]
pub enum FolioError {
    #[error("import error: {0}")]
    Import(#[from] ImportError),

    #[error("missing price for asset '{asset}' on {date}")]
    MissingPrice { asset: String, date: NaiveDate },

    #[error("no weights stored for portfolio '{portfolio}' on {date}")]
    MissingWeights { portfolio: String, date: NaiveDate },

    #[error("portfolio value is zero on {date}, weights are undefined")]
    ZeroPortfolioValue { date: NaiveDate },

    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("io error")]
    Io(#[from] std::io::Error),
}

impl FolioError {
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        FolioError::NotFound {
            kind,
            name: name.into(),
        }
    }
}

/// Result type alias for portfolio operations
pub type Result<T> = std::result::Result<T, FolioError>;
