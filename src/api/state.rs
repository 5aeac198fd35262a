//! Shared application state for API handlers.

use std::path::PathBuf;

/// State injected into every handler via axum's State extractor.
///
/// Each request opens its own SQLite connection from `db_path` and runs
/// one synchronous read-and-compute pass, so no connection or cache is
/// shared across requests.
#[derive(Clone)]
pub struct AppState {
    pub db_path: PathBuf,
}

impl AppState {
    pub fn new(db_path: PathBuf) -> Self {
        Self { db_path }
    }
}
