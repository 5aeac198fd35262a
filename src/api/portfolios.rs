//! Read endpoints for portfolio metrics.
//!
//! Each handler performs one synchronous read-and-compute pass against
//! its own SQLite connection inside `spawn_blocking`.

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Deserialize;

use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::db::{self, Portfolio};
use crate::error::{FolioError, Result};
use crate::valuation::{self, InitialUnit, ValuePoint, WeightPoint};

/// Common query parameters of the series endpoints.
///
/// `start`/`end` are ISO dates defaulting to the portfolio's initial
/// date and the last stored price date. `include_trades` selects the
/// trade-adjusted quantity series; it is accepted on every endpoint for
/// surface uniformity even though initial units can never depend on
/// trades.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct SeriesQuery {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    #[serde(default)]
    pub include_trades: bool,
}

/// Resolve and validate the requested date range for a portfolio.
pub(crate) fn resolve_range(
    conn: &Connection,
    portfolio: &Portfolio,
    query: &SeriesQuery,
) -> Result<(NaiveDate, NaiveDate)> {
    let last = db::last_price_date(conn)?.ok_or_else(|| {
        FolioError::InvalidRequest("no prices stored; run an import first".into())
    })?;

    // Dates before the initial date have no defined holdings
    let start = query
        .start
        .unwrap_or(portfolio.initial_date)
        .max(portfolio.initial_date);
    let end = query.end.unwrap_or(last);

    if end > last {
        return Err(FolioError::InvalidRequest(format!(
            "end {} is after the last stored price date {}",
            end, last
        )));
    }
    if start > end {
        return Err(FolioError::InvalidRequest(format!(
            "start {} is after end {}",
            start, end
        )));
    }

    Ok((start, end))
}

pub(crate) fn load_portfolio(conn: &Connection, id: i64) -> Result<Portfolio> {
    db::get_portfolio(conn, id)?
        .ok_or_else(|| FolioError::not_found("portfolio", id.to_string()))
}

/// Run a blocking read-and-compute pass on its own connection.
pub(crate) async fn with_conn<T, F>(state: AppState, f: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce(&Connection) -> Result<T> + Send + 'static,
{
    let result = tokio::task::spawn_blocking(move || {
        let conn = db::open_db(Some(state.db_path))?;
        f(&conn)
    })
    .await
    .map_err(|e| ApiError::internal(format!("computation task failed: {}", e)))?;
    result.map_err(ApiError::from)
}

async fn list_portfolios(State(state): State<AppState>) -> ApiResult<Json<Vec<Portfolio>>> {
    let portfolios = with_conn(state, db::list_portfolios).await?;
    Ok(Json(portfolios))
}

async fn initial_units(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<SeriesQuery>,
) -> ApiResult<Json<Vec<InitialUnit>>> {
    let units = with_conn(state, move |conn| {
        let portfolio = load_portfolio(conn, id)?;
        let (start, end) = resolve_range(conn, &portfolio, &query)?;
        let inputs = valuation::load_inputs(conn, &portfolio, start, end)?;
        valuation::initial_units(&inputs)
    })
    .await?;
    Ok(Json(units))
}

async fn value_series(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<SeriesQuery>,
) -> ApiResult<Json<Vec<ValuePoint>>> {
    let series = with_conn(state, move |conn| {
        let portfolio = load_portfolio(conn, id)?;
        let (start, end) = resolve_range(conn, &portfolio, &query)?;
        let inputs = valuation::load_inputs(conn, &portfolio, start, end)?;
        valuation::value_series(&inputs, query.include_trades)
    })
    .await?;
    Ok(Json(series))
}

async fn weight_series(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<SeriesQuery>,
) -> ApiResult<Json<Vec<WeightPoint>>> {
    let series = with_conn(state, move |conn| {
        let portfolio = load_portfolio(conn, id)?;
        let (start, end) = resolve_range(conn, &portfolio, &query)?;
        let inputs = valuation::load_inputs(conn, &portfolio, start, end)?;
        valuation::weight_series(&inputs, query.include_trades)
    })
    .await?;
    Ok(Json(series))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/portfolios", get(list_portfolios))
        .route("/api/portfolios/{id}/initial-units", get(initial_units))
        .route("/api/portfolios/{id}/value-series", get(value_series))
        .route("/api/portfolios/{id}/weight-series", get(weight_series))
}
