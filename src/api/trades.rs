//! Trade recording endpoint.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::api::error::{ApiError, ApiResult};
use crate::api::portfolios::{load_portfolio, with_conn};
use crate::api::state::AppState;
use crate::db::{self, TradeAmount, TradeSide};

/// Trade submitted against a portfolio; exactly one of `units` and
/// `notional` must be set.
#[derive(Debug, Clone, Deserialize)]
pub struct TradeRequest {
    pub asset: String,
    pub date: NaiveDate,
    pub side: TradeSide,
    pub units: Option<Decimal>,
    pub notional: Option<Decimal>,
}

#[derive(Debug, Serialize)]
pub struct TradeResponse {
    pub id: Option<i64>,
    pub asset: String,
    pub date: NaiveDate,
    pub side: TradeSide,
    pub delta_units: Decimal,
}

async fn record_trade(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<TradeRequest>,
) -> ApiResult<(StatusCode, Json<TradeResponse>)> {
    let amount = match (request.units, request.notional) {
        (Some(units), None) => TradeAmount::Units(units),
        (None, Some(notional)) => TradeAmount::Notional(notional),
        _ => {
            return Err(ApiError::bad_request(
                "exactly one of 'units' and 'notional' must be provided",
            ))
        }
    };

    let asset = request.asset.clone();
    let trade = with_conn(state, move |conn| {
        let portfolio = load_portfolio(conn, id)?;
        db::record_trade(
            conn,
            portfolio.id.expect("portfolio loaded from db has id"),
            &request.asset,
            request.date,
            request.side,
            amount,
        )
    })
    .await?;

    let response = TradeResponse {
        id: trade.id,
        asset,
        date: trade.trade_date,
        side: trade.side,
        delta_units: trade.delta_units,
    };
    Ok((StatusCode::CREATED, Json(response)))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/portfolios/{id}/trades", post(record_trade))
}
