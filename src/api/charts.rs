//! Charted portfolio page.
//!
//! Renders a self-contained HTML page plotting the value and weight
//! series for one portfolio. Series data is computed server-side and
//! embedded as JSON; Chart.js does the drawing in the browser.

use axum::{
    extract::{Path, Query, State},
    response::Html,
    routing::get,
    Router,
};
use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;
use std::collections::BTreeMap;

use crate::api::error::ApiResult;
use crate::api::portfolios::{load_portfolio, resolve_range, with_conn, SeriesQuery};
use crate::api::state::AppState;
use crate::valuation::{self, ValuePoint, WeightPoint};

const CHARTS_TEMPLATE: &str = include_str!("charts.html");

/// Charts default to the trade-adjusted series, unlike the JSON
/// endpoints where the flag defaults off.
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChartsQuery {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    #[serde(default = "default_true")]
    pub include_trades: bool,
}

struct ChartData {
    portfolio_name: String,
    include_trades: bool,
    values: Vec<ValuePoint>,
    weights: Vec<WeightPoint>,
}

async fn charts_page(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<ChartsQuery>,
) -> ApiResult<Html<String>> {
    let series_query = SeriesQuery {
        start: query.start,
        end: query.end,
        include_trades: query.include_trades,
    };

    let data = with_conn(state, move |conn| {
        let portfolio = load_portfolio(conn, id)?;
        let (start, end) = resolve_range(conn, &portfolio, &series_query)?;
        let inputs = valuation::load_inputs(conn, &portfolio, start, end)?;
        Ok(ChartData {
            portfolio_name: portfolio.name.clone(),
            include_trades: series_query.include_trades,
            values: valuation::value_series(&inputs, series_query.include_trades)?,
            weights: valuation::weight_series(&inputs, series_query.include_trades)?,
        })
    })
    .await?;

    Ok(Html(render_charts(&data)))
}

/// Substitute computed series into the embedded template.
///
/// Decimals drop to f64 here; the page is for display, the JSON
/// endpoints keep full precision.
fn render_charts(data: &ChartData) -> String {
    let dates: Vec<String> = data.values.iter().map(|p| p.date.to_string()).collect();
    let values: Vec<f64> = data
        .values
        .iter()
        .map(|p| p.value.to_f64().unwrap_or(0.0))
        .collect();

    let asset_names: Vec<&String> = data
        .weights
        .first()
        .map(|point| point.weights.keys().collect())
        .unwrap_or_default();
    let mut weight_lines: BTreeMap<&String, Vec<f64>> = BTreeMap::new();
    for name in asset_names {
        let line = data
            .weights
            .iter()
            .map(|point| {
                point
                    .weights
                    .get(name)
                    .and_then(|w| w.to_f64())
                    .unwrap_or(0.0)
            })
            .collect();
        weight_lines.insert(name, line);
    }

    let mode = if data.include_trades {
        "with trades"
    } else {
        "without trades"
    };

    CHARTS_TEMPLATE
        .replace("__PORTFOLIO__", &html_escape(&data.portfolio_name))
        .replace("__MODE__", mode)
        .replace(
            "__DATES__",
            &serde_json::to_string(&dates).unwrap_or_else(|_| "[]".into()),
        )
        .replace(
            "__VALUES__",
            &serde_json::to_string(&values).unwrap_or_else(|_| "[]".into()),
        )
        .replace(
            "__WEIGHTS__",
            &serde_json::to_string(&weight_lines).unwrap_or_else(|_| "{}".into()),
        )
}

fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub fn router() -> Router<AppState> {
    Router::new().route("/portfolios/{id}/charts", get(charts_page))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_render_embeds_series_data() {
        let date = NaiveDate::from_ymd_opt(2022, 2, 15).unwrap();
        let data = ChartData {
            portfolio_name: "P1".to_string(),
            include_trades: true,
            values: vec![ValuePoint {
                date,
                value: dec!(1000.00),
            }],
            weights: vec![WeightPoint {
                date,
                weights: BTreeMap::from([
                    ("A".to_string(), dec!(0.6)),
                    ("B".to_string(), dec!(0.4)),
                ]),
            }],
        };

        let html = render_charts(&data);
        assert!(html.contains("P1"));
        assert!(html.contains("2022-02-15"));
        assert!(html.contains("1000"));
        assert!(html.contains("with trades"));
        assert!(!html.contains("__DATES__"));
    }

    #[test]
    fn test_portfolio_name_is_escaped() {
        let data = ChartData {
            portfolio_name: "<script>".to_string(),
            include_trades: false,
            values: Vec::new(),
            weights: Vec::new(),
        };
        let html = render_charts(&data);
        assert!(!html.contains("<script>alert"));
        assert!(html.contains("&lt;script&gt;"));
    }
}
