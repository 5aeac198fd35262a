//! HTTP surface tests driving the router directly with `oneshot`.


use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::NaiveDate;
use folio::api::{app_router, AppState};
use folio::db;
use folio::importers::{self, ImportOptions};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2022, 2, d).unwrap()
}

// Decimals serialize as strings; compare numerically so trailing
// zeros from intermediate scales never matter.
fn decimal(value: &Value) -> rust_decimal::Decimal {
    value.as_str().expect("decimal field").parse().unwrap()
}

fn setup_app() -> (TempDir, Router, i64) {
    let dir = TempDir::new().expect("failed to create temp dir");
    let db_path = dir.path().join("data.db");
    db::init_database(Some(db_path.clone())).expect("init db");

    let workbook = dir.path().join("portfolio.xlsx");
    xlsx_fixtures::write_basic_workbook(&workbook);
    let options = ImportOptions {
        portfolio: "Portfolio 1".to_string(),
        initial_date: day(15),
        notional: dec!(1000),
        weights_sheet: "weights".to_string(),
        prices_sheet: "prices".to_string(),
    };
    let parsed = importers::parse_workbook(&workbook, &options).expect("parse");
    let mut conn = db::open_db(Some(db_path.clone())).expect("open db");
    let summary = importers::import_workbook(&mut conn, &parsed, &options).expect("import");

    let app = app_router(AppState::new(db_path));
    (dir, app, summary.portfolio_id)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn health_reports_ok() {
    let (_dir, app, _id) = setup_app();
    let (status, body) = get(&app, "/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn portfolios_are_listed() {
    let (_dir, app, _id) = setup_app();
    let (status, body) = get(&app, "/api/portfolios").await;
    assert_eq!(status, StatusCode::OK);
    let list = body.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["name"], "Portfolio 1");
}

#[tokio::test]
async fn initial_units_are_served_as_json() {
    let (_dir, app, id) = setup_app();
    let (status, body) = get(&app, &format!("/api/portfolios/{id}/initial-units")).await;
    assert_eq!(status, StatusCode::OK);
    let units = body.as_array().unwrap();
    assert_eq!(units.len(), 2);
    assert_eq!(units[0]["asset"], "A");
    assert_eq!(decimal(&units[0]["units"]), dec!(60));
    assert_eq!(units[1]["asset"], "B");
    assert_eq!(decimal(&units[1]["units"]), dec!(20));
}

#[tokio::test]
async fn value_series_reflects_trades_only_when_asked() {
    let (_dir, app, id) = setup_app();

    let (status, created) = post_json(
        &app,
        &format!("/api/portfolios/{id}/trades"),
        json!({ "asset": "A", "date": "2022-02-16", "side": "buy", "units": "5" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(decimal(&created["delta_units"]), dec!(5));

    let (status, plain) = get(&app, &format!("/api/portfolios/{id}/value-series")).await;
    assert_eq!(status, StatusCode::OK);
    let (status, traded) = get(
        &app,
        &format!("/api/portfolios/{id}/value-series?include_trades=true"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(decimal(&plain[1]["value"]), dec!(1100));
    assert_eq!(decimal(&traded[1]["value"]), dec!(1160));
    assert_eq!(decimal(&plain[0]["value"]), decimal(&traded[0]["value"]));
}

#[tokio::test]
async fn weight_series_rows_carry_per_asset_weights() {
    let (_dir, app, id) = setup_app();
    let (status, body) = get(
        &app,
        &format!("/api/portfolios/{id}/weight-series?start=2022-02-15&end=2022-02-15"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["date"], "2022-02-15");
    assert_eq!(decimal(&rows[0]["weights"]["A"]), dec!(0.6));
    assert_eq!(decimal(&rows[0]["weights"]["B"]), dec!(0.4));
}

#[tokio::test]
async fn unknown_portfolio_is_404() {
    let (_dir, app, _id) = setup_app();
    let (status, body) = get(&app, "/api/portfolios/999/initial-units").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn end_past_last_price_date_is_400() {
    let (_dir, app, id) = setup_app();
    let (status, body) = get(
        &app,
        &format!("/api/portfolios/{id}/value-series?end=2022-03-01"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_REQUEST");
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("last stored price date"));
}

#[tokio::test]
async fn trade_requires_exactly_one_amount() {
    let (_dir, app, id) = setup_app();

    let (status, body) = post_json(
        &app,
        &format!("/api/portfolios/{id}/trades"),
        json!({ "asset": "A", "date": "2022-02-16", "side": "buy" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_REQUEST");

    let (status, _) = post_json(
        &app,
        &format!("/api/portfolios/{id}/trades"),
        json!({
            "asset": "A",
            "date": "2022-02-16",
            "side": "buy",
            "units": "5",
            "notional": "60"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn trade_for_unknown_asset_is_404() {
    let (_dir, app, id) = setup_app();
    let (status, body) = post_json(
        &app,
        &format!("/api/portfolios/{id}/trades"),
        json!({ "asset": "Z", "date": "2022-02-16", "side": "buy", "units": "5" }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn zero_portfolio_value_is_422() {
    let (dir, app, id) = setup_app();

    // Force V to zero on the 16th by zeroing both prices directly
    let conn = db::open_db(Some(dir.path().join("data.db"))).expect("open db");
    let a = db::get_asset_by_name(&conn, "A").unwrap().unwrap();
    let b = db::get_asset_by_name(&conn, "B").unwrap().unwrap();
    db::upsert_price(&conn, a.id.unwrap(), day(16), dec!(0)).unwrap();
    db::upsert_price(&conn, b.id.unwrap(), day(16), dec!(0)).unwrap();

    let (status, body) = get(&app, &format!("/api/portfolios/{id}/weight-series")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "ZERO_PORTFOLIO_VALUE");
    assert!(body["message"].as_str().unwrap().contains("2022-02-16"));
}

#[tokio::test]
async fn charts_page_renders_portfolio_html() {
    let (_dir, app, id) = setup_app();
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/portfolios/{id}/charts"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let html = String::from_utf8(body.to_vec()).unwrap();
    assert!(html.contains("Portfolio 1"), "portfolio name in page");
    assert!(html.contains("canvas"), "chart canvases in page");
    assert!(html.contains("2022-02-17"), "date labels in page");
}
