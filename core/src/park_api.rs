//! The park's HTTP surface.
//!
//! Every handler is one `Economy` call. Rejections come back as JSON
//! `{ "error": ... }` with the status from `ParkError::status_code`.

use crate::{
    economy::Economy,
    error::{ParkError, ParkResult},
    state::AttractionRecord,
    wire::{
        AdmissionBody, AttractionListing, AttractionRef, BalanceBody, ParkStatus, RegisterBody,
        RegisterRequest, TransactionRequest,
    },
};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;

pub fn router(economy: Arc<Economy>) -> Router {
    Router::new()
        .route("/park-status", get(park_status))
        .route("/transaction", post(transaction))
        .route("/enter", post(enter))
        .route("/leave", post(leave))
        .route("/register", post(register))
        .route("/break", post(break_attraction))
        .route("/remove", post(remove))
        .route("/attractions", get(attractions))
        .with_state(economy)
}

/// Every malformed body is a 400, whatever axum's rejection says.
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> ParkResult<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ParkError::BadRequest(rejection.body_text()))
}

async fn park_status(State(economy): State<Arc<Economy>>) -> ParkResult<Json<ParkStatus>> {
    Ok(Json(economy.status()?))
}

async fn transaction(
    State(economy): State<Arc<Economy>>,
    payload: Result<Json<TransactionRequest>, JsonRejection>,
) -> ParkResult<Json<BalanceBody>> {
    let req = body(payload)?;
    let money = economy.apply_transaction(req.amount)?;
    log::debug!("Transaction of ${:.2} applied, balance ${money:.2}", req.amount);
    Ok(Json(BalanceBody { money }))
}

async fn enter(State(economy): State<Arc<Economy>>) -> ParkResult<Json<AdmissionBody>> {
    let fee = economy.enter()?;
    Ok(Json(AdmissionBody { fee }))
}

async fn leave(State(economy): State<Arc<Economy>>) -> ParkResult<StatusCode> {
    economy.leave()?;
    Ok(StatusCode::OK)
}

async fn register(
    State(economy): State<Arc<Economy>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> ParkResult<Json<RegisterBody>> {
    let req = body(payload)?;
    let outcome = economy.register(&req)?;
    Ok(Json(RegisterBody { outcome }))
}

async fn break_attraction(
    State(economy): State<Arc<Economy>>,
    payload: Result<Json<AttractionRef>, JsonRejection>,
) -> ParkResult<StatusCode> {
    let req = body(payload)?;
    economy.mark_broken(&req.url)?;
    Ok(StatusCode::OK)
}

async fn remove(
    State(economy): State<Arc<Economy>>,
    payload: Result<Json<AttractionRef>, JsonRejection>,
) -> ParkResult<Json<AttractionRecord>> {
    let req = body(payload)?;
    Ok(Json(economy.remove(&req.url)?))
}

async fn attractions(State(economy): State<Arc<Economy>>) -> ParkResult<Json<Vec<AttractionListing>>> {
    let listings = economy
        .operational_attractions()?
        .into_iter()
        .map(|a| AttractionListing { url: a.id, size: a.footprint })
        .collect();
    Ok(Json(listings))
}
