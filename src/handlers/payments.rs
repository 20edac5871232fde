use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::error::AppError;
use crate::services::ChargeInput;
use crate::AppState;

pub async fn get_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let payment = state.payments.get(id).await?;

    Ok(Json(payment))
}

#[derive(Deserialize)]
pub struct AutomaticChargeRequest {
    pub guest_id: Uuid,
    pub required_points: i64,
    pub reservation_id: Option<Uuid>,
    pub cast_id: Option<Uuid>,
    pub description: String,
    /// true = reservation-creation flow (unconfirmed intent, captured by the
    /// sweep); false = mid-reservation overage.
    #[serde(default)]
    pub deferred: bool,
}

pub async fn automatic_charge(
    State(state): State<AppState>,
    Json(request): Json<AutomaticChargeRequest>,
) -> Result<impl IntoResponse, AppError> {
    let input = ChargeInput {
        guest_id: request.guest_id,
        required_points: request.required_points,
        reservation_id: request.reservation_id,
        cast_id: request.cast_id,
        description: request.description,
    };

    let outcome = if request.deferred {
        state
            .automatic_payments
            .charge_with_pending(input, Utc::now())
            .await?
    } else {
        state
            .automatic_payments
            .charge_for_shortfall(input, Utc::now())
            .await?
    };

    Ok(Json(outcome))
}

pub async fn capture_sweep(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let report = state
        .automatic_payments
        .process_pending_captures(Utc::now())
        .await?;

    Ok(Json(report))
}

#[derive(Deserialize)]
pub struct RegisterCustomerRequest {
    pub email: String,
}

pub async fn register_customer(
    State(state): State<AppState>,
    Path(guest_id): Path<Uuid>,
    Json(request): Json<RegisterCustomerRequest>,
) -> Result<impl IntoResponse, AppError> {
    // Make sure the guest exists before creating anything at the gateway.
    state.accounts.guest(guest_id).await?;

    let customer_id = state
        .gateway
        .create_customer(&request.email)
        .await
        .map_err(|e| AppError::Gateway(e.to_string()))?;

    state
        .accounts
        .set_guest_customer(guest_id, &customer_id)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "guest_id": guest_id, "customer_id": customer_id })),
    ))
}

/// Operator check before retrying payouts that failed on platform balance.
pub async fn platform_balance(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let balance = state
        .gateway
        .platform_balance("jpy")
        .await
        .map_err(|e| AppError::Gateway(e.to_string()))?;

    Ok(Json(json!({
        "available_yen": balance.available_yen,
        "pending_yen": balance.pending_yen,
    })))
}

pub async fn cast_balance(
    State(state): State<AppState>,
    Path(cast_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let cast = state.accounts.cast(cast_id).await?;
    let unsettled = state.ledger.unsettled_balance(cast_id).await?;

    Ok(Json(json!({
        "cast_id": cast_id,
        "points": cast.points,
        "unsettled_points": unsettled,
    })))
}

pub async fn recompute_grade(
    State(state): State<AppState>,
    Path(guest_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = state.grades.recompute(guest_id).await?;

    Ok(Json(outcome))
}
