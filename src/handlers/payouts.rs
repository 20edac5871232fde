use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use chrono::{Datelike, NaiveDate, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::schedule::end_of_month;
use crate::error::AppError;
use crate::AppState;

#[derive(Deserialize)]
pub struct Pagination {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn list_payouts(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
) -> Result<impl IntoResponse, AppError> {
    let limit = pagination.limit.unwrap_or(20);
    let offset = pagination.offset.unwrap_or(0);

    let payouts = state.payouts.list(limit, offset).await?;

    Ok(Json(payouts))
}

pub async fn get_payout(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let payout = state.payouts.get(id).await?;

    Ok(Json(payout))
}

#[derive(Deserialize)]
pub struct CloseMonthRequest {
    /// Closing month as "YYYY-MM"; defaults to the month that just ended.
    pub month: Option<String>,
}

fn parse_month(raw: &str) -> Result<NaiveDate, AppError> {
    let (year, month) = raw
        .split_once('-')
        .ok_or_else(|| AppError::BadRequest("month must be YYYY-MM".to_string()))?;
    let year: i32 = year
        .parse()
        .map_err(|_| AppError::BadRequest("month must be YYYY-MM".to_string()))?;
    let month: u32 = month
        .parse()
        .map_err(|_| AppError::BadRequest("month must be YYYY-MM".to_string()))?;
    if !(1..=12).contains(&month) {
        return Err(AppError::BadRequest("month out of range".to_string()));
    }
    Ok(end_of_month(year, month))
}

pub async fn close_month(
    State(state): State<AppState>,
    Json(request): Json<CloseMonthRequest>,
) -> Result<impl IntoResponse, AppError> {
    let period_end = match request.month.as_deref() {
        Some(raw) => parse_month(raw)?,
        None => {
            let today = Utc::now().date_naive();
            today
                .with_day(1)
                .and_then(|d| d.pred_opt())
                .unwrap_or(today)
        }
    };

    let report = state.payout_engine.close_monthly_period(period_end).await?;

    Ok(Json(report))
}

pub async fn run_due(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let report = state
        .payout_engine
        .process_due_payouts(Utc::now().date_naive())
        .await?;

    Ok(Json(report))
}

#[derive(Deserialize)]
pub struct InstantPayoutRequest {
    pub cast_id: Uuid,
    pub amount_yen: i64,
    pub memo: Option<String>,
}

pub async fn create_instant(
    State(state): State<AppState>,
    Json(request): Json<InstantPayoutRequest>,
) -> Result<impl IntoResponse, AppError> {
    let payout = state
        .payout_engine
        .create_instant_payout(
            request.cast_id,
            request.amount_yen,
            request.memo,
            Utc::now().date_naive(),
        )
        .await?;

    Ok(Json(payout))
}

pub async fn approve(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let payout = state.payout_engine.approve_instant(id).await?;
    Ok(Json(payout))
}

pub async fn reject(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let payout = state.payout_engine.reject_instant(id).await?;
    Ok(Json(payout))
}

pub async fn retry(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let payout = state.payout_engine.retry_payout(id).await?;
    Ok(Json(payout))
}

pub async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let payout = state.payout_engine.cancel_payout(id).await?;
    Ok(Json(payout))
}

pub async fn mark_paid(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let payout = state.payout_engine.finalize_payout(id, Utc::now()).await?;
    Ok(Json(payout))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_month() {
        let date = parse_month("2026-07").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2026, 7, 31).unwrap());
    }

    #[test]
    fn test_parse_month_rejects_garbage() {
        assert!(parse_month("202607").is_err());
        assert!(parse_month("2026-13").is_err());
        assert!(parse_month("x-y").is_err());
    }
}
