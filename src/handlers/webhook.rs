//! Gateway webhook: capture confirmations and payout settlement events.
//!
//! The raw body is authenticated with an HMAC-SHA256 signature before any
//! parsing. Duplicate deliveries are harmless: every state change behind
//! these events is a compare-and-set, so a replay finds nothing to do.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;

use crate::error::AppError;
use crate::AppState;

pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

type HmacSha256 = Hmac<Sha256>;

pub fn sign(secret: &str, body: &[u8]) -> String {
    // HMAC accepts keys of any length; this cannot fail.
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

fn verify_signature(secret: &str, body: &[u8], provided_hex: &str) -> bool {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(body);

    let provided = match hex::decode(provided_hex) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };

    mac.verify_slice(&provided).is_ok()
}

#[derive(Debug, Deserialize)]
struct WebhookEvent {
    #[serde(rename = "type")]
    event_type: String,
    data: WebhookData,
}

#[derive(Debug, Deserialize)]
struct WebhookData {
    object: WebhookObject,
}

#[derive(Debug, Deserialize)]
struct WebhookObject {
    id: String,
    #[serde(default)]
    failure_message: Option<String>,
}

pub async fn callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("missing webhook signature".to_string()))?;

    if !verify_signature(&state.webhook_secret, &body, signature) {
        return Err(AppError::Unauthorized("invalid webhook signature".to_string()));
    }

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("malformed event payload: {}", e)))?;

    let handled = match event.event_type.as_str() {
        "payment_intent.succeeded" => {
            match state.payments.find_by_intent(&event.data.object.id).await? {
                Some(payment) => {
                    state
                        .automatic_payments
                        .mark_captured(&payment, Utc::now())
                        .await?
                }
                None => false,
            }
        }
        "payment_intent.payment_failed" => {
            match state.payments.find_by_intent(&event.data.object.id).await? {
                Some(payment) => {
                    let reason = event
                        .data
                        .object
                        .failure_message
                        .unwrap_or_else(|| "payment failed at gateway".to_string());
                    state
                        .automatic_payments
                        .mark_capture_failed(&payment, &reason)
                        .await?
                }
                None => false,
            }
        }
        "payout.paid" => {
            match state
                .payments
                .find_by_provider_payout(&event.data.object.id)
                .await?
            {
                Some(payment) => match payment.cast_payout_id {
                    Some(payout_id) => {
                        match state.payout_engine.finalize_payout(payout_id, Utc::now()).await {
                            Ok(_) => true,
                            // Already finalized by an operator or an earlier
                            // delivery.
                            Err(AppError::Conflict(_)) => false,
                            Err(e) => return Err(e),
                        }
                    }
                    None => false,
                },
                None => false,
            }
        }
        "payout.failed" => {
            match state
                .payments
                .find_by_provider_payout(&event.data.object.id)
                .await?
            {
                Some(payment) => match payment.cast_payout_id {
                    Some(payout_id) => {
                        let reason = event
                            .data
                            .object
                            .failure_message
                            .unwrap_or_else(|| "payout failed at gateway".to_string());
                        state
                            .payout_engine
                            .mark_dispatch_failed(payout_id, &reason)
                            .await?
                    }
                    None => false,
                },
                None => false,
            }
        }
        other => {
            tracing::debug!(event_type = other, "ignoring webhook event");
            false
        }
    };

    Ok(Json(json!({ "received": true, "handled": handled })))
}
