//! Stripe REST response payloads (the fields this service reads).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeCustomer {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeCard {
    pub last4: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripePaymentMethod {
    pub id: String,
    pub card: Option<StripeCard>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripePaymentMethodList {
    pub data: Vec<StripePaymentMethod>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripePaymentIntent {
    pub id: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeTransfer {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripePayout {
    pub id: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeBalanceEntry {
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeBalance {
    pub available: Vec<StripeBalanceEntry>,
    pub pending: Vec<StripeBalanceEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeRequirements {
    #[serde(default)]
    pub currently_due: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeAccount {
    pub id: String,
    #[serde(default)]
    pub payouts_enabled: bool,
    pub requirements: Option<StripeRequirements>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeErrorDetail {
    pub message: Option<String>,
    #[serde(rename = "type")]
    pub error_type: Option<String>,
    pub code: Option<String>,
    pub decline_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeErrorBody {
    pub error: StripeErrorDetail,
}
