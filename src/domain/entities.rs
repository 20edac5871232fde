//! Domain entities for the point ledger and payout pipeline.

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ActorType {
    Guest,
    Cast,
}

impl ActorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorType::Guest => "guest",
            ActorType::Cast => "cast",
        }
    }
}

/// Typed ledger entry kinds. `transfer` and `gift` are the earnable kinds
/// that feed cast payouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum EntryType {
    Buy,
    Transfer,
    Gift,
    Pending,
    ExceededPending,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Buy => "buy",
            EntryType::Transfer => "transfer",
            EntryType::Gift => "gift",
            EntryType::Pending => "pending",
            EntryType::ExceededPending => "exceeded_pending",
        }
    }

    pub fn is_earnable(&self) -> bool {
        matches!(self, EntryType::Transfer | EntryType::Gift)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Canceled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Canceled => "canceled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum PayoutType {
    Scheduled,
    Instant,
}

impl PayoutType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutType::Scheduled => "scheduled",
            PayoutType::Instant => "instant",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum PayoutStatus {
    Scheduled,
    Pending,
    PendingApproval,
    Processing,
    Paid,
    Failed,
    Cancelled,
    Rejected,
}

impl PayoutStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutStatus::Scheduled => "scheduled",
            PayoutStatus::Pending => "pending",
            PayoutStatus::PendingApproval => "pending_approval",
            PayoutStatus::Processing => "processing",
            PayoutStatus::Paid => "paid",
            PayoutStatus::Failed => "failed",
            PayoutStatus::Cancelled => "cancelled",
            PayoutStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PayoutStatus::Paid | PayoutStatus::Cancelled | PayoutStatus::Rejected
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum Grade {
    Green,
    Orange,
    Bronze,
    Silver,
    Gold,
    Platinum,
    Centurion,
}

impl Grade {
    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::Green => "green",
            Grade::Orange => "orange",
            Grade::Bronze => "bronze",
            Grade::Silver => "silver",
            Grade::Gold => "gold",
            Grade::Platinum => "platinum",
            Grade::Centurion => "centurion",
        }
    }
}

/// Immutable ledger row. Exactly one owning side (guest or cast); transfer
/// rows carry both ids for provenance, the cast side owns them.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PointTransaction {
    pub id: Uuid,
    pub guest_id: Option<Uuid>,
    pub cast_id: Option<Uuid>,
    pub entry_type: EntryType,
    pub amount: i64,
    pub reservation_id: Option<Uuid>,
    pub payment_id: Option<Uuid>,
    pub cast_payout_id: Option<Uuid>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl PointTransaction {
    pub fn guest_entry(
        guest_id: Uuid,
        entry_type: EntryType,
        amount: i64,
        reservation_id: Option<Uuid>,
        payment_id: Option<Uuid>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            guest_id: Some(guest_id),
            cast_id: None,
            entry_type,
            amount,
            reservation_id,
            payment_id,
            cast_payout_id: None,
            description: description.into(),
            created_at: Utc::now(),
        }
    }

    pub fn cast_entry(
        cast_id: Uuid,
        guest_id: Option<Uuid>,
        entry_type: EntryType,
        amount: i64,
        reservation_id: Option<Uuid>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            guest_id,
            cast_id: Some(cast_id),
            entry_type,
            amount,
            reservation_id,
            payment_id: None,
            cast_payout_id: None,
            description: description.into(),
            created_at: Utc::now(),
        }
    }
}

/// One attempt to move money through the gateway. Status transitions are
/// monotonic: pending -> paid | failed | canceled.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub user_type: ActorType,
    pub amount_yen: i64,
    pub status: PaymentStatus,
    pub payment_method: Option<String>,
    pub is_automatic: bool,
    pub stripe_payment_intent_id: Option<String>,
    pub stripe_payout_id: Option<String>,
    pub stripe_connect_account_id: Option<String>,
    pub reservation_id: Option<Uuid>,
    pub cast_payout_id: Option<Uuid>,
    pub metadata: serde_json::Value,
    pub expires_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn automatic(
        guest_id: Uuid,
        amount_yen: i64,
        reservation_id: Option<Uuid>,
        metadata: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: guest_id,
            user_type: ActorType::Guest,
            amount_yen,
            status: PaymentStatus::Pending,
            payment_method: None,
            is_automatic: true,
            stripe_payment_intent_id: None,
            stripe_payout_id: None,
            stripe_connect_account_id: None,
            reservation_id,
            cast_payout_id: None,
            metadata,
            expires_at: None,
            paid_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn disbursement(
        cast_id: Uuid,
        amount_yen: i64,
        cast_payout_id: Uuid,
        connect_account_id: String,
        transfer_id: String,
        payout_id: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: cast_id,
            user_type: ActorType::Cast,
            amount_yen,
            status: PaymentStatus::Pending,
            payment_method: None,
            is_automatic: false,
            stripe_payment_intent_id: None,
            stripe_payout_id: Some(payout_id),
            stripe_connect_account_id: Some(connect_account_id),
            reservation_id: None,
            cast_payout_id: Some(cast_payout_id),
            metadata: json!({ "stripe_transfer_id": transfer_id }),
            expires_at: None,
            paid_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Aggregation of a cast's earnable ledger rows into one payable unit.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CastPayout {
    pub id: Uuid,
    pub cast_id: Uuid,
    pub payout_type: PayoutType,
    pub closing_month: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub total_points: i64,
    pub conversion_rate: BigDecimal,
    pub gross_amount_yen: i64,
    pub fee_rate: BigDecimal,
    pub fee_amount_yen: i64,
    pub net_amount_yen: i64,
    pub transaction_count: i32,
    pub scheduled_payout_date: NaiveDate,
    pub status: PayoutStatus,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Guest {
    pub id: Uuid,
    pub points: i64,
    pub grade: Grade,
    pub grade_points: i64,
    pub grade_updated_at: Option<DateTime<Utc>>,
    pub stripe_customer_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Cast {
    pub id: Uuid,
    pub points: i64,
    pub grade: Grade,
    pub stripe_connect_account_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
