//! Service boundaries: persistence, the payment gateway, and notification
//! delivery. Engines depend on these traits only, so they can run against
//! Postgres in production and in-memory fakes in tests.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{
    ActorType, Cast, CastPayout, Grade, Guest, Payment, PaymentStatus, PayoutStatus,
    PointTransaction,
};

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("not found: {0}")]
    NotFound(String),

    /// A concurrent writer got there first (claimed a row, moved a status).
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Append-only point ledger. Rows are immutable apart from the claim link
/// and description relabeling; balances are always derived sums.
///
/// The `record_*`/`revoke_*` methods are documented atomic units: the
/// Postgres adapter runs each inside a single transaction, and any error
/// rolls the whole unit back.
#[async_trait]
pub trait LedgerRepository: Send + Sync {
    async fn insert(&self, entry: &PointTransaction) -> RepositoryResult<PointTransaction>;

    /// Sum of unclaimed earnable (transfer/gift) amounts for a cast.
    async fn unsettled_balance(&self, cast_id: Uuid) -> RepositoryResult<i64>;

    /// Unclaimed earnable rows for a cast, oldest first.
    async fn unclaimed_earnable(&self, cast_id: Uuid) -> RepositoryResult<Vec<PointTransaction>>;

    /// Unclaimed earnable rows created within `[start, end]`, oldest first.
    async fn unclaimed_earnable_between(
        &self,
        cast_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> RepositoryResult<Vec<PointTransaction>>;

    /// Distinct casts holding unclaimed earnable rows within `[start, end]`.
    async fn casts_with_unclaimed_earnings(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> RepositoryResult<Vec<Uuid>>;

    /// Lifetime buy-point sum for a guest (grade input).
    async fn sum_buy_points(&self, guest_id: Uuid) -> RepositoryResult<i64>;

    async fn claimed_by(&self, payout_id: Uuid) -> RepositoryResult<Vec<PointTransaction>>;

    /// Atomic: insert a `+points` buy row and a `-points` exceeded_pending
    /// row for the payment, and credit the guest's spendable balance.
    async fn record_automatic_purchase(
        &self,
        guest_id: Uuid,
        payment_id: Uuid,
        points: i64,
        reservation_id: Option<Uuid>,
        description: &str,
    ) -> RepositoryResult<()>;

    /// Atomic: take the credited points back off the guest's balance and
    /// relabel the payment's ledger rows. Used when a deferred capture fails.
    async fn revoke_automatic_purchase(
        &self,
        payment_id: Uuid,
        description: &str,
    ) -> RepositoryResult<()>;

    async fn relabel_payment_entries(
        &self,
        payment_id: Uuid,
        description: &str,
    ) -> RepositoryResult<()>;
}

/// Payout persistence. Claiming and releasing ledger rows happens inside the
/// same transaction as the payout status change.
#[async_trait]
pub trait PayoutRepository: Send + Sync {
    /// Atomic: lock the candidate rows (`FOR UPDATE`), verify every one is
    /// still unclaimed, insert the payout, and claim the rows. Returns
    /// `Conflict` when a concurrent payout claimed any candidate or an open
    /// scheduled payout already exists for the cast and month.
    async fn create_claiming(
        &self,
        payout: &CastPayout,
        entry_ids: &[Uuid],
    ) -> RepositoryResult<CastPayout>;

    async fn get(&self, id: Uuid) -> RepositoryResult<CastPayout>;

    async fn list(&self, limit: i64, offset: i64) -> RepositoryResult<Vec<CastPayout>>;

    /// Scheduled/pending payouts due on or before `run_date`.
    async fn due(&self, run_date: NaiveDate) -> RepositoryResult<Vec<CastPayout>>;

    async fn exists_open_scheduled(
        &self,
        cast_id: Uuid,
        closing_month: &str,
    ) -> RepositoryResult<bool>;

    /// Compare-and-set status transition. Returns false when the payout was
    /// not in any of the expected states; that is the idempotency gate.
    async fn transition(
        &self,
        id: Uuid,
        from: &[PayoutStatus],
        to: PayoutStatus,
    ) -> RepositoryResult<bool>;

    /// Shallow-merge a JSON patch into the payout metadata.
    async fn merge_metadata(&self, id: Uuid, patch: serde_json::Value) -> RepositoryResult<()>;

    /// Atomic: move the payout to `to` (only from one of `from`) and release
    /// every claimed ledger row back to unclaimed. Returns false when the
    /// payout was not in an expected state.
    async fn release_claims(
        &self,
        id: Uuid,
        from: &[PayoutStatus],
        to: PayoutStatus,
    ) -> RepositoryResult<bool>;
}

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn insert(&self, payment: &Payment) -> RepositoryResult<Payment>;

    async fn get(&self, id: Uuid) -> RepositoryResult<Payment>;

    async fn find_by_intent(&self, intent_id: &str) -> RepositoryResult<Option<Payment>>;

    async fn find_by_provider_payout(&self, payout_id: &str) -> RepositoryResult<Option<Payment>>;

    async fn find_by_cast_payout(&self, cast_payout_id: Uuid)
        -> RepositoryResult<Option<Payment>>;

    /// Compare-and-set status transition; the only gate against double
    /// processing of gateway callbacks and capture sweeps.
    async fn transition(
        &self,
        id: Uuid,
        from: &[PaymentStatus],
        to: PaymentStatus,
        paid_at: Option<DateTime<Utc>>,
    ) -> RepositoryResult<bool>;

    async fn merge_metadata(&self, id: Uuid, patch: serde_json::Value) -> RepositoryResult<()>;

    /// Record a successful authorization: intent id, charged card, and the
    /// deferred-capture deadline.
    async fn attach_authorization(
        &self,
        id: Uuid,
        intent_id: &str,
        card_last4: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> RepositoryResult<()>;

    /// Pending automatic payments whose capture deadline has passed.
    async fn due_for_capture(&self, now: DateTime<Utc>) -> RepositoryResult<Vec<Payment>>;
}

#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn guest(&self, id: Uuid) -> RepositoryResult<Guest>;

    async fn cast(&self, id: Uuid) -> RepositoryResult<Cast>;

    async fn credit_guest_points(&self, id: Uuid, delta: i64) -> RepositoryResult<()>;

    async fn debit_cast_points(&self, id: Uuid, points: i64) -> RepositoryResult<()>;

    async fn update_guest_grade(
        &self,
        id: Uuid,
        grade: Grade,
        grade_points: i64,
        changed: bool,
    ) -> RepositoryResult<()>;

    async fn set_guest_customer(&self, id: Uuid, customer_id: &str) -> RepositoryResult<()>;
}

// --- Payment gateway ---

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("card declined: {0}")]
    CardDeclined(String),

    #[error("insufficient platform balance: {0}")]
    InsufficientBalance(String),

    #[error("connected account not ready: {0}")]
    AccountNotReady(String),

    #[error("gateway request failed: {0}")]
    Request(String),

    #[error("gateway circuit breaker open")]
    CircuitOpen,
}

impl GatewayError {
    pub fn is_insufficient_balance(&self) -> bool {
        matches!(self, GatewayError::InsufficientBalance(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentMethodInfo {
    pub id: String,
    pub card_last4: String,
}

#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub customer_id: String,
    pub payment_method_id: String,
    pub amount_yen: i64,
    pub currency: String,
    /// false = create the intent unconfirmed; confirmation happens at
    /// capture time (reservation-creation flow).
    pub confirm: bool,
    pub description: String,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct ChargeAuthorization {
    pub charge_id: String,
}

#[derive(Debug, Clone)]
pub struct TransferRef {
    pub id: String,
}

#[derive(Debug, Clone)]
pub struct PayoutRef {
    pub id: String,
    pub status: String,
}

#[derive(Debug, Clone)]
pub struct BalanceInfo {
    pub available_yen: i64,
    pub pending_yen: i64,
}

#[derive(Debug, Clone)]
pub struct ConnectedAccountStatus {
    pub payouts_enabled: bool,
    pub requirements_due: Vec<String>,
}

/// Abstract payment processor. All charges are authorize-only (manual
/// capture); payouts are the two-step transfer-then-payout movement.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_customer(&self, email: &str) -> Result<String, GatewayError>;

    /// Registered payment methods in the customer's listed order.
    async fn list_payment_methods(
        &self,
        customer_id: &str,
    ) -> Result<Vec<PaymentMethodInfo>, GatewayError>;

    async fn authorize_charge(
        &self,
        request: &ChargeRequest,
    ) -> Result<ChargeAuthorization, GatewayError>;

    async fn capture_charge(
        &self,
        charge_id: &str,
        amount_yen: Option<i64>,
    ) -> Result<(), GatewayError>;

    async fn create_transfer(
        &self,
        destination_account_id: &str,
        amount_yen: i64,
        currency: &str,
        metadata: &serde_json::Value,
    ) -> Result<TransferRef, GatewayError>;

    async fn create_payout(
        &self,
        connected_account_id: &str,
        amount_yen: i64,
        currency: &str,
        metadata: &serde_json::Value,
    ) -> Result<PayoutRef, GatewayError>;

    async fn platform_balance(&self, currency: &str) -> Result<BalanceInfo, GatewayError>;

    async fn connected_account_status(
        &self,
        account_id: &str,
    ) -> Result<ConnectedAccountStatus, GatewayError>;
}

// --- Notifications ---

#[derive(Error, Debug)]
#[error("notification delivery failed: {0}")]
pub struct NotifyError(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyCategory {
    AutoChargeFailed,
    AutoChargeCompleted,
    PayoutFailed,
    PayoutPaid,
    SystemMessage,
}

/// Fire-and-forget message delivery. Callers must treat failures as
/// non-fatal; delivery never affects the primary outcome.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        actor_id: Uuid,
        actor_type: ActorType,
        category: NotifyCategory,
        message: &str,
        context: serde_json::Value,
    ) -> Result<(), NotifyError>;
}
