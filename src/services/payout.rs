//! Cast payout engine: monthly closing, due-payout dispatch, and the
//! instant-payout path.

use bigdecimal::{BigDecimal, ToPrimitive};
use bigdecimal::rounding::RoundingMode;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::domain::conversion::{fee_amount, points_to_yen, yen_to_points};
use crate::domain::schedule::{closing_month_label, month_bounds, scheduled_payout_date};
use crate::domain::{
    ActorType, Cast, CastPayout, PaymentStatus, PayoutStatus, PayoutType, Payment,
    PointTransaction,
};
use crate::error::AppError;
use crate::ports::{
    AccountRepository, GatewayError, LedgerRepository, Notifier, NotifyCategory, PaymentGateway,
    PaymentRepository, PayoutRepository,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct MonthlyCloseReport {
    pub casts_seen: usize,
    pub payouts_created: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct DueSweepReport {
    pub dispatched: usize,
    pub parked: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    Dispatched { payment_id: Uuid },
    /// Connected account missing or unverified; the payout waits as
    /// `pending` with no retry storm.
    Parked,
    Failed { reason: String },
}

const PAYOUT_FAILED_CAST: &str =
    "Your payout could not be processed. Our team is looking into it.";
const PAYOUT_PAID_CAST: &str = "Your payout has been sent to your bank account.";

fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .unwrap_or_else(Utc::now)
}

fn day_end(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(23, 59, 59)
        .map(|dt| dt.and_utc())
        .unwrap_or_else(Utc::now)
}

pub struct CastPayoutService {
    ledger: Arc<dyn LedgerRepository>,
    payouts: Arc<dyn PayoutRepository>,
    payments: Arc<dyn PaymentRepository>,
    accounts: Arc<dyn AccountRepository>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
    config: EngineConfig,
}

impl CastPayoutService {
    pub fn new(
        ledger: Arc<dyn LedgerRepository>,
        payouts: Arc<dyn PayoutRepository>,
        payments: Arc<dyn PaymentRepository>,
        accounts: Arc<dyn AccountRepository>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
        config: EngineConfig,
    ) -> Self {
        Self {
            ledger,
            payouts,
            payments,
            accounts,
            gateway,
            notifier,
            config,
        }
    }

    /// Sweep the closed month into one scheduled payout per cast. Safe to
    /// re-run: casts whose month is already closed are skipped, and the
    /// claim step refuses rows another payout grabbed in between.
    pub async fn close_monthly_period(
        &self,
        period_end: NaiveDate,
    ) -> Result<MonthlyCloseReport, AppError> {
        let (period_start, period_end) = month_bounds(period_end);
        let label = closing_month_label(period_end);

        let cast_ids = self
            .ledger
            .casts_with_unclaimed_earnings(day_start(period_start), day_end(period_end))
            .await?;

        let mut report = MonthlyCloseReport {
            casts_seen: cast_ids.len(),
            payouts_created: 0,
        };

        for cast_id in cast_ids {
            match self
                .close_cast_month(cast_id, period_start, period_end, &label)
                .await
            {
                Ok(true) => report.payouts_created += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(cast_id = %cast_id, closing_month = %label, "monthly close failed for cast: {}", e);
                }
            }
        }

        tracing::info!(
            closing_month = %label,
            casts_seen = report.casts_seen,
            payouts_created = report.payouts_created,
            "monthly close finished"
        );

        Ok(report)
    }

    async fn close_cast_month(
        &self,
        cast_id: Uuid,
        period_start: NaiveDate,
        period_end: NaiveDate,
        label: &str,
    ) -> Result<bool, AppError> {
        if self.payouts.exists_open_scheduled(cast_id, label).await? {
            return Ok(false);
        }

        let rows = self
            .ledger
            .unclaimed_earnable_between(cast_id, day_start(period_start), day_end(period_end))
            .await?;

        let total_points: i64 = rows.iter().map(|r| r.amount).sum();
        if total_points <= 0 {
            return Ok(false);
        }

        let cast = self.accounts.cast(cast_id).await?;
        let fee_rate = self.config.scheduled_fees.rate_for(cast.grade).clone();
        let payout_date = scheduled_payout_date(
            period_end,
            self.config.payout_offset_months,
            self.config.business_day_adjustment,
        );

        let payout = self.build_payout(
            &cast,
            PayoutType::Scheduled,
            PayoutStatus::Scheduled,
            label.to_string(),
            period_start,
            period_end,
            payout_date,
            total_points,
            rows.len() as i32,
            fee_rate,
            json!({}),
        );

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        match self.payouts.create_claiming(&payout, &ids).await {
            Ok(saved) => {
                tracing::info!(
                    cast_id = %cast_id,
                    payout_id = %saved.id,
                    total_points,
                    net_amount_yen = saved.net_amount_yen,
                    "scheduled payout created"
                );
                Ok(true)
            }
            Err(crate::ports::RepositoryError::Conflict(reason)) => {
                tracing::warn!(cast_id = %cast_id, "skipping cast, rows contested: {}", reason);
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn build_payout(
        &self,
        cast: &Cast,
        payout_type: PayoutType,
        status: PayoutStatus,
        closing_month: String,
        period_start: NaiveDate,
        period_end: NaiveDate,
        payout_date: NaiveDate,
        total_points: i64,
        transaction_count: i32,
        fee_rate: BigDecimal,
        metadata: serde_json::Value,
    ) -> CastPayout {
        let gross = points_to_yen(total_points, &self.config.point_rate);
        let fee = fee_amount(gross, &fee_rate);
        let now = Utc::now();

        CastPayout {
            id: Uuid::new_v4(),
            cast_id: cast.id,
            payout_type,
            closing_month,
            period_start,
            period_end,
            total_points,
            conversion_rate: self.config.point_rate.clone(),
            gross_amount_yen: gross,
            fee_rate,
            fee_amount_yen: fee,
            net_amount_yen: gross - fee,
            transaction_count,
            scheduled_payout_date: payout_date,
            status,
            metadata,
            created_at: now,
            updated_at: now,
        }
    }

    /// Dispatch every scheduled/pending payout due by `run_date`.
    pub async fn process_due_payouts(&self, run_date: NaiveDate) -> Result<DueSweepReport, AppError> {
        let due = self.payouts.due(run_date).await?;
        let mut report = DueSweepReport::default();

        for payout in due {
            match self.prepare_and_dispatch(&payout).await {
                Ok(DispatchOutcome::Dispatched { .. }) => report.dispatched += 1,
                Ok(DispatchOutcome::Parked) => report.parked += 1,
                Ok(DispatchOutcome::Failed { .. }) => report.failed += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(payout_id = %payout.id, "payout dispatch errored: {}", e);
                }
            }
        }

        tracing::info!(
            run_date = %run_date,
            dispatched = report.dispatched,
            parked = report.parked,
            failed = report.failed,
            "due payout sweep finished"
        );

        Ok(report)
    }

    async fn prepare_and_dispatch(
        &self,
        payout: &CastPayout,
    ) -> Result<DispatchOutcome, AppError> {
        let cast = self.accounts.cast(payout.cast_id).await?;

        let account_id = match &cast.stripe_connect_account_id {
            Some(id) => id.clone(),
            None => {
                self.park(payout).await?;
                return Ok(DispatchOutcome::Parked);
            }
        };

        match self.gateway.connected_account_status(&account_id).await {
            Ok(status) if status.payouts_enabled => {}
            Ok(status) => {
                self.payouts
                    .merge_metadata(
                        payout.id,
                        json!({ "requirements_due": status.requirements_due }),
                    )
                    .await?;
                self.park(payout).await?;
                return Ok(DispatchOutcome::Parked);
            }
            Err(e) => {
                // Can't verify the account right now; wait, don't fail.
                tracing::warn!(payout_id = %payout.id, "account check unavailable: {}", e);
                self.park(payout).await?;
                return Ok(DispatchOutcome::Parked);
            }
        }

        let moved = self
            .payouts
            .transition(
                payout.id,
                &[PayoutStatus::Scheduled, PayoutStatus::Pending],
                PayoutStatus::Processing,
            )
            .await?;
        if !moved {
            // Someone else is already driving this payout.
            return Ok(DispatchOutcome::Parked);
        }

        self.dispatch(payout, &account_id).await
    }

    async fn park(&self, payout: &CastPayout) -> Result<(), AppError> {
        if payout.status != PayoutStatus::Pending {
            self.payouts
                .transition(payout.id, &[PayoutStatus::Scheduled], PayoutStatus::Pending)
                .await?;
        }
        Ok(())
    }

    /// Two-step money movement. The platform-to-account transfer is the
    /// expensive, hard-to-reverse step: its id is persisted before the bank
    /// payout is attempted, and a later failure keeps it in metadata for
    /// manual reconciliation.
    async fn dispatch(
        &self,
        payout: &CastPayout,
        account_id: &str,
    ) -> Result<DispatchOutcome, AppError> {
        let gateway_metadata = json!({
            "cast_payout_id": payout.id,
            "closing_month": payout.closing_month,
        });

        let transfer = match self
            .gateway
            .create_transfer(
                account_id,
                payout.net_amount_yen,
                &self.config.currency,
                &gateway_metadata,
            )
            .await
        {
            Ok(transfer) => transfer,
            Err(e) => {
                let reason = e.to_string();
                self.fail_dispatch(payout, &e).await?;
                return Ok(DispatchOutcome::Failed { reason });
            }
        };

        self.payouts
            .merge_metadata(payout.id, json!({ "stripe_transfer_id": transfer.id }))
            .await?;

        let payout_ref = match self
            .gateway
            .create_payout(
                account_id,
                payout.net_amount_yen,
                &self.config.currency,
                &gateway_metadata,
            )
            .await
        {
            Ok(payout_ref) => payout_ref,
            Err(e) => {
                // The transfer went through; its id stays in metadata and no
                // payment record is created for the broken attempt.
                let reason = e.to_string();
                self.fail_dispatch(payout, &e).await?;
                return Ok(DispatchOutcome::Failed { reason });
            }
        };

        let payment = self
            .payments
            .insert(&Payment::disbursement(
                payout.cast_id,
                payout.net_amount_yen,
                payout.id,
                account_id.to_string(),
                transfer.id,
                payout_ref.id.clone(),
            ))
            .await?;

        self.payouts
            .merge_metadata(
                payout.id,
                json!({ "stripe_payout_id": payout_ref.id, "payment_id": payment.id }),
            )
            .await?;

        tracing::info!(
            payout_id = %payout.id,
            payment_id = %payment.id,
            net_amount_yen = payout.net_amount_yen,
            "payout dispatched"
        );

        Ok(DispatchOutcome::Dispatched {
            payment_id: payment.id,
        })
    }

    async fn fail_dispatch(&self, payout: &CastPayout, error: &GatewayError) -> Result<(), AppError> {
        let kind = if error.is_insufficient_balance() {
            "insufficient_platform_balance"
        } else {
            "gateway_error"
        };

        if error.is_insufficient_balance() {
            tracing::error!(
                payout_id = %payout.id,
                net_amount_yen = payout.net_amount_yen,
                "payout blocked: platform balance insufficient, top up the gateway account"
            );
        }

        self.payouts
            .merge_metadata(
                payout.id,
                json!({ "dispatch_error": error.to_string(), "dispatch_error_kind": kind }),
            )
            .await?;
        self.payouts
            .transition(payout.id, &[PayoutStatus::Processing], PayoutStatus::Failed)
            .await?;

        self.notify_best_effort(
            payout.cast_id,
            NotifyCategory::PayoutFailed,
            PAYOUT_FAILED_CAST,
            json!({ "payout_id": payout.id }),
        )
        .await;

        Ok(())
    }

    /// On-demand payout against a capped share of the unsettled balance.
    /// Eligibility is checked before anything is written.
    pub async fn create_instant_payout(
        &self,
        cast_id: Uuid,
        amount_yen: i64,
        memo: Option<String>,
        today: NaiveDate,
    ) -> Result<CastPayout, AppError> {
        if amount_yen < self.config.instant_min_yen {
            return Err(AppError::Validation(format!(
                "instant payout amount must be at least {} yen",
                self.config.instant_min_yen
            )));
        }

        let unsettled = self.ledger.unsettled_balance(cast_id).await?;
        if unsettled < self.config.instant_min_points {
            return Err(AppError::Validation(format!(
                "at least {} unsettled points are required for an instant payout",
                self.config.instant_min_points
            )));
        }

        let cap_points = (BigDecimal::from(unsettled) * &self.config.instant_max_ratio)
            .with_scale_round(0, RoundingMode::Floor)
            .to_i64()
            .unwrap_or(0);
        let cap_yen = points_to_yen(cap_points, &self.config.point_rate);
        if amount_yen > cap_yen {
            return Err(AppError::Validation(format!(
                "instant payout amount exceeds the limit of {} yen",
                cap_yen
            )));
        }

        let cast = self.accounts.cast(cast_id).await?;
        let account_id = cast.stripe_connect_account_id.clone().ok_or_else(|| {
            AppError::Validation("payout account is not set up".to_string())
        })?;

        let required_points = yen_to_points(amount_yen, &self.config.point_rate);
        let rows = self.ledger.unclaimed_earnable(cast_id).await?;
        let consumed = select_rows_oldest_first(&rows, required_points);

        let total_points: i64 = consumed.iter().map(|r| r.amount).sum();
        if total_points < required_points {
            return Err(AppError::Validation(
                "unsettled points do not cover the requested amount".to_string(),
            ));
        }

        let needs_approval = amount_yen >= self.config.instant_approval_threshold_yen;
        let status = if needs_approval {
            PayoutStatus::PendingApproval
        } else {
            PayoutStatus::Processing
        };

        let period_start = consumed
            .first()
            .map(|r| r.created_at.date_naive())
            .unwrap_or(today);
        let period_end = consumed
            .last()
            .map(|r| r.created_at.date_naive())
            .unwrap_or(today);
        let fee_rate = self.config.instant_fees.rate_for(cast.grade).clone();

        let payout = self.build_payout(
            &cast,
            PayoutType::Instant,
            status,
            closing_month_label(today),
            period_start,
            period_end,
            today,
            total_points,
            consumed.len() as i32,
            fee_rate,
            json!({ "memo": memo, "requested_amount_yen": amount_yen }),
        );

        let ids: Vec<Uuid> = consumed.iter().map(|r| r.id).collect();
        let saved = self.payouts.create_claiming(&payout, &ids).await?;

        if needs_approval {
            tracing::info!(payout_id = %saved.id, "instant payout awaiting approval");
            return Ok(saved);
        }

        self.dispatch(&saved, &account_id).await?;
        Ok(self.payouts.get(saved.id).await?)
    }

    pub async fn approve_instant(&self, id: Uuid) -> Result<CastPayout, AppError> {
        let payout = self.payouts.get(id).await?;

        let moved = self
            .payouts
            .transition(id, &[PayoutStatus::PendingApproval], PayoutStatus::Processing)
            .await?;
        if !moved {
            return Err(AppError::Conflict(
                "payout is not awaiting approval".to_string(),
            ));
        }

        let cast = self.accounts.cast(payout.cast_id).await?;
        match cast.stripe_connect_account_id {
            Some(account_id) => {
                self.dispatch(&payout, &account_id).await?;
            }
            None => {
                self.fail_dispatch(
                    &payout,
                    &GatewayError::AccountNotReady("connected account missing".to_string()),
                )
                .await?;
            }
        }

        Ok(self.payouts.get(id).await?)
    }

    pub async fn reject_instant(&self, id: Uuid) -> Result<CastPayout, AppError> {
        let moved = self
            .payouts
            .release_claims(id, &[PayoutStatus::PendingApproval], PayoutStatus::Rejected)
            .await?;
        if !moved {
            return Err(AppError::Conflict(
                "payout is not awaiting approval".to_string(),
            ));
        }

        Ok(self.payouts.get(id).await?)
    }

    /// Operator retry of a failed dispatch.
    pub async fn retry_payout(&self, id: Uuid) -> Result<CastPayout, AppError> {
        let payout = self.payouts.get(id).await?;
        if payout.status != PayoutStatus::Failed {
            return Err(AppError::Validation(
                "only failed payouts can be retried".to_string(),
            ));
        }

        let moved = self
            .payouts
            .transition(id, &[PayoutStatus::Failed], PayoutStatus::Processing)
            .await?;
        if !moved {
            return Err(AppError::Conflict("payout is no longer failed".to_string()));
        }

        let retries = payout
            .metadata
            .get("retry_count")
            .and_then(|v| v.as_i64())
            .unwrap_or(0);
        self.payouts
            .merge_metadata(id, json!({ "retry_count": retries + 1 }))
            .await?;

        let cast = self.accounts.cast(payout.cast_id).await?;
        match cast.stripe_connect_account_id {
            Some(account_id) => {
                self.dispatch(&payout, &account_id).await?;
            }
            None => {
                self.fail_dispatch(
                    &payout,
                    &GatewayError::AccountNotReady("connected account missing".to_string()),
                )
                .await?;
            }
        }

        Ok(self.payouts.get(id).await?)
    }

    /// Cancel an undispatched payout, returning its claimed rows to the
    /// unsettled pool.
    pub async fn cancel_payout(&self, id: Uuid) -> Result<CastPayout, AppError> {
        let moved = self
            .payouts
            .release_claims(
                id,
                &[PayoutStatus::Scheduled, PayoutStatus::Pending],
                PayoutStatus::Cancelled,
            )
            .await?;
        if !moved {
            return Err(AppError::Validation(
                "only scheduled or pending payouts can be cancelled".to_string(),
            ));
        }

        if let Some(payment) = self.payments.find_by_cast_payout(id).await? {
            self.payments
                .transition(
                    payment.id,
                    &[PaymentStatus::Pending],
                    PaymentStatus::Canceled,
                    None,
                )
                .await?;
        }

        Ok(self.payouts.get(id).await?)
    }

    /// Settle a processing payout: debit the cast's running balance, mark
    /// the payout and its payment paid. Driven by the operator or the
    /// gateway's payout.paid event.
    pub async fn finalize_payout(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<CastPayout, AppError> {
        let payout = self.payouts.get(id).await?;

        let moved = self
            .payouts
            .transition(id, &[PayoutStatus::Processing], PayoutStatus::Paid)
            .await?;
        if !moved {
            return Err(AppError::Conflict(
                "payout is not processing".to_string(),
            ));
        }

        self.accounts
            .debit_cast_points(payout.cast_id, payout.total_points)
            .await?;

        if let Some(payment) = self.payments.find_by_cast_payout(id).await? {
            self.payments
                .transition(
                    payment.id,
                    &[PaymentStatus::Pending],
                    PaymentStatus::Paid,
                    Some(now),
                )
                .await?;
        }

        self.notify_best_effort(
            payout.cast_id,
            NotifyCategory::PayoutPaid,
            PAYOUT_PAID_CAST,
            json!({ "payout_id": id, "net_amount_yen": payout.net_amount_yen }),
        )
        .await;

        Ok(self.payouts.get(id).await?)
    }

    /// Mark a processing payout failed from a gateway callback.
    pub async fn mark_dispatch_failed(&self, id: Uuid, reason: &str) -> Result<bool, AppError> {
        let moved = self
            .payouts
            .transition(id, &[PayoutStatus::Processing], PayoutStatus::Failed)
            .await?;
        if moved {
            self.payouts
                .merge_metadata(id, json!({ "dispatch_error": reason }))
                .await?;
        }
        Ok(moved)
    }

    async fn notify_best_effort(
        &self,
        cast_id: Uuid,
        category: NotifyCategory,
        message: &str,
        context: serde_json::Value,
    ) {
        if let Err(e) = self
            .notifier
            .notify(cast_id, ActorType::Cast, category, message, context)
            .await
        {
            tracing::warn!(cast_id = %cast_id, "notification dropped: {}", e);
        }
    }
}

/// Whole rows, oldest first, until the requirement is met. The final row may
/// overshoot; partial consumption is not supported.
fn select_rows_oldest_first(
    rows: &[PointTransaction],
    required_points: i64,
) -> Vec<PointTransaction> {
    let mut selected = Vec::new();
    let mut consumed = 0i64;

    for row in rows {
        if consumed >= required_points {
            break;
        }
        selected.push(row.clone());
        consumed += row.amount;
    }

    selected
}
