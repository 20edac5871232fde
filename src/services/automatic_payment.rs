//! Automatic card charging for point shortfalls.
//!
//! Charges are authorize-only; capture runs days later via the sweep. Points
//! are credited to the guest as soon as the authorization succeeds, so a
//! reservation can keep going while the money settles.

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::domain::conversion::{apply_consumption_tax, clamp_min_charge, points_to_yen};
use crate::domain::{ActorType, Payment, PaymentStatus};
use crate::error::AppError;
use crate::ports::{
    AccountRepository, ChargeRequest, GatewayError, LedgerRepository, Notifier, NotifyCategory,
    PaymentGateway, PaymentRepository,
};
use crate::services::grade::GradeService;

/// What triggered the charge. Mid-reservation overage confirms the intent
/// immediately; the reservation-creation flow leaves it unconfirmed until
/// the capture sweep picks it up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeTrigger {
    MidReservation,
    ReservationCreate,
}

impl ChargeTrigger {
    fn confirm(&self) -> bool {
        matches!(self, ChargeTrigger::MidReservation)
    }

    fn deduction_type(&self) -> &'static str {
        match self {
            ChargeTrigger::MidReservation => "exceeded_time",
            ChargeTrigger::ReservationCreate => "reservation_pending",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChargeInput {
    pub guest_id: Uuid,
    pub required_points: i64,
    pub reservation_id: Option<Uuid>,
    /// Cast on the active reservation, if any; gets the counterpart failure
    /// notice.
    pub cast_id: Option<Uuid>,
    pub description: String,
}

/// Expected outcomes are values; errors are reserved for integrity problems.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ChargeOutcome {
    Authorized {
        payment_id: Uuid,
        charged_yen: i64,
        card_last4: String,
    },
    AllCardsFailed {
        payment_id: Uuid,
        errors: Vec<String>,
    },
    NoPaymentMethod {
        payment_id: Uuid,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct CaptureSweepReport {
    pub captured: usize,
    pub failed: usize,
}

// One failure message for every no-charge path; the copy never reveals
// whether cards were declined or simply absent.
const CHARGE_FAILED_GUEST: &str =
    "We could not complete an automatic card payment. Please check your registered cards.";
const CHARGE_FAILED_CAST: &str =
    "A guest payment for your reservation could not be completed.";
const CHARGE_FAILED_CHAT: &str =
    "An automatic payment failed. The reservation needs attention.";

const LABEL_CAPTURED: &str = "automatic payment completed";
const LABEL_CAPTURE_FAILED: &str = "automatic payment failed; points revoked";

pub struct AutomaticPaymentService {
    ledger: Arc<dyn LedgerRepository>,
    payments: Arc<dyn PaymentRepository>,
    accounts: Arc<dyn AccountRepository>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
    grades: Arc<GradeService>,
    config: EngineConfig,
}

impl AutomaticPaymentService {
    pub fn new(
        ledger: Arc<dyn LedgerRepository>,
        payments: Arc<dyn PaymentRepository>,
        accounts: Arc<dyn AccountRepository>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
        grades: Arc<GradeService>,
        config: EngineConfig,
    ) -> Self {
        Self {
            ledger,
            payments,
            accounts,
            gateway,
            notifier,
            grades,
            config,
        }
    }

    /// Mid-reservation overage: the guest ran out of points while the clock
    /// was running.
    pub async fn charge_for_shortfall(
        &self,
        input: ChargeInput,
        now: DateTime<Utc>,
    ) -> Result<ChargeOutcome, AppError> {
        self.run_charge(input, now, ChargeTrigger::MidReservation)
            .await
    }

    /// Reservation-creation shortfall: the intent stays unconfirmed until
    /// the capture sweep finishes it.
    pub async fn charge_with_pending(
        &self,
        input: ChargeInput,
        now: DateTime<Utc>,
    ) -> Result<ChargeOutcome, AppError> {
        self.run_charge(input, now, ChargeTrigger::ReservationCreate)
            .await
    }

    async fn run_charge(
        &self,
        input: ChargeInput,
        now: DateTime<Utc>,
        trigger: ChargeTrigger,
    ) -> Result<ChargeOutcome, AppError> {
        if input.required_points <= 0 {
            return Err(AppError::Validation(
                "required points must be positive".to_string(),
            ));
        }

        let guest = self.accounts.guest(input.guest_id).await?;

        let base_yen = points_to_yen(input.required_points, &self.config.point_rate);
        let taxed_yen = apply_consumption_tax(base_yen, &self.config.consumption_tax_rate);
        let amount_yen = clamp_min_charge(taxed_yen, self.config.min_charge_yen);

        let metadata = json!({
            "deduction_type": trigger.deduction_type(),
            "required_points": input.required_points,
            "conversion_rate": self.config.point_rate.to_string(),
            "base_amount_yen": base_yen,
            "taxed_amount_yen": taxed_yen,
        });

        let payment = self
            .payments
            .insert(&Payment::automatic(
                input.guest_id,
                amount_yen,
                input.reservation_id,
                metadata,
            ))
            .await?;

        let customer_id = match guest.stripe_customer_id {
            Some(id) => id,
            None => {
                self.fail_without_charge(&input, payment.id, "no gateway customer registered")
                    .await?;
                return Ok(ChargeOutcome::NoPaymentMethod {
                    payment_id: payment.id,
                });
            }
        };

        let methods = match self.gateway.list_payment_methods(&customer_id).await {
            Ok(methods) => methods,
            Err(e) => {
                self.payments
                    .merge_metadata(payment.id, json!({ "error": e.to_string() }))
                    .await?;
                self.payments
                    .transition(payment.id, &[PaymentStatus::Pending], PaymentStatus::Failed, None)
                    .await?;
                return Err(AppError::Gateway(e.to_string()));
            }
        };

        if methods.is_empty() {
            self.fail_without_charge(&input, payment.id, "no payment methods registered")
                .await?;
            return Ok(ChargeOutcome::NoPaymentMethod {
                payment_id: payment.id,
            });
        }

        // Try each card in the customer's listed order; first success wins.
        let mut card_errors = Vec::new();
        for method in &methods {
            let request = ChargeRequest {
                customer_id: customer_id.clone(),
                payment_method_id: method.id.clone(),
                amount_yen,
                currency: self.config.currency.clone(),
                confirm: trigger.confirm(),
                description: input.description.clone(),
                metadata: json!({
                    "payment_id": payment.id,
                    "deduction_type": trigger.deduction_type(),
                }),
            };

            match self.gateway.authorize_charge(&request).await {
                Ok(authorization) => {
                    return self
                        .complete_authorization(
                            &input,
                            payment.id,
                            amount_yen,
                            &authorization.charge_id,
                            &method.card_last4,
                            now,
                        )
                        .await;
                }
                Err(GatewayError::CircuitOpen) => {
                    // An outage is not a declined card; stop iterating.
                    card_errors.push("gateway unavailable".to_string());
                    break;
                }
                Err(e) => {
                    card_errors.push(format!("card ending in {}: {}", method.card_last4, e));
                }
            }
        }

        self.payments
            .merge_metadata(payment.id, json!({ "errors": card_errors.join("; ") }))
            .await?;
        self.payments
            .transition(payment.id, &[PaymentStatus::Pending], PaymentStatus::Failed, None)
            .await?;
        self.notify_charge_failure(&input).await;

        tracing::warn!(
            guest_id = %input.guest_id,
            payment_id = %payment.id,
            cards_tried = methods.len(),
            "automatic payment failed on every card"
        );

        Ok(ChargeOutcome::AllCardsFailed {
            payment_id: payment.id,
            errors: card_errors,
        })
    }

    async fn complete_authorization(
        &self,
        input: &ChargeInput,
        payment_id: Uuid,
        amount_yen: i64,
        charge_id: &str,
        card_last4: &str,
        now: DateTime<Utc>,
    ) -> Result<ChargeOutcome, AppError> {
        let expires_at = now + Duration::days(self.config.capture_delay_days);
        self.payments
            .attach_authorization(payment_id, charge_id, card_last4, Some(expires_at))
            .await?;

        // Optimistic credit: the guest can spend the points before the
        // charge is captured.
        self.ledger
            .record_automatic_purchase(
                input.guest_id,
                payment_id,
                input.required_points,
                input.reservation_id,
                &input.description,
            )
            .await?;

        if let Err(e) = self.grades.recompute(input.guest_id).await {
            tracing::warn!(guest_id = %input.guest_id, "grade recompute failed: {}", e);
        }

        tracing::info!(
            guest_id = %input.guest_id,
            payment_id = %payment_id,
            amount_yen,
            "automatic payment authorized"
        );

        Ok(ChargeOutcome::Authorized {
            payment_id,
            charged_yen: amount_yen,
            card_last4: card_last4.to_string(),
        })
    }

    async fn fail_without_charge(
        &self,
        input: &ChargeInput,
        payment_id: Uuid,
        reason: &str,
    ) -> Result<(), AppError> {
        self.payments
            .merge_metadata(payment_id, json!({ "error": reason }))
            .await?;
        self.payments
            .transition(payment_id, &[PaymentStatus::Pending], PaymentStatus::Failed, None)
            .await?;
        self.notify_charge_failure(input).await;
        Ok(())
    }

    async fn notify_charge_failure(&self, input: &ChargeInput) {
        let context = json!({ "reservation_id": input.reservation_id });

        self.notify_best_effort(
            input.guest_id,
            ActorType::Guest,
            NotifyCategory::AutoChargeFailed,
            CHARGE_FAILED_GUEST,
            context.clone(),
        )
        .await;

        if let Some(cast_id) = input.cast_id {
            self.notify_best_effort(
                cast_id,
                ActorType::Cast,
                NotifyCategory::AutoChargeFailed,
                CHARGE_FAILED_CAST,
                context.clone(),
            )
            .await;
        }

        self.notify_best_effort(
            input.guest_id,
            ActorType::Guest,
            NotifyCategory::SystemMessage,
            CHARGE_FAILED_CHAT,
            context,
        )
        .await;
    }

    async fn notify_best_effort(
        &self,
        actor_id: Uuid,
        actor_type: ActorType,
        category: NotifyCategory,
        message: &str,
        context: serde_json::Value,
    ) {
        if let Err(e) = self
            .notifier
            .notify(actor_id, actor_type, category, message, context)
            .await
        {
            tracing::warn!(actor_id = %actor_id, "notification dropped: {}", e);
        }
    }

    /// Capture every overdue automatic payment. The compare-and-set out of
    /// `pending` is the only gate: a second sweep finds nothing to do.
    pub async fn process_pending_captures(
        &self,
        now: DateTime<Utc>,
    ) -> Result<CaptureSweepReport, AppError> {
        let due = self.payments.due_for_capture(now).await?;
        let mut report = CaptureSweepReport::default();

        for payment in due {
            let intent_id = match &payment.stripe_payment_intent_id {
                Some(id) => id.clone(),
                None => {
                    // Authorization never completed; nothing to capture.
                    continue;
                }
            };

            match self.gateway.capture_charge(&intent_id, None).await {
                Ok(()) => {
                    if self.mark_captured(&payment, now).await? {
                        report.captured += 1;
                    }
                }
                Err(GatewayError::CircuitOpen) => {
                    tracing::warn!("capture sweep halted: gateway circuit open");
                    break;
                }
                Err(e) => {
                    if self.mark_capture_failed(&payment, &e.to_string()).await? {
                        report.failed += 1;
                    }
                }
            }
        }

        Ok(report)
    }

    /// Shared by the sweep and the gateway webhook. Returns false when the
    /// payment already left `pending` (duplicate delivery).
    pub async fn mark_captured(
        &self,
        payment: &Payment,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let moved = self
            .payments
            .transition(
                payment.id,
                &[PaymentStatus::Pending],
                PaymentStatus::Paid,
                Some(now),
            )
            .await?;

        if !moved {
            return Ok(false);
        }

        self.payments
            .merge_metadata(
                payment.id,
                json!({ "captured_at": now, "points_credited": true }),
            )
            .await?;
        self.ledger
            .relabel_payment_entries(payment.id, LABEL_CAPTURED)
            .await?;

        self.notify_best_effort(
            payment.user_id,
            payment.user_type,
            NotifyCategory::AutoChargeCompleted,
            "Your automatic card payment has been completed.",
            json!({ "payment_id": payment.id, "amount_yen": payment.amount_yen }),
        )
        .await;

        Ok(true)
    }

    /// Capture failed for good: take the optimistic credit back.
    pub async fn mark_capture_failed(
        &self,
        payment: &Payment,
        reason: &str,
    ) -> Result<bool, AppError> {
        let moved = self
            .payments
            .transition(
                payment.id,
                &[PaymentStatus::Pending],
                PaymentStatus::Failed,
                None,
            )
            .await?;

        if !moved {
            return Ok(false);
        }

        self.payments
            .merge_metadata(payment.id, json!({ "capture_error": reason }))
            .await?;
        self.ledger
            .revoke_automatic_purchase(payment.id, LABEL_CAPTURE_FAILED)
            .await?;

        self.notify_best_effort(
            payment.user_id,
            payment.user_type,
            NotifyCategory::AutoChargeFailed,
            CHARGE_FAILED_GUEST,
            json!({ "payment_id": payment.id }),
        )
        .await;

        tracing::warn!(payment_id = %payment.id, "capture failed: {}", reason);
        Ok(true)
    }
}
