//! In-memory implementations of the service ports. One mutex guards the
//! whole world, which gives the same all-or-nothing semantics the Postgres
//! adapters get from transactions: the claim re-check and the claim write
//! happen under one lock.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use pointpay_core::domain::{
    ActorType, Cast, CastPayout, EntryType, Grade, Guest, Payment, PaymentStatus, PayoutStatus,
    PayoutType, PointTransaction,
};
use pointpay_core::ports::{
    AccountRepository, BalanceInfo, ChargeAuthorization, ChargeRequest, ConnectedAccountStatus,
    GatewayError, LedgerRepository, Notifier, NotifyCategory, NotifyError, PaymentGateway,
    PaymentMethodInfo, PaymentRepository, PayoutRef, PayoutRepository, RepositoryError,
    RepositoryResult, TransferRef,
};

#[derive(Default)]
struct World {
    ledger: Vec<PointTransaction>,
    payouts: HashMap<Uuid, CastPayout>,
    payments: HashMap<Uuid, Payment>,
    guests: HashMap<Uuid, Guest>,
    casts: HashMap<Uuid, Cast>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<World>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_guest(&self, customer_id: Option<&str>) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        self.inner.lock().unwrap().guests.insert(
            id,
            Guest {
                id,
                points: 0,
                grade: Grade::Green,
                grade_points: 0,
                grade_updated_at: None,
                stripe_customer_id: customer_id.map(str::to_string),
                created_at: now,
                updated_at: now,
            },
        );
        id
    }

    pub fn add_cast(&self, connect_account: Option<&str>, grade: Grade) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        self.inner.lock().unwrap().casts.insert(
            id,
            Cast {
                id,
                points: 0,
                grade,
                stripe_connect_account_id: connect_account.map(str::to_string),
                created_at: now,
                updated_at: now,
            },
        );
        id
    }

    pub fn set_cast_account(&self, cast_id: Uuid, account: &str) {
        if let Some(cast) = self.inner.lock().unwrap().casts.get_mut(&cast_id) {
            cast.stripe_connect_account_id = Some(account.to_string());
        }
    }

    pub fn add_earnable(&self, cast_id: Uuid, amount: i64, created_at: DateTime<Utc>) -> Uuid {
        let mut entry = PointTransaction::cast_entry(
            cast_id,
            None,
            EntryType::Transfer,
            amount,
            None,
            "reservation earnings",
        );
        entry.created_at = created_at;
        let id = entry.id;
        self.inner.lock().unwrap().ledger.push(entry);
        id
    }

    pub fn add_buy_entry(&self, guest_id: Uuid, amount: i64) {
        let entry = PointTransaction::guest_entry(
            guest_id,
            EntryType::Buy,
            amount,
            None,
            None,
            "points purchase",
        );
        self.inner.lock().unwrap().ledger.push(entry);
    }

    pub fn guest_snapshot(&self, id: Uuid) -> Guest {
        self.inner.lock().unwrap().guests[&id].clone()
    }

    pub fn cast_snapshot(&self, id: Uuid) -> Cast {
        self.inner.lock().unwrap().casts[&id].clone()
    }

    pub fn payment_snapshot(&self, id: Uuid) -> Payment {
        self.inner.lock().unwrap().payments[&id].clone()
    }

    pub fn payout_snapshot(&self, id: Uuid) -> CastPayout {
        self.inner.lock().unwrap().payouts[&id].clone()
    }

    pub fn all_payouts(&self) -> Vec<CastPayout> {
        self.inner.lock().unwrap().payouts.values().cloned().collect()
    }

    pub fn all_payments(&self) -> Vec<Payment> {
        self.inner.lock().unwrap().payments.values().cloned().collect()
    }

    pub fn ledger_entries(&self) -> Vec<PointTransaction> {
        self.inner.lock().unwrap().ledger.clone()
    }

    pub fn entries_for_payment(&self, payment_id: Uuid) -> Vec<PointTransaction> {
        self.inner
            .lock()
            .unwrap()
            .ledger
            .iter()
            .filter(|e| e.payment_id == Some(payment_id))
            .cloned()
            .collect()
    }

    /// Earnable points ever recorded for a cast, claimed or not.
    pub fn total_earnable_recorded(&self, cast_id: Uuid) -> i64 {
        self.inner
            .lock()
            .unwrap()
            .ledger
            .iter()
            .filter(|e| e.cast_id == Some(cast_id) && e.entry_type.is_earnable())
            .map(|e| e.amount)
            .sum()
    }
}

fn merge(into: &mut serde_json::Value, patch: serde_json::Value) {
    match (into.as_object_mut(), patch.as_object()) {
        (Some(target), Some(source)) => {
            for (key, value) in source {
                target.insert(key.clone(), value.clone());
            }
        }
        _ => *into = patch,
    }
}

#[async_trait]
impl LedgerRepository for MemoryStore {
    async fn insert(&self, entry: &PointTransaction) -> RepositoryResult<PointTransaction> {
        self.inner.lock().unwrap().ledger.push(entry.clone());
        Ok(entry.clone())
    }

    async fn unsettled_balance(&self, cast_id: Uuid) -> RepositoryResult<i64> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .ledger
            .iter()
            .filter(|e| {
                e.cast_id == Some(cast_id) && e.entry_type.is_earnable() && e.cast_payout_id.is_none()
            })
            .map(|e| e.amount)
            .sum())
    }

    async fn unclaimed_earnable(&self, cast_id: Uuid) -> RepositoryResult<Vec<PointTransaction>> {
        let mut rows: Vec<_> = self
            .inner
            .lock()
            .unwrap()
            .ledger
            .iter()
            .filter(|e| {
                e.cast_id == Some(cast_id) && e.entry_type.is_earnable() && e.cast_payout_id.is_none()
            })
            .cloned()
            .collect();
        rows.sort_by_key(|e| e.created_at);
        Ok(rows)
    }

    async fn unclaimed_earnable_between(
        &self,
        cast_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> RepositoryResult<Vec<PointTransaction>> {
        let mut rows: Vec<_> = self
            .inner
            .lock()
            .unwrap()
            .ledger
            .iter()
            .filter(|e| {
                e.cast_id == Some(cast_id)
                    && e.entry_type.is_earnable()
                    && e.cast_payout_id.is_none()
                    && e.created_at >= start
                    && e.created_at <= end
            })
            .cloned()
            .collect();
        rows.sort_by_key(|e| e.created_at);
        Ok(rows)
    }

    async fn casts_with_unclaimed_earnings(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> RepositoryResult<Vec<Uuid>> {
        let mut ids: Vec<Uuid> = self
            .inner
            .lock()
            .unwrap()
            .ledger
            .iter()
            .filter(|e| {
                e.entry_type.is_earnable()
                    && e.cast_payout_id.is_none()
                    && e.created_at >= start
                    && e.created_at <= end
            })
            .filter_map(|e| e.cast_id)
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    async fn sum_buy_points(&self, guest_id: Uuid) -> RepositoryResult<i64> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .ledger
            .iter()
            .filter(|e| e.guest_id == Some(guest_id) && e.entry_type == EntryType::Buy)
            .map(|e| e.amount)
            .sum())
    }

    async fn claimed_by(&self, payout_id: Uuid) -> RepositoryResult<Vec<PointTransaction>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .ledger
            .iter()
            .filter(|e| e.cast_payout_id == Some(payout_id))
            .cloned()
            .collect())
    }

    async fn record_automatic_purchase(
        &self,
        guest_id: Uuid,
        payment_id: Uuid,
        points: i64,
        reservation_id: Option<Uuid>,
        description: &str,
    ) -> RepositoryResult<()> {
        let mut world = self.inner.lock().unwrap();

        let guest = world
            .guests
            .get_mut(&guest_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("guest {}", guest_id)))?;
        guest.points += points;

        world.ledger.push(PointTransaction::guest_entry(
            guest_id,
            EntryType::Buy,
            points,
            reservation_id,
            Some(payment_id),
            description,
        ));
        world.ledger.push(PointTransaction::guest_entry(
            guest_id,
            EntryType::ExceededPending,
            -points,
            reservation_id,
            Some(payment_id),
            description,
        ));

        Ok(())
    }

    async fn revoke_automatic_purchase(
        &self,
        payment_id: Uuid,
        description: &str,
    ) -> RepositoryResult<()> {
        let mut world = self.inner.lock().unwrap();

        let (guest_id, amount) = world
            .ledger
            .iter()
            .find(|e| e.payment_id == Some(payment_id) && e.entry_type == EntryType::Buy)
            .and_then(|e| e.guest_id.map(|g| (g, e.amount)))
            .ok_or_else(|| {
                RepositoryError::NotFound(format!("ledger rows for payment {}", payment_id))
            })?;

        if let Some(guest) = world.guests.get_mut(&guest_id) {
            guest.points -= amount;
        }

        for entry in world
            .ledger
            .iter_mut()
            .filter(|e| e.payment_id == Some(payment_id))
        {
            entry.description = description.to_string();
        }

        Ok(())
    }

    async fn relabel_payment_entries(
        &self,
        payment_id: Uuid,
        description: &str,
    ) -> RepositoryResult<()> {
        for entry in self
            .inner
            .lock()
            .unwrap()
            .ledger
            .iter_mut()
            .filter(|e| e.payment_id == Some(payment_id))
        {
            entry.description = description.to_string();
        }
        Ok(())
    }
}

#[async_trait]
impl PayoutRepository for MemoryStore {
    async fn create_claiming(
        &self,
        payout: &CastPayout,
        entry_ids: &[Uuid],
    ) -> RepositoryResult<CastPayout> {
        let mut world = self.inner.lock().unwrap();

        if payout.payout_type == PayoutType::Scheduled {
            let open = world.payouts.values().any(|p| {
                p.cast_id == payout.cast_id
                    && p.closing_month == payout.closing_month
                    && p.payout_type == PayoutType::Scheduled
                    && matches!(
                        p.status,
                        PayoutStatus::Scheduled | PayoutStatus::Pending | PayoutStatus::Processing
                    )
            });
            if open {
                return Err(RepositoryError::Conflict(format!(
                    "open scheduled payout already exists for cast {} in {}",
                    payout.cast_id, payout.closing_month
                )));
            }
        }

        let unclaimed = world
            .ledger
            .iter()
            .filter(|e| entry_ids.contains(&e.id) && e.cast_payout_id.is_none())
            .count();
        if unclaimed != entry_ids.len() {
            return Err(RepositoryError::Conflict(format!(
                "{} of {} candidate ledger rows already claimed",
                entry_ids.len() - unclaimed,
                entry_ids.len()
            )));
        }

        for entry in world
            .ledger
            .iter_mut()
            .filter(|e| entry_ids.contains(&e.id))
        {
            entry.cast_payout_id = Some(payout.id);
        }
        world.payouts.insert(payout.id, payout.clone());

        Ok(payout.clone())
    }

    async fn get(&self, id: Uuid) -> RepositoryResult<CastPayout> {
        self.inner
            .lock()
            .unwrap()
            .payouts
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("payout {}", id)))
    }

    async fn list(&self, limit: i64, offset: i64) -> RepositoryResult<Vec<CastPayout>> {
        let mut all: Vec<_> = self.inner.lock().unwrap().payouts.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn due(&self, run_date: NaiveDate) -> RepositoryResult<Vec<CastPayout>> {
        let mut due: Vec<_> = self
            .inner
            .lock()
            .unwrap()
            .payouts
            .values()
            .filter(|p| {
                matches!(p.status, PayoutStatus::Scheduled | PayoutStatus::Pending)
                    && p.scheduled_payout_date <= run_date
            })
            .cloned()
            .collect();
        due.sort_by_key(|p| p.scheduled_payout_date);
        Ok(due)
    }

    async fn exists_open_scheduled(
        &self,
        cast_id: Uuid,
        closing_month: &str,
    ) -> RepositoryResult<bool> {
        Ok(self.inner.lock().unwrap().payouts.values().any(|p| {
            p.cast_id == cast_id
                && p.closing_month == closing_month
                && p.payout_type == PayoutType::Scheduled
                && matches!(
                    p.status,
                    PayoutStatus::Scheduled | PayoutStatus::Pending | PayoutStatus::Processing
                )
        }))
    }

    async fn transition(
        &self,
        id: Uuid,
        from: &[PayoutStatus],
        to: PayoutStatus,
    ) -> RepositoryResult<bool> {
        let mut world = self.inner.lock().unwrap();
        match world.payouts.get_mut(&id) {
            Some(payout) if from.contains(&payout.status) => {
                payout.status = to;
                payout.updated_at = Utc::now();
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(RepositoryError::NotFound(format!("payout {}", id))),
        }
    }

    async fn merge_metadata(&self, id: Uuid, patch: serde_json::Value) -> RepositoryResult<()> {
        let mut world = self.inner.lock().unwrap();
        let payout = world
            .payouts
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("payout {}", id)))?;
        merge(&mut payout.metadata, patch);
        Ok(())
    }

    async fn release_claims(
        &self,
        id: Uuid,
        from: &[PayoutStatus],
        to: PayoutStatus,
    ) -> RepositoryResult<bool> {
        let mut world = self.inner.lock().unwrap();

        let moved = match world.payouts.get_mut(&id) {
            Some(payout) if from.contains(&payout.status) => {
                payout.status = to;
                payout.updated_at = Utc::now();
                true
            }
            Some(_) => false,
            None => return Err(RepositoryError::NotFound(format!("payout {}", id))),
        };

        if moved {
            for entry in world
                .ledger
                .iter_mut()
                .filter(|e| e.cast_payout_id == Some(id))
            {
                entry.cast_payout_id = None;
            }
        }

        Ok(moved)
    }
}

#[async_trait]
impl PaymentRepository for MemoryStore {
    async fn insert(&self, payment: &Payment) -> RepositoryResult<Payment> {
        self.inner
            .lock()
            .unwrap()
            .payments
            .insert(payment.id, payment.clone());
        Ok(payment.clone())
    }

    async fn get(&self, id: Uuid) -> RepositoryResult<Payment> {
        self.inner
            .lock()
            .unwrap()
            .payments
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("payment {}", id)))
    }

    async fn find_by_intent(&self, intent_id: &str) -> RepositoryResult<Option<Payment>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .payments
            .values()
            .find(|p| p.stripe_payment_intent_id.as_deref() == Some(intent_id))
            .cloned())
    }

    async fn find_by_provider_payout(&self, payout_id: &str) -> RepositoryResult<Option<Payment>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .payments
            .values()
            .find(|p| p.stripe_payout_id.as_deref() == Some(payout_id))
            .cloned())
    }

    async fn find_by_cast_payout(
        &self,
        cast_payout_id: Uuid,
    ) -> RepositoryResult<Option<Payment>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .payments
            .values()
            .find(|p| p.cast_payout_id == Some(cast_payout_id))
            .cloned())
    }

    async fn transition(
        &self,
        id: Uuid,
        from: &[PaymentStatus],
        to: PaymentStatus,
        paid_at: Option<DateTime<Utc>>,
    ) -> RepositoryResult<bool> {
        let mut world = self.inner.lock().unwrap();
        match world.payments.get_mut(&id) {
            Some(payment) if from.contains(&payment.status) => {
                payment.status = to;
                if paid_at.is_some() {
                    payment.paid_at = paid_at;
                }
                payment.updated_at = Utc::now();
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(RepositoryError::NotFound(format!("payment {}", id))),
        }
    }

    async fn merge_metadata(&self, id: Uuid, patch: serde_json::Value) -> RepositoryResult<()> {
        let mut world = self.inner.lock().unwrap();
        let payment = world
            .payments
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("payment {}", id)))?;
        merge(&mut payment.metadata, patch);
        Ok(())
    }

    async fn attach_authorization(
        &self,
        id: Uuid,
        intent_id: &str,
        card_last4: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> RepositoryResult<()> {
        let mut world = self.inner.lock().unwrap();
        let payment = world
            .payments
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("payment {}", id)))?;
        payment.stripe_payment_intent_id = Some(intent_id.to_string());
        payment.payment_method = Some(card_last4.to_string());
        payment.expires_at = expires_at;
        payment.updated_at = Utc::now();
        Ok(())
    }

    async fn due_for_capture(&self, now: DateTime<Utc>) -> RepositoryResult<Vec<Payment>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .payments
            .values()
            .filter(|p| {
                p.status == PaymentStatus::Pending
                    && p.is_automatic
                    && p.expires_at.map(|e| e <= now).unwrap_or(false)
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AccountRepository for MemoryStore {
    async fn guest(&self, id: Uuid) -> RepositoryResult<Guest> {
        self.inner
            .lock()
            .unwrap()
            .guests
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("guest {}", id)))
    }

    async fn cast(&self, id: Uuid) -> RepositoryResult<Cast> {
        self.inner
            .lock()
            .unwrap()
            .casts
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("cast {}", id)))
    }

    async fn credit_guest_points(&self, id: Uuid, delta: i64) -> RepositoryResult<()> {
        let mut world = self.inner.lock().unwrap();
        let guest = world
            .guests
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("guest {}", id)))?;
        guest.points += delta;
        Ok(())
    }

    async fn debit_cast_points(&self, id: Uuid, points: i64) -> RepositoryResult<()> {
        let mut world = self.inner.lock().unwrap();
        let cast = world
            .casts
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("cast {}", id)))?;
        cast.points -= points;
        Ok(())
    }

    async fn update_guest_grade(
        &self,
        id: Uuid,
        grade: Grade,
        grade_points: i64,
        changed: bool,
    ) -> RepositoryResult<()> {
        let mut world = self.inner.lock().unwrap();
        let guest = world
            .guests
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("guest {}", id)))?;
        guest.grade_points = grade_points;
        if changed {
            guest.grade = grade;
            guest.grade_updated_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn set_guest_customer(&self, id: Uuid, customer_id: &str) -> RepositoryResult<()> {
        let mut world = self.inner.lock().unwrap();
        let guest = world
            .guests
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("guest {}", id)))?;
        guest.stripe_customer_id = Some(customer_id.to_string());
        Ok(())
    }
}

// --- Scriptable gateway ---

#[derive(Default)]
pub struct MockGateway {
    pub methods: Mutex<Vec<PaymentMethodInfo>>,
    pub charge_results: Mutex<VecDeque<Result<ChargeAuthorization, GatewayError>>>,
    pub capture_results: Mutex<VecDeque<Result<(), GatewayError>>>,
    pub transfer_results: Mutex<VecDeque<Result<TransferRef, GatewayError>>>,
    pub payout_results: Mutex<VecDeque<Result<PayoutRef, GatewayError>>>,
    /// account id -> payouts_enabled; unknown accounts count as enabled.
    pub account_status: Mutex<HashMap<String, bool>>,
    pub charge_requests: Mutex<Vec<ChargeRequest>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cards(self, last4s: &[&str]) -> Self {
        *self.methods.lock().unwrap() = last4s
            .iter()
            .enumerate()
            .map(|(i, last4)| PaymentMethodInfo {
                id: format!("pm_{}", i + 1),
                card_last4: last4.to_string(),
            })
            .collect();
        self
    }

    pub fn push_charge(&self, result: Result<ChargeAuthorization, GatewayError>) {
        self.charge_results.lock().unwrap().push_back(result);
    }

    pub fn push_transfer(&self, result: Result<TransferRef, GatewayError>) {
        self.transfer_results.lock().unwrap().push_back(result);
    }

    pub fn push_payout(&self, result: Result<PayoutRef, GatewayError>) {
        self.payout_results.lock().unwrap().push_back(result);
    }

    pub fn push_capture(&self, result: Result<(), GatewayError>) {
        self.capture_results.lock().unwrap().push_back(result);
    }

    pub fn disable_account(&self, account: &str) {
        self.account_status
            .lock()
            .unwrap()
            .insert(account.to_string(), false);
    }

    pub fn recorded_charges(&self) -> Vec<ChargeRequest> {
        self.charge_requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_customer(&self, _email: &str) -> Result<String, GatewayError> {
        Ok(format!("cus_{}", Uuid::new_v4().simple()))
    }

    async fn list_payment_methods(
        &self,
        _customer_id: &str,
    ) -> Result<Vec<PaymentMethodInfo>, GatewayError> {
        Ok(self.methods.lock().unwrap().clone())
    }

    async fn authorize_charge(
        &self,
        request: &ChargeRequest,
    ) -> Result<ChargeAuthorization, GatewayError> {
        self.charge_requests.lock().unwrap().push(request.clone());
        self.charge_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Ok(ChargeAuthorization {
                    charge_id: format!("pi_{}", Uuid::new_v4().simple()),
                })
            })
    }

    async fn capture_charge(
        &self,
        _charge_id: &str,
        _amount_yen: Option<i64>,
    ) -> Result<(), GatewayError> {
        self.capture_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()))
    }

    async fn create_transfer(
        &self,
        _destination_account_id: &str,
        _amount_yen: i64,
        _currency: &str,
        _metadata: &serde_json::Value,
    ) -> Result<TransferRef, GatewayError> {
        self.transfer_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Ok(TransferRef {
                    id: format!("tr_{}", Uuid::new_v4().simple()),
                })
            })
    }

    async fn create_payout(
        &self,
        _connected_account_id: &str,
        _amount_yen: i64,
        _currency: &str,
        _metadata: &serde_json::Value,
    ) -> Result<PayoutRef, GatewayError> {
        self.payout_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Ok(PayoutRef {
                    id: format!("po_{}", Uuid::new_v4().simple()),
                    status: "in_transit".to_string(),
                })
            })
    }

    async fn platform_balance(&self, _currency: &str) -> Result<BalanceInfo, GatewayError> {
        Ok(BalanceInfo {
            available_yen: 10_000_000,
            pending_yen: 0,
        })
    }

    async fn connected_account_status(
        &self,
        account_id: &str,
    ) -> Result<ConnectedAccountStatus, GatewayError> {
        let enabled = self
            .account_status
            .lock()
            .unwrap()
            .get(account_id)
            .copied()
            .unwrap_or(true);
        Ok(ConnectedAccountStatus {
            payouts_enabled: enabled,
            requirements_due: if enabled {
                Vec::new()
            } else {
                vec!["external_account".to_string()]
            },
        })
    }
}

// --- Recording / failing notifier ---

#[derive(Debug, Clone)]
pub struct RecordedNotification {
    pub actor_id: Uuid,
    pub actor_type: ActorType,
    pub category: NotifyCategory,
    pub message: String,
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<RecordedNotification>>,
    pub fail: Mutex<bool>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let notifier = Self::default();
        *notifier.fail.lock().unwrap() = true;
        notifier
    }

    pub fn messages(&self) -> Vec<RecordedNotification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(
        &self,
        actor_id: Uuid,
        actor_type: ActorType,
        category: NotifyCategory,
        message: &str,
        _context: serde_json::Value,
    ) -> Result<(), NotifyError> {
        if *self.fail.lock().unwrap() {
            return Err(NotifyError("sink offline".to_string()));
        }
        self.sent.lock().unwrap().push(RecordedNotification {
            actor_id,
            actor_type,
            category,
            message: message.to_string(),
        });
        Ok(())
    }
}
