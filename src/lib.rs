pub mod adapters;
pub mod cli;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod ports;
pub mod services;
pub mod stripe;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::adapters::{
    PostgresAccountRepository, PostgresLedgerRepository, PostgresPaymentRepository,
    PostgresPayoutRepository,
};
use crate::config::{Config, EngineConfig};
use crate::ports::{
    AccountRepository, LedgerRepository, Notifier, PaymentGateway, PaymentRepository,
    PayoutRepository,
};
use crate::services::{
    AutomaticPaymentService, CastPayoutService, GradeService, HttpNotifier, LogNotifier,
};
use crate::stripe::StripeGateway;

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub ledger: Arc<dyn LedgerRepository>,
    pub payouts: Arc<dyn PayoutRepository>,
    pub payments: Arc<dyn PaymentRepository>,
    pub accounts: Arc<dyn AccountRepository>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub automatic_payments: Arc<AutomaticPaymentService>,
    pub payout_engine: Arc<CastPayoutService>,
    pub grades: Arc<GradeService>,
    pub webhook_secret: String,
}

/// Wire the Postgres adapters, gateway client, and engines into one state
/// value shared by the HTTP surface, the CLI, and the scheduler.
pub fn build_state(pool: sqlx::PgPool, config: &Config, engine_config: EngineConfig) -> AppState {
    let ledger: Arc<dyn LedgerRepository> = Arc::new(PostgresLedgerRepository::new(pool.clone()));
    let payouts: Arc<dyn PayoutRepository> = Arc::new(PostgresPayoutRepository::new(pool.clone()));
    let payments: Arc<dyn PaymentRepository> =
        Arc::new(PostgresPaymentRepository::new(pool.clone()));
    let accounts: Arc<dyn AccountRepository> =
        Arc::new(PostgresAccountRepository::new(pool.clone()));

    let gateway: Arc<dyn PaymentGateway> = Arc::new(StripeGateway::new(
        config.stripe_api_url.clone(),
        config.stripe_secret_key.clone(),
    ));

    let notifier: Arc<dyn Notifier> = match &config.notify_endpoint {
        Some(endpoint) => Arc::new(HttpNotifier::new(endpoint.clone())),
        None => Arc::new(LogNotifier),
    };

    let grades = Arc::new(GradeService::new(ledger.clone(), accounts.clone()));

    let automatic_payments = Arc::new(AutomaticPaymentService::new(
        ledger.clone(),
        payments.clone(),
        accounts.clone(),
        gateway.clone(),
        notifier.clone(),
        grades.clone(),
        engine_config.clone(),
    ));

    let payout_engine = Arc::new(CastPayoutService::new(
        ledger.clone(),
        payouts.clone(),
        payments.clone(),
        accounts.clone(),
        gateway.clone(),
        notifier,
        engine_config,
    ));

    AppState {
        db: pool,
        ledger,
        payouts,
        payments,
        accounts,
        gateway,
        automatic_payments,
        payout_engine,
        grades,
        webhook_secret: config.webhook_secret.clone(),
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/payouts", get(handlers::payouts::list_payouts))
        .route("/payouts/close", post(handlers::payouts::close_month))
        .route("/payouts/run-due", post(handlers::payouts::run_due))
        .route("/payouts/instant", post(handlers::payouts::create_instant))
        .route("/payouts/:id", get(handlers::payouts::get_payout))
        .route("/payouts/:id/approve", post(handlers::payouts::approve))
        .route("/payouts/:id/reject", post(handlers::payouts::reject))
        .route("/payouts/:id/retry", post(handlers::payouts::retry))
        .route("/payouts/:id/cancel", post(handlers::payouts::cancel))
        .route("/payouts/:id/mark-paid", post(handlers::payouts::mark_paid))
        .route("/payments/automatic", post(handlers::payments::automatic_charge))
        .route(
            "/payments/capture-sweep",
            post(handlers::payments::capture_sweep),
        )
        .route("/payments/:id", get(handlers::payments::get_payment))
        .route(
            "/gateway/balance",
            get(handlers::payments::platform_balance),
        )
        .route("/casts/:id/balance", get(handlers::payments::cast_balance))
        .route(
            "/guests/:id/customer",
            post(handlers::payments::register_customer),
        )
        .route(
            "/guests/:id/recompute-grade",
            post(handlers::payments::recompute_grade),
        )
        .route("/callback", post(handlers::webhook::callback))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
