//! Periodic job loops: monthly close, due-payout sweep, pending-capture
//! sweep. Each loop sleeps until its next cron firing, runs once, and logs
//! failures without dying.

use chrono::{Datelike, Utc};
use cron::Schedule;
use std::str::FromStr;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

use crate::domain::schedule::end_of_month;
use crate::services::automatic_payment::AutomaticPaymentService;
use crate::services::payout::CastPayoutService;

#[derive(Debug, Clone)]
pub struct JobSchedules {
    pub monthly_close: String,
    pub due_payouts: String,
    pub pending_captures: String,
}

pub async fn run_scheduler(
    payout_engine: Arc<CastPayoutService>,
    automatic_payments: Arc<AutomaticPaymentService>,
    schedules: JobSchedules,
) {
    tracing::info!("job scheduler started");

    let close_engine = payout_engine.clone();
    let close_loop = run_cron(schedules.monthly_close, "monthly_close", move || {
        let engine = close_engine.clone();
        async move {
            // Close the month that just ended.
            let today = Utc::now().date_naive();
            let period_end = match today.with_day(1).and_then(|d| d.pred_opt()) {
                Some(date) => date,
                None => end_of_month(today.year(), today.month()),
            };
            match engine.close_monthly_period(period_end).await {
                Ok(report) => {
                    tracing::info!(payouts_created = report.payouts_created, "monthly close job done")
                }
                Err(e) => tracing::error!("monthly close job failed: {}", e),
            }
        }
    });

    let due_engine = payout_engine.clone();
    let due_loop = run_cron(schedules.due_payouts, "due_payouts", move || {
        let engine = due_engine.clone();
        async move {
            match engine.process_due_payouts(Utc::now().date_naive()).await {
                Ok(report) => tracing::info!(
                    dispatched = report.dispatched,
                    parked = report.parked,
                    failed = report.failed,
                    "due payout job done"
                ),
                Err(e) => tracing::error!("due payout job failed: {}", e),
            }
        }
    });

    let capture_loop = run_cron(schedules.pending_captures, "pending_captures", move || {
        let service = automatic_payments.clone();
        async move {
            match service.process_pending_captures(Utc::now()).await {
                Ok(report) => tracing::info!(
                    captured = report.captured,
                    failed = report.failed,
                    "capture sweep job done"
                ),
                Err(e) => tracing::error!("capture sweep job failed: {}", e),
            }
        }
    });

    tokio::join!(close_loop, due_loop, capture_loop);
}

async fn run_cron<F, Fut>(expression: String, name: &'static str, job: F)
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    let schedule = match Schedule::from_str(&expression) {
        Ok(schedule) => schedule,
        Err(e) => {
            tracing::error!(job = name, "invalid cron expression {:?}: {}", expression, e);
            return;
        }
    };

    loop {
        let next = match schedule.upcoming(Utc).next() {
            Some(next) => next,
            None => {
                tracing::warn!(job = name, "cron schedule has no upcoming firings");
                return;
            }
        };

        let wait = (next - Utc::now())
            .to_std()
            .unwrap_or(Duration::from_secs(1));
        sleep(wait).await;

        tracing::debug!(job = name, "job firing");
        job().await;
    }
}
