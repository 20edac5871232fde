//! Guest grade recomputation from the ledger.

use std::sync::Arc;
use uuid::Uuid;

use crate::domain::grade::grade_for_points;
use crate::domain::Grade;
use crate::error::AppError;
use crate::ports::{AccountRepository, LedgerRepository};

pub struct GradeService {
    ledger: Arc<dyn LedgerRepository>,
    accounts: Arc<dyn AccountRepository>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct GradeOutcome {
    pub grade: Grade,
    pub total_buy_points: i64,
    pub changed: bool,
}

impl GradeService {
    pub fn new(ledger: Arc<dyn LedgerRepository>, accounts: Arc<dyn AccountRepository>) -> Self {
        Self { ledger, accounts }
    }

    /// Fold the guest's buy-type ledger rows into a tier. The recomputed
    /// total is always persisted; the tier and its timestamp only change
    /// when the ladder position moved.
    pub async fn recompute(&self, guest_id: Uuid) -> Result<GradeOutcome, AppError> {
        let guest = self.accounts.guest(guest_id).await?;
        let total = self.ledger.sum_buy_points(guest_id).await?;
        let grade = grade_for_points(total);
        let changed = grade != guest.grade;

        self.accounts
            .update_guest_grade(guest_id, grade, total, changed)
            .await?;

        if changed {
            tracing::info!(
                guest_id = %guest_id,
                from = guest.grade.as_str(),
                to = grade.as_str(),
                total_buy_points = total,
                "guest grade changed"
            );
        }

        Ok(GradeOutcome {
            grade,
            total_buy_points: total,
            changed,
        })
    }
}
