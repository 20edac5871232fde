//! Postgres implementation of payout persistence.
//!
//! Locking contract: `create_claiming` and `release_claims` run inside one
//! transaction; candidate ledger rows are taken `FOR UPDATE` and re-verified
//! before the claim is written, so two concurrent payout computations can
//! never claim the same row.

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{CastPayout, PayoutStatus, PayoutType};
use crate::ports::{PayoutRepository, RepositoryError, RepositoryResult};

#[derive(Clone)]
pub struct PostgresPayoutRepository {
    pool: PgPool,
}

impl PostgresPayoutRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn status_strings(statuses: &[PayoutStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

const OPEN_SCHEDULED: &str = r#"
    SELECT EXISTS (
        SELECT 1 FROM cast_payouts
        WHERE cast_id = $1
          AND closing_month = $2
          AND payout_type = 'scheduled'
          AND status IN ('scheduled', 'pending', 'processing')
    )
"#;

#[async_trait]
impl PayoutRepository for PostgresPayoutRepository {
    async fn create_claiming(
        &self,
        payout: &CastPayout,
        entry_ids: &[Uuid],
    ) -> RepositoryResult<CastPayout> {
        let mut tx = self.pool.begin().await?;

        if payout.payout_type == PayoutType::Scheduled {
            let open: bool = sqlx::query_scalar(OPEN_SCHEDULED)
                .bind(payout.cast_id)
                .bind(&payout.closing_month)
                .fetch_one(&mut *tx)
                .await?;
            if open {
                tx.rollback().await?;
                return Err(RepositoryError::Conflict(format!(
                    "open scheduled payout already exists for cast {} in {}",
                    payout.cast_id, payout.closing_month
                )));
            }
        }

        // Lock the candidates and re-verify none were claimed since they
        // were read outside this transaction.
        let unclaimed: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM point_transactions
            WHERE id = ANY($1) AND cast_payout_id IS NULL
            FOR UPDATE
            "#,
        )
        .bind(entry_ids)
        .fetch_all(&mut *tx)
        .await?;

        if unclaimed.len() != entry_ids.len() {
            tx.rollback().await?;
            return Err(RepositoryError::Conflict(format!(
                "{} of {} candidate ledger rows already claimed",
                entry_ids.len() - unclaimed.len(),
                entry_ids.len()
            )));
        }

        let saved = sqlx::query_as::<_, CastPayout>(
            r#"
            INSERT INTO cast_payouts (
                id, cast_id, payout_type, closing_month, period_start, period_end,
                total_points, conversion_rate, gross_amount_yen, fee_rate,
                fee_amount_yen, net_amount_yen, transaction_count,
                scheduled_payout_date, status, metadata, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            RETURNING *
            "#,
        )
        .bind(payout.id)
        .bind(payout.cast_id)
        .bind(payout.payout_type.as_str())
        .bind(&payout.closing_month)
        .bind(payout.period_start)
        .bind(payout.period_end)
        .bind(payout.total_points)
        .bind(&payout.conversion_rate)
        .bind(payout.gross_amount_yen)
        .bind(&payout.fee_rate)
        .bind(payout.fee_amount_yen)
        .bind(payout.net_amount_yen)
        .bind(payout.transaction_count)
        .bind(payout.scheduled_payout_date)
        .bind(payout.status.as_str())
        .bind(&payout.metadata)
        .bind(payout.created_at)
        .bind(payout.updated_at)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE point_transactions SET cast_payout_id = $1 WHERE id = ANY($2)")
            .bind(saved.id)
            .bind(entry_ids)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(saved)
    }

    async fn get(&self, id: Uuid) -> RepositoryResult<CastPayout> {
        sqlx::query_as::<_, CastPayout>("SELECT * FROM cast_payouts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("payout {}", id)))
    }

    async fn list(&self, limit: i64, offset: i64) -> RepositoryResult<Vec<CastPayout>> {
        let rows = sqlx::query_as::<_, CastPayout>(
            "SELECT * FROM cast_payouts ORDER BY created_at DESC LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn due(&self, run_date: NaiveDate) -> RepositoryResult<Vec<CastPayout>> {
        let rows = sqlx::query_as::<_, CastPayout>(
            r#"
            SELECT * FROM cast_payouts
            WHERE status IN ('scheduled', 'pending')
              AND scheduled_payout_date <= $1
            ORDER BY scheduled_payout_date ASC
            "#,
        )
        .bind(run_date)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn exists_open_scheduled(
        &self,
        cast_id: Uuid,
        closing_month: &str,
    ) -> RepositoryResult<bool> {
        let open: bool = sqlx::query_scalar(OPEN_SCHEDULED)
            .bind(cast_id)
            .bind(closing_month)
            .fetch_one(&self.pool)
            .await?;

        Ok(open)
    }

    async fn transition(
        &self,
        id: Uuid,
        from: &[PayoutStatus],
        to: PayoutStatus,
    ) -> RepositoryResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE cast_payouts SET status = $2, updated_at = NOW()
            WHERE id = $1 AND status = ANY($3)
            "#,
        )
        .bind(id)
        .bind(to.as_str())
        .bind(status_strings(from))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn merge_metadata(&self, id: Uuid, patch: serde_json::Value) -> RepositoryResult<()> {
        sqlx::query(
            "UPDATE cast_payouts SET metadata = metadata || $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(patch)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn release_claims(
        &self,
        id: Uuid,
        from: &[PayoutStatus],
        to: PayoutStatus,
    ) -> RepositoryResult<bool> {
        let mut tx = self.pool.begin().await?;

        let moved = sqlx::query(
            r#"
            UPDATE cast_payouts SET status = $2, updated_at = NOW()
            WHERE id = $1 AND status = ANY($3)
            "#,
        )
        .bind(id)
        .bind(to.as_str())
        .bind(status_strings(from))
        .execute(&mut *tx)
        .await?;

        if moved.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query("UPDATE point_transactions SET cast_payout_id = NULL WHERE cast_payout_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }
}
