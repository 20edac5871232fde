//! Postgres implementation of the point ledger.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{EntryType, PointTransaction};
use crate::ports::{LedgerRepository, RepositoryError, RepositoryResult};

#[derive(Clone)]
pub struct PostgresLedgerRepository {
    pool: PgPool,
}

impl PostgresLedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerRepository for PostgresLedgerRepository {
    async fn insert(&self, entry: &PointTransaction) -> RepositoryResult<PointTransaction> {
        let row = sqlx::query_as::<_, PointTransaction>(
            r#"
            INSERT INTO point_transactions (
                id, guest_id, cast_id, entry_type, amount,
                reservation_id, payment_id, cast_payout_id, description, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(entry.id)
        .bind(entry.guest_id)
        .bind(entry.cast_id)
        .bind(entry.entry_type.as_str())
        .bind(entry.amount)
        .bind(entry.reservation_id)
        .bind(entry.payment_id)
        .bind(entry.cast_payout_id)
        .bind(&entry.description)
        .bind(entry.created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn unsettled_balance(&self, cast_id: Uuid) -> RepositoryResult<i64> {
        let sum: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(amount), 0)::BIGINT
            FROM point_transactions
            WHERE cast_id = $1
              AND entry_type IN ('transfer', 'gift')
              AND cast_payout_id IS NULL
            "#,
        )
        .bind(cast_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(sum)
    }

    async fn unclaimed_earnable(&self, cast_id: Uuid) -> RepositoryResult<Vec<PointTransaction>> {
        let rows = sqlx::query_as::<_, PointTransaction>(
            r#"
            SELECT * FROM point_transactions
            WHERE cast_id = $1
              AND entry_type IN ('transfer', 'gift')
              AND cast_payout_id IS NULL
            ORDER BY created_at ASC
            "#,
        )
        .bind(cast_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn unclaimed_earnable_between(
        &self,
        cast_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> RepositoryResult<Vec<PointTransaction>> {
        let rows = sqlx::query_as::<_, PointTransaction>(
            r#"
            SELECT * FROM point_transactions
            WHERE cast_id = $1
              AND entry_type IN ('transfer', 'gift')
              AND cast_payout_id IS NULL
              AND created_at >= $2
              AND created_at <= $3
            ORDER BY created_at ASC
            "#,
        )
        .bind(cast_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn casts_with_unclaimed_earnings(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> RepositoryResult<Vec<Uuid>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT cast_id FROM point_transactions
            WHERE cast_id IS NOT NULL
              AND entry_type IN ('transfer', 'gift')
              AND cast_payout_id IS NULL
              AND created_at >= $1
              AND created_at <= $2
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    async fn sum_buy_points(&self, guest_id: Uuid) -> RepositoryResult<i64> {
        let sum: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(amount), 0)::BIGINT
            FROM point_transactions
            WHERE guest_id = $1 AND entry_type = 'buy'
            "#,
        )
        .bind(guest_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(sum)
    }

    async fn claimed_by(&self, payout_id: Uuid) -> RepositoryResult<Vec<PointTransaction>> {
        let rows = sqlx::query_as::<_, PointTransaction>(
            "SELECT * FROM point_transactions WHERE cast_payout_id = $1 ORDER BY created_at ASC",
        )
        .bind(payout_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn record_automatic_purchase(
        &self,
        guest_id: Uuid,
        payment_id: Uuid,
        points: i64,
        reservation_id: Option<Uuid>,
        description: &str,
    ) -> RepositoryResult<()> {
        let mut tx = self.pool.begin().await?;

        let credit = PointTransaction::guest_entry(
            guest_id,
            EntryType::Buy,
            points,
            reservation_id,
            Some(payment_id),
            description,
        );
        let debit = PointTransaction::guest_entry(
            guest_id,
            EntryType::ExceededPending,
            -points,
            reservation_id,
            Some(payment_id),
            description,
        );

        for entry in [&credit, &debit] {
            sqlx::query(
                r#"
                INSERT INTO point_transactions (
                    id, guest_id, cast_id, entry_type, amount,
                    reservation_id, payment_id, cast_payout_id, description, created_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(entry.id)
            .bind(entry.guest_id)
            .bind(entry.cast_id)
            .bind(entry.entry_type.as_str())
            .bind(entry.amount)
            .bind(entry.reservation_id)
            .bind(entry.payment_id)
            .bind(entry.cast_payout_id)
            .bind(&entry.description)
            .bind(entry.created_at)
            .execute(&mut *tx)
            .await?;
        }

        let updated = sqlx::query(
            "UPDATE guests SET points = points + $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(guest_id)
        .bind(points)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(RepositoryError::NotFound(format!("guest {}", guest_id)));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn revoke_automatic_purchase(
        &self,
        payment_id: Uuid,
        description: &str,
    ) -> RepositoryResult<()> {
        let mut tx = self.pool.begin().await?;

        let credited: Option<(Option<Uuid>, i64)> = sqlx::query_as(
            r#"
            SELECT guest_id, amount FROM point_transactions
            WHERE payment_id = $1 AND entry_type = 'buy'
            FOR UPDATE
            "#,
        )
        .bind(payment_id)
        .fetch_optional(&mut *tx)
        .await?;

        let (guest_id, amount) = match credited {
            Some((Some(guest_id), amount)) => (guest_id, amount),
            _ => {
                return Err(RepositoryError::NotFound(format!(
                    "ledger rows for payment {}",
                    payment_id
                )))
            }
        };

        sqlx::query("UPDATE guests SET points = points - $2, updated_at = NOW() WHERE id = $1")
            .bind(guest_id)
            .bind(amount)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE point_transactions SET description = $2 WHERE payment_id = $1")
            .bind(payment_id)
            .bind(description)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn relabel_payment_entries(
        &self,
        payment_id: Uuid,
        description: &str,
    ) -> RepositoryResult<()> {
        sqlx::query("UPDATE point_transactions SET description = $2 WHERE payment_id = $1")
            .bind(payment_id)
            .bind(description)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
