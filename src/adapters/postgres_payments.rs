//! Postgres implementation of payment persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{Payment, PaymentStatus};
use crate::ports::{PaymentRepository, RepositoryError, RepositoryResult};

#[derive(Clone)]
pub struct PostgresPaymentRepository {
    pool: PgPool,
}

impl PostgresPaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentRepository for PostgresPaymentRepository {
    async fn insert(&self, payment: &Payment) -> RepositoryResult<Payment> {
        let row = sqlx::query_as::<_, Payment>(
            r#"
            INSERT INTO payments (
                id, user_id, user_type, amount_yen, status, payment_method,
                is_automatic, stripe_payment_intent_id, stripe_payout_id,
                stripe_connect_account_id, reservation_id, cast_payout_id,
                metadata, expires_at, paid_at, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            RETURNING *
            "#,
        )
        .bind(payment.id)
        .bind(payment.user_id)
        .bind(payment.user_type.as_str())
        .bind(payment.amount_yen)
        .bind(payment.status.as_str())
        .bind(&payment.payment_method)
        .bind(payment.is_automatic)
        .bind(&payment.stripe_payment_intent_id)
        .bind(&payment.stripe_payout_id)
        .bind(&payment.stripe_connect_account_id)
        .bind(payment.reservation_id)
        .bind(payment.cast_payout_id)
        .bind(&payment.metadata)
        .bind(payment.expires_at)
        .bind(payment.paid_at)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn get(&self, id: Uuid) -> RepositoryResult<Payment> {
        sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("payment {}", id)))
    }

    async fn find_by_intent(&self, intent_id: &str) -> RepositoryResult<Option<Payment>> {
        let row = sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments WHERE stripe_payment_intent_id = $1",
        )
        .bind(intent_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn find_by_provider_payout(&self, payout_id: &str) -> RepositoryResult<Option<Payment>> {
        let row =
            sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE stripe_payout_id = $1")
                .bind(payout_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row)
    }

    async fn find_by_cast_payout(
        &self,
        cast_payout_id: Uuid,
    ) -> RepositoryResult<Option<Payment>> {
        let row = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE cast_payout_id = $1")
            .bind(cast_payout_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    async fn transition(
        &self,
        id: Uuid,
        from: &[PaymentStatus],
        to: PaymentStatus,
        paid_at: Option<DateTime<Utc>>,
    ) -> RepositoryResult<bool> {
        let from: Vec<String> = from.iter().map(|s| s.as_str().to_string()).collect();
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = $2, paid_at = COALESCE($4, paid_at), updated_at = NOW()
            WHERE id = $1 AND status = ANY($3)
            "#,
        )
        .bind(id)
        .bind(to.as_str())
        .bind(from)
        .bind(paid_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn merge_metadata(&self, id: Uuid, patch: serde_json::Value) -> RepositoryResult<()> {
        sqlx::query(
            "UPDATE payments SET metadata = metadata || $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(patch)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn attach_authorization(
        &self,
        id: Uuid,
        intent_id: &str,
        card_last4: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            UPDATE payments
            SET stripe_payment_intent_id = $2, payment_method = $3,
                expires_at = $4, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(intent_id)
        .bind(card_last4)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn due_for_capture(&self, now: DateTime<Utc>) -> RepositoryResult<Vec<Payment>> {
        let rows = sqlx::query_as::<_, Payment>(
            r#"
            SELECT * FROM payments
            WHERE status = 'pending'
              AND is_automatic
              AND expires_at IS NOT NULL
              AND expires_at <= $1
            ORDER BY expires_at ASC
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
