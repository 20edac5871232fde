//! Postgres implementation of guest/cast account state.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{Cast, Grade, Guest};
use crate::ports::{AccountRepository, RepositoryError, RepositoryResult};

#[derive(Clone)]
pub struct PostgresAccountRepository {
    pool: PgPool,
}

impl PostgresAccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountRepository for PostgresAccountRepository {
    async fn guest(&self, id: Uuid) -> RepositoryResult<Guest> {
        sqlx::query_as::<_, Guest>("SELECT * FROM guests WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("guest {}", id)))
    }

    async fn cast(&self, id: Uuid) -> RepositoryResult<Cast> {
        sqlx::query_as::<_, Cast>("SELECT * FROM casts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("cast {}", id)))
    }

    async fn credit_guest_points(&self, id: Uuid, delta: i64) -> RepositoryResult<()> {
        let result =
            sqlx::query("UPDATE guests SET points = points + $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(delta)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("guest {}", id)));
        }
        Ok(())
    }

    async fn debit_cast_points(&self, id: Uuid, points: i64) -> RepositoryResult<()> {
        let result =
            sqlx::query("UPDATE casts SET points = points - $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(points)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("cast {}", id)));
        }
        Ok(())
    }

    async fn update_guest_grade(
        &self,
        id: Uuid,
        grade: Grade,
        grade_points: i64,
        changed: bool,
    ) -> RepositoryResult<()> {
        // The recomputed total is always persisted; the tier timestamp only
        // moves on an actual change.
        let query = if changed {
            sqlx::query(
                r#"
                UPDATE guests
                SET grade = $2, grade_points = $3, grade_updated_at = NOW(), updated_at = NOW()
                WHERE id = $1
                "#,
            )
        } else {
            sqlx::query("UPDATE guests SET grade_points = $3, updated_at = NOW() WHERE id = $1 AND grade = $2")
        };

        let result = query
            .bind(id)
            .bind(grade.as_str())
            .bind(grade_points)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("guest {}", id)));
        }
        Ok(())
    }

    async fn set_guest_customer(&self, id: Uuid, customer_id: &str) -> RepositoryResult<()> {
        let result = sqlx::query(
            "UPDATE guests SET stripe_customer_id = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(customer_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("guest {}", id)));
        }
        Ok(())
    }
}
