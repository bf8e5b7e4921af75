/// PostgreSQL-backed stores
///
/// Tables are created by the migrations under `migrations/`:
/// - `refresh_tokens(refresh_id UUID PRIMARY KEY, hash TEXT, created_at TIMESTAMPTZ)`
/// - `users(guid UUID PRIMARY KEY, username TEXT, email TEXT)`

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::StorageError;
use crate::store::{Account, AccountDirectory, RefreshTokenStore, RotationOutcome, VerificationRecord};

#[derive(Clone)]
pub struct PgRefreshTokenStore {
    pool: PgPool,
}

impl PgRefreshTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RefreshTokenStore for PgRefreshTokenStore {
    async fn insert(&self, record: &VerificationRecord) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (refresh_id, hash, created_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(record.id)
        .bind(&record.hash)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fetch_hash(&self, id: Uuid) -> Result<Option<String>, StorageError> {
        let hash = sqlx::query_scalar::<_, String>(
            "SELECT hash FROM refresh_tokens WHERE refresh_id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(hash)
    }

    /// The DELETE takes the row lock, so a concurrent rotation of the same
    /// record waits and then sees zero affected rows.
    async fn rotate(
        &self,
        consumed: Uuid,
        replacement: VerificationRecord,
    ) -> Result<RotationOutcome, StorageError> {
        let mut transaction = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM refresh_tokens WHERE refresh_id = $1")
            .bind(consumed)
            .execute(&mut transaction)
            .await?;

        if deleted.rows_affected() != 1 {
            transaction.rollback().await?;
            return Ok(RotationOutcome::Missing);
        }

        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (refresh_id, hash, created_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(replacement.id)
        .bind(&replacement.hash)
        .bind(Utc::now())
        .execute(&mut transaction)
        .await?;

        transaction
            .commit()
            .await
            .map_err(|e| StorageError::TransactionAborted(e.to_string()))?;

        Ok(RotationOutcome::Rotated)
    }
}

#[derive(Clone)]
pub struct PgAccountDirectory {
    pool: PgPool,
}

impl PgAccountDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountDirectory for PgAccountDirectory {
    async fn exists(&self, subject: &str) -> Result<bool, StorageError> {
        let Ok(guid) = Uuid::parse_str(subject) else {
            return Ok(false);
        };

        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM users WHERE guid = $1)",
        )
        .bind(guid)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn find_by_subject(&self, subject: &str) -> Result<Option<Account>, StorageError> {
        let Ok(guid) = Uuid::parse_str(subject) else {
            return Ok(None);
        };

        let account = sqlx::query_as::<_, (String, String)>(
            "SELECT username, email FROM users WHERE guid = $1",
        )
        .bind(guid)
        .fetch_optional(&self.pool)
        .await?
        .map(|(username, email)| Account { username, email });

        Ok(account)
    }
}
