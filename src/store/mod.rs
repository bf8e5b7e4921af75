/// Storage seams for the token service
///
/// `RefreshTokenStore` owns the refresh verification records; the existence
/// of a record is the only thing that makes a refresh token live.
/// `AccountDirectory` is the read-only view of user accounts.

mod memory;
mod postgres;

pub use memory::{MemoryAccountDirectory, MemoryRefreshTokenStore};
pub use postgres::{PgAccountDirectory, PgRefreshTokenStore};

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StorageError;

/// Persisted proof for one live refresh token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationRecord {
    pub id: Uuid,
    pub hash: String,
}

/// Result of swapping a consumed refresh record for its replacement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationOutcome {
    /// The consumed record was deleted and the replacement inserted
    Rotated,
    /// The consumed record was already gone; nothing was written
    Missing,
}

#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn insert(&self, record: &VerificationRecord) -> Result<(), StorageError>;

    async fn fetch_hash(&self, id: Uuid) -> Result<Option<String>, StorageError>;

    /// Delete `consumed` and insert `replacement` as one atomic unit.
    async fn rotate(
        &self,
        consumed: Uuid,
        replacement: VerificationRecord,
    ) -> Result<RotationOutcome, StorageError>;
}

/// Account details needed by the token service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub username: String,
    pub email: String,
}

#[async_trait]
pub trait AccountDirectory: Send + Sync {
    async fn exists(&self, subject: &str) -> Result<bool, StorageError>;

    async fn find_by_subject(&self, subject: &str) -> Result<Option<Account>, StorageError>;
}
