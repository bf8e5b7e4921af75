//! In-process stores for local development and tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StorageError;
use crate::store::{Account, AccountDirectory, RefreshTokenStore, RotationOutcome, VerificationRecord};

type RecordMap = HashMap<Uuid, String>;

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StorageError> {
    mutex
        .lock()
        .map_err(|_| StorageError::Unavailable("in-memory store lock poisoned".to_string()))
}

#[derive(Clone, Default)]
pub struct MemoryRefreshTokenStore {
    records: Arc<Mutex<RecordMap>>,
}

impl MemoryRefreshTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live refresh records
    pub fn len(&self) -> usize {
        self.records.lock().map(|records| records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.records
            .lock()
            .map(|records| records.contains_key(&id))
            .unwrap_or(false)
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryRefreshTokenStore {
    async fn insert(&self, record: &VerificationRecord) -> Result<(), StorageError> {
        let mut records = lock(&self.records)?;
        if records.contains_key(&record.id) {
            return Err(StorageError::UniqueConstraintViolation(format!(
                "refresh record {} already exists",
                record.id
            )));
        }
        records.insert(record.id, record.hash.clone());
        Ok(())
    }

    async fn fetch_hash(&self, id: Uuid) -> Result<Option<String>, StorageError> {
        Ok(lock(&self.records)?.get(&id).cloned())
    }

    async fn rotate(
        &self,
        consumed: Uuid,
        replacement: VerificationRecord,
    ) -> Result<RotationOutcome, StorageError> {
        let mut records = lock(&self.records)?;
        if records.contains_key(&replacement.id) {
            return Err(StorageError::UniqueConstraintViolation(format!(
                "refresh record {} already exists",
                replacement.id
            )));
        }
        if records.remove(&consumed).is_none() {
            return Ok(RotationOutcome::Missing);
        }
        records.insert(replacement.id, replacement.hash);
        Ok(RotationOutcome::Rotated)
    }
}

#[derive(Clone, Default)]
pub struct MemoryAccountDirectory {
    accounts: Arc<Mutex<HashMap<String, Account>>>,
}

impl MemoryAccountDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(self, subject: &str, username: &str, email: &str) -> Self {
        self.add(subject, username, email);
        self
    }

    pub fn add(&self, subject: &str, username: &str, email: &str) {
        if let Ok(mut accounts) = self.accounts.lock() {
            accounts.insert(
                subject.to_string(),
                Account {
                    username: username.to_string(),
                    email: email.to_string(),
                },
            );
        }
    }

    pub fn remove(&self, subject: &str) {
        if let Ok(mut accounts) = self.accounts.lock() {
            accounts.remove(subject);
        }
    }
}

#[async_trait]
impl AccountDirectory for MemoryAccountDirectory {
    async fn exists(&self, subject: &str) -> Result<bool, StorageError> {
        Ok(lock(&self.accounts)?.contains_key(subject))
    }

    async fn find_by_subject(&self, subject: &str) -> Result<Option<Account>, StorageError> {
        Ok(lock(&self.accounts)?.get(subject).cloned())
    }
}
