use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{InsertRowError, Result, UserStore, DUPLICATE_REASON};
use crate::model::UserRecord;

/// An in-process store, used for the `local` environment and in tests.
/// Its insert is conditional: the uniqueness of `user_id` is re-checked under the write lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<Vec<UserRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn count_by_user_id(&self, user_id: &str) -> Result<u64> {
        let records = self.records.read().await;
        Ok(records.iter().filter(|r| r.user_id == user_id).count() as u64)
    }

    async fn insert_record(&self, record: &UserRecord) -> Result<Vec<InsertRowError>> {
        let mut records = self.records.write().await;
        if records.iter().any(|r| r.user_id == record.user_id) {
            return Ok(vec![InsertRowError::new(
                0,
                DUPLICATE_REASON,
                format!("user_id '{}' already exists", record.user_id),
            )]);
        }
        records.push(record.clone());
        Ok(Vec::new())
    }

    async fn list_all(&self) -> Result<Vec<UserRecord>> {
        Ok(self.records.read().await.clone())
    }
}
