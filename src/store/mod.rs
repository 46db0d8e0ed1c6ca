//! The store gateway.
//! Both handlers only talk to the store through the `UserStore` trait, so the
//! backend can be swapped between BigQuery and the in-process `MemoryStore`.

mod bigquery;
mod memory;

pub use bigquery::{BigQueryClient, TokenSource};
pub use memory::MemoryStore;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    config::{StoreBackend, StoreConfig},
    model::UserRecord,
};

/// Row error reason reported by stores that reject an insert because the `user_id` is taken.
pub const DUPLICATE_REASON: &str = "duplicate";

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Short name of the backend, recorded on every request span.
    fn backend(&self) -> &'static str;
    /// Number of stored records carrying `user_id`.
    async fn count_by_user_id(&self, user_id: &str) -> Result<u64>;
    /// Appends `record`. An empty `Vec` means the row was accepted.
    async fn insert_record(&self, record: &UserRecord) -> Result<Vec<InsertRowError>>;
    /// Every stored record, in whatever order the store yields them.
    async fn list_all(&self) -> Result<Vec<UserRecord>>;
}

/// A row level insertion error, shaped like BigQuery's `insertErrors` entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertRowError {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub errors: Vec<ErrorProto>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorProto {
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub message: String,
}

impl InsertRowError {
    pub fn new(index: u32, reason: impl Into<String>, message: impl Into<String>) -> Self {
        InsertRowError {
            index,
            errors: vec![ErrorProto {
                reason: reason.into(),
                location: String::new(),
                message: message.into(),
            }],
        }
    }

    pub fn is_duplicate(&self) -> bool {
        self.errors.iter().any(|er| er.reason == DUPLICATE_REASON)
    }
}

/// Builds the process wide store client selected by `store_config.backend`.
pub async fn init_store(store_config: &StoreConfig) -> Result<Arc<dyn UserStore>> {
    info!(
        "{:<12} - Initializing the {:?} store",
        "init_store", store_config.backend
    );
    let store: Arc<dyn UserStore> = match store_config.backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::BigQuery => Arc::new(BigQueryClient::from_config(store_config).await?),
    };
    Ok(store)
}

// ###################################
// ->   ERROR
// ###################################
pub type Result<T> = core::result::Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("url parsing error: {0}")]
    UrlParsing(String),
    #[error("query job did not complete in time: {job_id}")]
    JobIncomplete { job_id: String },
    #[error("query result is missing the schema")]
    MissingSchema,
    #[error("query result is missing column: {0}")]
    MissingColumn(&'static str),
    #[error("failed to decode row {row}: {reason}")]
    RowDecode { row: usize, reason: String },

    #[error("gcp auth error: {0}")]
    Auth(#[from] gcp_auth::Error),
    #[error("config error: {0}")]
    Config(#[from] crate::config::ConfigError),
    #[error("reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
}
