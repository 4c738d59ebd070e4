//! Persistent key-value storage for limiter state.
//!
//! The store is the single source of truth for every limiter decision.
//! Actors keep a copy of their record in memory, but any actor may be
//! dropped and rebuilt from the store at any time between calls.

mod memory;

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

pub use memory::MemoryStore;

/// Errors raised by store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store could not be reached or refused the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A record could not be encoded for writing.
    #[error("unencodable record for {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// A persisted record could not be decoded.
    #[error("corrupt record at {key}: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A key-value store whose entries expire after a per-write TTL.
///
/// An expired entry must be indistinguishable from one that was never
/// written.
#[async_trait]
pub trait Store: Send + Sync {
    /// Read the live value stored under `key`.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Write `value` under `key`, replacing any previous value and TTL.
    async fn put(&self, key: &str, value: String, ttl: Duration) -> StoreResult<()>;
}

/// Read and decode a JSON record.
pub async fn load_json<T: DeserializeOwned>(
    store: &dyn Store,
    key: &str,
) -> StoreResult<Option<T>> {
    match store.get(key).await? {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| StoreError::Corrupt {
                key: key.to_string(),
                source,
            }),
        None => Ok(None),
    }
}

/// Encode and write a JSON record with the given TTL.
pub async fn save_json<T: Serialize>(
    store: &dyn Store,
    key: &str,
    record: &T,
    ttl: Duration,
) -> StoreResult<()> {
    let raw = serde_json::to_string(record).map_err(|source| StoreError::Encode {
        key: key.to_string(),
        source,
    })?;
    store.put(key, raw, ttl).await
}
