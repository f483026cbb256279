//! Persistence abstraction the engine builds on.

use async_trait::async_trait;

use crate::error::StoreError;

/// Minimal async key-value surface.
///
/// Values are opaque JSON strings; schema belongs to the caller.
/// Implementations must be safe for concurrent use from multiple tasks.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError>;

    async fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Keys beginning with `prefix`, in unspecified order.
    async fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}
