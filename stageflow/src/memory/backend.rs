//! Memory backend capability and error type.
//!
//! Backends implement the required key-value operations; optional
//! operations default to `OperationNotSupported` so the manager can
//! surface exactly which capability a backend lacks. Backend failures are
//! passed through with their reason intact; the manager never rewrites
//! them.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Errors from the memory manager or a backend.
#[derive(Debug, Clone, Error)]
pub enum MemoryError {
    /// The requested source name is not registered with the manager.
    #[error("unknown memory source: {0}")]
    UnknownSource(String),
    /// No sources are registered, so there is no default to route to.
    #[error("no memory sources configured")]
    NoSources,
    /// The backend does not implement this optional operation.
    #[error("operation not supported: {0}")]
    OperationNotSupported(&'static str),
    /// The backend failed; the reason is the backend's own, untranslated.
    #[error("backend error: {0}")]
    Backend(String),
}

/// One hit from a backend search.
///
/// `score` is a relevance value for backends that rank (e.g. vector
/// stores); key-value backends return `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub key: String,
    pub value: Value,
    pub score: Option<f64>,
}

/// Update function applied inside [`MemoryBackend::update`]: receives the
/// current value (if any) and returns the replacement.
pub type UpdateFn = Box<dyn FnOnce(Option<Value>) -> Value + Send>;

/// Memory backend capability.
///
/// Required: `store`, `retrieve`, `search`, `delete`, `list_keys`.
/// Everything else is optional; the default implementations return
/// [`MemoryError::OperationNotSupported`] naming the operation, which the
/// manager surfaces unchanged.
///
/// Concrete persistent backends (tables, vector stores) live outside the
/// core; [`InMemoryBackend`](crate::memory::InMemoryBackend) is the
/// bundled reference implementation.
#[async_trait]
pub trait MemoryBackend: Send + Sync {
    /// One-time setup with the source's configured opts. Default: no-op.
    async fn init(&self, _opts: &Value) -> Result<(), MemoryError> {
        Ok(())
    }

    /// Teardown when the source is removed or the agent terminates.
    /// Default: no-op.
    async fn terminate(&self) -> Result<(), MemoryError> {
        Ok(())
    }

    /// Stores `value` under `key`, replacing any existing value.
    async fn store(&self, key: &str, value: &Value) -> Result<(), MemoryError>;

    /// Returns the value for `key`, or `None` when absent.
    async fn retrieve(&self, key: &str) -> Result<Option<Value>, MemoryError>;

    /// Searches stored values with a backend-defined query.
    async fn search(&self, query: &Value, limit: Option<usize>)
        -> Result<Vec<SearchHit>, MemoryError>;

    /// Deletes the value for `key`; absent keys are not an error.
    async fn delete(&self, key: &str) -> Result<(), MemoryError>;

    /// Returns all keys, in a backend-defined (but stable) order.
    async fn list_keys(&self) -> Result<Vec<String>, MemoryError>;

    /// Stores several key-value pairs.
    async fn store_many(&self, _items: &[(String, Value)]) -> Result<(), MemoryError> {
        Err(MemoryError::OperationNotSupported("store_many"))
    }

    /// Retrieves several keys; each slot is `None` when absent.
    async fn retrieve_many(&self, _keys: &[String]) -> Result<Vec<Option<Value>>, MemoryError> {
        Err(MemoryError::OperationNotSupported("retrieve_many"))
    }

    /// Counts entries matching the query.
    async fn count(&self, _query: &Value) -> Result<usize, MemoryError> {
        Err(MemoryError::OperationNotSupported("count"))
    }

    /// Atomically replaces the value at `key` with `f(current)`.
    async fn update(&self, _key: &str, _f: UpdateFn) -> Result<Value, MemoryError> {
        Err(MemoryError::OperationNotSupported("update"))
    }

    /// Deletes several keys.
    async fn delete_many(&self, _keys: &[String]) -> Result<(), MemoryError> {
        Err(MemoryError::OperationNotSupported("delete_many"))
    }

    /// True when `key` has a value.
    async fn exists(&self, _key: &str) -> Result<bool, MemoryError> {
        Err(MemoryError::OperationNotSupported("exists"))
    }

    /// Removes every entry.
    async fn clear(&self) -> Result<(), MemoryError> {
        Err(MemoryError::OperationNotSupported("clear"))
    }

    /// Backend self-description (entry count, capabilities, ...).
    async fn info(&self) -> Result<Value, MemoryError> {
        Err(MemoryError::OperationNotSupported("info"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MinimalBackend;

    #[async_trait]
    impl MemoryBackend for MinimalBackend {
        async fn store(&self, _key: &str, _value: &Value) -> Result<(), MemoryError> {
            Ok(())
        }
        async fn retrieve(&self, _key: &str) -> Result<Option<Value>, MemoryError> {
            Ok(None)
        }
        async fn search(
            &self,
            _query: &Value,
            _limit: Option<usize>,
        ) -> Result<Vec<SearchHit>, MemoryError> {
            Ok(vec![])
        }
        async fn delete(&self, _key: &str) -> Result<(), MemoryError> {
            Ok(())
        }
        async fn list_keys(&self) -> Result<Vec<String>, MemoryError> {
            Ok(vec![])
        }
    }

    /// **Scenario**: A backend implementing only the required operations
    /// reports OperationNotSupported naming each optional op.
    #[tokio::test]
    async fn optional_operations_default_to_not_supported() {
        let backend = MinimalBackend;
        let err = backend.store_many(&[]).await.unwrap_err();
        assert!(matches!(err, MemoryError::OperationNotSupported("store_many")));
        let err = backend.count(&Value::Null).await.unwrap_err();
        assert!(matches!(err, MemoryError::OperationNotSupported("count")));
        let err = backend.exists("k").await.unwrap_err();
        assert!(matches!(err, MemoryError::OperationNotSupported("exists")));
        let err = backend.clear().await.unwrap_err();
        assert!(matches!(err, MemoryError::OperationNotSupported("clear")));
        let err = backend.info().await.unwrap_err();
        assert!(matches!(err, MemoryError::OperationNotSupported("info")));
    }

    /// **Scenario**: Default init and terminate succeed without overrides.
    #[tokio::test]
    async fn default_lifecycle_is_noop() {
        let backend = MinimalBackend;
        assert!(backend.init(&Value::Null).await.is_ok());
        assert!(backend.terminate().await.is_ok());
    }
}
