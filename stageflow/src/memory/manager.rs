//! Memory manager: multiplexes operations across named backends.
//!
//! Every operation takes [`MemoryOpts`]; an absent `source` routes to the
//! default source. The manager serializes operations per source with an
//! async mutex (backends may parallelize internally) and owns backend
//! lifecycle: `init` at coordinator startup, `terminate` at teardown or
//! source removal.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::spec::MemorySourceSpec;

use super::backend::{MemoryBackend, MemoryError, SearchHit, UpdateFn};

/// Routing options for one memory operation.
#[derive(Debug, Clone, Default)]
pub struct MemoryOpts {
    /// Source to route to; `None` means the default source.
    pub source: Option<String>,
    /// Result cap for search-style operations.
    pub limit: Option<usize>,
}

impl MemoryOpts {
    /// Routes to the named source.
    pub fn source(name: impl Into<String>) -> Self {
        Self {
            source: Some(name.into()),
            limit: None,
        }
    }

    /// Sets the search result cap.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

struct Source {
    backend: Arc<dyn MemoryBackend>,
    opts: Value,
    description: String,
    /// Serializes operations against this backend.
    op_lock: Arc<Mutex<()>>,
}

struct Inner {
    sources: HashMap<String, Source>,
    /// Source names in registration order; default re-election follows it.
    order: Vec<String>,
    default: Option<String>,
}

/// Cheap-clone handle to the memory manager.
///
/// Shared into every dispatched [`StageContext`](crate::state::StageContext)
/// so tools and callbacks can reach agent memory. The coordinator owns the
/// lifecycle (`init_all` / `terminate_all`).
#[derive(Clone)]
pub struct MemoryManagerHandle {
    inner: Arc<RwLock<Inner>>,
}

impl std::fmt::Debug for MemoryManagerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MemoryManagerHandle")
    }
}

impl Default for MemoryManagerHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryManagerHandle {
    /// Creates an empty manager with no sources.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                sources: HashMap::new(),
                order: Vec::new(),
                default: None,
            })),
        }
    }

    /// Registers a source. The first source added becomes the default;
    /// a source flagged `default` in its spec takes the default slot.
    pub async fn add_source(
        &self,
        spec: &MemorySourceSpec,
        backend: Arc<dyn MemoryBackend>,
    ) {
        let mut inner = self.inner.write().await;
        let first = inner.sources.is_empty();
        if !inner.sources.contains_key(&spec.name) {
            inner.order.push(spec.name.clone());
        }
        inner.sources.insert(
            spec.name.clone(),
            Source {
                backend,
                opts: spec.opts.clone(),
                description: spec.description.clone(),
                op_lock: Arc::new(Mutex::new(())),
            },
        );
        if first || spec.default {
            inner.default = Some(spec.name.clone());
        }
        debug!(source = %spec.name, default = ?inner.default, "memory source added");
    }

    /// Removes a source, terminating its backend when supported. When the
    /// removed source was the default, the earliest remaining source (by
    /// registration order) becomes the new default.
    pub async fn remove_source(&self, name: &str) -> Result<(), MemoryError> {
        let removed = {
            let mut inner = self.inner.write().await;
            let source = inner
                .sources
                .remove(name)
                .ok_or_else(|| MemoryError::UnknownSource(name.to_string()))?;
            inner.order.retain(|n| n != name);
            if inner.default.as_deref() == Some(name) {
                inner.default = inner.order.first().cloned();
            }
            source
        };
        match removed.backend.terminate().await {
            Ok(()) => {}
            Err(MemoryError::OperationNotSupported(_)) => {}
            Err(e) => {
                warn!(source = %name, error = %e, "backend terminate failed on removal");
                return Err(e);
            }
        }
        Ok(())
    }

    /// Initializes every backend with its configured opts, in registration
    /// order. Fails fast on the first backend error.
    pub async fn init_all(&self) -> Result<(), MemoryError> {
        let inner = self.inner.read().await;
        for name in &inner.order {
            let source = &inner.sources[name];
            match source.backend.init(&source.opts).await {
                Ok(()) | Err(MemoryError::OperationNotSupported(_)) => {}
                Err(e) => {
                    warn!(source = %name, error = %e, "memory backend init failed");
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Terminates every backend. Unsupported terminate is not an error;
    /// other failures are logged and do not stop the remaining teardowns.
    pub async fn terminate_all(&self) {
        let inner = self.inner.read().await;
        for name in &inner.order {
            let source = &inner.sources[name];
            match source.backend.terminate().await {
                Ok(()) | Err(MemoryError::OperationNotSupported(_)) => {}
                Err(e) => warn!(source = %name, error = %e, "memory backend terminate failed"),
            }
        }
    }

    /// The current default source name.
    pub async fn default_source(&self) -> Option<String> {
        self.inner.read().await.default.clone()
    }

    /// Registered source names, in registration order.
    pub async fn source_names(&self) -> Vec<String> {
        self.inner.read().await.order.clone()
    }

    async fn resolve(
        &self,
        opts: &MemoryOpts,
    ) -> Result<(Arc<dyn MemoryBackend>, Arc<Mutex<()>>), MemoryError> {
        let inner = self.inner.read().await;
        let name = match &opts.source {
            Some(name) => name.clone(),
            None => inner.default.clone().ok_or(MemoryError::NoSources)?,
        };
        let source = inner
            .sources
            .get(&name)
            .ok_or(MemoryError::UnknownSource(name))?;
        Ok((source.backend.clone(), source.op_lock.clone()))
    }

    /// Stores `value` under `key` in the routed source.
    pub async fn store(&self, key: &str, value: &Value, opts: MemoryOpts) -> Result<(), MemoryError> {
        let (backend, lock) = self.resolve(&opts).await?;
        let _guard = lock.lock().await;
        backend.store(key, value).await
    }

    /// Stores several pairs in the routed source.
    pub async fn store_many(
        &self,
        items: &[(String, Value)],
        opts: MemoryOpts,
    ) -> Result<(), MemoryError> {
        let (backend, lock) = self.resolve(&opts).await?;
        let _guard = lock.lock().await;
        backend.store_many(items).await
    }

    /// Retrieves the value for `key` from the routed source.
    pub async fn retrieve(&self, key: &str, opts: MemoryOpts) -> Result<Option<Value>, MemoryError> {
        let (backend, lock) = self.resolve(&opts).await?;
        let _guard = lock.lock().await;
        backend.retrieve(key).await
    }

    /// Retrieves several keys from the routed source.
    pub async fn retrieve_many(
        &self,
        keys: &[String],
        opts: MemoryOpts,
    ) -> Result<Vec<Option<Value>>, MemoryError> {
        let (backend, lock) = self.resolve(&opts).await?;
        let _guard = lock.lock().await;
        backend.retrieve_many(keys).await
    }

    /// Searches the routed source.
    pub async fn search(&self, query: &Value, opts: MemoryOpts) -> Result<Vec<SearchHit>, MemoryError> {
        let limit = opts.limit;
        let (backend, lock) = self.resolve(&opts).await?;
        let _guard = lock.lock().await;
        backend.search(query, limit).await
    }

    /// Counts matching entries in the routed source.
    pub async fn count(&self, query: &Value, opts: MemoryOpts) -> Result<usize, MemoryError> {
        let (backend, lock) = self.resolve(&opts).await?;
        let _guard = lock.lock().await;
        backend.count(query).await
    }

    /// Applies `f` to the current value at `key` in the routed source.
    pub async fn update(
        &self,
        key: &str,
        f: UpdateFn,
        opts: MemoryOpts,
    ) -> Result<Value, MemoryError> {
        let (backend, lock) = self.resolve(&opts).await?;
        let _guard = lock.lock().await;
        backend.update(key, f).await
    }

    /// Deletes `key` from the routed source.
    pub async fn delete(&self, key: &str, opts: MemoryOpts) -> Result<(), MemoryError> {
        let (backend, lock) = self.resolve(&opts).await?;
        let _guard = lock.lock().await;
        backend.delete(key).await
    }

    /// Deletes several keys from the routed source.
    pub async fn delete_many(&self, keys: &[String], opts: MemoryOpts) -> Result<(), MemoryError> {
        let (backend, lock) = self.resolve(&opts).await?;
        let _guard = lock.lock().await;
        backend.delete_many(keys).await
    }

    /// Lists the routed source's keys.
    pub async fn list_keys(&self, opts: MemoryOpts) -> Result<Vec<String>, MemoryError> {
        let (backend, lock) = self.resolve(&opts).await?;
        let _guard = lock.lock().await;
        backend.list_keys().await
    }

    /// True when `key` exists in the routed source.
    pub async fn exists(&self, key: &str, opts: MemoryOpts) -> Result<bool, MemoryError> {
        let (backend, lock) = self.resolve(&opts).await?;
        let _guard = lock.lock().await;
        backend.exists(key).await
    }

    /// Clears the routed source.
    pub async fn clear(&self, opts: MemoryOpts) -> Result<(), MemoryError> {
        let (backend, lock) = self.resolve(&opts).await?;
        let _guard = lock.lock().await;
        backend.clear().await
    }

    /// Describes every source: default flag, description, and the
    /// backend's own info when it implements the operation.
    pub async fn info(&self) -> Value {
        let inner = self.inner.read().await;
        let mut out = serde_json::Map::new();
        for name in &inner.order {
            let source = &inner.sources[name];
            let backend_info = match source.backend.info().await {
                Ok(v) => v,
                Err(_) => Value::Null,
            };
            out.insert(
                name.clone(),
                serde_json::json!({
                    "default": inner.default.as_deref() == Some(name.as_str()),
                    "description": source.description,
                    "backend": backend_info,
                }),
            );
        }
        Value::Object(out)
    }
}
