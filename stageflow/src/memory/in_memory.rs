//! In-memory backend. Not persistent.
//!
//! The reference [`MemoryBackend`] used in tests and examples. Search is
//! substring/subset matching only; ranked semantic search belongs to
//! external vector backends.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::backend::{MemoryBackend, MemoryError, SearchHit, UpdateFn};

/// In-memory key-value backend with every optional operation implemented.
///
/// **Interaction**: Registered as a backend factory in the
/// [`Registry`](crate::registry::Registry); created per memory source at
/// coordinator init.
pub struct InMemoryBackend {
    entries: Arc<RwLock<HashMap<String, Value>>>,
}

impl InMemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// True when the stored value matches the query: a string query
    /// matches a substring of the serialized value; an object query
    /// matches when every query field equals the stored object's field.
    fn matches(value: &Value, query: &Value) -> bool {
        match query {
            Value::Null => true,
            Value::String(q) => value.to_string().contains(q.as_str()),
            Value::Object(fields) => fields
                .iter()
                .all(|(k, qv)| value.get(k).map(|v| v == qv).unwrap_or(false)),
            other => value == other,
        }
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemoryBackend for InMemoryBackend {
    async fn store(&self, key: &str, value: &Value) -> Result<(), MemoryError> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn retrieve(&self, key: &str) -> Result<Option<Value>, MemoryError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn search(
        &self,
        query: &Value,
        limit: Option<usize>,
    ) -> Result<Vec<SearchHit>, MemoryError> {
        let guard = self.entries.read().await;
        let mut hits: Vec<SearchHit> = guard
            .iter()
            .filter(|(_, v)| Self::matches(v, query))
            .map(|(k, v)| SearchHit {
                key: k.clone(),
                value: v.clone(),
                score: None,
            })
            .collect();
        hits.sort_by(|a, b| a.key.cmp(&b.key));
        if let Some(limit) = limit {
            hits.truncate(limit);
        }
        Ok(hits)
    }

    async fn delete(&self, key: &str) -> Result<(), MemoryError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn list_keys(&self) -> Result<Vec<String>, MemoryError> {
        let mut keys: Vec<String> = self.entries.read().await.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    async fn store_many(&self, items: &[(String, Value)]) -> Result<(), MemoryError> {
        let mut guard = self.entries.write().await;
        for (key, value) in items {
            guard.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    async fn retrieve_many(&self, keys: &[String]) -> Result<Vec<Option<Value>>, MemoryError> {
        let guard = self.entries.read().await;
        Ok(keys.iter().map(|k| guard.get(k).cloned()).collect())
    }

    async fn count(&self, query: &Value) -> Result<usize, MemoryError> {
        let guard = self.entries.read().await;
        Ok(guard.values().filter(|v| Self::matches(v, query)).count())
    }

    async fn update(&self, key: &str, f: UpdateFn) -> Result<Value, MemoryError> {
        let mut guard = self.entries.write().await;
        let current = guard.get(key).cloned();
        let next = f(current);
        guard.insert(key.to_string(), next.clone());
        Ok(next)
    }

    async fn delete_many(&self, keys: &[String]) -> Result<(), MemoryError> {
        let mut guard = self.entries.write().await;
        for key in keys {
            guard.remove(key);
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, MemoryError> {
        Ok(self.entries.read().await.contains_key(key))
    }

    async fn clear(&self) -> Result<(), MemoryError> {
        self.entries.write().await.clear();
        Ok(())
    }

    async fn info(&self) -> Result<Value, MemoryError> {
        let len = self.entries.read().await.len();
        Ok(serde_json::json!({
            "backend": "in_memory",
            "persistent": false,
            "entries": len,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// **Scenario**: store then retrieve returns the stored value.
    #[tokio::test]
    async fn store_retrieve_roundtrip() {
        let backend = InMemoryBackend::new();
        backend.store("k", &json!({"v": 1})).await.unwrap();
        assert_eq!(backend.retrieve("k").await.unwrap(), Some(json!({"v": 1})));
        assert_eq!(backend.retrieve("missing").await.unwrap(), None);
    }

    /// **Scenario**: delete removes the key; deleting an absent key is not an error.
    #[tokio::test]
    async fn delete_is_idempotent() {
        let backend = InMemoryBackend::new();
        backend.store("k", &json!(1)).await.unwrap();
        backend.delete("k").await.unwrap();
        assert_eq!(backend.retrieve("k").await.unwrap(), None);
        backend.delete("k").await.unwrap();
    }

    /// **Scenario**: list_keys is sorted; clear empties the backend.
    #[tokio::test]
    async fn list_keys_sorted_and_clear() {
        let backend = InMemoryBackend::new();
        backend.store("b", &json!(2)).await.unwrap();
        backend.store("a", &json!(1)).await.unwrap();
        assert_eq!(backend.list_keys().await.unwrap(), ["a", "b"]);
        backend.clear().await.unwrap();
        assert!(backend.list_keys().await.unwrap().is_empty());
    }

    /// **Scenario**: A string query matches substrings; an object query
    /// matches field subsets; count agrees with search.
    #[tokio::test]
    async fn search_and_count_by_query() {
        let backend = InMemoryBackend::new();
        backend
            .store("u1", &json!({"name": "ada", "role": "admin"}))
            .await
            .unwrap();
        backend
            .store("u2", &json!({"name": "bob", "role": "user"}))
            .await
            .unwrap();

        let hits = backend.search(&json!("ada"), None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].key, "u1");
        assert!(hits[0].score.is_none());

        let hits = backend.search(&json!({"role": "user"}), None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].key, "u2");

        assert_eq!(backend.count(&json!({"role": "admin"})).await.unwrap(), 1);
        assert_eq!(backend.count(&Value::Null).await.unwrap(), 2);
    }

    /// **Scenario**: search with a limit truncates results after sorting by key.
    #[tokio::test]
    async fn search_limit_truncates() {
        let backend = InMemoryBackend::new();
        for k in ["c", "a", "b"] {
            backend.store(k, &json!("same")).await.unwrap();
        }
        let hits = backend.search(&json!("same"), Some(2)).await.unwrap();
        let keys: Vec<_> = hits.iter().map(|h| h.key.as_str()).collect();
        assert_eq!(keys, ["a", "b"]);
    }

    /// **Scenario**: update applies the function to the current value.
    #[tokio::test]
    async fn update_applies_function() {
        let backend = InMemoryBackend::new();
        backend.store("n", &json!(1)).await.unwrap();
        let next = backend
            .update(
                "n",
                Box::new(|cur| json!(cur.and_then(|v| v.as_i64()).unwrap_or(0) + 1)),
            )
            .await
            .unwrap();
        assert_eq!(next, json!(2));
        assert_eq!(backend.retrieve("n").await.unwrap(), Some(json!(2)));

        // Absent key: the function sees None.
        let next = backend
            .update("fresh", Box::new(|cur| json!(cur.is_none())))
            .await
            .unwrap();
        assert_eq!(next, json!(true));
    }

    /// **Scenario**: store_many / retrieve_many / delete_many / exists round-trip.
    #[tokio::test]
    async fn bulk_operations() {
        let backend = InMemoryBackend::new();
        backend
            .store_many(&[("a".into(), json!(1)), ("b".into(), json!(2))])
            .await
            .unwrap();
        let values = backend
            .retrieve_many(&["a".into(), "missing".into(), "b".into()])
            .await
            .unwrap();
        assert_eq!(values, vec![Some(json!(1)), None, Some(json!(2))]);
        assert!(backend.exists("a").await.unwrap());
        backend.delete_many(&["a".into(), "b".into()]).await.unwrap();
        assert!(!backend.exists("a").await.unwrap());
    }

    /// **Scenario**: info reports the backend name and entry count.
    #[tokio::test]
    async fn info_reports_entries() {
        let backend = InMemoryBackend::new();
        backend.store("k", &json!(1)).await.unwrap();
        let info = backend.info().await.unwrap();
        assert_eq!(info["backend"], "in_memory");
        assert_eq!(info["entries"], 1);
    }
}
