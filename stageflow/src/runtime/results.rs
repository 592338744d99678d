//! Accumulated stage results for the current run, plus the archive of
//! prior runs kept for stateful agents.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

/// One archived run: its result map and when it was archived.
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    pub results: HashMap<String, Value>,
    pub archived_at: DateTime<Utc>,
}

/// Stage results for the current run plus an append-only history.
///
/// **Interaction**: Coordinator-owned. Batches commit through
/// [`ResultManager::commit_batch`]; stateful agents call
/// [`ResultManager::archive_current`] when accepting a new inbound
/// message.
#[derive(Debug, Default)]
pub struct ResultManager {
    current: HashMap<String, Value>,
    history: Vec<ExecutionRecord>,
}

impl ResultManager {
    /// Creates an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one stage result. Replaces any existing entry.
    pub fn add(&mut self, name: impl Into<String>, result: Value) {
        self.current.insert(name.into(), result);
    }

    /// Commits a completed batch. On a name conflict the batch entry wins;
    /// conflicts only arise under retry, where the fresher result is the
    /// correct one.
    pub fn commit_batch(&mut self, batch: HashMap<String, Value>) {
        self.current.extend(batch);
    }

    /// The result for a stage, if completed in the current run.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.current.get(name)
    }

    /// All results of the current run.
    pub fn all(&self) -> &HashMap<String, Value> {
        &self.current
    }

    /// Number of completed stages in the current run.
    pub fn completed_count(&self) -> usize {
        self.current.len()
    }

    /// True when every listed name has a result.
    pub fn has_all<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> bool {
        names.into_iter().all(|n| self.current.contains_key(n))
    }

    /// Archives the current map onto the history and clears it.
    pub fn archive_current(&mut self) {
        let results = std::mem::take(&mut self.current);
        self.history.push(ExecutionRecord {
            results,
            archived_at: Utc::now(),
        });
    }

    /// Prior runs, oldest first.
    pub fn history(&self) -> &[ExecutionRecord] {
        &self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// **Scenario**: add then get round-trips; completed_count follows.
    #[test]
    fn add_get_count() {
        let mut rm = ResultManager::new();
        rm.add("a", json!("x"));
        assert_eq!(rm.get("a"), Some(&json!("x")));
        assert_eq!(rm.get("b"), None);
        assert_eq!(rm.completed_count(), 1);
    }

    /// **Scenario**: commit_batch merges; an existing name is overwritten
    /// by the batch entry (later wins).
    #[test]
    fn commit_batch_later_wins() {
        let mut rm = ResultManager::new();
        rm.add("a", json!("stale"));
        rm.commit_batch(HashMap::from([
            ("a".to_string(), json!("fresh")),
            ("b".to_string(), json!("y")),
        ]));
        assert_eq!(rm.get("a"), Some(&json!("fresh")));
        assert_eq!(rm.get("b"), Some(&json!("y")));
        assert_eq!(rm.completed_count(), 2);
    }

    /// **Scenario**: has_all is true only when every name is present.
    #[test]
    fn has_all_membership() {
        let mut rm = ResultManager::new();
        rm.add("a", json!(1));
        rm.add("b", json!(2));
        assert!(rm.has_all(["a", "b"]));
        assert!(!rm.has_all(["a", "b", "c"]));
        assert!(rm.has_all([]));
    }

    /// **Scenario**: archive_current pushes the map onto the history and
    /// clears the current run; the last history entry equals the archived
    /// map.
    #[test]
    fn archive_then_history() {
        let mut rm = ResultManager::new();
        rm.add("a", json!("x"));
        rm.archive_current();
        assert!(rm.all().is_empty());
        assert_eq!(rm.history().len(), 1);
        assert_eq!(
            rm.history().last().unwrap().results,
            HashMap::from([("a".to_string(), json!("x"))])
        );

        rm.add("a", json!("second-run"));
        rm.archive_current();
        assert_eq!(rm.history().len(), 2);
        assert_eq!(
            rm.history().last().unwrap().results.get("a"),
            Some(&json!("second-run"))
        );
    }
}
