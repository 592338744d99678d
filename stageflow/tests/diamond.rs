//! Integration test: diamond DAG A -> {B, C} -> D.
//!
//! After A completes, the second batch contains exactly {B, C}; after
//! both finish, the third batch contains {D}; three planning cycles in
//! total and one batch_complete per batch.

mod common;
mod init_logging;

use std::time::Duration;

use serde_json::{json, Value};
use stageflow::{execute, AgentSpec, Registry, StartOptions};

use common::{register_recording, text_stage, RecordingCallbacks};

#[tokio::test]
async fn diamond_batches_in_three_cycles() {
    let registry = Registry::new();
    let (callbacks, recording) = RecordingCallbacks::new();
    let module = register_recording(&registry, callbacks);

    let a = text_stage(&registry, "a", "ra");
    let b = text_stage(&registry, "b", "rb").depends_on("a");
    let c = text_stage(&registry, "c", "rc").depends_on("a");
    let d = text_stage(&registry, "d", "rd").depends_on("b").depends_on("c");
    let spec = AgentSpec::new("diamond", vec![a, b, c, d]).with_callbacks(module);

    let results = execute(
        spec,
        Value::Null,
        json!({}),
        StartOptions::default(),
        Duration::from_secs(5),
        &registry,
    )
    .await
    .expect("diamond executes");

    assert_eq!(results.len(), 4);
    assert_eq!(results.get("d"), Some(&json!("rd")));

    let rec = recording.lock().unwrap();
    assert_eq!(rec.plan_calls, 3, "three planning cycles");
    assert_eq!(
        rec.batch_start_batches,
        vec![
            vec!["a".to_string()],
            vec!["b".to_string(), "c".to_string()],
            vec!["d".to_string()],
        ],
        "second batch is exactly {{b, c}}"
    );
    assert_eq!(rec.batch_complete_calls, 3, "one batch_complete per batch");
    assert_eq!(rec.complete_calls, 1);

    // Within the middle batch b and c may finish in any order, but both
    // finish before d starts.
    let finishes = &rec.stage_finishes;
    assert_eq!(finishes.len(), 4);
    assert_eq!(finishes[0], "a");
    assert_eq!(finishes[3], "d");
    let middle: std::collections::HashSet<&str> =
        finishes[1..3].iter().map(String::as_str).collect();
    assert_eq!(middle, ["b", "c"].into_iter().collect());
}
