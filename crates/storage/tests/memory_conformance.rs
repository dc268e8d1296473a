//! Runs the backend-agnostic conformance suite against the in-memory store.

use fleet_storage::conformance::run_conformance_suite;
use fleet_storage::{FailPoint, InMemoryStore};

#[tokio::test]
async fn in_memory_store_passes_conformance() {
    let report = run_conformance_suite(|| async { InMemoryStore::new() }).await;
    assert!(!report.outcomes.is_empty());
    assert!(report.is_clean(), "{report}");
}

#[tokio::test]
async fn broken_reads_are_reported_per_check() {
    let report = run_conformance_suite(|| async {
        let store = InMemoryStore::new();
        store.fail_on(FailPoint::GetTask);
        store
    })
    .await;
    assert!(!report.is_clean());
    assert!(report
        .failures()
        .any(|o| o.area == "tasks" && o.check == "created_task_readable"));
    assert!(report.to_string().contains("tasks::created_task_readable"));
}
