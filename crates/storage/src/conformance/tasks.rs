use std::future::Future;

use rust_decimal::Decimal;

use super::{make_line_item, make_task, outcome, CheckOutcome};
use crate::FleetStore;

const AREA: &str = "tasks";

pub(super) async fn run_task_tests<S, F, Fut>(factory: &F) -> Vec<CheckOutcome>
where
    S: FleetStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        outcome(AREA, "create_assigns_id", create_assigns_id(factory).await),
        outcome(AREA, "created_task_readable", created_task_readable(factory).await),
        outcome(AREA, "update_persists_changes", update_persists_changes(factory).await),
        outcome(AREA, "delete_removes_task", delete_removes_task(factory).await),
        outcome(
            AREA,
            "list_filters_by_organization_and_vehicle",
            list_filters_by_organization_and_vehicle(factory).await,
        ),
        outcome(
            AREA,
            "replace_line_items_overwrites",
            replace_line_items_overwrites(factory).await,
        ),
        outcome(
            AREA,
            "line_items_ordered_by_group_then_position",
            line_items_ordered_by_group_then_position(factory).await,
        ),
        outcome(AREA, "delete_removes_line_items", delete_removes_line_items(factory).await),
    ]
}

// ── 1. create assigns a fresh, non-empty id ──────────────────────────────────

async fn create_assigns_id<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FleetStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let a = s
        .create_task(make_task("org-1", "V1"))
        .await
        .map_err(|e| format!("create failed: {e}"))?;
    let b = s
        .create_task(make_task("org-1", "V1"))
        .await
        .map_err(|e| format!("create failed: {e}"))?;
    if a.id.is_empty() {
        return Err("created task has empty id".to_string());
    }
    if a.id == b.id {
        return Err(format!("two creates returned the same id {}", a.id));
    }
    Ok(())
}

// ── 2. a created task can be read back unchanged ─────────────────────────────

async fn created_task_readable<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FleetStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let created = s
        .create_task(make_task("org-1", "V1"))
        .await
        .map_err(|e| format!("create failed: {e}"))?;
    let read = s
        .get_task(&created.id)
        .await
        .map_err(|e| format!("get failed: {e}"))?;
    if read.vehicle_id != "V1" || read.service_groups.len() != 1 {
        return Err(format!("read back unexpected task: {:?}", read));
    }
    if read.service_groups[0].service_cost != Decimal::from(1500) {
        return Err(format!(
            "expected service_cost 1500, got {}",
            read.service_groups[0].service_cost
        ));
    }
    Ok(())
}

// ── 3. update overwrites the stored row ──────────────────────────────────────

async fn update_persists_changes<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FleetStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut task = s
        .create_task(make_task("org-1", "V1"))
        .await
        .map_err(|e| format!("create failed: {e}"))?;
    task.status = "resolved".to_string();
    task.service_groups.clear();
    s.update_task(task.clone())
        .await
        .map_err(|e| format!("update failed: {e}"))?;
    let read = s
        .get_task(&task.id)
        .await
        .map_err(|e| format!("get failed: {e}"))?;
    if read.status != "resolved" || !read.service_groups.is_empty() {
        return Err(format!("update not persisted: {:?}", read));
    }
    Ok(())
}

// ── 4. delete makes the task unreadable ──────────────────────────────────────

async fn delete_removes_task<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FleetStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let task = s
        .create_task(make_task("org-1", "V1"))
        .await
        .map_err(|e| format!("create failed: {e}"))?;
    s.delete_task(&task.id)
        .await
        .map_err(|e| format!("delete failed: {e}"))?;
    match s.get_task(&task.id).await {
        Err(crate::StorageError::TaskNotFound { .. }) => Ok(()),
        other => Err(format!("expected TaskNotFound after delete, got {:?}", other)),
    }
}

// ── 5. list scopes by organization and optional vehicle ──────────────────────

async fn list_filters_by_organization_and_vehicle<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FleetStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    for (org, vehicle) in [("org-1", "V1"), ("org-1", "V2"), ("org-2", "V1")] {
        s.create_task(make_task(org, vehicle))
            .await
            .map_err(|e| format!("create failed: {e}"))?;
    }
    let all = s
        .list_tasks("org-1", None)
        .await
        .map_err(|e| format!("list failed: {e}"))?;
    if all.len() != 2 {
        return Err(format!("expected 2 tasks for org-1, got {}", all.len()));
    }
    let v1 = s
        .list_tasks("org-1", Some("V1"))
        .await
        .map_err(|e| format!("list failed: {e}"))?;
    if v1.len() != 1 || v1[0].vehicle_id != "V1" {
        return Err(format!("expected 1 task for org-1/V1, got {:?}", v1));
    }
    Ok(())
}

// ── 6. replace_line_items drops the previous set ─────────────────────────────

async fn replace_line_items_overwrites<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FleetStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let task = s
        .create_task(make_task("org-1", "V1"))
        .await
        .map_err(|e| format!("create failed: {e}"))?;
    s.replace_line_items(
        &task.id,
        vec![
            make_line_item(&task.id, 0, 0, "Oil"),
            make_line_item(&task.id, 0, 1, "Filter"),
        ],
    )
    .await
    .map_err(|e| format!("replace failed: {e}"))?;
    s.replace_line_items(&task.id, vec![make_line_item(&task.id, 0, 0, "Labour")])
        .await
        .map_err(|e| format!("second replace failed: {e}"))?;
    let items = s
        .list_line_items(&task.id)
        .await
        .map_err(|e| format!("list failed: {e}"))?;
    if items.len() != 1 || items[0].name != "Labour" {
        return Err(format!("expected only Labour, got {:?}", items));
    }
    Ok(())
}

// ── 7. line items come back ordered ──────────────────────────────────────────

async fn line_items_ordered_by_group_then_position<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FleetStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let task = s
        .create_task(make_task("org-1", "V1"))
        .await
        .map_err(|e| format!("create failed: {e}"))?;
    s.replace_line_items(
        &task.id,
        vec![
            make_line_item(&task.id, 1, 0, "c"),
            make_line_item(&task.id, 0, 1, "b"),
            make_line_item(&task.id, 0, 0, "a"),
        ],
    )
    .await
    .map_err(|e| format!("replace failed: {e}"))?;
    let names: Vec<String> = s
        .list_line_items(&task.id)
        .await
        .map_err(|e| format!("list failed: {e}"))?
        .into_iter()
        .map(|li| li.name)
        .collect();
    if names != ["a", "b", "c"] {
        return Err(format!("expected [a, b, c], got {:?}", names));
    }
    Ok(())
}

// ── 8. deleting a task deletes its line items ────────────────────────────────

async fn delete_removes_line_items<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FleetStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let task = s
        .create_task(make_task("org-1", "V1"))
        .await
        .map_err(|e| format!("create failed: {e}"))?;
    s.replace_line_items(&task.id, vec![make_line_item(&task.id, 0, 0, "Oil")])
        .await
        .map_err(|e| format!("replace failed: {e}"))?;
    s.delete_task(&task.id)
        .await
        .map_err(|e| format!("delete failed: {e}"))?;
    let items = s
        .list_line_items(&task.id)
        .await
        .map_err(|e| format!("list failed: {e}"))?;
    if !items.is_empty() {
        return Err(format!("line items survived task deletion: {:?}", items));
    }
    Ok(())
}
