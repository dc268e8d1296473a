use std::future::Future;

use super::{make_line_item, make_task, outcome, CheckOutcome};
use crate::{FleetStore, StorageError};

const AREA: &str = "errors";

pub(super) async fn run_error_tests<S, F, Fut>(factory: &F) -> Vec<CheckOutcome>
where
    S: FleetStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        outcome(AREA, "get_missing_task_has_id", get_missing_task_has_id(factory).await),
        outcome(AREA, "update_missing_task", update_missing_task(factory).await),
        outcome(AREA, "delete_missing_task", delete_missing_task(factory).await),
        outcome(
            AREA,
            "line_items_for_missing_task",
            line_items_for_missing_task(factory).await,
        ),
    ]
}

async fn get_missing_task_has_id<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FleetStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.get_task("task-404").await {
        Err(StorageError::TaskNotFound { task_id }) if task_id == "task-404" => Ok(()),
        other => Err(format!("expected TaskNotFound(task-404), got {:?}", other)),
    }
}

async fn update_missing_task<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FleetStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut task = make_task("org-1", "V1");
    task.id = "task-404".to_string();
    match s.update_task(task).await {
        Err(StorageError::TaskNotFound { .. }) => Ok(()),
        other => Err(format!("expected TaskNotFound, got {:?}", other)),
    }
}

async fn delete_missing_task<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FleetStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.delete_task("task-404").await {
        Err(StorageError::TaskNotFound { .. }) => Ok(()),
        other => Err(format!("expected TaskNotFound, got {:?}", other)),
    }
}

async fn line_items_for_missing_task<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FleetStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s
        .replace_line_items("task-404", vec![make_line_item("task-404", 0, 0, "Oil")])
        .await
    {
        Err(StorageError::TaskNotFound { .. }) => Ok(()),
        other => Err(format!("expected TaskNotFound, got {:?}", other)),
    }
}
