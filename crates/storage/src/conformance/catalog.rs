use std::future::Future;

use super::{outcome, CheckOutcome};
use crate::record::NewCatalogTask;
use crate::{FleetStore, StorageError};

const AREA: &str = "catalog";

pub(super) async fn run_catalog_tests<S, F, Fut>(factory: &F) -> Vec<CheckOutcome>
where
    S: FleetStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        outcome(
            AREA,
            "inserted_tasks_found_case_insensitively",
            inserted_tasks_found_case_insensitively(factory).await,
        ),
        outcome(
            AREA,
            "catalog_scoped_to_organization",
            catalog_scoped_to_organization(factory).await,
        ),
        outcome(
            AREA,
            "duplicate_catalog_task_rejected",
            duplicate_catalog_task_rejected(factory).await,
        ),
        outcome(AREA, "vendor_lookup_by_name", vendor_lookup_by_name(factory).await),
        outcome(AREA, "unknown_vendor_is_none", unknown_vendor_is_none(factory).await),
    ]
}

fn custom(name: &str) -> NewCatalogTask {
    NewCatalogTask {
        name: name.to_string(),
        category: "Custom".to_string(),
    }
}

async fn inserted_tasks_found_case_insensitively<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FleetStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let inserted = s
        .insert_catalog_tasks("org-1", vec![custom("Engine Oil Change"), custom("Air Filter")])
        .await
        .map_err(|e| format!("insert failed: {e}"))?;
    if inserted.len() != 2 || inserted[0].name != "Engine Oil Change" {
        return Err(format!("unexpected insert result: {:?}", inserted));
    }
    let found = s
        .find_catalog_tasks("org-1", &["  engine oil CHANGE ".to_string()])
        .await
        .map_err(|e| format!("find failed: {e}"))?;
    if found.len() != 1 || found[0].id != inserted[0].id {
        return Err(format!("expected the oil change entry, got {:?}", found));
    }
    if found[0].category != "Custom" {
        return Err(format!("expected category Custom, got {}", found[0].category));
    }
    Ok(())
}

async fn catalog_scoped_to_organization<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FleetStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.insert_catalog_tasks("org-1", vec![custom("Brake Pads")])
        .await
        .map_err(|e| format!("insert failed: {e}"))?;
    let found = s
        .find_catalog_tasks("org-2", &["Brake Pads".to_string()])
        .await
        .map_err(|e| format!("find failed: {e}"))?;
    if !found.is_empty() {
        return Err(format!("org-2 saw org-1 catalog rows: {:?}", found));
    }
    // Same name in another organization is not a duplicate.
    s.insert_catalog_tasks("org-2", vec![custom("Brake Pads")])
        .await
        .map_err(|e| format!("insert into org-2 failed: {e}"))?;
    Ok(())
}

async fn duplicate_catalog_task_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FleetStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.insert_catalog_tasks("org-1", vec![custom("Wheel Alignment")])
        .await
        .map_err(|e| format!("insert failed: {e}"))?;
    match s
        .insert_catalog_tasks("org-1", vec![custom("wheel alignment")])
        .await
    {
        Err(StorageError::DuplicateCatalogEntry { .. }) => Ok(()),
        other => Err(format!("expected DuplicateCatalogEntry, got {:?}", other)),
    }
}

async fn vendor_lookup_by_name<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FleetStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let vendor = s
        .insert_vendor("org-1", "Joe's Garage")
        .await
        .map_err(|e| format!("insert vendor failed: {e}"))?;
    let found = s
        .find_vendor("org-1", "joe's garage")
        .await
        .map_err(|e| format!("find vendor failed: {e}"))?;
    match found {
        Some(v) if v.id == vendor.id => Ok(()),
        other => Err(format!("expected {:?}, got {:?}", vendor, other)),
    }
}

async fn unknown_vendor_is_none<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FleetStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.find_vendor("org-1", "Nobody Motors").await {
        Ok(None) => Ok(()),
        other => Err(format!("expected Ok(None), got {:?}", other)),
    }
}
