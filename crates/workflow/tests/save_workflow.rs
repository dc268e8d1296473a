//! End-to-end save scenarios against the in-memory backends.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use fleet_core::{
    Attachment, BatteryTracking, CostEntry, LineItem, MaintenanceDraft, MaintenanceForm,
    ServiceGroup, TaskRef, VendorRef,
};
use fleet_storage::{FailPoint, FleetStore, InMemoryBucket, InMemoryStore};
use fleet_workflow::{
    DiagnosticsAction, OpStatus, SaveConfig, SaveError, SaveOrchestrator, SavePhase, ToastKind,
    VendorPolicy, OP_DATABASE_SAVE, OP_FILE_UPLOAD, OP_TASK_CREATION,
};
use rust_decimal::Decimal;
use time::macros::datetime;

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

struct Harness {
    store: Arc<InMemoryStore>,
    bucket: Arc<InMemoryBucket>,
    orchestrator: SaveOrchestrator<InMemoryStore, InMemoryBucket>,
}

fn harness(config: SaveConfig) -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let bucket = Arc::new(InMemoryBucket::new("https://cdn.example"));
    let orchestrator = SaveOrchestrator::new(store.clone(), bucket.clone(), "org-1", config);
    Harness {
        store,
        bucket,
        orchestrator,
    }
}

fn oil_change_draft() -> MaintenanceDraft {
    let mut draft = MaintenanceDraft {
        vehicle_id: Some("V1".to_string()),
        start_date: Some(datetime!(2024-01-10 00:00 UTC)),
        odometer_reading: Some(50_000),
        service_groups: vec![ServiceGroup {
            vendor: Some(VendorRef::name("Joe's Garage")),
            tasks: vec![TaskRef::named("Engine Oil Change")],
            cost: CostEntry::Quick {
                amount: dec("1500"),
            },
            ..Default::default()
        }],
        ..Default::default()
    };
    draft.recompute_total();
    draft
}

fn brake_job_draft() -> MaintenanceDraft {
    let mut draft = oil_change_draft();
    draft.service_groups[0].cost = CostEntry::Detailed {
        items: vec![
            LineItem::new("Brake pads", dec("1"), dec("2400")),
            LineItem::new("Brake fluid", dec("2"), dec("350")),
        ],
    };
    draft.recompute_total();
    draft
}

fn write_file(dir: &Path, name: &str) -> Attachment {
    write_bytes(dir, name, b"%PDF-1.4 test")
}

fn write_bytes(dir: &Path, name: &str, bytes: &[u8]) -> Attachment {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, bytes).unwrap();
    Attachment::local(path)
}

// ── Happy path ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn oil_change_saves_with_resolved_vendor() {
    let h = harness(SaveConfig::default());
    let vendor = h.store.insert_vendor("org-1", "Joe's Garage").await.unwrap();

    let mut draft = oil_change_draft();
    let (session, result) = h.orchestrator.save(&mut draft, None).await;
    let saved = result.unwrap();

    assert_eq!(session.phase(), SavePhase::Done);
    assert_eq!(saved.service_groups[0].service_cost, dec("1500"));
    assert_eq!(saved.service_groups[0].vendor_id, vendor.id);
    assert_eq!(saved.total_cost, dec("1500"));

    let stored = h.store.get_task(&saved.id).await.unwrap();
    assert_eq!(stored, saved);
    let catalog = h.store.catalog().await;
    assert_eq!(catalog.len(), 1);
    assert_eq!(stored.service_groups[0].tasks, vec![catalog[0].id.clone()]);
    assert!(session.report().is_finished());
    assert!(!session.report().has_failures());
}

#[tokio::test]
async fn attachments_upload_under_task_path() {
    let h = harness(SaveConfig::default());
    let dir = tempfile::tempdir().unwrap();
    let mut draft = oil_change_draft();
    draft.service_groups[0].bills = vec![write_file(dir.path(), "bill.pdf")];
    draft.service_groups[0].battery = Some(BatteryTracking {
        serial_number: "BAT-1".into(),
        brand: "Exide".into(),
        warranty_until: Some(datetime!(2026-01-10 00:00 UTC)),
        warranty_files: vec![write_file(dir.path(), "warranty.pdf")],
    });

    let (_, result) = h.orchestrator.save(&mut draft, None).await;
    let saved = result.unwrap();

    let bill_path = format!("{}/group0/bill/0-bill.pdf", saved.id);
    let battery_path = format!("{}/group0/battery/0-warranty.pdf", saved.id);
    assert_eq!(h.bucket.paths().await, vec![battery_path.clone(), bill_path.clone()]);
    assert_eq!(
        saved.service_groups[0].bill_url,
        vec![format!("https://cdn.example/{}", bill_path)]
    );
    let battery = saved.service_groups[0].battery_data.as_ref().unwrap();
    assert_eq!(
        battery["warranty_urls"][0],
        format!("https://cdn.example/{}", battery_path)
    );
    assert_eq!(draft.pending_uploads(), 0);
}

#[tokio::test]
async fn same_named_bills_are_both_kept() {
    let h = harness(SaveConfig::default());
    let dir = tempfile::tempdir().unwrap();
    let mut draft = oil_change_draft();
    draft.service_groups[0].bills = vec![
        write_bytes(dir.path(), "jan/bill.pdf", b"JANUARY"),
        write_bytes(dir.path(), "feb/bill.pdf", b"FEBRUARY"),
    ];

    let (_, result) = h.orchestrator.save(&mut draft, None).await;
    let saved = result.unwrap();

    let urls = &saved.service_groups[0].bill_url;
    assert_eq!(urls.len(), 2);
    assert_ne!(urls[0], urls[1]);
    assert_eq!(h.bucket.paths().await.len(), 2);
    let jan = h
        .bucket
        .object(&format!("{}/group0/bill/0-bill.pdf", saved.id))
        .await
        .unwrap();
    let feb = h
        .bucket
        .object(&format!("{}/group0/bill/1-bill.pdf", saved.id))
        .await
        .unwrap();
    assert_eq!(jan.bytes, b"JANUARY".to_vec());
    assert_eq!(feb.bytes, b"FEBRUARY".to_vec());
}

#[tokio::test]
async fn detailed_groups_write_line_items() {
    let h = harness(SaveConfig::default());
    let mut form = MaintenanceForm::from_draft(oil_change_draft());
    form.set_vehicle("V1", Some(49_000));
    {
        let mut groups = form.groups();
        groups
            .set_cost_mode(0, fleet_core::CostMode::Detailed)
            .unwrap();
        groups
            .update_line_item(0, 0, |item| {
                item.quantity = dec("2");
                item.unit_price = dec("400");
            })
            .unwrap();
    }

    let submission = h
        .orchestrator
        .submit(&mut form, None, datetime!(2024-02-01 00:00 UTC))
        .await;
    let saved = submission.result.unwrap();
    assert_eq!(submission.toast.kind, ToastKind::Success);
    assert!(saved.service_groups[0].use_line_items);
    assert_eq!(saved.total_cost, dec("800"));

    let items = h.store.list_line_items(&saved.id).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].name, "Engine Oil Change");
    assert_eq!(items[0].subtotal, dec("800"));
}

#[tokio::test]
async fn invalid_form_never_reaches_storage() {
    let h = harness(SaveConfig::default());
    let mut draft = oil_change_draft();
    draft.vehicle_id = None;
    let mut form = MaintenanceForm::from_draft(draft);

    let submission = h
        .orchestrator
        .submit(&mut form, None, datetime!(2024-02-01 00:00 UTC))
        .await;
    assert!(matches!(submission.result, Err(SaveError::Validation(_))));
    assert!(submission.session.is_none());
    assert_eq!(submission.toast.kind, ToastKind::Error);
    assert_ne!(submission.toast.message, fleet_workflow::Toast::FAILED);
    assert_eq!(h.store.task_count().await, 0);
}

// ── Compensation ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn final_write_failure_rolls_back_but_keeps_catalog_label() {
    let h = harness(SaveConfig::default());
    h.store.fail_on(FailPoint::UpdateTask);

    let mut draft = oil_change_draft();
    let (session, result) = h.orchestrator.save(&mut draft, None).await;

    assert!(matches!(result, Err(SaveError::Persist(_))));
    assert_eq!(h.store.task_count().await, 0);
    let catalog = h.store.catalog().await;
    assert_eq!(catalog.len(), 1);
    assert_eq!(catalog[0].name, "Engine Oil Change");
    assert_eq!(catalog[0].category, "Custom");

    let report = session.report();
    assert!(report.compensated);
    assert_eq!(session.task_id(), None);
    assert_eq!(report.status(OP_DATABASE_SAVE), Some(OpStatus::Error));
    assert_eq!(session.phase(), SavePhase::Error);
}

#[tokio::test]
async fn create_failure_leaves_nothing_behind() {
    let h = harness(SaveConfig::default());
    h.store.fail_on(FailPoint::CreateTask);
    let dir = tempfile::tempdir().unwrap();
    let mut draft = oil_change_draft();
    draft.service_groups[0].bills = vec![write_file(dir.path(), "bill.pdf")];

    let (session, result) = h.orchestrator.save(&mut draft, None).await;

    assert!(matches!(result, Err(SaveError::Create(_))));
    assert_eq!(h.store.task_count().await, 0);
    assert!(h.bucket.paths().await.is_empty());
    assert!(h.store.catalog().await.is_empty());
    assert!(!session.report().compensated);
    assert_eq!(session.report().failed_ids(), vec![OP_TASK_CREATION.to_string()]);
}

#[tokio::test]
async fn upload_failure_rolls_back_created_task() {
    let h = harness(SaveConfig::default());
    h.bucket.fail_uploads_under("");
    let dir = tempfile::tempdir().unwrap();
    let mut draft = oil_change_draft();
    draft.service_groups[0].bills = vec![write_file(dir.path(), "bill.pdf")];

    let (session, result) = h.orchestrator.save(&mut draft, None).await;

    assert!(matches!(result, Err(SaveError::Upload { failed: 1 })));
    assert_eq!(h.store.task_count().await, 0);
    let failed = session.report().failed_ids();
    assert!(failed.contains(&"file_upload/group0/bill".to_string()));
    assert!(failed.contains(&OP_FILE_UPLOAD.to_string()));
}

#[tokio::test]
async fn failed_update_keeps_previous_row_and_line_items() {
    let h = harness(SaveConfig::default());
    let mut draft = brake_job_draft();
    draft.complaint = "Squealing brakes".to_string();
    let (_, first) = h.orchestrator.save(&mut draft, None).await;
    let before = first.unwrap();
    let items_before = h.store.list_line_items(&before.id).await.unwrap();
    assert_eq!(items_before.len(), 2);

    h.store.fail_on(FailPoint::ReplaceLineItems);
    draft.complaint = "Noise from engine".to_string();
    if let CostEntry::Detailed { items } = &mut draft.service_groups[0].cost {
        items.pop();
    }
    draft.recompute_total();
    let (session, result) = h
        .orchestrator
        .save(&mut draft, Some(before.id.clone()))
        .await;

    assert!(matches!(result, Err(SaveError::Persist(_))));
    assert!(!session.report().compensated);
    let stored = h.store.get_task(&before.id).await.unwrap();
    assert_eq!(stored.complaint, "Squealing brakes");
    assert_eq!(stored, before);
    assert_eq!(h.store.list_line_items(&before.id).await.unwrap(), items_before);
}

#[tokio::test]
async fn required_vendor_policy_rolls_back_on_unknown_vendor() {
    let h = harness(SaveConfig {
        vendor_policy: VendorPolicy::Require,
        ..Default::default()
    });
    let mut draft = oil_change_draft();
    let (session, result) = h.orchestrator.save(&mut draft, None).await;

    match result {
        Err(SaveError::Resolution(message)) => assert!(message.contains("Joe's Garage")),
        other => panic!("expected resolution error, got {:?}", other),
    }
    assert_eq!(h.store.task_count().await, 0);
    assert!(session.report().compensated);
}

#[tokio::test]
async fn degraded_vendor_saves_with_note() {
    let h = harness(SaveConfig::default());
    let mut draft = oil_change_draft();
    let (session, result) = h.orchestrator.save(&mut draft, None).await;

    let saved = result.unwrap();
    assert_eq!(saved.service_groups[0].vendor_id, "");
    let report = session.report();
    let group = report.find("reference_resolution/group0").unwrap();
    assert_eq!(group.status, OpStatus::Success);
    assert!(group.note.as_deref().unwrap().contains("Joe's Garage"));
}

// ── Partial save and retry ───────────────────────────────────────────────────

#[tokio::test]
async fn partial_save_keeps_task_and_retries_failed_uploads() {
    let h = harness(SaveConfig {
        allow_partial_save: true,
        ..Default::default()
    });
    let dir = tempfile::tempdir().unwrap();
    let mut draft = oil_change_draft();
    draft.service_groups[0].bills = vec![write_file(dir.path(), "bill.pdf")];
    draft.service_groups[0].battery = Some(BatteryTracking {
        serial_number: "BAT-1".into(),
        brand: "Exide".into(),
        warranty_until: Some(datetime!(2026-01-10 00:00 UTC)),
        warranty_files: vec![write_file(dir.path(), "warranty.pdf")],
    });
    h.bucket.fail_uploads_under("");

    let mut session = h.orchestrator.begin(&draft, None);
    let reporter = session.subscribe();
    let saved = h.orchestrator.run(&mut session, &mut draft).await.unwrap();

    assert_eq!(h.store.task_count().await, 1);
    assert!(saved.service_groups[0].bill_url.is_empty());
    assert_eq!(
        reporter.actions(),
        vec![DiagnosticsAction::RetryFailed, DiagnosticsAction::ContinueAnyway]
    );
    assert_eq!(draft.pending_uploads(), 2);

    h.bucket.clear_failures();
    let saved = h
        .orchestrator
        .retry_failed(&mut session, &mut draft)
        .await
        .unwrap();

    assert_eq!(session.task_id(), Some(saved.id.as_str()));
    assert_eq!(h.store.task_count().await, 1);
    assert_eq!(saved.service_groups[0].bill_url.len(), 1);
    assert_eq!(draft.pending_uploads(), 0);
    assert!(reporter.failed_operations().is_empty());
    assert_eq!(reporter.actions(), vec![DiagnosticsAction::Close]);
}

#[tokio::test]
async fn retry_after_rollback_recreates_task() {
    let h = harness(SaveConfig::default());
    h.store.fail_on(FailPoint::UpdateTask);
    let mut draft = oil_change_draft();

    let mut session = h.orchestrator.begin(&draft, None);
    assert!(h.orchestrator.run(&mut session, &mut draft).await.is_err());
    assert!(session.report().compensated);
    assert!(session
        .report()
        .failed_ids()
        .contains(&OP_TASK_CREATION.to_string()));

    h.store.clear_failures();
    let saved = h
        .orchestrator
        .retry_failed(&mut session, &mut draft)
        .await
        .unwrap();

    assert_eq!(h.store.task_count().await, 1);
    assert_eq!(h.store.get_task(&saved.id).await.unwrap().vehicle_id, "V1");
    assert!(!session.report().compensated);
    assert!(!session.report().has_failures());
    // The label auto-created during the first attempt is reused.
    assert_eq!(h.store.catalog().await.len(), 1);
}

#[tokio::test]
async fn rollback_removes_uploads_and_retry_reuploads_under_new_task() {
    let h = harness(SaveConfig::default());
    h.store.fail_on(FailPoint::UpdateTask);
    let dir = tempfile::tempdir().unwrap();
    let bill = write_file(dir.path(), "bill.pdf");
    let mut draft = oil_change_draft();
    draft.service_groups[0].bills = vec![bill.clone()];

    let mut session = h.orchestrator.begin(&draft, None);
    assert!(h.orchestrator.run(&mut session, &mut draft).await.is_err());
    assert_eq!(h.store.task_count().await, 0);
    assert!(h.bucket.paths().await.is_empty());
    assert_eq!(draft.service_groups[0].bills, vec![bill]);
    assert!(session
        .report()
        .find(OP_FILE_UPLOAD)
        .unwrap()
        .note
        .as_deref()
        .unwrap()
        .contains("removed"));

    h.store.clear_failures();
    let saved = h
        .orchestrator
        .retry_failed(&mut session, &mut draft)
        .await
        .unwrap();

    let path = format!("{}/group0/bill/0-bill.pdf", saved.id);
    assert_eq!(h.bucket.paths().await, vec![path.clone()]);
    assert_eq!(
        saved.service_groups[0].bill_url,
        vec![format!("https://cdn.example/{}", path)]
    );
    assert_eq!(draft.pending_uploads(), 0);
}

// ── Timeout ──────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn slow_uploads_time_out_and_roll_back() {
    let h = harness(SaveConfig::default());
    h.bucket.set_delay(Some(Duration::from_secs(120)));
    let dir = tempfile::tempdir().unwrap();
    let mut draft = oil_change_draft();
    draft.service_groups[0].bills = vec![write_file(dir.path(), "bill.pdf")];

    let (session, result) = h.orchestrator.save(&mut draft, None).await;

    assert!(matches!(result, Err(SaveError::UploadTimeout { secs: 60 })));
    assert_eq!(h.store.task_count().await, 0);
    let report = session.report();
    let bill = report.find("file_upload/group0/bill").unwrap();
    assert_eq!(bill.status, OpStatus::Error);
    assert!(bill.error.as_deref().unwrap().contains("timed out"));
}

// ── Delete ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn delete_removes_task_and_line_items() {
    let h = harness(SaveConfig::default());
    let mut draft = brake_job_draft();
    let (_, result) = h.orchestrator.save(&mut draft, None).await;
    let id = result.unwrap().id;
    assert_eq!(h.store.list_line_items(&id).await.unwrap().len(), 2);

    h.orchestrator.delete(&id).await.unwrap();
    assert_eq!(h.store.task_count().await, 0);
    assert!(h.store.list_line_items(&id).await.unwrap().is_empty());
    assert!(matches!(
        h.orchestrator.delete(&id).await,
        Err(SaveError::Delete(_))
    ));
}
