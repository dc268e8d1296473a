use std::path::Path;
use std::process;
use std::sync::Arc;

use fleet_core::MaintenanceForm;
use fleet_storage::{FleetStore, InMemoryBucket, InMemoryStore, ObjectStore};
use fleet_workflow::adapter::{PostgrestStore, RestBucket};
use fleet_workflow::{render_report, SaveOrchestrator};
use time::OffsetDateTime;

use crate::{report_error, Context, OutputFormat};

pub(crate) async fn cmd_save(
    ctx: &Context,
    form_path: &Path,
    task_id: Option<String>,
    last_odometer: Option<i64>,
    dry_run: bool,
) {
    let draft = super::load_form(ctx, form_path);
    let vehicle = draft.vehicle_id.clone();
    let mut form = MaintenanceForm::from_draft(draft);
    if let Some(vehicle) = vehicle {
        form.set_vehicle(vehicle, last_odometer);
    }

    if dry_run {
        if task_id.is_some() {
            report_error(
                "error: --task-id cannot be combined with --dry-run",
                ctx.output,
                ctx.quiet,
            );
            process::exit(1);
        }
        let org = ctx.org.clone().unwrap_or_else(|| "local".to_string());
        let orchestrator = SaveOrchestrator::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(InMemoryBucket::default()),
            org,
            ctx.save_config.clone(),
        );
        run_save(ctx, &orchestrator, &mut form, None).await;
    } else {
        let org = ctx.require_org();
        let client = ctx.require_client();
        let orchestrator = SaveOrchestrator::new(
            Arc::new(PostgrestStore::new(&client)),
            Arc::new(RestBucket::new(&client, ctx.save_config.bucket.clone())),
            org,
            ctx.save_config.clone(),
        );
        run_save(ctx, &orchestrator, &mut form, task_id).await;
    }
}

async fn run_save<S: FleetStore, B: ObjectStore>(
    ctx: &Context,
    orchestrator: &SaveOrchestrator<S, B>,
    form: &mut MaintenanceForm,
    task_id: Option<String>,
) {
    let submission = orchestrator
        .submit(form, task_id, OffsetDateTime::now_utc())
        .await;
    let report = submission.session.as_ref().map(|s| s.report());

    if !ctx.quiet {
        match ctx.output {
            OutputFormat::Text => {
                if let Some(report) = &report {
                    print!("{}", render_report(report));
                }
                println!("{}", submission.toast.message);
                if let Ok(task) = &submission.result {
                    println!("task id: {}", task.id);
                }
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({
                        "ok": submission.result.is_ok(),
                        "task": submission.result.as_ref().ok(),
                        "error": submission.result.as_ref().err().map(|e| e.to_string()),
                        "toast": submission.toast,
                        "report": report,
                    })
                );
            }
        }
    }

    if let Err(e) = &submission.result {
        if ctx.output == OutputFormat::Text {
            report_error(&format!("error: {}", e), ctx.output, ctx.quiet);
        }
        process::exit(1);
    }
}
