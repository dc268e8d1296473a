use std::process;
use std::sync::Arc;

use fleet_workflow::adapter::{PostgrestStore, RestBucket};
use fleet_workflow::SaveOrchestrator;

use crate::{report_error, Context, OutputFormat};

pub(crate) async fn cmd_delete(ctx: &Context, task_id: &str) {
    let org = ctx.require_org();
    let client = ctx.require_client();
    let orchestrator = SaveOrchestrator::new(
        Arc::new(PostgrestStore::new(&client)),
        Arc::new(RestBucket::new(&client, ctx.save_config.bucket.clone())),
        org,
        ctx.save_config.clone(),
    );

    if let Err(e) = orchestrator.delete(task_id).await {
        report_error(&format!("error: {}", e), ctx.output, ctx.quiet);
        process::exit(1);
    }
    if ctx.quiet {
        return;
    }
    match ctx.output {
        OutputFormat::Text => println!("deleted maintenance task {}", task_id),
        OutputFormat::Json => println!("{}", serde_json::json!({ "deleted": task_id })),
    }
}
