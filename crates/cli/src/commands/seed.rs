use std::collections::HashSet;
use std::path::Path;
use std::process;

use fleet_storage::{catalog_key, FleetStore, InMemoryStore, NewCatalogTask, StorageError};
use fleet_workflow::adapter::PostgrestStore;
use serde::Deserialize;

use crate::{report_error, Context, OutputFormat};

/// Catalog file layout: `{"tasks": [{"name", "category"}], "vendors": ["..."]}`.
#[derive(Debug, Default, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    tasks: Vec<NewCatalogTask>,
    #[serde(default)]
    vendors: Vec<String>,
}

#[derive(Debug, Default, PartialEq, Eq)]
struct SeedSummary {
    tasks_added: usize,
    vendors_added: usize,
}

pub(crate) async fn cmd_seed(ctx: &Context, catalog_path: &Path, dry_run: bool) {
    let text = match std::fs::read_to_string(catalog_path) {
        Ok(s) => s,
        Err(e) => {
            let msg = format!("error reading file '{}': {}", catalog_path.display(), e);
            report_error(&msg, ctx.output, ctx.quiet);
            process::exit(1);
        }
    };
    let catalog: CatalogFile = match serde_json::from_str(&text) {
        Ok(c) => c,
        Err(e) => {
            let msg = format!("error parsing catalog in '{}': {}", catalog_path.display(), e);
            report_error(&msg, ctx.output, ctx.quiet);
            process::exit(1);
        }
    };

    let result = if dry_run {
        let org = ctx.org.clone().unwrap_or_else(|| "local".to_string());
        seed_store(&InMemoryStore::new(), &org, catalog).await
    } else {
        let org = ctx.require_org();
        let client = ctx.require_client();
        seed_store(&PostgrestStore::new(&client), &org, catalog).await
    };

    let summary = match result {
        Ok(s) => s,
        Err(e) => {
            report_error(&format!("error: {}", e), ctx.output, ctx.quiet);
            process::exit(1);
        }
    };
    if ctx.quiet {
        return;
    }
    match ctx.output {
        OutputFormat::Text => println!(
            "{} tasks, {} vendors added",
            summary.tasks_added, summary.vendors_added
        ),
        OutputFormat::Json => println!(
            "{}",
            serde_json::json!({
                "tasks_added": summary.tasks_added,
                "vendors_added": summary.vendors_added,
            })
        ),
    }
}

/// Insert the catalog entries and vendors the organization does not have yet.
async fn seed_store<S: FleetStore>(
    store: &S,
    organization_id: &str,
    catalog: CatalogFile,
) -> Result<SeedSummary, StorageError> {
    let names: Vec<String> = catalog.tasks.iter().map(|t| t.name.clone()).collect();
    let mut seen: HashSet<String> = store
        .find_catalog_tasks(organization_id, &names)
        .await?
        .iter()
        .map(|t| catalog_key(&t.name))
        .collect();
    let missing: Vec<NewCatalogTask> = catalog
        .tasks
        .into_iter()
        .filter(|t| !t.name.trim().is_empty() && seen.insert(catalog_key(&t.name)))
        .collect();
    let tasks_added = store
        .insert_catalog_tasks(organization_id, missing)
        .await?
        .len();

    let mut vendors_added = 0;
    let mut seen_vendors = HashSet::new();
    for name in &catalog.vendors {
        if name.trim().is_empty() || !seen_vendors.insert(catalog_key(name)) {
            continue;
        }
        if store.find_vendor(organization_id, name).await?.is_none() {
            store.insert_vendor(organization_id, name).await?;
            vendors_added += 1;
        }
    }

    tracing::info!(organization_id, tasks_added, vendors_added, "seeded catalog");
    Ok(SeedSummary {
        tasks_added,
        vendors_added,
    })
}
