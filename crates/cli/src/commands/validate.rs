use std::path::Path;
use std::process;

use fleet_core::MaintenanceForm;
use time::OffsetDateTime;

use crate::{report_error, Context, OutputFormat};

pub(crate) fn cmd_validate(ctx: &Context, form_path: &Path, last_odometer: Option<i64>) {
    let draft = super::load_form(ctx, form_path);
    let vehicle = draft.vehicle_id.clone();
    let mut form = MaintenanceForm::from_draft(draft);
    if let Some(vehicle) = vehicle {
        form.set_vehicle(vehicle, last_odometer);
    }

    match form.validate(OffsetDateTime::now_utc()) {
        Ok(()) => {
            if ctx.quiet {
                return;
            }
            match ctx.output {
                OutputFormat::Text => println!("{}: valid", form_path.display()),
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::json!({
                        "valid": true,
                        "service_groups": form.draft().service_groups.len(),
                        "total_cost": form.draft().total_cost,
                    })
                ),
            }
        }
        Err(e) => {
            match ctx.output {
                OutputFormat::Text => report_error(
                    &format!("{}: invalid: {}", form_path.display(), e),
                    ctx.output,
                    ctx.quiet,
                ),
                OutputFormat::Json => {
                    if !ctx.quiet {
                        println!(
                            "{}",
                            serde_json::json!({
                                "valid": false,
                                "field": e.field(),
                                "error": e.to_string(),
                            })
                        );
                    }
                }
            }
            process::exit(1);
        }
    }
}
