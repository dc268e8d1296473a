pub(crate) mod delete;
pub(crate) mod save;
pub(crate) mod seed;
pub(crate) mod validate;

use std::path::Path;
use std::process;

use fleet_core::{Attachment, MaintenanceDraft};

use crate::{report_error, Context};

/// Read a form JSON file. Relative attachment paths are taken relative to
/// the form file's directory.
pub(crate) fn load_form(ctx: &Context, path: &Path) -> MaintenanceDraft {
    let text = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            let msg = format!("error reading file '{}': {}", path.display(), e);
            report_error(&msg, ctx.output, ctx.quiet);
            process::exit(1);
        }
    };
    let mut draft: MaintenanceDraft = match serde_json::from_str(&text) {
        Ok(d) => d,
        Err(e) => {
            let msg = format!("error parsing form in '{}': {}", path.display(), e);
            report_error(&msg, ctx.output, ctx.quiet);
            process::exit(1);
        }
    };
    if let Some(base) = path.parent() {
        rebase_attachments(&mut draft, base);
    }
    draft
}

fn rebase_attachments(draft: &mut MaintenanceDraft, base: &Path) {
    let rebase = |files: &mut Vec<Attachment>| {
        for file in files.iter_mut() {
            if let Attachment::Local { path } = file {
                if path.is_relative() {
                    *path = base.join(&*path);
                }
            }
        }
    };
    for group in &mut draft.service_groups {
        rebase(&mut group.bills);
        if let Some(battery) = &mut group.battery {
            rebase(&mut battery.warranty_files);
        }
        if let Some(tyre) = &mut group.tyre {
            rebase(&mut tyre.warranty_files);
        }
        for part in &mut group.parts {
            rebase(&mut part.warranty_files);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::ServiceGroup;
    use std::path::PathBuf;

    #[test]
    fn relative_attachments_resolve_against_form_dir() {
        let mut draft = MaintenanceDraft {
            service_groups: vec![ServiceGroup {
                bills: vec![
                    Attachment::local("bills/a.pdf"),
                    Attachment::local("/abs/b.pdf"),
                    Attachment::Remote {
                        url: "https://cdn/c.pdf".into(),
                    },
                ],
                ..Default::default()
            }],
            ..Default::default()
        };
        rebase_attachments(&mut draft, Path::new("/forms"));
        let bills = &draft.service_groups[0].bills;
        assert_eq!(bills[0].local_path(), Some(PathBuf::from("/forms/bills/a.pdf").as_path()));
        assert_eq!(bills[1].local_path(), Some(Path::new("/abs/b.pdf")));
        assert!(!bills[2].is_local());
    }
}
