//! Live save progress: the operation tree, its rendering, and the actions
//! offered to the user once a save has stopped.

use std::fmt::Write as _;

use serde::Serialize;
use tokio::sync::watch;

use crate::save::SaveError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OpStatus {
    Pending,
    InProgress,
    Success,
    Error,
}

impl OpStatus {
    pub fn icon(&self) -> &'static str {
        match self {
            OpStatus::Pending => "○",
            OpStatus::InProgress => "◐",
            OpStatus::Success => "✓",
            OpStatus::Error => "✗",
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, OpStatus::Success | OpStatus::Error)
    }
}

/// One step of a save, possibly with nested sub-steps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaveOperation {
    pub id: String,
    pub label: String,
    pub status: OpStatus,
    /// Percent complete, for steps with measurable progress.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Non-fatal remark, e.g. a degraded vendor lookup.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SaveOperation>,
}

impl SaveOperation {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        SaveOperation {
            id: id.into(),
            label: label.into(),
            status: OpStatus::Pending,
            progress: None,
            error: None,
            note: None,
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<SaveOperation>) -> Self {
        self.children = children;
        self
    }

    fn find(&self, id: &str) -> Option<&SaveOperation> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(id))
    }

    fn find_mut(&mut self, id: &str) -> Option<&mut SaveOperation> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter_mut().find_map(|c| c.find_mut(id))
    }

    fn collect_failed(&self, out: &mut Vec<String>) {
        if self.status == OpStatus::Error {
            out.push(self.id.clone());
        }
        for child in &self.children {
            child.collect_failed(out);
        }
    }

    fn all_settled(&self) -> bool {
        self.status.is_settled() && self.children.iter().all(SaveOperation::all_settled)
    }
}

/// Snapshot of a save's progress, published on every change.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SaveReport {
    pub operations: Vec<SaveOperation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    /// The created task was deleted after a later failure.
    pub compensated: bool,
}

impl SaveReport {
    pub fn find(&self, id: &str) -> Option<&SaveOperation> {
        self.operations.iter().find_map(|op| op.find(id))
    }

    pub fn find_mut(&mut self, id: &str) -> Option<&mut SaveOperation> {
        self.operations.iter_mut().find_map(|op| op.find_mut(id))
    }

    pub fn status(&self, id: &str) -> Option<OpStatus> {
        self.find(id).map(|op| op.status)
    }

    pub fn start(&mut self, id: &str) {
        if let Some(op) = self.find_mut(id) {
            op.status = OpStatus::InProgress;
            op.error = None;
        }
    }

    pub fn succeed(&mut self, id: &str) {
        if let Some(op) = self.find_mut(id) {
            op.status = OpStatus::Success;
            op.error = None;
            if op.progress.is_some() {
                op.progress = Some(100);
            }
        }
    }

    pub fn fail(&mut self, id: &str, message: impl Into<String>) {
        if let Some(op) = self.find_mut(id) {
            op.status = OpStatus::Error;
            op.error = Some(message.into());
        }
    }

    pub fn note(&mut self, id: &str, note: impl Into<String>) {
        if let Some(op) = self.find_mut(id) {
            op.note = Some(note.into());
        }
    }

    pub fn set_progress(&mut self, id: &str, percent: u8) {
        if let Some(op) = self.find_mut(id) {
            op.progress = Some(percent.min(100));
        }
    }

    /// Put an operation back to pending ahead of a retry.
    pub fn reset(&mut self, id: &str) {
        if let Some(op) = self.find_mut(id) {
            op.status = OpStatus::Pending;
            op.error = None;
            op.progress = op.progress.map(|_| 0);
        }
    }

    /// Add `child` under `parent` unless an operation with that id exists.
    pub fn ensure_child(&mut self, parent: &str, child: SaveOperation) {
        if self.find(&child.id).is_some() {
            return;
        }
        if let Some(op) = self.find_mut(parent) {
            op.children.push(child);
        }
    }

    /// Ids of every failed operation, parents before their children.
    pub fn failed_ids(&self) -> Vec<String> {
        let mut out = Vec::new();
        for op in &self.operations {
            op.collect_failed(&mut out);
        }
        out
    }

    pub fn has_failures(&self) -> bool {
        !self.failed_ids().is_empty()
    }

    /// No operation is pending or running.
    pub fn is_finished(&self) -> bool {
        self.operations.iter().all(SaveOperation::all_settled)
    }
}

/// Choices offered once a save stops with failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticsAction {
    RetryFailed,
    ContinueAnyway,
    Close,
}

/// Follows a save session's report and decides what the user can do next.
///
/// Dropping or closing the reporter never cancels the save it watches.
pub struct DiagnosticsReporter {
    rx: watch::Receiver<SaveReport>,
    allow_partial_save: bool,
}

impl DiagnosticsReporter {
    pub fn new(rx: watch::Receiver<SaveReport>, allow_partial_save: bool) -> Self {
        DiagnosticsReporter {
            rx,
            allow_partial_save,
        }
    }

    pub fn snapshot(&self) -> SaveReport {
        self.rx.borrow().clone()
    }

    /// Wait for the next update. Returns `false` once the session is gone.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }

    pub fn failed_operations(&self) -> Vec<String> {
        self.rx.borrow().failed_ids()
    }

    pub fn actions(&self) -> Vec<DiagnosticsAction> {
        let report = self.rx.borrow();
        if !report.has_failures() {
            return vec![DiagnosticsAction::Close];
        }
        if self.allow_partial_save {
            vec![
                DiagnosticsAction::RetryFailed,
                DiagnosticsAction::ContinueAnyway,
            ]
        } else {
            vec![DiagnosticsAction::RetryFailed, DiagnosticsAction::Close]
        }
    }

    pub fn render(&self) -> String {
        render_report(&self.rx.borrow())
    }
}

/// Plain-text rendering of the operation tree, one line per operation.
pub fn render_report(report: &SaveReport) -> String {
    let mut out = String::new();
    for op in &report.operations {
        render_op(&mut out, op, 0);
    }
    if report.compensated {
        out.push_str("Created task was rolled back.\n");
    }
    out
}

fn render_op(out: &mut String, op: &SaveOperation, depth: usize) {
    let _ = write!(out, "{}{} {}", "  ".repeat(depth), op.status.icon(), op.label);
    if let Some(p) = op.progress {
        if op.status == OpStatus::InProgress {
            let _ = write!(out, " ({}%)", p);
        }
    }
    if let Some(err) = &op.error {
        let _ = write!(out, ": {}", err);
    }
    out.push('\n');
    if let Some(note) = &op.note {
        let _ = writeln!(out, "{}  note: {}", "  ".repeat(depth), note);
    }
    for child in &op.children {
        render_op(out, child, depth + 1);
    }
}

// ──────────────────────────────────────────────
// Toast
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToastKind {
    Success,
    Error,
}

/// Short user-facing outcome message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Toast {
    pub kind: ToastKind,
    pub message: String,
}

impl Toast {
    pub const SAVED: &'static str = "Maintenance task saved";
    pub const FAILED: &'static str = "Failed to save maintenance task";

    /// Validation errors show their own message; anything else gets the
    /// generic failure text, with details left to the diagnostics view.
    pub fn for_result<T>(result: &Result<T, SaveError>) -> Toast {
        match result {
            Ok(_) => Toast {
                kind: ToastKind::Success,
                message: Self::SAVED.to_string(),
            },
            Err(SaveError::Validation(e)) => Toast {
                kind: ToastKind::Error,
                message: e.to_string(),
            },
            Err(_) => Toast {
                kind: ToastKind::Error,
                message: Self::FAILED.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::ValidationError;

    fn report() -> SaveReport {
        SaveReport {
            operations: vec![
                SaveOperation::new("task_creation", "Create maintenance task"),
                SaveOperation::new("file_upload", "Upload files").with_children(vec![
                    SaveOperation::new("file_upload/group0/bill", "Group 1: bills"),
                    SaveOperation::new("file_upload/group0/battery", "Group 1: battery warranty"),
                ]),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn failed_ids_walk_children() {
        let mut r = report();
        r.succeed("task_creation");
        r.fail("file_upload", "1 attachment upload(s) failed");
        r.succeed("file_upload/group0/bill");
        r.fail("file_upload/group0/battery", "boom");
        assert_eq!(
            r.failed_ids(),
            vec!["file_upload".to_string(), "file_upload/group0/battery".to_string()]
        );
        assert!(r.is_finished());
    }

    #[test]
    fn reset_clears_error() {
        let mut r = report();
        r.fail("file_upload/group0/bill", "boom");
        r.reset("file_upload/group0/bill");
        let op = r.find("file_upload/group0/bill").unwrap();
        assert_eq!(op.status, OpStatus::Pending);
        assert!(op.error.is_none());
        assert!(!r.is_finished());
    }

    #[test]
    fn ensure_child_is_idempotent() {
        let mut r = report();
        r.ensure_child("file_upload", SaveOperation::new("file_upload/group0/bill", "dup"));
        r.ensure_child("file_upload", SaveOperation::new("file_upload/group1/tyre", "new"));
        assert_eq!(r.find("file_upload").unwrap().children.len(), 3);
        assert_eq!(r.find("file_upload/group0/bill").unwrap().label, "Group 1: bills");
    }

    #[test]
    fn render_shows_icons_errors_and_notes() {
        let mut r = report();
        r.succeed("task_creation");
        r.fail("file_upload/group0/battery", "timed out");
        r.note("file_upload/group0/bill", "nothing to upload");
        let text = render_report(&r);
        assert!(text.contains("✓ Create maintenance task"));
        assert!(text.contains("  ✗ Group 1: battery warranty: timed out"));
        assert!(text.contains("note: nothing to upload"));
        assert!(text.contains("○ Upload files"));
    }

    #[test]
    fn actions_depend_on_failures_and_partial_save() {
        let mut r = report();
        r.fail("file_upload/group0/bill", "boom");
        let (tx, rx) = watch::channel(r);
        let strict = DiagnosticsReporter::new(rx.clone(), false);
        assert_eq!(
            strict.actions(),
            vec![DiagnosticsAction::RetryFailed, DiagnosticsAction::Close]
        );
        let lenient = DiagnosticsReporter::new(rx, true);
        assert_eq!(
            lenient.actions(),
            vec![DiagnosticsAction::RetryFailed, DiagnosticsAction::ContinueAnyway]
        );

        tx.send_modify(|r| r.succeed("file_upload/group0/bill"));
        assert_eq!(strict.actions(), vec![DiagnosticsAction::Close]);
        assert!(strict.failed_operations().is_empty());
    }

    #[test]
    fn toast_uses_validation_message() {
        let err: Result<(), SaveError> = Err(SaveError::Validation(ValidationError::VehicleRequired));
        let toast = Toast::for_result(&err);
        assert_eq!(toast.kind, ToastKind::Error);
        assert_eq!(toast.message, ValidationError::VehicleRequired.to_string());

        let err: Result<(), SaveError> = Err(SaveError::UploadTimeout { secs: 60 });
        assert_eq!(Toast::for_result(&err).message, Toast::FAILED);
        assert_eq!(Toast::for_result(&Ok::<(), SaveError>(())).kind, ToastKind::Success);
    }
}
