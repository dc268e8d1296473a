//! The save sequence for a maintenance task.
//!
//! A save walks four phases in order:
//!
//! 1. **Task creation** (new tasks only): insert the base row to obtain an id.
//! 2. **Reference resolution**: task labels and vendor names to catalog ids.
//! 3. **File upload**: local attachments to object storage, under the task id.
//! 4. **Database save**: write the full row and replace its line items.
//!
//! The backend offers no transactions. When a phase after task creation
//! fails, the task created in that same attempt is deleted again, along with
//! the files uploaded under its id; those attachments go back to pointing at
//! their local files. Catalog rows added during resolution are kept.
//!
//! An update that fails at the final write puts the previous row and line
//! items back.
//!
//! Progress is published as a [`SaveReport`] through a `tokio::sync::watch`
//! channel; see [`SaveSession::subscribe`].

use std::collections::HashSet;
use std::sync::Arc;

use fleet_core::{MaintenanceDraft, MaintenanceForm, ValidationError};
use fleet_storage::{FleetStore, LineItemRecord, ObjectStore, StorageError, TaskRecord};
use futures::stream::{FuturesUnordered, StreamExt};
use time::OffsetDateTime;
use tokio::sync::watch;

use crate::config::{SaveConfig, VendorPolicy};
use crate::diagnostics::{DiagnosticsReporter, SaveOperation, SaveReport, Toast};
use crate::payload::{self, PayloadError};
use crate::resolver::{ReferenceResolver, ResolvedGroup};
use crate::upload::{self, FileUploader, TargetUpload, UploadTarget, UploadedObject};

pub const OP_TASK_CREATION: &str = "task_creation";
pub const OP_REFERENCE_RESOLUTION: &str = "reference_resolution";
pub const OP_FILE_UPLOAD: &str = "file_upload";
pub const OP_DATABASE_SAVE: &str = "database_save";

/// Diagnostics id for resolving one service group.
pub fn resolution_op_id(group: usize) -> String {
    format!("{}/group{}", OP_REFERENCE_RESOLUTION, group)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavePhase {
    Idle,
    TaskCreation,
    ReferenceResolution,
    FileUpload,
    DatabaseSave,
    Done,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    Create,
    Update,
}

#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("failed to create maintenance task: {0}")]
    Create(#[source] StorageError),

    #[error("reference resolution failed: {0}")]
    Resolution(String),

    #[error("{failed} attachment upload(s) failed")]
    Upload { failed: usize },

    #[error("file upload timed out after {secs}s")]
    UploadTimeout { secs: u64 },

    #[error("failed to save maintenance task: {0}")]
    Persist(#[source] StorageError),

    #[error("failed to delete maintenance task: {0}")]
    Delete(#[source] StorageError),

    #[error(transparent)]
    Payload(#[from] PayloadError),

    #[error("no failed operations to retry")]
    NothingToRetry,
}

/// State carried across one save and any retries of it.
pub struct SaveSession {
    mode: SaveMode,
    task_id: Option<String>,
    phase: SavePhase,
    /// Per service group; `None` until the group resolved successfully.
    resolved: Vec<Option<ResolvedGroup>>,
    /// Objects written during the current attempt.
    uploaded: Vec<UploadedObject>,
    report: watch::Sender<SaveReport>,
    allow_partial_save: bool,
}

impl SaveSession {
    pub fn mode(&self) -> SaveMode {
        self.mode
    }

    pub fn phase(&self) -> SavePhase {
        self.phase
    }

    /// Id of the task being saved. `None` before creation and after the
    /// created task was rolled back.
    pub fn task_id(&self) -> Option<&str> {
        self.task_id.as_deref()
    }

    pub fn report(&self) -> SaveReport {
        self.report.borrow().clone()
    }

    pub fn subscribe(&self) -> DiagnosticsReporter {
        DiagnosticsReporter::new(self.report.subscribe(), self.allow_partial_save)
    }

    fn update<F>(&self, modify: F)
    where
        F: FnOnce(&mut SaveReport),
    {
        self.report.send_modify(modify);
    }

    fn enter(&mut self, phase: SavePhase) {
        tracing::info!(from = ?self.phase, to = ?phase, "save phase");
        self.phase = phase;
    }
}

/// Outcome of [`SaveOrchestrator::submit`].
pub struct Submission {
    /// `None` when validation stopped the submit before any save started.
    pub session: Option<SaveSession>,
    pub result: Result<TaskRecord, SaveError>,
    pub toast: Toast,
}

pub struct SaveOrchestrator<S: FleetStore, B: ObjectStore> {
    store: Arc<S>,
    bucket: Arc<B>,
    organization_id: String,
    config: SaveConfig,
}

impl<S: FleetStore, B: ObjectStore> SaveOrchestrator<S, B> {
    pub fn new(
        store: Arc<S>,
        bucket: Arc<B>,
        organization_id: impl Into<String>,
        config: SaveConfig,
    ) -> Self {
        SaveOrchestrator {
            store,
            bucket,
            organization_id: organization_id.into(),
            config,
        }
    }

    pub fn config(&self) -> &SaveConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Set up a session and its operation tree without touching storage.
    ///
    /// Passing `existing_task_id` saves in update mode: no creation phase and
    /// no rollback.
    pub fn begin(&self, draft: &MaintenanceDraft, existing_task_id: Option<String>) -> SaveSession {
        let mode = if existing_task_id.is_some() {
            SaveMode::Update
        } else {
            SaveMode::Create
        };
        let groups = draft.service_groups.len();

        let mut operations = Vec::new();
        if mode == SaveMode::Create {
            operations.push(SaveOperation::new(OP_TASK_CREATION, "Create maintenance task"));
        }
        operations.push(
            SaveOperation::new(OP_REFERENCE_RESOLUTION, "Resolve tasks and vendors").with_children(
                (0..groups)
                    .map(|i| SaveOperation::new(resolution_op_id(i), format!("Group {}", i + 1)))
                    .collect(),
            ),
        );
        operations.push(
            SaveOperation::new(OP_FILE_UPLOAD, "Upload files").with_children(
                upload::pending_targets(draft)
                    .iter()
                    .map(|t| SaveOperation::new(t.op_id(), t.label()))
                    .collect(),
            ),
        );
        operations.push(SaveOperation::new(OP_DATABASE_SAVE, "Save maintenance task"));

        let (report, _) = watch::channel(SaveReport {
            operations,
            task_id: existing_task_id.clone(),
            compensated: false,
        });
        SaveSession {
            mode,
            task_id: existing_task_id,
            phase: SavePhase::Idle,
            resolved: vec![None; groups],
            uploaded: Vec::new(),
            report,
            allow_partial_save: self.config.allow_partial_save,
        }
    }

    /// Run every phase of a fresh save.
    ///
    /// The draft is updated in place as attachments are uploaded, so a retry
    /// never uploads the same file twice.
    pub async fn run(
        &self,
        session: &mut SaveSession,
        draft: &mut MaintenanceDraft,
    ) -> Result<TaskRecord, SaveError> {
        tracing::info!(
            mode = ?session.mode,
            groups = draft.service_groups.len(),
            pending_uploads = draft.pending_uploads(),
            "saving maintenance task"
        );
        session.resolved = vec![None; draft.service_groups.len()];
        self.execute(session, draft).await
    }

    /// [`begin`](Self::begin) followed by [`run`](Self::run).
    pub async fn save(
        &self,
        draft: &mut MaintenanceDraft,
        existing_task_id: Option<String>,
    ) -> (SaveSession, Result<TaskRecord, SaveError>) {
        let mut session = self.begin(draft, existing_task_id);
        let result = self.run(&mut session, draft).await;
        (session, result)
    }

    /// Validate the form and save it, producing the toast to show.
    pub async fn submit(
        &self,
        form: &mut MaintenanceForm,
        existing_task_id: Option<String>,
        now: OffsetDateTime,
    ) -> Submission {
        if let Err(e) = form.validate(now) {
            tracing::debug!(field = %e.field(), "submission rejected");
            let result = Err(SaveError::Validation(e));
            let toast = Toast::for_result(&result);
            return Submission {
                session: None,
                result,
                toast,
            };
        }
        let (session, result) = self.save(form.draft_mut(), existing_task_id).await;
        if let Err(e) = &result {
            tracing::error!(error = %e, "maintenance task save failed");
        }
        let toast = Toast::for_result(&result);
        Submission {
            session: Some(session),
            result,
            toast,
        }
    }

    /// Re-run what failed in the last attempt.
    ///
    /// Groups that already resolved and files that already uploaded are not
    /// touched again. The task is re-created if it was rolled back, and the
    /// final database write always runs.
    pub async fn retry_failed(
        &self,
        session: &mut SaveSession,
        draft: &mut MaintenanceDraft,
    ) -> Result<TaskRecord, SaveError> {
        let failed = session.report().failed_ids();
        if failed.is_empty() {
            return Err(SaveError::NothingToRetry);
        }
        tracing::info!(operations = ?failed, "retrying failed save operations");
        session.update(|r| {
            for id in &failed {
                r.reset(id);
            }
            r.reset(OP_DATABASE_SAVE);
        });
        if session.resolved.len() != draft.service_groups.len() {
            session.resolved = vec![None; draft.service_groups.len()];
        }
        self.execute(session, draft).await
    }

    /// Delete a persisted task together with its line items.
    pub async fn delete(&self, task_id: &str) -> Result<(), SaveError> {
        self.store
            .delete_task(task_id)
            .await
            .map_err(SaveError::Delete)?;
        tracing::info!(task_id, "deleted maintenance task");
        Ok(())
    }

    // ── Phases ────────────────────────────────────────────────────────────────

    async fn execute(
        &self,
        session: &mut SaveSession,
        draft: &mut MaintenanceDraft,
    ) -> Result<TaskRecord, SaveError> {
        session.uploaded.clear();
        let (task_id, created_now) = self.ensure_task(session, draft).await?;

        if let Err(e) = self.resolve_references(session, draft).await {
            return Err(self.abort(session, draft, created_now, e).await);
        }

        if let Err(e) = self.upload_files(session, draft, &task_id).await {
            if !self.config.allow_partial_save {
                return Err(self.abort(session, draft, created_now, e).await);
            }
            tracing::warn!(error = %e, "continuing with partial uploads");
        }

        session.enter(SavePhase::DatabaseSave);
        session.update(|r| r.start(OP_DATABASE_SAVE));
        match self.persist(session, draft, &task_id, created_now).await {
            Ok(saved) => {
                session.update(|r| r.succeed(OP_DATABASE_SAVE));
                session.enter(SavePhase::Done);
                tracing::info!(task_id = %task_id, "maintenance task saved");
                Ok(saved)
            }
            Err(e) => {
                let message = e.to_string();
                session.update(|r| r.fail(OP_DATABASE_SAVE, message));
                Err(self.abort(session, draft, created_now, e).await)
            }
        }
    }

    /// Returns the task id and whether the task was created by this call.
    async fn ensure_task(
        &self,
        session: &mut SaveSession,
        draft: &MaintenanceDraft,
    ) -> Result<(String, bool), SaveError> {
        if let Some(id) = &session.task_id {
            return Ok((id.clone(), false));
        }

        session.enter(SavePhase::TaskCreation);
        session.update(|r| r.start(OP_TASK_CREATION));
        let created = match payload::base_record(draft, &self.organization_id) {
            Ok(record) => self.store.create_task(record).await.map_err(SaveError::Create),
            Err(e) => Err(SaveError::Payload(e)),
        };
        match created {
            Ok(task) => {
                tracing::info!(task_id = %task.id, "created maintenance task");
                let id = task.id.clone();
                session.task_id = Some(task.id);
                session.update(|r| {
                    r.succeed(OP_TASK_CREATION);
                    r.task_id = Some(id.clone());
                    r.compensated = false;
                });
                Ok((id, true))
            }
            Err(e) => {
                let message = e.to_string();
                session.update(|r| r.fail(OP_TASK_CREATION, message));
                session.enter(SavePhase::Error);
                Err(e)
            }
        }
    }

    async fn resolve_references(
        &self,
        session: &mut SaveSession,
        draft: &MaintenanceDraft,
    ) -> Result<(), SaveError> {
        session.enter(SavePhase::ReferenceResolution);
        let groups = draft.service_groups.len();
        session.resolved.resize(groups, None);

        let todo: Vec<usize> = (0..groups)
            .filter(|&i| session.resolved[i].is_none())
            .collect();
        session.update(|r| {
            for i in 0..groups {
                r.ensure_child(
                    OP_REFERENCE_RESOLUTION,
                    SaveOperation::new(resolution_op_id(i), format!("Group {}", i + 1)),
                );
            }
            r.start(OP_REFERENCE_RESOLUTION);
        });

        let resolver = ReferenceResolver::new(
            self.store.as_ref(),
            &self.organization_id,
            &self.config.custom_category,
        );
        let mut failures = Vec::new();
        for i in todo {
            let op = resolution_op_id(i);
            session.update(|r| r.start(&op));
            let resolved = resolver.resolve_group(&draft.service_groups[i]).await;

            let mut notes = resolved.warnings.clone();
            if let Some(name) = &resolved.unresolved_vendor {
                match self.config.vendor_policy {
                    VendorPolicy::Require => {
                        let message = format!("vendor '{}' not found", name);
                        failures.push(format!("group {}: {}", i + 1, message));
                        session.update(|r| r.fail(&op, message));
                        continue;
                    }
                    VendorPolicy::Degrade => {
                        notes.push(format!("vendor '{}' not found, saved without vendor", name));
                    }
                }
            }
            session.resolved[i] = Some(resolved);
            session.update(|r| {
                r.succeed(&op);
                if !notes.is_empty() {
                    r.note(&op, notes.join("; "));
                }
            });
        }

        if failures.is_empty() {
            session.update(|r| r.succeed(OP_REFERENCE_RESOLUTION));
            Ok(())
        } else {
            let message = failures.join("; ");
            session.update(|r| r.fail(OP_REFERENCE_RESOLUTION, message.clone()));
            Err(SaveError::Resolution(message))
        }
    }

    async fn upload_files(
        &self,
        session: &mut SaveSession,
        draft: &mut MaintenanceDraft,
        task_id: &str,
    ) -> Result<(), SaveError> {
        session.enter(SavePhase::FileUpload);
        let targets = upload::pending_targets(draft);
        if targets.is_empty() {
            session.update(|r| r.succeed(OP_FILE_UPLOAD));
            return Ok(());
        }

        session.update(|r| {
            r.start(OP_FILE_UPLOAD);
            r.set_progress(OP_FILE_UPLOAD, 0);
            for t in &targets {
                r.ensure_child(OP_FILE_UPLOAD, SaveOperation::new(t.op_id(), t.label()));
                r.start(&t.op_id());
            }
        });

        let uploader = FileUploader::new(self.bucket.as_ref(), &self.config.compression);
        let total = targets.len();
        let mut finished: Vec<TargetUpload> = Vec::with_capacity(total);
        let timed_out = {
            let mut pending: FuturesUnordered<_> = targets
                .iter()
                .map(|t| {
                    let files =
                        upload::attachments(&draft.service_groups[t.group], t.category).to_vec();
                    uploader.upload_target(task_id, *t, files)
                })
                .collect();
            let session = &*session;
            let finished = &mut finished;
            let drive = async move {
                while let Some(result) = pending.next().await {
                    let percent = ((finished.len() + 1) * 100 / total) as u8;
                    session.update(|r| {
                        let op = result.target.op_id();
                        match result.error_message() {
                            None => r.succeed(&op),
                            Some(message) => r.fail(&op, message),
                        }
                        r.set_progress(OP_FILE_UPLOAD, percent);
                    });
                    finished.push(result);
                }
            };
            tokio::time::timeout(self.config.upload_timeout(), drive)
                .await
                .is_err()
        };

        for result in &finished {
            upload::apply(draft, result);
            session.uploaded.extend(result.objects.iter().cloned());
        }
        let mut failed = finished.iter().filter(|r| !r.is_success()).count();

        if timed_out {
            let secs = self.config.upload_timeout_secs;
            let done: HashSet<UploadTarget> = finished.iter().map(|r| r.target).collect();
            let unfinished: Vec<UploadTarget> = targets
                .into_iter()
                .filter(|t| !done.contains(t))
                .collect();
            failed += unfinished.len();
            tracing::warn!(secs, unfinished = unfinished.len(), "file upload timed out");
            session.update(|r| {
                for t in &unfinished {
                    r.fail(&t.op_id(), format!("timed out after {}s", secs));
                }
            });
        }

        if failed == 0 {
            session.update(|r| r.succeed(OP_FILE_UPLOAD));
            return Ok(());
        }
        let err = if timed_out {
            SaveError::UploadTimeout {
                secs: self.config.upload_timeout_secs,
            }
        } else {
            SaveError::Upload { failed }
        };
        let message = err.to_string();
        session.update(|r| r.fail(OP_FILE_UPLOAD, message));
        Err(err)
    }

    /// Write the full row, then the line items.
    ///
    /// For a task that existed before this attempt, the stored row and line
    /// items are read first and written back if either write fails. A task
    /// created in this attempt is removed by [`abort`](Self::abort) instead.
    async fn persist(
        &self,
        session: &SaveSession,
        draft: &MaintenanceDraft,
        task_id: &str,
        created_now: bool,
    ) -> Result<TaskRecord, SaveError> {
        let resolved: Vec<ResolvedGroup> = session
            .resolved
            .iter()
            .map(|r| r.clone().unwrap_or_default())
            .collect();
        let record = payload::full_record(draft, &self.organization_id, task_id, &resolved)?;
        let items = payload::line_item_records(task_id, draft);

        let prior = if created_now {
            None
        } else {
            let row = self.store.get_task(task_id).await.map_err(SaveError::Persist)?;
            let line_items = self
                .store
                .list_line_items(task_id)
                .await
                .map_err(SaveError::Persist)?;
            Some((row, line_items))
        };

        let saved = self
            .store
            .update_task(record)
            .await
            .map_err(SaveError::Persist)?;
        if let Err(e) = self.store.replace_line_items(task_id, items).await {
            if let Some((row, line_items)) = prior {
                self.restore_prior(task_id, row, line_items).await;
            }
            return Err(SaveError::Persist(e));
        }
        Ok(saved)
    }

    async fn restore_prior(
        &self,
        task_id: &str,
        row: TaskRecord,
        line_items: Vec<LineItemRecord>,
    ) {
        tracing::warn!(task_id, "restoring previous maintenance task row");
        if let Err(e) = self.store.update_task(row).await {
            tracing::error!(task_id, error = %e, "failed to restore maintenance task row");
        }
        if let Err(e) = self.store.replace_line_items(task_id, line_items).await {
            tracing::error!(task_id, error = %e, "failed to restore line items");
        }
    }

    /// Move to the error phase and, if this attempt created the task, delete
    /// it again together with the files uploaded under its id. Rollback
    /// failures are logged; the original error is returned.
    async fn abort(
        &self,
        session: &mut SaveSession,
        draft: &mut MaintenanceDraft,
        created_now: bool,
        err: SaveError,
    ) -> SaveError {
        session.enter(SavePhase::Error);
        tracing::warn!(error = %err, "save failed");
        if !created_now || session.mode != SaveMode::Create {
            return err;
        }
        let Some(task_id) = session.task_id.clone() else {
            return err;
        };

        tracing::warn!(task_id = %task_id, "rolling back created maintenance task");
        if let Err(e) = self.store.delete_task(&task_id).await {
            tracing::error!(task_id = %task_id, error = %e, "failed to roll back maintenance task");
            return err;
        }
        session.task_id = None;

        let objects = std::mem::take(&mut session.uploaded);
        if !objects.is_empty() {
            let paths: Vec<String> = objects.iter().map(|o| o.path.clone()).collect();
            if let Err(e) = self.bucket.remove(&paths).await {
                tracing::error!(task_id = %task_id, error = %e, "failed to remove uploaded files");
            }
            for object in &objects {
                upload::restore(draft, object);
            }
        }

        session.update(|r| {
            r.compensated = true;
            r.task_id = None;
            r.fail(OP_TASK_CREATION, "rolled back after a later failure");
            if !objects.is_empty() {
                r.note(
                    OP_FILE_UPLOAD,
                    format!("{} uploaded file(s) removed with the task", objects.len()),
                );
            }
        });
        err
    }
}
