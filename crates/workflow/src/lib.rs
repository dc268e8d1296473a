//! fleet-workflow: saving a maintenance task against the hosted backend.
//!
//! - [`SaveOrchestrator`] -- ordered save phases with rollback and retry
//! - [`ReferenceResolver`] -- task labels and vendor names to catalog ids
//! - [`FileUploader`] -- attachment compression and upload
//! - [`DiagnosticsReporter`] -- live operation tree and follow-up actions
//! - [`SaveConfig`] / [`ClientConfig`] -- TOML and environment configuration
//!
//! With the `rest` feature (default), [`adapter`] provides `FleetStore` and
//! `ObjectStore` implementations over HTTP.

#[cfg(feature = "rest")]
pub mod adapter;
pub mod compress;
pub mod config;
pub mod diagnostics;
pub mod payload;
pub mod resolver;
pub mod save;
pub mod upload;

pub use config::{ClientConfig, CompressionConfig, ConfigError, SaveConfig, VendorPolicy};
pub use diagnostics::{
    render_report, DiagnosticsAction, DiagnosticsReporter, OpStatus, SaveOperation, SaveReport,
    Toast, ToastKind,
};
pub use payload::PayloadError;
pub use resolver::{ReferenceResolver, ResolvedGroup};
pub use save::{
    SaveError, SaveMode, SaveOrchestrator, SavePhase, SaveSession, Submission, OP_DATABASE_SAVE,
    OP_FILE_UPLOAD, OP_REFERENCE_RESOLUTION, OP_TASK_CREATION,
};
pub use upload::{AttachmentCategory, FileUploader, TargetUpload, UploadTarget, UploadedObject};
