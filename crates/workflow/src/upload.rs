//! Attachment upload for service groups.
//!
//! Attachments are grouped into upload targets: one per service group and
//! category (bills, battery warranty, tyre warranty, each part's warranty).
//! Targets upload independently; within a target files go one after the
//! other. The save orchestrator drives targets concurrently and owns the
//! phase timeout.
//!
//! Object names carry the attachment's position in its list, so two files
//! with the same name in one target never share a key.

use std::fmt;

use fleet_core::{Attachment, MaintenanceDraft, ServiceGroup};
use fleet_storage::ObjectStore;

use crate::compress::prepare_file;
use crate::config::CompressionConfig;

/// Which attachment list of a service group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AttachmentCategory {
    Bill,
    Battery,
    Tyre,
    /// Warranty documents of the part at this index.
    Part(usize),
}

impl AttachmentCategory {
    /// Segment used in object paths and operation ids.
    pub fn path_segment(&self) -> String {
        match self {
            AttachmentCategory::Bill => "bill".to_string(),
            AttachmentCategory::Battery => "battery".to_string(),
            AttachmentCategory::Tyre => "tyre".to_string(),
            AttachmentCategory::Part(n) => format!("part{}", n),
        }
    }
}

impl fmt::Display for AttachmentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttachmentCategory::Bill => write!(f, "bills"),
            AttachmentCategory::Battery => write!(f, "battery warranty"),
            AttachmentCategory::Tyre => write!(f, "tyre warranty"),
            AttachmentCategory::Part(n) => write!(f, "part {} warranty", n + 1),
        }
    }
}

/// One group/category pair with files to upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UploadTarget {
    pub group: usize,
    pub category: AttachmentCategory,
}

impl UploadTarget {
    pub fn new(group: usize, category: AttachmentCategory) -> Self {
        UploadTarget { group, category }
    }

    /// Diagnostics id, nested under the file upload phase.
    pub fn op_id(&self) -> String {
        format!(
            "{}/group{}/{}",
            crate::save::OP_FILE_UPLOAD,
            self.group,
            self.category.path_segment()
        )
    }

    pub fn label(&self) -> String {
        format!("Group {}: {}", self.group + 1, self.category)
    }

    /// Object key for the attachment at `position` in this target's list.
    pub fn object_path(&self, task_id: &str, position: usize, file_name: &str) -> String {
        format!(
            "{}/group{}/{}/{}-{}",
            task_id,
            self.group,
            self.category.path_segment(),
            position,
            file_name
        )
    }
}

pub fn attachments(group: &ServiceGroup, category: AttachmentCategory) -> &[Attachment] {
    match category {
        AttachmentCategory::Bill => &group.bills,
        AttachmentCategory::Battery => group
            .battery
            .as_ref()
            .map(|b| b.warranty_files.as_slice())
            .unwrap_or(&[]),
        AttachmentCategory::Tyre => group
            .tyre
            .as_ref()
            .map(|t| t.warranty_files.as_slice())
            .unwrap_or(&[]),
        AttachmentCategory::Part(n) => group
            .parts
            .get(n)
            .map(|p| p.warranty_files.as_slice())
            .unwrap_or(&[]),
    }
}

fn attachments_mut(
    group: &mut ServiceGroup,
    category: AttachmentCategory,
) -> Option<&mut Vec<Attachment>> {
    match category {
        AttachmentCategory::Bill => Some(&mut group.bills),
        AttachmentCategory::Battery => group.battery.as_mut().map(|b| &mut b.warranty_files),
        AttachmentCategory::Tyre => group.tyre.as_mut().map(|t| &mut t.warranty_files),
        AttachmentCategory::Part(n) => group.parts.get_mut(n).map(|p| &mut p.warranty_files),
    }
}

/// Every target that still holds at least one local file, in group order.
pub fn pending_targets(draft: &MaintenanceDraft) -> Vec<UploadTarget> {
    let mut targets = Vec::new();
    for (index, group) in draft.service_groups.iter().enumerate() {
        let mut categories = vec![
            AttachmentCategory::Bill,
            AttachmentCategory::Battery,
            AttachmentCategory::Tyre,
        ];
        categories.extend((0..group.parts.len()).map(AttachmentCategory::Part));
        for category in categories {
            if attachments(group, category).iter().any(Attachment::is_local) {
                targets.push(UploadTarget::new(index, category));
            }
        }
    }
    targets
}

/// A file written to object storage, with the local attachment it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedObject {
    pub target: UploadTarget,
    pub path: String,
    pub url: String,
    pub source: Attachment,
}

/// Result of uploading one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetUpload {
    pub target: UploadTarget,
    /// The target's attachment list with uploaded files replaced by URLs.
    /// Files that failed stay local.
    pub attachments: Vec<Attachment>,
    pub objects: Vec<UploadedObject>,
    pub errors: Vec<String>,
}

impl TargetUpload {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn error_message(&self) -> Option<String> {
        if self.errors.is_empty() {
            None
        } else {
            Some(self.errors.join("; "))
        }
    }
}

/// Write upload results back into the draft.
pub fn apply(draft: &mut MaintenanceDraft, result: &TargetUpload) {
    let list = draft
        .service_groups
        .get_mut(result.target.group)
        .and_then(|g| attachments_mut(g, result.target.category));
    if let Some(list) = list {
        *list = result.attachments.clone();
    }
}

/// Point an uploaded attachment back at its local file.
pub fn restore(draft: &mut MaintenanceDraft, object: &UploadedObject) {
    let list = draft
        .service_groups
        .get_mut(object.target.group)
        .and_then(|g| attachments_mut(g, object.target.category));
    let Some(list) = list else {
        return;
    };
    for attachment in list.iter_mut() {
        if attachment.url() == Some(object.url.as_str()) {
            *attachment = object.source.clone();
        }
    }
}

pub struct FileUploader<'a, B: ObjectStore> {
    bucket: &'a B,
    compression: &'a CompressionConfig,
}

impl<'a, B: ObjectStore> FileUploader<'a, B> {
    pub fn new(bucket: &'a B, compression: &'a CompressionConfig) -> Self {
        FileUploader {
            bucket,
            compression,
        }
    }

    /// Upload every local file of `files`, which is the current attachment
    /// list of `target`.
    pub async fn upload_target(
        &self,
        task_id: &str,
        target: UploadTarget,
        files: Vec<Attachment>,
    ) -> TargetUpload {
        let mut result = TargetUpload {
            target,
            attachments: Vec::with_capacity(files.len()),
            objects: Vec::new(),
            errors: Vec::new(),
        };
        for (position, attachment) in files.into_iter().enumerate() {
            let Some(path) = attachment.local_path() else {
                result.attachments.push(attachment);
                continue;
            };
            let prepared = match prepare_file(path, self.compression).await {
                Ok(p) => p,
                Err(e) => {
                    result.errors.push(e.to_string());
                    result.attachments.push(attachment);
                    continue;
                }
            };
            let object_path = target.object_path(task_id, position, &prepared.file_name);
            match self
                .bucket
                .upload(&object_path, prepared.bytes, &prepared.content_type)
                .await
            {
                Ok(url) => {
                    tracing::debug!(path = %object_path, "uploaded attachment");
                    result.attachments.push(Attachment::Remote { url: url.clone() });
                    result.objects.push(UploadedObject {
                        target,
                        path: object_path,
                        url,
                        source: attachment,
                    });
                }
                Err(e) => {
                    tracing::warn!(path = %object_path, error = %e, "attachment upload failed");
                    result.errors.push(e.to_string());
                    result.attachments.push(attachment);
                }
            }
        }
        result
    }
}
