use async_trait::async_trait;

use crate::error::StorageError;
use crate::record::{CatalogTask, LineItemRecord, NewCatalogTask, TaskRecord, Vendor};

/// The storage trait for the hosted fleet database.
///
/// A `FleetStore` holds maintenance tasks, their line items, and the
/// organization-scoped catalogs used to resolve task labels and vendor names.
///
/// ## Atomicity
///
/// Each method is a single request against the backend and either fully
/// succeeds or fully fails. There is no multi-call transaction: callers that
/// need all-or-nothing behaviour across calls (the save workflow) compensate
/// by deleting what they created.
///
/// ## Name matching
///
/// Catalog lookups match names case-insensitively after trimming
/// (see [`crate::catalog_key`]).
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` so they can be shared
/// behind an `Arc` across async tasks.
#[async_trait]
pub trait FleetStore: Send + Sync + 'static {
    // ── Maintenance tasks ─────────────────────────────────────────────────────

    /// Insert a task. The backend assigns the id; any id on `record` is
    /// ignored. Returns the stored row.
    async fn create_task(&self, record: TaskRecord) -> Result<TaskRecord, StorageError>;

    /// Overwrite an existing task row.
    ///
    /// Returns `Err(StorageError::TaskNotFound)` if `record.id` does not exist.
    async fn update_task(&self, record: TaskRecord) -> Result<TaskRecord, StorageError>;

    /// Delete a task and its line items.
    ///
    /// Returns `Err(StorageError::TaskNotFound)` if the task does not exist.
    async fn delete_task(&self, task_id: &str) -> Result<(), StorageError>;

    /// Returns `Err(StorageError::TaskNotFound)` if the task does not exist.
    async fn get_task(&self, task_id: &str) -> Result<TaskRecord, StorageError>;

    /// List an organization's tasks, optionally for one vehicle.
    async fn list_tasks(
        &self,
        organization_id: &str,
        vehicle_id: Option<&str>,
    ) -> Result<Vec<TaskRecord>, StorageError>;

    // ── Line items ────────────────────────────────────────────────────────────

    /// Replace every line item of a task with `items`.
    async fn replace_line_items(
        &self,
        task_id: &str,
        items: Vec<LineItemRecord>,
    ) -> Result<(), StorageError>;

    /// Line items of a task ordered by group index, then position.
    async fn list_line_items(&self, task_id: &str) -> Result<Vec<LineItemRecord>, StorageError>;

    // ── Catalogs ──────────────────────────────────────────────────────────────

    /// Catalog tasks whose names match any of `names`.
    async fn find_catalog_tasks(
        &self,
        organization_id: &str,
        names: &[String],
    ) -> Result<Vec<CatalogTask>, StorageError>;

    /// Insert catalog tasks. Returns the stored rows in input order.
    ///
    /// Returns `Err(StorageError::DuplicateCatalogEntry)` if a name already
    /// exists in the organization; nothing is inserted in that case.
    async fn insert_catalog_tasks(
        &self,
        organization_id: &str,
        entries: Vec<NewCatalogTask>,
    ) -> Result<Vec<CatalogTask>, StorageError>;

    /// Look up a vendor by name.
    async fn find_vendor(
        &self,
        organization_id: &str,
        name: &str,
    ) -> Result<Option<Vendor>, StorageError>;

    /// Insert a vendor.
    ///
    /// Returns `Err(StorageError::DuplicateCatalogEntry)` if the name exists.
    async fn insert_vendor(&self, organization_id: &str, name: &str)
        -> Result<Vendor, StorageError>;
}

/// Remote object storage for bills and warranty documents.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Store `bytes` at `path` and return the object's public URL.
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StorageError>;

    /// Remove objects. Missing paths are ignored.
    async fn remove(&self, paths: &[String]) -> Result<(), StorageError>;
}
