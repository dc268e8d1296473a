/// All errors that can be returned by a `FleetStore` or `ObjectStore`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// No maintenance task with the given id.
    #[error("maintenance task not found: {task_id}")]
    TaskNotFound { task_id: String },

    /// A catalog row with this name already exists in the organization.
    #[error("catalog entry already exists in {organization_id}: {name}")]
    DuplicateCatalogEntry {
        organization_id: String,
        name: String,
    },

    /// Upload to or removal from the object store failed.
    #[error("object storage error at {path}: {message}")]
    Object { path: String, message: String },

    /// A backend-specific storage error (connection, HTTP status, serialization, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}
