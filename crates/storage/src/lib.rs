pub mod conformance;
mod error;
pub mod memory;
mod record;
mod traits;

pub use error::StorageError;
pub use memory::{FailPoint, InMemoryBucket, InMemoryStore};
pub use record::{
    catalog_key, CatalogTask, LineItemRecord, NewCatalogTask, ServiceGroupRecord, TaskRecord,
    Vendor,
};
pub use traits::{FleetStore, ObjectStore};
