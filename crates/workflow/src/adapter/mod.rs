//! REST backends for the hosted database and its object storage.
//!
//! Both speak plain HTTP through `ureq` (sync) wrapped in
//! `tokio::task::spawn_blocking`, authenticating with the project API key.

pub mod bucket;
pub mod rest;

pub use bucket::RestBucket;
pub use rest::PostgrestStore;

use fleet_storage::StorageError;

/// Run a blocking HTTP call off the async runtime.
async fn blocking<T, F>(call: F) -> Result<T, StorageError>
where
    F: FnOnce() -> Result<T, StorageError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|e| StorageError::Backend(format!("task join error: {}", e)))?
}

fn bearer(api_key: &str) -> String {
    format!("Bearer {}", api_key)
}
