//! In-memory `FleetStore` and `ObjectStore` backends.
//!
//! Used by tests and dry runs. Both backends support fault injection so the
//! save workflow's failure paths can be exercised deterministically.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::StorageError;
use crate::record::{
    catalog_key, CatalogTask, LineItemRecord, NewCatalogTask, TaskRecord, Vendor,
};
use crate::traits::{FleetStore, ObjectStore};

/// A `FleetStore` call that can be forced to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    CreateTask,
    UpdateTask,
    DeleteTask,
    GetTask,
    ReplaceLineItems,
    FindCatalogTasks,
    InsertCatalogTasks,
    FindVendor,
}

#[derive(Default)]
struct Tables {
    tasks: BTreeMap<String, TaskRecord>,
    line_items: BTreeMap<String, Vec<LineItemRecord>>,
    catalog: Vec<CatalogTask>,
    vendors: Vec<Vendor>,
}

#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
    fail_points: StdMutex<HashSet<FailPoint>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        InMemoryStore::default()
    }

    /// Make every subsequent call of `point` fail with a backend error.
    pub fn fail_on(&self, point: FailPoint) {
        self.fail_points
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(point);
    }

    pub fn clear_failures(&self) {
        self.fail_points
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    fn check(&self, point: FailPoint) -> Result<(), StorageError> {
        let failing = self
            .fail_points
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&point);
        if failing {
            return Err(StorageError::Backend(format!("injected failure: {:?}", point)));
        }
        Ok(())
    }

    pub async fn task_count(&self) -> usize {
        self.tables.lock().await.tasks.len()
    }

    pub async fn catalog(&self) -> Vec<CatalogTask> {
        self.tables.lock().await.catalog.clone()
    }
}

#[async_trait]
impl FleetStore for InMemoryStore {
    async fn create_task(&self, mut record: TaskRecord) -> Result<TaskRecord, StorageError> {
        self.check(FailPoint::CreateTask)?;
        record.id = uuid::Uuid::new_v4().to_string();
        let mut tables = self.tables.lock().await;
        tables.tasks.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn update_task(&self, record: TaskRecord) -> Result<TaskRecord, StorageError> {
        self.check(FailPoint::UpdateTask)?;
        let mut tables = self.tables.lock().await;
        match tables.tasks.get_mut(&record.id) {
            Some(slot) => {
                *slot = record.clone();
                Ok(record)
            }
            None => Err(StorageError::TaskNotFound { task_id: record.id }),
        }
    }

    async fn delete_task(&self, task_id: &str) -> Result<(), StorageError> {
        self.check(FailPoint::DeleteTask)?;
        let mut tables = self.tables.lock().await;
        if tables.tasks.remove(task_id).is_none() {
            return Err(StorageError::TaskNotFound {
                task_id: task_id.to_string(),
            });
        }
        tables.line_items.remove(task_id);
        Ok(())
    }

    async fn get_task(&self, task_id: &str) -> Result<TaskRecord, StorageError> {
        self.check(FailPoint::GetTask)?;
        let tables = self.tables.lock().await;
        tables
            .tasks
            .get(task_id)
            .cloned()
            .ok_or_else(|| StorageError::TaskNotFound {
                task_id: task_id.to_string(),
            })
    }

    async fn list_tasks(
        &self,
        organization_id: &str,
        vehicle_id: Option<&str>,
    ) -> Result<Vec<TaskRecord>, StorageError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .tasks
            .values()
            .filter(|t| t.organization_id == organization_id)
            .filter(|t| vehicle_id.map_or(true, |v| t.vehicle_id == v))
            .cloned()
            .collect())
    }

    async fn replace_line_items(
        &self,
        task_id: &str,
        items: Vec<LineItemRecord>,
    ) -> Result<(), StorageError> {
        self.check(FailPoint::ReplaceLineItems)?;
        let mut tables = self.tables.lock().await;
        if !tables.tasks.contains_key(task_id) {
            return Err(StorageError::TaskNotFound {
                task_id: task_id.to_string(),
            });
        }
        tables.line_items.insert(task_id.to_string(), items);
        Ok(())
    }

    async fn list_line_items(&self, task_id: &str) -> Result<Vec<LineItemRecord>, StorageError> {
        let tables = self.tables.lock().await;
        let mut items = tables.line_items.get(task_id).cloned().unwrap_or_default();
        items.sort_by_key(|li| (li.group_index, li.position));
        Ok(items)
    }

    async fn find_catalog_tasks(
        &self,
        organization_id: &str,
        names: &[String],
    ) -> Result<Vec<CatalogTask>, StorageError> {
        self.check(FailPoint::FindCatalogTasks)?;
        let wanted: HashSet<String> = names.iter().map(|n| catalog_key(n)).collect();
        let tables = self.tables.lock().await;
        Ok(tables
            .catalog
            .iter()
            .filter(|c| c.organization_id == organization_id)
            .filter(|c| wanted.contains(&catalog_key(&c.name)))
            .cloned()
            .collect())
    }

    async fn insert_catalog_tasks(
        &self,
        organization_id: &str,
        entries: Vec<NewCatalogTask>,
    ) -> Result<Vec<CatalogTask>, StorageError> {
        self.check(FailPoint::InsertCatalogTasks)?;
        let mut tables = self.tables.lock().await;
        let mut seen: HashSet<String> = tables
            .catalog
            .iter()
            .filter(|c| c.organization_id == organization_id)
            .map(|c| catalog_key(&c.name))
            .collect();
        for entry in &entries {
            if !seen.insert(catalog_key(&entry.name)) {
                return Err(StorageError::DuplicateCatalogEntry {
                    organization_id: organization_id.to_string(),
                    name: entry.name.clone(),
                });
            }
        }
        let inserted: Vec<CatalogTask> = entries
            .into_iter()
            .map(|e| CatalogTask {
                id: uuid::Uuid::new_v4().to_string(),
                organization_id: organization_id.to_string(),
                name: e.name.trim().to_string(),
                category: e.category,
            })
            .collect();
        tables.catalog.extend(inserted.iter().cloned());
        Ok(inserted)
    }

    async fn find_vendor(
        &self,
        organization_id: &str,
        name: &str,
    ) -> Result<Option<Vendor>, StorageError> {
        self.check(FailPoint::FindVendor)?;
        let key = catalog_key(name);
        let tables = self.tables.lock().await;
        Ok(tables
            .vendors
            .iter()
            .find(|v| v.organization_id == organization_id && catalog_key(&v.name) == key)
            .cloned())
    }

    async fn insert_vendor(
        &self,
        organization_id: &str,
        name: &str,
    ) -> Result<Vendor, StorageError> {
        let key = catalog_key(name);
        let mut tables = self.tables.lock().await;
        if tables
            .vendors
            .iter()
            .any(|v| v.organization_id == organization_id && catalog_key(&v.name) == key)
        {
            return Err(StorageError::DuplicateCatalogEntry {
                organization_id: organization_id.to_string(),
                name: name.to_string(),
            });
        }
        let vendor = Vendor {
            id: uuid::Uuid::new_v4().to_string(),
            organization_id: organization_id.to_string(),
            name: name.trim().to_string(),
        };
        tables.vendors.push(vendor.clone());
        Ok(vendor)
    }
}

// ──────────────────────────────────────────────
// Object store
// ──────────────────────────────────────────────

/// A stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

pub struct InMemoryBucket {
    base_url: String,
    objects: Mutex<BTreeMap<String, StoredObject>>,
    fail_prefixes: StdMutex<Vec<String>>,
    delay: StdMutex<Option<Duration>>,
}

impl Default for InMemoryBucket {
    fn default() -> Self {
        InMemoryBucket::new("memory://bucket")
    }
}

impl InMemoryBucket {
    pub fn new(base_url: impl Into<String>) -> Self {
        InMemoryBucket {
            base_url: base_url.into(),
            objects: Mutex::new(BTreeMap::new()),
            fail_prefixes: StdMutex::new(Vec::new()),
            delay: StdMutex::new(None),
        }
    }

    /// Fail uploads whose path starts with `prefix`.
    pub fn fail_uploads_under(&self, prefix: impl Into<String>) {
        self.fail_prefixes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(prefix.into());
    }

    pub fn clear_failures(&self) {
        self.fail_prefixes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// Delay every upload, e.g. to trip an upload timeout.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap_or_else(|e| e.into_inner()) = delay;
    }

    pub fn public_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    pub async fn object(&self, path: &str) -> Option<StoredObject> {
        self.objects.lock().await.get(path).cloned()
    }

    pub async fn paths(&self) -> Vec<String> {
        self.objects.lock().await.keys().cloned().collect()
    }
}

#[async_trait]
impl ObjectStore for InMemoryBucket {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let delay = *self.delay.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failing = self
            .fail_prefixes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|p| path.starts_with(p.as_str()));
        if failing {
            return Err(StorageError::Object {
                path: path.to_string(),
                message: "injected upload failure".to_string(),
            });
        }
        self.objects.lock().await.insert(
            path.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(self.public_url(path))
    }

    async fn remove(&self, paths: &[String]) -> Result<(), StorageError> {
        let mut objects = self.objects.lock().await;
        for path in paths {
            objects.remove(path);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fail_point_applies_until_cleared() {
        let store = InMemoryStore::new();
        store.fail_on(FailPoint::FindVendor);
        assert!(matches!(
            store.find_vendor("org", "Acme").await,
            Err(StorageError::Backend(_))
        ));
        store.clear_failures();
        assert_eq!(store.find_vendor("org", "Acme").await, Ok(None));
    }

    #[tokio::test]
    async fn bucket_upload_returns_public_url() {
        let bucket = InMemoryBucket::new("https://cdn.example/bills/");
        let url = bucket
            .upload("t1/group0/bill/a.pdf", vec![1, 2, 3], "application/pdf")
            .await
            .unwrap();
        assert_eq!(url, "https://cdn.example/bills/t1/group0/bill/a.pdf");
        let obj = bucket.object("t1/group0/bill/a.pdf").await.unwrap();
        assert_eq!(obj.content_type, "application/pdf");
    }

    #[tokio::test]
    async fn bucket_fails_only_matching_prefix() {
        let bucket = InMemoryBucket::default();
        bucket.fail_uploads_under("t1/group0/battery");
        assert!(bucket
            .upload("t1/group0/battery/w.pdf", vec![], "application/pdf")
            .await
            .is_err());
        assert!(bucket
            .upload("t1/group0/bill/b.pdf", vec![], "application/pdf")
            .await
            .is_ok());
    }
}
