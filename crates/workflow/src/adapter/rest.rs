//! `FleetStore` over the hosted database's PostgREST API.
//!
//! Tables live under `{base_url}/rest/v1/{table}`; filters are query
//! parameters such as `id=eq.{id}`. Writes ask for `return=representation`
//! so the stored rows come back in the response.

use async_trait::async_trait;
use fleet_storage::{
    catalog_key, CatalogTask, FleetStore, LineItemRecord, NewCatalogTask, StorageError,
    TaskRecord, Vendor,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use super::{bearer, blocking};
use crate::config::ClientConfig;

pub const TASKS_TABLE: &str = "maintenance_tasks";
pub const LINE_ITEMS_TABLE: &str = "maintenance_line_items";
pub const CATALOG_TABLE: &str = "maintenance_tasks_list";
pub const VENDORS_TABLE: &str = "maintenance_vendors";

type Query = Vec<(&'static str, String)>;

/// Blocking half of the store; cloned into each `spawn_blocking` call.
#[derive(Clone)]
struct Client {
    base_url: String,
    api_key: String,
    agent: ureq::Agent,
}

impl Client {
    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url.trim_end_matches('/'), table)
    }

    fn select<T: DeserializeOwned>(&self, table: &str, query: Query) -> Result<Vec<T>, ureq::Error> {
        let mut request = self
            .agent
            .get(self.table_url(table))
            .header("apikey", &self.api_key)
            .header("Authorization", &bearer(&self.api_key))
            .query("select", "*");
        for (key, value) in query {
            request = request.query(key, value);
        }
        request.call()?.into_body().read_json()
    }

    fn insert<T: DeserializeOwned>(&self, table: &str, body: Value) -> Result<Vec<T>, ureq::Error> {
        self.agent
            .post(self.table_url(table))
            .header("apikey", &self.api_key)
            .header("Authorization", &bearer(&self.api_key))
            .header("Prefer", "return=representation")
            .send_json(body)?
            .into_body()
            .read_json()
    }

    fn update<T: DeserializeOwned>(
        &self,
        table: &str,
        query: Query,
        body: Value,
    ) -> Result<Vec<T>, ureq::Error> {
        let mut request = self
            .agent
            .patch(self.table_url(table))
            .header("apikey", &self.api_key)
            .header("Authorization", &bearer(&self.api_key))
            .header("Prefer", "return=representation");
        for (key, value) in query {
            request = request.query(key, value);
        }
        request.send_json(body)?.into_body().read_json()
    }

    fn delete(&self, table: &str, query: Query) -> Result<Vec<Value>, ureq::Error> {
        let mut request = self
            .agent
            .delete(self.table_url(table))
            .header("apikey", &self.api_key)
            .header("Authorization", &bearer(&self.api_key))
            .header("Prefer", "return=representation");
        for (key, value) in query {
            request = request.query(key, value);
        }
        request.call()?.into_body().read_json()
    }
}

fn eq(value: &str) -> String {
    format!("eq.{}", value)
}

fn backend(e: ureq::Error) -> StorageError {
    match e {
        ureq::Error::StatusCode(code) => StorageError::Backend(format!("HTTP status {}", code)),
        other => StorageError::Backend(other.to_string()),
    }
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Value, StorageError> {
    serde_json::to_value(value).map_err(|e| StorageError::Backend(format!("serialization: {}", e)))
}

fn is_conflict(e: &ureq::Error) -> bool {
    matches!(e, ureq::Error::StatusCode(409))
}

pub struct PostgrestStore {
    client: Client,
}

impl PostgrestStore {
    pub fn new(config: &ClientConfig) -> Self {
        PostgrestStore {
            client: Client {
                base_url: config.database_url.clone(),
                api_key: config.api_key.clone(),
                agent: ureq::Agent::new_with_defaults(),
            },
        }
    }

    pub fn table_url(&self, table: &str) -> String {
        self.client.table_url(table)
    }

    async fn fetch_task(&self, task_id: &str) -> Result<TaskRecord, StorageError> {
        let client = self.client.clone();
        let id = task_id.to_string();
        blocking(move || {
            let rows: Vec<TaskRecord> = client
                .select(TASKS_TABLE, vec![("id", eq(&id))])
                .map_err(backend)?;
            rows.into_iter()
                .next()
                .ok_or(StorageError::TaskNotFound { task_id: id })
        })
        .await
    }
}

#[async_trait]
impl FleetStore for PostgrestStore {
    async fn create_task(&self, mut record: TaskRecord) -> Result<TaskRecord, StorageError> {
        record.id.clear();
        let body = encode(&record)?;
        let client = self.client.clone();
        blocking(move || {
            let rows: Vec<TaskRecord> = client.insert(TASKS_TABLE, body).map_err(backend)?;
            rows.into_iter()
                .next()
                .ok_or_else(|| StorageError::Backend("insert returned no row".to_string()))
        })
        .await
    }

    async fn update_task(&self, record: TaskRecord) -> Result<TaskRecord, StorageError> {
        let body = encode(&record)?;
        let client = self.client.clone();
        let id = record.id;
        blocking(move || {
            let rows: Vec<TaskRecord> = client
                .update(TASKS_TABLE, vec![("id", eq(&id))], body)
                .map_err(backend)?;
            rows.into_iter()
                .next()
                .ok_or(StorageError::TaskNotFound { task_id: id })
        })
        .await
    }

    async fn delete_task(&self, task_id: &str) -> Result<(), StorageError> {
        let client = self.client.clone();
        let id = task_id.to_string();
        blocking(move || {
            client
                .delete(LINE_ITEMS_TABLE, vec![("task_id", eq(&id))])
                .map_err(backend)?;
            let deleted = client
                .delete(TASKS_TABLE, vec![("id", eq(&id))])
                .map_err(backend)?;
            if deleted.is_empty() {
                return Err(StorageError::TaskNotFound { task_id: id });
            }
            Ok(())
        })
        .await
    }

    async fn get_task(&self, task_id: &str) -> Result<TaskRecord, StorageError> {
        self.fetch_task(task_id).await
    }

    async fn list_tasks(
        &self,
        organization_id: &str,
        vehicle_id: Option<&str>,
    ) -> Result<Vec<TaskRecord>, StorageError> {
        let mut query: Query = vec![
            ("organization_id", eq(organization_id)),
            ("order", "start_date.desc".to_string()),
        ];
        if let Some(vehicle) = vehicle_id {
            query.push(("vehicle_id", eq(vehicle)));
        }
        let client = self.client.clone();
        blocking(move || client.select(TASKS_TABLE, query).map_err(backend)).await
    }

    async fn replace_line_items(
        &self,
        task_id: &str,
        items: Vec<LineItemRecord>,
    ) -> Result<(), StorageError> {
        self.fetch_task(task_id).await?;
        let body = encode(&items)?;
        let client = self.client.clone();
        let id = task_id.to_string();
        blocking(move || {
            client
                .delete(LINE_ITEMS_TABLE, vec![("task_id", eq(&id))])
                .map_err(backend)?;
            if !items.is_empty() {
                let _: Vec<Value> = client.insert(LINE_ITEMS_TABLE, body).map_err(backend)?;
            }
            Ok(())
        })
        .await
    }

    async fn list_line_items(&self, task_id: &str) -> Result<Vec<LineItemRecord>, StorageError> {
        let query: Query = vec![
            ("task_id", eq(task_id)),
            ("order", "group_index.asc,position.asc".to_string()),
        ];
        let client = self.client.clone();
        blocking(move || client.select(LINE_ITEMS_TABLE, query).map_err(backend)).await
    }

    async fn find_catalog_tasks(
        &self,
        organization_id: &str,
        names: &[String],
    ) -> Result<Vec<CatalogTask>, StorageError> {
        let keys: Vec<String> = names.iter().map(|n| catalog_key(n)).collect();
        let client = self.client.clone();
        let query: Query = vec![("organization_id", eq(organization_id))];
        blocking(move || {
            let rows: Vec<CatalogTask> = client.select(CATALOG_TABLE, query).map_err(backend)?;
            Ok(rows
                .into_iter()
                .filter(|t| keys.contains(&catalog_key(&t.name)))
                .collect())
        })
        .await
    }

    async fn insert_catalog_tasks(
        &self,
        organization_id: &str,
        entries: Vec<NewCatalogTask>,
    ) -> Result<Vec<CatalogTask>, StorageError> {
        if entries.is_empty() {
            return Ok(Vec::new());
        }
        let first = entries[0].name.trim().to_string();
        let body = Value::Array(
            entries
                .iter()
                .map(|e| {
                    json!({
                        "organization_id": organization_id,
                        "name": e.name.trim(),
                        "category": e.category,
                    })
                })
                .collect(),
        );
        let client = self.client.clone();
        let org = organization_id.to_string();
        blocking(move || match client.insert::<CatalogTask>(CATALOG_TABLE, body) {
            Ok(rows) => Ok(rows),
            Err(e) if is_conflict(&e) => Err(StorageError::DuplicateCatalogEntry {
                organization_id: org,
                name: first,
            }),
            Err(e) => Err(backend(e)),
        })
        .await
    }

    async fn find_vendor(
        &self,
        organization_id: &str,
        name: &str,
    ) -> Result<Option<Vendor>, StorageError> {
        let key = catalog_key(name);
        let client = self.client.clone();
        let query: Query = vec![("organization_id", eq(organization_id))];
        blocking(move || {
            let rows: Vec<Vendor> = client.select(VENDORS_TABLE, query).map_err(backend)?;
            Ok(rows.into_iter().find(|v| catalog_key(&v.name) == key))
        })
        .await
    }

    async fn insert_vendor(
        &self,
        organization_id: &str,
        name: &str,
    ) -> Result<Vendor, StorageError> {
        let body = json!({ "organization_id": organization_id, "name": name.trim() });
        let client = self.client.clone();
        let org = organization_id.to_string();
        let name = name.trim().to_string();
        blocking(move || match client.insert::<Vendor>(VENDORS_TABLE, body) {
            Ok(rows) => rows
                .into_iter()
                .next()
                .ok_or_else(|| StorageError::Backend("insert returned no row".to_string())),
            Err(e) if is_conflict(&e) => Err(StorageError::DuplicateCatalogEntry {
                organization_id: org,
                name,
            }),
            Err(e) => Err(backend(e)),
        })
        .await
    }
}
