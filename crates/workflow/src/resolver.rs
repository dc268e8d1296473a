//! Turns the names typed into a service group into catalog ids.
//!
//! Task labels missing from the organization's catalog are inserted on the
//! fly. Vendor names are looked up only. Lookup failures never abort: they
//! are logged and treated as "no match", so the save can still go ahead.

use std::collections::HashMap;

use fleet_core::{ServiceGroup, VendorRef};
use fleet_storage::{catalog_key, FleetStore, NewCatalogTask};

/// Outcome of resolving one service group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedGroup {
    /// Empty when the vendor is unknown.
    pub vendor_id: String,
    /// Catalog ids in the order the tasks were selected.
    pub task_ids: Vec<String>,
    /// Set when a vendor name was given but not found.
    pub unresolved_vendor: Option<String>,
    pub warnings: Vec<String>,
}

pub struct ReferenceResolver<'a, S: FleetStore> {
    store: &'a S,
    organization_id: &'a str,
    custom_category: &'a str,
}

impl<'a, S: FleetStore> ReferenceResolver<'a, S> {
    pub fn new(store: &'a S, organization_id: &'a str, custom_category: &'a str) -> Self {
        ReferenceResolver {
            store,
            organization_id,
            custom_category,
        }
    }

    /// Resolve task labels to catalog ids, inserting unknown labels.
    ///
    /// Labels are matched trimmed and case-insensitively. The result keeps
    /// input order with duplicates removed; labels that could not be
    /// resolved or created are left out.
    pub async fn resolve_tasks(&self, names: &[String]) -> Vec<String> {
        let (ids, _) = self.resolve_task_map(names).await;
        let mut out: Vec<String> = Vec::new();
        for name in names {
            if let Some(id) = ids.get(&catalog_key(name)) {
                if !out.contains(id) {
                    out.push(id.clone());
                }
            }
        }
        out
    }

    /// Look up a vendor id by name. Returns `None` when the vendor is not in
    /// the catalog or the lookup failed.
    pub async fn resolve_vendor(&self, name: &str) -> Option<String> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        match self.store.find_vendor(self.organization_id, name).await {
            Ok(found) => found.map(|v| v.id),
            Err(e) => {
                tracing::warn!(vendor = name, error = %e, "vendor lookup failed");
                None
            }
        }
    }

    pub async fn resolve_group(&self, group: &ServiceGroup) -> ResolvedGroup {
        let mut resolved = ResolvedGroup::default();

        let pending: Vec<String> = group
            .tasks
            .iter()
            .filter(|t| t.id.is_none())
            .map(|t| t.label.clone())
            .collect();
        let (ids, warnings) = self.resolve_task_map(&pending).await;
        resolved.warnings.extend(warnings);

        for task in &group.tasks {
            let id = match &task.id {
                Some(id) => Some(id.clone()),
                None => ids.get(&catalog_key(&task.label)).cloned(),
            };
            if let Some(id) = id {
                if !resolved.task_ids.contains(&id) {
                    resolved.task_ids.push(id);
                }
            }
        }

        match &group.vendor {
            Some(VendorRef::Id { id, .. }) => resolved.vendor_id = id.clone(),
            Some(VendorRef::Name { name }) if !name.trim().is_empty() => {
                match self.resolve_vendor(name).await {
                    Some(id) => resolved.vendor_id = id,
                    None => {
                        tracing::warn!(vendor = %name, "vendor not found in catalog");
                        resolved.unresolved_vendor = Some(name.trim().to_string());
                    }
                }
            }
            _ => {}
        }

        resolved
    }

    /// Map of catalog key to id for `names`, plus warnings for labels that
    /// could not be resolved.
    async fn resolve_task_map(&self, names: &[String]) -> (HashMap<String, String>, Vec<String>) {
        let mut wanted: Vec<(String, String)> = Vec::new();
        for name in names {
            let key = catalog_key(name);
            if !key.is_empty() && !wanted.iter().any(|(k, _)| *k == key) {
                wanted.push((key, name.trim().to_string()));
            }
        }
        let mut ids = HashMap::new();
        let mut warnings = Vec::new();
        if wanted.is_empty() {
            return (ids, warnings);
        }

        let lookup: Vec<String> = wanted.iter().map(|(_, n)| n.clone()).collect();
        match self
            .store
            .find_catalog_tasks(self.organization_id, &lookup)
            .await
        {
            Ok(found) => {
                for task in found {
                    ids.insert(catalog_key(&task.name), task.id);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "catalog lookup failed, treating as no matches");
            }
        }

        let missing: Vec<NewCatalogTask> = wanted
            .iter()
            .filter(|(key, _)| !ids.contains_key(key))
            .map(|(_, name)| NewCatalogTask {
                name: name.clone(),
                category: self.custom_category.to_string(),
            })
            .collect();
        if missing.is_empty() {
            return (ids, warnings);
        }

        let count = missing.len();
        match self
            .store
            .insert_catalog_tasks(self.organization_id, missing)
            .await
        {
            Ok(created) => {
                tracing::info!(count, "added custom tasks to catalog");
                for task in created {
                    ids.insert(catalog_key(&task.name), task.id);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, count, "failed to add custom tasks to catalog");
                for (key, name) in &wanted {
                    if !ids.contains_key(key) {
                        warnings.push(format!("task '{}' could not be added to the catalog", name));
                    }
                }
            }
        }
        (ids, warnings)
    }
}
