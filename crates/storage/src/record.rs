use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A maintenance task row as stored in the backend.
///
/// Dates are RFC 3339 strings. `id` is empty until the backend assigns one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub organization_id: String,
    pub vehicle_id: String,
    pub task_type: String,
    pub status: String,
    pub priority: String,
    pub start_date: String,
    pub end_date: Option<String>,
    pub downtime_days: u32,
    pub downtime_hours: u32,
    pub odometer_reading: i64,
    pub total_cost: Decimal,
    #[serde(default)]
    pub complaint: String,
    #[serde(default)]
    pub resolution: String,
    #[serde(default)]
    pub service_groups: Vec<ServiceGroupRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// A service group embedded in a task row.
///
/// `vendor_id` is empty when the vendor could not be resolved and the save
/// ran with the degrade policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceGroupRecord {
    pub vendor_id: String,
    /// Catalog task ids.
    pub tasks: Vec<String>,
    pub service_cost: Decimal,
    pub service_type: String,
    pub bill_url: Vec<String>,
    pub parts_data: serde_json::Value,
    pub use_line_items: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery_data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tyre_data: Option<serde_json::Value>,
}

/// A cost line item, stored separately from the task row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItemRecord {
    pub task_id: String,
    pub group_index: u32,
    pub position: u32,
    pub name: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
}

/// A task catalog entry, scoped to an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogTask {
    pub id: String,
    pub organization_id: String,
    pub name: String,
    pub category: String,
}

/// A catalog entry to insert; the backend assigns the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCatalogTask {
    pub name: String,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vendor {
    pub id: String,
    pub organization_id: String,
    pub name: String,
}

/// Normalized form used for case-insensitive catalog name matching.
pub fn catalog_key(name: &str) -> String {
    name.trim().to_lowercase()
}
