//! Maintenance task model shared by the form, the service group editor and
//! the save workflow.
//!
//! The draft is deliberately partial: fields the user has not filled in yet
//! are `None`, and [`crate::validate`] decides whether the draft is ready to
//! be submitted. Cost entry and attachments are tagged unions so that the
//! "quick amount vs line items" and "local file vs uploaded URL" states can
//! never be mixed.

use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::downtime::Downtime;

// ──────────────────────────────────────────────
// Enumerations
// ──────────────────────────────────────────────

/// Lifecycle status of a maintenance task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Open,
    InProgress,
    Resolved,
    Escalated,
    Rework,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Open => "open",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Resolved => "resolved",
            TaskStatus::Escalated => "escalated",
            TaskStatus::Rework => "rework",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    #[default]
    Preventive,
    Corrective,
    Breakdown,
    Accident,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Preventive => "preventive",
            TaskType::Corrective => "corrective",
            TaskType::Breakdown => "breakdown",
            TaskType::Accident => "accident",
        }
    }
}

/// What kind of engagement a service group represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    #[default]
    Maintenance,
    Repair,
    Purchase,
}

impl ServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::Maintenance => "maintenance",
            ServiceType::Repair => "repair",
            ServiceType::Purchase => "purchase",
        }
    }
}

// ──────────────────────────────────────────────
// References
// ──────────────────────────────────────────────

/// A task selected in a service group.
///
/// The label is what the user typed or picked; `id` is set once the label is
/// known to the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRef {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl TaskRef {
    pub fn named(label: impl Into<String>) -> Self {
        TaskRef {
            label: label.into(),
            id: None,
        }
    }

    pub fn with_id(id: impl Into<String>, label: impl Into<String>) -> Self {
        TaskRef {
            label: label.into(),
            id: Some(id.into()),
        }
    }
}

/// The vendor a service group was carried out by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VendorRef {
    /// Free-text name, resolved against the vendor catalog on save.
    Name { name: String },
    /// Already-known catalog vendor.
    Id {
        id: String,
        #[serde(default)]
        name: String,
    },
}

impl VendorRef {
    pub fn name(name: impl Into<String>) -> Self {
        VendorRef::Name { name: name.into() }
    }

    pub fn is_blank(&self) -> bool {
        match self {
            VendorRef::Name { name } => name.trim().is_empty(),
            VendorRef::Id { id, .. } => id.trim().is_empty(),
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            VendorRef::Name { name } => name,
            VendorRef::Id { id, name } if name.is_empty() => id,
            VendorRef::Id { name, .. } => name,
        }
    }
}

/// A file attached to a service group, before or after upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Attachment {
    Local { path: PathBuf },
    Remote { url: String },
}

impl Attachment {
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Attachment::Local { path: path.into() }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Attachment::Local { .. })
    }

    pub fn local_path(&self) -> Option<&Path> {
        match self {
            Attachment::Local { path } => Some(path),
            Attachment::Remote { .. } => None,
        }
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            Attachment::Remote { url } => Some(url),
            Attachment::Local { .. } => None,
        }
    }
}

// ──────────────────────────────────────────────
// Cost entry
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub name: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

impl LineItem {
    pub fn new(name: impl Into<String>, quantity: Decimal, unit_price: Decimal) -> Self {
        LineItem {
            name: name.into(),
            quantity,
            unit_price,
        }
    }

    pub fn subtotal(&self) -> Decimal {
        self.quantity * self.unit_price
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostMode {
    Quick,
    Detailed,
}

/// How a service group's cost was entered.
///
/// In `Detailed` mode the cost is always the sum of the line-item subtotals;
/// there is no separately stored amount that could drift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CostEntry {
    Quick { amount: Decimal },
    Detailed { items: Vec<LineItem> },
}

impl Default for CostEntry {
    fn default() -> Self {
        CostEntry::Quick {
            amount: Decimal::ZERO,
        }
    }
}

impl CostEntry {
    pub fn total(&self) -> Decimal {
        match self {
            CostEntry::Quick { amount } => *amount,
            CostEntry::Detailed { items } => items.iter().map(LineItem::subtotal).sum(),
        }
    }

    pub fn mode(&self) -> CostMode {
        match self {
            CostEntry::Quick { .. } => CostMode::Quick,
            CostEntry::Detailed { .. } => CostMode::Detailed,
        }
    }

    pub fn line_items(&self) -> &[LineItem] {
        match self {
            CostEntry::Quick { .. } => &[],
            CostEntry::Detailed { items } => items,
        }
    }
}

// ──────────────────────────────────────────────
// Parts and warranty tracking
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartKind {
    Battery,
    Tyre,
    Spare,
}

impl PartKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartKind::Battery => "battery",
            PartKind::Tyre => "tyre",
            PartKind::Spare => "spare",
        }
    }

    pub fn default_name(&self) -> &'static str {
        match self {
            PartKind::Battery => "Battery",
            PartKind::Tyre => "Tyre",
            PartKind::Spare => "Spare part",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartEntry {
    pub kind: PartKind,
    pub name: String,
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub serial_number: String,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub warranty_until: Option<OffsetDateTime>,
    #[serde(default)]
    pub warranty_files: Vec<Attachment>,
}

fn default_quantity() -> u32 {
    1
}

impl PartEntry {
    pub fn new(kind: PartKind) -> Self {
        PartEntry {
            kind,
            name: kind.default_name().to_string(),
            brand: String::new(),
            serial_number: String::new(),
            quantity: 1,
            warranty_until: None,
            warranty_files: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatteryTracking {
    #[serde(default)]
    pub serial_number: String,
    #[serde(default)]
    pub brand: String,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub warranty_until: Option<OffsetDateTime>,
    #[serde(default)]
    pub warranty_files: Vec<Attachment>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TyreTracking {
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub serial_numbers: Vec<String>,
    #[serde(default)]
    pub positions: Vec<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub warranty_until: Option<OffsetDateTime>,
    #[serde(default)]
    pub warranty_files: Vec<Attachment>,
}

// ──────────────────────────────────────────────
// Service group and draft
// ──────────────────────────────────────────────

/// One vendor engagement within a maintenance task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceGroup {
    pub vendor: Option<VendorRef>,
    pub tasks: Vec<TaskRef>,
    pub service_type: ServiceType,
    pub cost: CostEntry,
    pub parts: Vec<PartEntry>,
    /// `Some` when battery tracking is enabled for this group.
    pub battery: Option<BatteryTracking>,
    /// `Some` when tyre tracking is enabled for this group.
    pub tyre: Option<TyreTracking>,
    pub bills: Vec<Attachment>,
    pub notes: String,
}

impl ServiceGroup {
    pub fn cost(&self) -> Decimal {
        self.cost.total()
    }

    /// Count of attachments in this group that still point at local files.
    pub fn pending_uploads(&self) -> usize {
        let bills = self.bills.iter().filter(|a| a.is_local()).count();
        let battery = self
            .battery
            .as_ref()
            .map_or(0, |b| b.warranty_files.iter().filter(|a| a.is_local()).count());
        let tyre = self
            .tyre
            .as_ref()
            .map_or(0, |t| t.warranty_files.iter().filter(|a| a.is_local()).count());
        let parts: usize = self
            .parts
            .iter()
            .map(|p| p.warranty_files.iter().filter(|a| a.is_local()).count())
            .sum();
        bills + battery + tyre + parts
    }
}

/// The in-progress maintenance task as edited by the form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceDraft {
    pub vehicle_id: Option<String>,
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub priority: Priority,
    #[serde(with = "time::serde::rfc3339::option")]
    pub start_date: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub end_date: Option<OffsetDateTime>,
    pub downtime: Downtime,
    pub odometer_reading: Option<i64>,
    pub complaint: String,
    pub resolution: String,
    pub service_groups: Vec<ServiceGroup>,
    /// Sum of all group costs. Maintained by the service group editor.
    pub total_cost: Decimal,
}

impl MaintenanceDraft {
    pub fn recompute_total(&mut self) {
        self.total_cost = self.service_groups.iter().map(ServiceGroup::cost).sum();
    }

    pub fn pending_uploads(&self) -> usize {
        self.service_groups
            .iter()
            .map(ServiceGroup::pending_uploads)
            .sum()
    }
}
