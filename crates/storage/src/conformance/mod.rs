//! Checks every `FleetStore` backend must pass: task and line-item
//! round trips, catalog and vendor lookups by `catalog_key`, and the
//! `TaskNotFound` cases.
//!
//! ```ignore
//! use fleet_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn rest_conformance() {
//!     let report = run_conformance_suite(|| async { create_test_store().await }).await;
//!     assert!(report.is_clean(), "{report}");
//! }
//! ```

mod catalog;
mod error;
mod tasks;

use std::fmt;
use std::future::Future;

use rust_decimal::Decimal;

use crate::record::{LineItemRecord, ServiceGroupRecord, TaskRecord};
use crate::FleetStore;

/// One check of the suite, with the failure message if it did not hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub area: &'static str,
    pub check: &'static str,
    pub error: Option<String>,
}

fn outcome(area: &'static str, check: &'static str, result: Result<(), String>) -> CheckOutcome {
    CheckOutcome {
        area,
        check,
        error: result.err(),
    }
}

/// Every check the suite ran against one backend.
#[derive(Debug, Clone, Default)]
pub struct SuiteReport {
    pub outcomes: Vec<CheckOutcome>,
}

impl SuiteReport {
    pub fn failures(&self) -> impl Iterator<Item = &CheckOutcome> {
        self.outcomes.iter().filter(|o| o.error.is_some())
    }

    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }
}

impl fmt::Display for SuiteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let failed = self.failures().count();
        writeln!(f, "{} checks, {} failing", self.outcomes.len(), failed)?;
        for o in self.failures() {
            if let Some(error) = &o.error {
                writeln!(f, "  {}::{}: {}", o.area, o.check, error)?;
            }
        }
        Ok(())
    }
}

/// Run every check against a backend. `factory` builds a fresh, empty store
/// for each check.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> SuiteReport
where
    S: FleetStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut outcomes = tasks::run_task_tests(&factory).await;
    outcomes.extend(catalog::run_catalog_tests(&factory).await);
    outcomes.extend(error::run_error_tests(&factory).await);
    SuiteReport { outcomes }
}

// ── Helpers: record constructors with sensible defaults ──────────────────────

fn make_task(organization_id: &str, vehicle_id: &str) -> TaskRecord {
    TaskRecord {
        id: String::new(),
        organization_id: organization_id.to_string(),
        vehicle_id: vehicle_id.to_string(),
        task_type: "preventive".to_string(),
        status: "open".to_string(),
        priority: "medium".to_string(),
        start_date: "2024-01-10T00:00:00Z".to_string(),
        end_date: None,
        downtime_days: 0,
        downtime_hours: 0,
        odometer_reading: 50_000,
        total_cost: Decimal::from(1500),
        complaint: String::new(),
        resolution: String::new(),
        service_groups: vec![make_group("vendor-1", 1500)],
        created_at: None,
        updated_at: None,
    }
}

fn make_group(vendor_id: &str, cost: i64) -> ServiceGroupRecord {
    ServiceGroupRecord {
        vendor_id: vendor_id.to_string(),
        tasks: vec!["task-1".to_string()],
        service_cost: Decimal::from(cost),
        service_type: "maintenance".to_string(),
        bill_url: vec![],
        parts_data: serde_json::json!([]),
        use_line_items: false,
        battery_data: None,
        tyre_data: None,
    }
}

fn make_line_item(task_id: &str, group_index: u32, position: u32, name: &str) -> LineItemRecord {
    LineItemRecord {
        task_id: task_id.to_string(),
        group_index,
        position,
        name: name.to_string(),
        quantity: Decimal::ONE,
        unit_price: Decimal::from(10),
        subtotal: Decimal::from(10),
    }
}
