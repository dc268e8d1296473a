//! fleet-core: maintenance task form model.
//!
//! Everything here is synchronous and storage-agnostic. The save workflow in
//! `fleet-workflow` consumes a validated [`MaintenanceDraft`].
//!
//! - [`MaintenanceForm`] -- field setters, date/downtime sync, validation
//! - [`ServiceGroupEditor`] -- group and line-item editing with cost roll-up
//! - [`validate()`] -- ordered submission rules
//! - model types: [`MaintenanceDraft`], [`ServiceGroup`], [`CostEntry`], ...

pub mod downtime;
pub mod form;
pub mod groups;
pub mod model;
pub mod validate;

pub use downtime::{Downtime, QuickDowntimeDebouncer, DAY_TOLERANCE};
pub use form::MaintenanceForm;
pub use groups::{purchase_part_kind, EditError, ServiceGroupEditor};
pub use model::{
    Attachment, BatteryTracking, CostEntry, CostMode, LineItem, MaintenanceDraft, PartEntry,
    PartKind, Priority, ServiceGroup, ServiceType, TaskRef, TaskStatus, TaskType, TyreTracking,
    VendorRef,
};
pub use validate::{validate, ValidationContext, ValidationError};
