//! Submission-time validation of a maintenance draft.
//!
//! [`validate`] checks the rules in a fixed order and stops at the first one
//! that fails, so the form only ever shows a single message.

use rust_decimal::Decimal;
use time::OffsetDateTime;

use crate::model::{CostEntry, MaintenanceDraft, ServiceGroup};

/// The first rule a draft failed.
///
/// Group and item indices are zero-based; messages number them from one.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("please select a vehicle")]
    VehicleRequired,

    #[error("start date is required")]
    StartDateRequired,

    #[error("start date cannot be in the future")]
    StartDateInFuture,

    #[error("end date cannot be before the start date")]
    EndBeforeStart,

    #[error("odometer reading is required")]
    OdometerRequired,

    #[error("odometer reading cannot be negative")]
    OdometerNegative,

    #[error("odometer reading {reading} is below the last recorded reading {last_known}")]
    OdometerRegressed { reading: i64, last_known: i64 },

    #[error("add at least one service group")]
    NoServiceGroups,

    #[error("service group {}: vendor is required", .group + 1)]
    VendorRequired { group: usize },

    #[error("service group {}: select at least one task", .group + 1)]
    TasksRequired { group: usize },

    #[error("service group {}: cost cannot be negative", .group + 1)]
    NegativeCost { group: usize },

    #[error("service group {}, line item {}: {reason}", .group + 1, .item + 1)]
    InvalidLineItem {
        group: usize,
        item: usize,
        reason: &'static str,
    },

    #[error("service group {}: battery {field} is required", .group + 1)]
    BatteryFieldRequired { group: usize, field: &'static str },

    #[error("service group {}: tyre {field} is required", .group + 1)]
    TyreFieldRequired { group: usize, field: &'static str },
}

impl ValidationError {
    /// Path of the offending field, for placing the message next to it.
    pub fn field(&self) -> String {
        match self {
            ValidationError::VehicleRequired => "vehicle_id".to_string(),
            ValidationError::StartDateRequired | ValidationError::StartDateInFuture => {
                "start_date".to_string()
            }
            ValidationError::EndBeforeStart => "end_date".to_string(),
            ValidationError::OdometerRequired
            | ValidationError::OdometerNegative
            | ValidationError::OdometerRegressed { .. } => "odometer_reading".to_string(),
            ValidationError::NoServiceGroups => "service_groups".to_string(),
            ValidationError::VendorRequired { group } => format!("service_groups[{group}].vendor"),
            ValidationError::TasksRequired { group } => format!("service_groups[{group}].tasks"),
            ValidationError::NegativeCost { group } => format!("service_groups[{group}].cost"),
            ValidationError::InvalidLineItem { group, item, .. } => {
                format!("service_groups[{group}].cost.items[{item}]")
            }
            ValidationError::BatteryFieldRequired { group, field } => {
                format!("service_groups[{group}].battery.{field}")
            }
            ValidationError::TyreFieldRequired { group, field } => {
                format!("service_groups[{group}].tyre.{field}")
            }
        }
    }
}

/// Inputs to validation that do not live on the draft itself.
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext {
    pub now: OffsetDateTime,
    /// Highest odometer reading already recorded for the selected vehicle.
    pub last_known_odometer: Option<i64>,
}

impl ValidationContext {
    pub fn at(now: OffsetDateTime) -> Self {
        ValidationContext {
            now,
            last_known_odometer: None,
        }
    }
}

pub fn validate(draft: &MaintenanceDraft, ctx: &ValidationContext) -> Result<(), ValidationError> {
    if draft
        .vehicle_id
        .as_deref()
        .map_or(true, |v| v.trim().is_empty())
    {
        return Err(ValidationError::VehicleRequired);
    }

    let start = draft.start_date.ok_or(ValidationError::StartDateRequired)?;
    if start > ctx.now {
        return Err(ValidationError::StartDateInFuture);
    }
    if let Some(end) = draft.end_date {
        if end < start {
            return Err(ValidationError::EndBeforeStart);
        }
    }

    let reading = draft
        .odometer_reading
        .ok_or(ValidationError::OdometerRequired)?;
    if reading < 0 {
        return Err(ValidationError::OdometerNegative);
    }
    if let Some(last_known) = ctx.last_known_odometer {
        if reading < last_known {
            return Err(ValidationError::OdometerRegressed {
                reading,
                last_known,
            });
        }
    }

    if draft.service_groups.is_empty() {
        return Err(ValidationError::NoServiceGroups);
    }
    for (index, group) in draft.service_groups.iter().enumerate() {
        validate_group(index, group)?;
    }
    Ok(())
}

fn validate_group(group: usize, g: &ServiceGroup) -> Result<(), ValidationError> {
    if g.vendor.as_ref().map_or(true, |v| v.is_blank()) {
        return Err(ValidationError::VendorRequired { group });
    }
    if g.tasks.iter().all(|t| t.label.trim().is_empty() && t.id.is_none()) {
        return Err(ValidationError::TasksRequired { group });
    }

    if let CostEntry::Detailed { items } = &g.cost {
        for (item, li) in items.iter().enumerate() {
            let reason = if li.name.trim().is_empty() {
                Some("name is required")
            } else if li.quantity <= Decimal::ZERO {
                Some("quantity must be positive")
            } else if li.unit_price < Decimal::ZERO {
                Some("unit price cannot be negative")
            } else {
                None
            };
            if let Some(reason) = reason {
                return Err(ValidationError::InvalidLineItem {
                    group,
                    item,
                    reason,
                });
            }
        }
    }
    if g.cost() < Decimal::ZERO {
        return Err(ValidationError::NegativeCost { group });
    }

    if let Some(battery) = &g.battery {
        let missing = if battery.serial_number.trim().is_empty() {
            Some("serial number")
        } else if battery.brand.trim().is_empty() {
            Some("brand")
        } else if battery.warranty_until.is_none() {
            Some("warranty date")
        } else {
            None
        };
        if let Some(field) = missing {
            return Err(ValidationError::BatteryFieldRequired { group, field });
        }
    }

    if let Some(tyre) = &g.tyre {
        let missing = if tyre.brand.trim().is_empty() {
            Some("brand")
        } else if tyre.serial_numbers.iter().all(|s| s.trim().is_empty()) {
            Some("serial number")
        } else if tyre.warranty_until.is_none() {
            Some("warranty date")
        } else {
            None
        };
        if let Some(field) = missing {
            return Err(ValidationError::TyreFieldRequired { group, field });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BatteryTracking, LineItem, TaskRef, TyreTracking, VendorRef};
    use std::str::FromStr;
    use time::macros::datetime;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn now() -> OffsetDateTime {
        datetime!(2024-02-01 12:00 UTC)
    }

    fn valid_group() -> ServiceGroup {
        ServiceGroup {
            vendor: Some(VendorRef::name("Joe's Garage")),
            tasks: vec![TaskRef::named("Engine Oil Change")],
            cost: CostEntry::Quick {
                amount: dec("1500"),
            },
            ..Default::default()
        }
    }

    fn valid_draft() -> MaintenanceDraft {
        MaintenanceDraft {
            vehicle_id: Some("V1".into()),
            start_date: Some(datetime!(2024-01-10 00:00 UTC)),
            odometer_reading: Some(50_000),
            service_groups: vec![valid_group()],
            ..Default::default()
        }
    }

    fn check(draft: &MaintenanceDraft) -> Result<(), ValidationError> {
        validate(draft, &ValidationContext::at(now()))
    }

    #[test]
    fn valid_draft_passes() {
        assert_eq!(check(&valid_draft()), Ok(()));
    }

    #[test]
    fn first_failing_rule_wins() {
        let draft = MaintenanceDraft::default();
        assert_eq!(check(&draft), Err(ValidationError::VehicleRequired));

        let mut draft = valid_draft();
        draft.start_date = None;
        draft.odometer_reading = None;
        assert_eq!(check(&draft), Err(ValidationError::StartDateRequired));
    }

    #[test]
    fn future_start_is_rejected() {
        let mut draft = valid_draft();
        draft.start_date = Some(datetime!(2024-03-01 00:00 UTC));
        assert_eq!(check(&draft), Err(ValidationError::StartDateInFuture));
    }

    #[test]
    fn end_before_start_is_rejected() {
        let mut draft = valid_draft();
        draft.end_date = Some(datetime!(2024-01-09 00:00 UTC));
        let err = check(&draft).unwrap_err();
        assert_eq!(err, ValidationError::EndBeforeStart);
        assert_eq!(err.field(), "end_date");
    }

    #[test]
    fn odometer_rules() {
        let mut draft = valid_draft();
        draft.odometer_reading = Some(-1);
        assert_eq!(check(&draft), Err(ValidationError::OdometerNegative));

        draft.odometer_reading = Some(40_000);
        let ctx = ValidationContext {
            now: now(),
            last_known_odometer: Some(45_000),
        };
        assert_eq!(
            validate(&draft, &ctx),
            Err(ValidationError::OdometerRegressed {
                reading: 40_000,
                last_known: 45_000
            })
        );
    }

    #[test]
    fn group_requires_vendor_and_task() {
        let mut draft = valid_draft();
        draft.service_groups.push(ServiceGroup {
            tasks: vec![TaskRef::named("Brake Pads")],
            ..Default::default()
        });
        let err = check(&draft).unwrap_err();
        assert_eq!(err, ValidationError::VendorRequired { group: 1 });
        assert_eq!(err.to_string(), "service group 2: vendor is required");
        assert_eq!(err.field(), "service_groups[1].vendor");

        draft.service_groups[1].vendor = Some(VendorRef::name("Acme"));
        draft.service_groups[1].tasks.clear();
        assert_eq!(
            check(&draft),
            Err(ValidationError::TasksRequired { group: 1 })
        );
    }

    #[test]
    fn negative_quick_cost_is_rejected() {
        let mut draft = valid_draft();
        draft.service_groups[0].cost = CostEntry::Quick { amount: dec("-5") };
        assert_eq!(
            check(&draft),
            Err(ValidationError::NegativeCost { group: 0 })
        );
    }

    #[test]
    fn line_items_need_positive_quantity() {
        let mut draft = valid_draft();
        draft.service_groups[0].cost = CostEntry::Detailed {
            items: vec![LineItem::new("Oil", dec("0"), dec("10"))],
        };
        assert!(matches!(
            check(&draft),
            Err(ValidationError::InvalidLineItem { group: 0, item: 0, .. })
        ));
    }

    #[test]
    fn battery_tracking_requires_fields() {
        let mut draft = valid_draft();
        draft.service_groups[0].battery = Some(BatteryTracking {
            serial_number: "SN-1".into(),
            ..Default::default()
        });
        assert_eq!(
            check(&draft),
            Err(ValidationError::BatteryFieldRequired {
                group: 0,
                field: "brand"
            })
        );

        let battery = draft.service_groups[0].battery.as_mut().unwrap();
        battery.brand = "Exide".into();
        battery.warranty_until = Some(datetime!(2026-01-01 00:00 UTC));
        assert_eq!(check(&draft), Ok(()));
    }

    #[test]
    fn tyre_tracking_requires_serial() {
        let mut draft = valid_draft();
        draft.service_groups[0].tyre = Some(TyreTracking {
            brand: "Michelin".into(),
            serial_numbers: vec!["  ".into()],
            warranty_until: Some(datetime!(2026-01-01 00:00 UTC)),
            ..Default::default()
        });
        assert_eq!(
            check(&draft),
            Err(ValidationError::TyreFieldRequired {
                group: 0,
                field: "serial number"
            })
        );
    }
}
