//! Draft → storage record conversion.

use fleet_core::{
    Attachment, BatteryTracking, CostMode, MaintenanceDraft, PartEntry, ServiceGroup, TyreTracking,
};
use fleet_storage::{LineItemRecord, ServiceGroupRecord, TaskRecord};
use serde_json::{json, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::resolver::ResolvedGroup;

#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("draft is missing {0}")]
    MissingField(&'static str),

    #[error("failed to format date: {0}")]
    Date(#[from] time::error::Format),
}

/// The task row without service groups, written when the task is first
/// created.
pub fn base_record(
    draft: &MaintenanceDraft,
    organization_id: &str,
) -> Result<TaskRecord, PayloadError> {
    let vehicle_id = draft
        .vehicle_id
        .clone()
        .ok_or(PayloadError::MissingField("vehicle"))?;
    let start = draft
        .start_date
        .ok_or(PayloadError::MissingField("start date"))?;
    let odometer = draft
        .odometer_reading
        .ok_or(PayloadError::MissingField("odometer reading"))?;

    Ok(TaskRecord {
        id: String::new(),
        organization_id: organization_id.to_string(),
        vehicle_id,
        task_type: draft.task_type.as_str().to_string(),
        status: draft.status.as_str().to_string(),
        priority: draft.priority.as_str().to_string(),
        start_date: format_date(start)?,
        end_date: draft.end_date.map(format_date).transpose()?,
        downtime_days: draft.downtime.days,
        downtime_hours: draft.downtime.hours,
        odometer_reading: odometer,
        total_cost: draft.total_cost,
        complaint: draft.complaint.clone(),
        resolution: draft.resolution.clone(),
        service_groups: Vec::new(),
        created_at: None,
        updated_at: None,
    })
}

/// The complete task row. `resolved` is indexed like `draft.service_groups`;
/// groups without a resolution entry are written with empty references.
pub fn full_record(
    draft: &MaintenanceDraft,
    organization_id: &str,
    task_id: &str,
    resolved: &[ResolvedGroup],
) -> Result<TaskRecord, PayloadError> {
    let mut record = base_record(draft, organization_id)?;
    record.id = task_id.to_string();
    record.total_cost = draft.service_groups.iter().map(ServiceGroup::cost).sum();
    let empty = ResolvedGroup::default();
    record.service_groups = draft
        .service_groups
        .iter()
        .enumerate()
        .map(|(i, group)| group_record(group, resolved.get(i).unwrap_or(&empty)))
        .collect::<Result<_, _>>()?;
    Ok(record)
}

pub fn group_record(
    group: &ServiceGroup,
    resolved: &ResolvedGroup,
) -> Result<ServiceGroupRecord, PayloadError> {
    let parts = group
        .parts
        .iter()
        .map(part_json)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ServiceGroupRecord {
        vendor_id: resolved.vendor_id.clone(),
        tasks: resolved.task_ids.clone(),
        service_cost: group.cost(),
        service_type: group.service_type.as_str().to_string(),
        bill_url: urls(&group.bills),
        parts_data: Value::Array(parts),
        use_line_items: group.cost.mode() == CostMode::Detailed,
        battery_data: group.battery.as_ref().map(battery_json).transpose()?,
        tyre_data: group.tyre.as_ref().map(tyre_json).transpose()?,
    })
}

/// Line item rows for every detailed-mode group.
pub fn line_item_records(task_id: &str, draft: &MaintenanceDraft) -> Vec<LineItemRecord> {
    let mut rows = Vec::new();
    for (g, group) in draft.service_groups.iter().enumerate() {
        for (p, item) in group.cost.line_items().iter().enumerate() {
            rows.push(LineItemRecord {
                task_id: task_id.to_string(),
                group_index: g as u32,
                position: p as u32,
                name: item.name.clone(),
                quantity: item.quantity,
                unit_price: item.unit_price,
                subtotal: item.subtotal(),
            });
        }
    }
    rows
}

pub fn format_date(date: OffsetDateTime) -> Result<String, PayloadError> {
    Ok(date.format(&Rfc3339)?)
}

// Only uploaded files are persisted; anything still local is left out.
fn urls(files: &[Attachment]) -> Vec<String> {
    files
        .iter()
        .filter_map(|a| a.url().map(str::to_string))
        .collect()
}

fn part_json(part: &PartEntry) -> Result<Value, PayloadError> {
    Ok(json!({
        "kind": part.kind.as_str(),
        "name": part.name,
        "brand": part.brand,
        "serial_number": part.serial_number,
        "quantity": part.quantity,
        "warranty_until": part.warranty_until.map(format_date).transpose()?,
        "warranty_urls": urls(&part.warranty_files),
    }))
}

fn battery_json(battery: &BatteryTracking) -> Result<Value, PayloadError> {
    Ok(json!({
        "serial_number": battery.serial_number,
        "brand": battery.brand,
        "warranty_until": battery.warranty_until.map(format_date).transpose()?,
        "warranty_urls": urls(&battery.warranty_files),
    }))
}

fn tyre_json(tyre: &TyreTracking) -> Result<Value, PayloadError> {
    Ok(json!({
        "brand": tyre.brand,
        "serial_numbers": tyre.serial_numbers,
        "positions": tyre.positions,
        "warranty_until": tyre.warranty_until.map(format_date).transpose()?,
        "warranty_urls": urls(&tyre.warranty_files),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::{CostEntry, Downtime, LineItem, PartKind, TaskRef, VendorRef};
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use time::macros::datetime;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn draft() -> MaintenanceDraft {
        MaintenanceDraft {
            vehicle_id: Some("V1".into()),
            start_date: Some(datetime!(2024-01-10 00:00 UTC)),
            end_date: Some(datetime!(2024-01-12 06:00 UTC)),
            downtime: Downtime::new(2, 6),
            odometer_reading: Some(50_000),
            service_groups: vec![
                ServiceGroup {
                    vendor: Some(VendorRef::name("Joe's Garage")),
                    tasks: vec![TaskRef::named("Engine Oil Change")],
                    cost: CostEntry::Quick { amount: dec("1500") },
                    bills: vec![
                        Attachment::Remote {
                            url: "https://cdn/bill.pdf".into(),
                        },
                        Attachment::local("/tmp/pending.pdf"),
                    ],
                    ..Default::default()
                },
                ServiceGroup {
                    cost: CostEntry::Detailed {
                        items: vec![
                            LineItem::new("Pads", dec("2"), dec("450")),
                            LineItem::new("Labour", dec("1"), dec("300")),
                        ],
                    },
                    parts: vec![PartEntry::new(PartKind::Battery)],
                    ..Default::default()
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn base_record_has_no_groups() {
        let rec = base_record(&draft(), "org-1").unwrap();
        assert!(rec.id.is_empty());
        assert!(rec.service_groups.is_empty());
        assert_eq!(rec.start_date, "2024-01-10T00:00:00Z");
        assert_eq!(rec.end_date.as_deref(), Some("2024-01-12T06:00:00Z"));
        assert_eq!((rec.downtime_days, rec.downtime_hours), (2, 6));
        assert_eq!(rec.status, "open");
    }

    #[test]
    fn base_record_requires_vehicle() {
        let mut d = draft();
        d.vehicle_id = None;
        assert!(matches!(
            base_record(&d, "org-1"),
            Err(PayloadError::MissingField("vehicle"))
        ));
    }

    #[test]
    fn full_record_uses_resolved_ids_and_urls() {
        let resolved = vec![ResolvedGroup {
            vendor_id: "v-1".into(),
            task_ids: vec!["t-1".into()],
            ..Default::default()
        }];
        let rec = full_record(&draft(), "org-1", "task-1", &resolved).unwrap();
        assert_eq!(rec.id, "task-1");
        assert_eq!(rec.total_cost, dec("2700"));

        let first = &rec.service_groups[0];
        assert_eq!(first.vendor_id, "v-1");
        assert_eq!(first.tasks, vec!["t-1".to_string()]);
        assert_eq!(first.bill_url, vec!["https://cdn/bill.pdf".to_string()]);
        assert!(!first.use_line_items);

        let second = &rec.service_groups[1];
        assert_eq!(second.vendor_id, "");
        assert!(second.use_line_items);
        assert_eq!(second.service_cost, dec("1200"));
        assert_eq!(second.parts_data[0]["kind"], "battery");
    }

    #[test]
    fn line_items_carry_group_and_position() {
        let rows = line_item_records("task-1", &draft());
        assert_eq!(rows.len(), 2);
        assert_eq!((rows[0].group_index, rows[0].position), (1, 0));
        assert_eq!(rows[0].subtotal, dec("900"));
        assert_eq!(rows[1].name, "Labour");
    }
}
