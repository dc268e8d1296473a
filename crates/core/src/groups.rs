//! Service group editing.
//!
//! Every mutation goes through [`ServiceGroupEditor`], which recomputes the
//! draft's total cost afterwards so the aggregate never goes stale.

use rust_decimal::Decimal;

use crate::model::{
    BatteryTracking, CostEntry, CostMode, LineItem, MaintenanceDraft, PartEntry, PartKind,
    ServiceGroup, ServiceType, TaskRef, TyreTracking, VendorRef,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EditError {
    #[error("service group {index} does not exist ({len} groups)")]
    GroupOutOfRange { index: usize, len: usize },

    #[error("line item {index} does not exist in service group {group} ({len} items)")]
    LineItemOutOfRange {
        group: usize,
        index: usize,
        len: usize,
    },

    #[error("service group {group} is not in detailed cost mode")]
    NotDetailed { group: usize },
}

/// Map a task label to the part kind a purchase of it implies.
pub fn purchase_part_kind(label: &str) -> Option<PartKind> {
    match label.trim().to_lowercase().as_str() {
        "battery purchase" => Some(PartKind::Battery),
        "tyre purchase" | "tire purchase" => Some(PartKind::Tyre),
        "spare parts purchase" => Some(PartKind::Spare),
        _ => None,
    }
}

/// Mutable view over a draft's service groups.
pub struct ServiceGroupEditor<'a> {
    draft: &'a mut MaintenanceDraft,
}

impl<'a> ServiceGroupEditor<'a> {
    pub fn new(draft: &'a mut MaintenanceDraft) -> Self {
        ServiceGroupEditor { draft }
    }

    pub fn len(&self) -> usize {
        self.draft.service_groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.draft.service_groups.is_empty()
    }

    pub fn group(&self, index: usize) -> Option<&ServiceGroup> {
        self.draft.service_groups.get(index)
    }

    pub fn total(&self) -> Decimal {
        self.draft.total_cost
    }

    pub fn add_group(&mut self) -> usize {
        self.add_group_with(ServiceGroup::default())
    }

    pub fn add_group_with(&mut self, group: ServiceGroup) -> usize {
        self.draft.service_groups.push(group);
        self.draft.recompute_total();
        self.draft.service_groups.len() - 1
    }

    /// Apply `edit` to one group and recompute the total.
    pub fn update_group<F>(&mut self, index: usize, edit: F) -> Result<(), EditError>
    where
        F: FnOnce(&mut ServiceGroup),
    {
        let group = self.group_mut(index)?;
        edit(group);
        self.draft.recompute_total();
        Ok(())
    }

    pub fn remove_group(&mut self, index: usize) -> Result<ServiceGroup, EditError> {
        self.group_mut(index)?;
        let removed = self.draft.service_groups.remove(index);
        self.draft.recompute_total();
        Ok(removed)
    }

    pub fn set_vendor(&mut self, index: usize, vendor: VendorRef) -> Result<(), EditError> {
        self.update_group(index, |g| g.vendor = Some(vendor))
    }

    pub fn set_service_type(
        &mut self,
        index: usize,
        service_type: ServiceType,
    ) -> Result<(), EditError> {
        self.update_group(index, |g| g.service_type = service_type)
    }

    /// Replace the selected tasks. Recognized purchase tasks add a part entry
    /// of the matching kind unless the group already has one.
    pub fn set_tasks(&mut self, index: usize, tasks: Vec<TaskRef>) -> Result<(), EditError> {
        self.update_group(index, |g| {
            g.tasks = tasks;
            let kinds: Vec<PartKind> = g
                .tasks
                .iter()
                .filter_map(|t| purchase_part_kind(&t.label))
                .collect();
            for kind in kinds {
                if !g.parts.iter().any(|p| p.kind == kind) {
                    g.parts.push(PartEntry::new(kind));
                }
            }
        })
    }

    /// Switch cost entry mode.
    ///
    /// Detailed to quick keeps the current total as the quick amount and
    /// drops the line items. Quick to detailed seeds one zero-priced line
    /// item per selected task.
    pub fn set_cost_mode(&mut self, index: usize, mode: CostMode) -> Result<(), EditError> {
        self.update_group(index, |g| {
            if g.cost.mode() == mode {
                return;
            }
            g.cost = match mode {
                CostMode::Quick => CostEntry::Quick {
                    amount: g.cost.total(),
                },
                CostMode::Detailed => CostEntry::Detailed {
                    items: g
                        .tasks
                        .iter()
                        .map(|t| LineItem::new(t.label.clone(), Decimal::ONE, Decimal::ZERO))
                        .collect(),
                },
            };
        })
    }

    /// Set the flat amount, switching the group to quick mode if needed.
    pub fn set_quick_amount(&mut self, index: usize, amount: Decimal) -> Result<(), EditError> {
        self.update_group(index, |g| g.cost = CostEntry::Quick { amount })
    }

    pub fn add_line_item(&mut self, group: usize, item: LineItem) -> Result<usize, EditError> {
        let items = self.line_items_mut(group)?;
        items.push(item);
        let added = items.len() - 1;
        self.draft.recompute_total();
        Ok(added)
    }

    pub fn update_line_item<F>(&mut self, group: usize, index: usize, edit: F) -> Result<(), EditError>
    where
        F: FnOnce(&mut LineItem),
    {
        let items = self.line_items_mut(group)?;
        let len = items.len();
        let item = items
            .get_mut(index)
            .ok_or(EditError::LineItemOutOfRange { group, index, len })?;
        edit(item);
        self.draft.recompute_total();
        Ok(())
    }

    pub fn remove_line_item(&mut self, group: usize, index: usize) -> Result<LineItem, EditError> {
        let items = self.line_items_mut(group)?;
        if index >= items.len() {
            return Err(EditError::LineItemOutOfRange {
                group,
                index,
                len: items.len(),
            });
        }
        let removed = items.remove(index);
        self.draft.recompute_total();
        Ok(removed)
    }

    pub fn set_battery_tracking(&mut self, index: usize, enabled: bool) -> Result<(), EditError> {
        self.update_group(index, |g| match (enabled, g.battery.is_some()) {
            (true, false) => g.battery = Some(BatteryTracking::default()),
            (false, true) => g.battery = None,
            _ => {}
        })
    }

    pub fn set_tyre_tracking(&mut self, index: usize, enabled: bool) -> Result<(), EditError> {
        self.update_group(index, |g| match (enabled, g.tyre.is_some()) {
            (true, false) => g.tyre = Some(TyreTracking::default()),
            (false, true) => g.tyre = None,
            _ => {}
        })
    }

    fn group_mut(&mut self, index: usize) -> Result<&mut ServiceGroup, EditError> {
        let len = self.draft.service_groups.len();
        self.draft
            .service_groups
            .get_mut(index)
            .ok_or(EditError::GroupOutOfRange { index, len })
    }

    fn line_items_mut(&mut self, group: usize) -> Result<&mut Vec<LineItem>, EditError> {
        match &mut self.group_mut(group)?.cost {
            CostEntry::Detailed { items } => Ok(items),
            CostEntry::Quick { .. } => Err(EditError::NotDetailed { group }),
        }
    }
}
