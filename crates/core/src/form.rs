//! Form state for authoring or editing one maintenance task.

use std::time::Instant;

use time::OffsetDateTime;

use crate::downtime::{days_apart, within_tolerance, Downtime, QuickDowntimeDebouncer};
use crate::groups::ServiceGroupEditor;
use crate::model::{MaintenanceDraft, Priority, TaskStatus, TaskType};
use crate::validate::{validate, ValidationContext, ValidationError};

/// Holds the in-progress draft and keeps derived fields consistent.
///
/// `end_date` and `downtime` are two views of the same quantity once a
/// start date is known. Each setter derives the other side, and skips the
/// write when the derived value already matches within
/// [`crate::downtime::DAY_TOLERANCE`].
#[derive(Debug, Clone, Default)]
pub struct MaintenanceForm {
    draft: MaintenanceDraft,
    last_known_odometer: Option<i64>,
    quick_downtime: QuickDowntimeDebouncer,
}

impl MaintenanceForm {
    pub fn new() -> Self {
        MaintenanceForm::default()
    }

    /// Start editing an existing task.
    pub fn from_draft(draft: MaintenanceDraft) -> Self {
        let mut form = MaintenanceForm {
            draft,
            ..Default::default()
        };
        form.draft.recompute_total();
        form
    }

    pub fn draft(&self) -> &MaintenanceDraft {
        &self.draft
    }

    pub fn draft_mut(&mut self) -> &mut MaintenanceDraft {
        &mut self.draft
    }

    pub fn into_draft(self) -> MaintenanceDraft {
        self.draft
    }

    pub fn groups(&mut self) -> ServiceGroupEditor<'_> {
        ServiceGroupEditor::new(&mut self.draft)
    }

    // ── Field setters ─────────────────────────────────────────────────────────

    /// Select the vehicle, along with its highest recorded odometer reading.
    pub fn set_vehicle(&mut self, vehicle_id: impl Into<String>, last_known_odometer: Option<i64>) {
        self.draft.vehicle_id = Some(vehicle_id.into());
        self.last_known_odometer = last_known_odometer;
    }

    pub fn set_task_type(&mut self, task_type: TaskType) {
        self.draft.task_type = task_type;
    }

    pub fn set_status(&mut self, status: TaskStatus) {
        self.draft.status = status;
    }

    pub fn set_priority(&mut self, priority: Priority) {
        self.draft.priority = priority;
    }

    pub fn set_odometer(&mut self, reading: Option<i64>) {
        self.draft.odometer_reading = reading;
    }

    pub fn set_complaint(&mut self, text: impl Into<String>) {
        self.draft.complaint = text.into();
    }

    pub fn set_resolution(&mut self, text: impl Into<String>) {
        self.draft.resolution = text.into();
    }

    pub fn set_start_date(&mut self, start: Option<OffsetDateTime>) {
        self.draft.start_date = start;
        self.sync_end_from_downtime();
    }

    pub fn set_downtime(&mut self, downtime: Downtime) {
        self.draft.downtime = downtime;
        self.sync_end_from_downtime();
    }

    pub fn set_end_date(&mut self, end: Option<OffsetDateTime>) {
        self.draft.end_date = end;
        self.sync_downtime_from_end();
    }

    // ── Quick downtime buttons ────────────────────────────────────────────────

    pub fn press_quick_downtime(&mut self, hours: u64, at: Instant) {
        self.quick_downtime.press(hours, at);
    }

    /// Apply accumulated quick-downtime presses once the buttons have gone
    /// quiet. Returns true when the downtime changed.
    pub fn settle_quick_downtime(&mut self, at: Instant) -> bool {
        match self.quick_downtime.settle(at) {
            Some(hours) => self.apply_quick_downtime(hours),
            None => false,
        }
    }

    fn apply_quick_downtime(&mut self, hours: u64) -> bool {
        if hours == 0 {
            return false;
        }
        let downtime = self.draft.downtime.add_hours(hours);
        self.set_downtime(downtime);
        true
    }

    // ── Validation ────────────────────────────────────────────────────────────

    /// Validate for submission. Pending quick-downtime presses are applied
    /// first so nothing the user clicked is lost.
    pub fn validate(&mut self, now: OffsetDateTime) -> Result<(), ValidationError> {
        if let Some(hours) = self.quick_downtime.flush() {
            self.apply_quick_downtime(hours);
        }
        let ctx = ValidationContext {
            now,
            last_known_odometer: self.last_known_odometer,
        };
        validate(&self.draft, &ctx)
    }

    // ── Date sync ─────────────────────────────────────────────────────────────

    fn sync_end_from_downtime(&mut self) {
        let Some(start) = self.draft.start_date else {
            return;
        };
        let computed = self.draft.downtime.end_from(start);
        match self.draft.end_date {
            Some(end) if within_tolerance(days_apart(end, computed), 0.0) => {}
            None if self.draft.downtime.is_zero() => {}
            _ => self.draft.end_date = Some(computed),
        }
    }

    fn sync_downtime_from_end(&mut self) {
        let (Some(start), Some(end)) = (self.draft.start_date, self.draft.end_date) else {
            return;
        };
        // A reversed range is left for validation to report.
        let Some(computed) = Downtime::between(start, end) else {
            return;
        };
        if !within_tolerance(computed.as_days(), self.draft.downtime.as_days()) {
            self.draft.downtime = computed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CostEntry, TaskRef, VendorRef};
    use rust_decimal::Decimal;
    use std::time::Duration as StdDuration;
    use time::macros::datetime;
    use time::Duration;

    #[test]
    fn downtime_derives_end_date() {
        let mut form = MaintenanceForm::new();
        form.set_start_date(Some(datetime!(2024-01-10 08:00 UTC)));
        assert_eq!(form.draft().end_date, None);

        form.set_downtime(Downtime::new(2, 6));
        assert_eq!(form.draft().end_date, Some(datetime!(2024-01-12 14:00 UTC)));
    }

    #[test]
    fn end_date_derives_downtime() {
        let mut form = MaintenanceForm::new();
        form.set_start_date(Some(datetime!(2024-01-10 08:00 UTC)));
        form.set_end_date(Some(datetime!(2024-01-13 10:00 UTC)));
        assert_eq!(form.draft().downtime, Downtime::new(3, 2));
    }

    #[test]
    fn near_identical_end_date_keeps_downtime() {
        let mut form = MaintenanceForm::new();
        form.set_start_date(Some(datetime!(2024-01-10 08:00 UTC)));
        form.set_downtime(Downtime::new(1, 0));
        let end = datetime!(2024-01-11 08:05 UTC);
        form.set_end_date(Some(end));
        assert_eq!(form.draft().downtime, Downtime::new(1, 0));
        assert_eq!(form.draft().end_date, Some(end));
    }

    #[test]
    fn moving_start_moves_end() {
        let mut form = MaintenanceForm::new();
        form.set_start_date(Some(datetime!(2024-01-10 08:00 UTC)));
        form.set_downtime(Downtime::new(0, 5));
        form.set_start_date(Some(datetime!(2024-01-11 08:00 UTC)));
        assert_eq!(
            form.draft().end_date,
            Some(datetime!(2024-01-11 08:00 UTC) + Duration::hours(5))
        );
    }

    #[test]
    fn quick_downtime_applies_after_quiet_window() {
        let mut form = MaintenanceForm::new();
        form.set_start_date(Some(datetime!(2024-01-10 08:00 UTC)));
        let t0 = Instant::now();
        form.press_quick_downtime(24, t0);
        form.press_quick_downtime(24, t0 + StdDuration::from_millis(50));
        assert!(!form.settle_quick_downtime(t0 + StdDuration::from_millis(100)));
        assert!(form.settle_quick_downtime(t0 + StdDuration::from_secs(1)));
        assert_eq!(form.draft().downtime, Downtime::new(2, 0));
        assert_eq!(form.draft().end_date, Some(datetime!(2024-01-12 08:00 UTC)));
    }

    #[test]
    fn validate_flushes_pending_presses_and_uses_last_odometer() {
        let mut form = MaintenanceForm::new();
        form.set_vehicle("V1", Some(60_000));
        form.set_start_date(Some(datetime!(2024-01-10 00:00 UTC)));
        form.set_odometer(Some(50_000));
        let i = form.groups().add_group();
        form.groups()
            .update_group(i, |g| {
                g.vendor = Some(VendorRef::name("Joe's Garage"));
                g.tasks = vec![TaskRef::named("Engine Oil Change")];
                g.cost = CostEntry::Quick {
                    amount: Decimal::from(1500),
                };
            })
            .unwrap();
        form.press_quick_downtime(3, Instant::now());

        let err = form.validate(datetime!(2024-02-01 00:00 UTC)).unwrap_err();
        assert!(matches!(err, ValidationError::OdometerRegressed { .. }));
        assert_eq!(form.draft().downtime, Downtime::new(0, 3));

        form.set_odometer(Some(61_000));
        assert_eq!(form.validate(datetime!(2024-02-01 00:00 UTC)), Ok(()));
        assert_eq!(form.draft().total_cost, Decimal::from(1500));
    }
}
