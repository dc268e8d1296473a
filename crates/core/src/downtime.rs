//! Vehicle downtime and the start/end date relationship.
//!
//! Downtime is kept at hour granularity. `end_date = start_date + downtime`
//! holds whenever both dates are present; the form keeps the two in sync and
//! uses [`DAY_TOLERANCE`] to avoid re-applying a value it just derived.

use std::time::{Duration as StdDuration, Instant};

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

/// Two downtime values closer than this (in days) are treated as equal.
pub const DAY_TOLERANCE: f64 = 0.01;

/// Quiet window for the quick-downtime buttons.
pub const QUICK_DOWNTIME_WINDOW: StdDuration = StdDuration::from_millis(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Downtime {
    pub days: u32,
    pub hours: u32,
}

impl Downtime {
    /// Build a downtime, carrying whole days out of `hours`.
    pub fn new(days: u32, hours: u32) -> Self {
        Downtime::from_hours(u64::from(days) * 24 + u64::from(hours))
    }

    pub fn from_hours(total: u64) -> Self {
        Downtime {
            days: u32::try_from(total / 24).unwrap_or(u32::MAX),
            hours: (total % 24) as u32,
        }
    }

    pub fn total_hours(&self) -> u64 {
        u64::from(self.days) * 24 + u64::from(self.hours)
    }

    pub fn is_zero(&self) -> bool {
        self.total_hours() == 0
    }

    pub fn as_days(&self) -> f64 {
        self.total_hours() as f64 / 24.0
    }

    pub fn as_duration(&self) -> Duration {
        Duration::hours(self.total_hours() as i64)
    }

    pub fn end_from(&self, start: OffsetDateTime) -> OffsetDateTime {
        start + self.as_duration()
    }

    /// Downtime between two instants, rounded to the nearest hour.
    ///
    /// Returns `None` when `end` is before `start`.
    pub fn between(start: OffsetDateTime, end: OffsetDateTime) -> Option<Self> {
        if end < start {
            return None;
        }
        let hours = ((end - start).as_seconds_f64() / 3600.0).round();
        Some(Downtime::from_hours(hours as u64))
    }

    pub fn add_hours(&self, hours: u64) -> Self {
        Downtime::from_hours(self.total_hours().saturating_add(hours))
    }
}

/// True when two day counts are within [`DAY_TOLERANCE`] of each other.
pub fn within_tolerance(a_days: f64, b_days: f64) -> bool {
    (a_days - b_days).abs() < DAY_TOLERANCE
}

/// Difference between two instants in fractional days.
pub fn days_apart(a: OffsetDateTime, b: OffsetDateTime) -> f64 {
    (a - b).as_seconds_f64().abs() / 86_400.0
}

// ──────────────────────────────────────────────
// Quick downtime debouncing
// ──────────────────────────────────────────────

/// Accumulates rapid quick-downtime presses and releases them once the
/// buttons have been idle for the quiet window.
///
/// Owned by a single form instance; two forms never share a timer.
#[derive(Debug, Clone)]
pub struct QuickDowntimeDebouncer {
    window: StdDuration,
    pending_hours: u64,
    last_press: Option<Instant>,
}

impl Default for QuickDowntimeDebouncer {
    fn default() -> Self {
        QuickDowntimeDebouncer::new(QUICK_DOWNTIME_WINDOW)
    }
}

impl QuickDowntimeDebouncer {
    pub fn new(window: StdDuration) -> Self {
        QuickDowntimeDebouncer {
            window,
            pending_hours: 0,
            last_press: None,
        }
    }

    pub fn press(&mut self, hours: u64, at: Instant) {
        self.pending_hours = self.pending_hours.saturating_add(hours);
        self.last_press = Some(at);
    }

    pub fn is_pending(&self) -> bool {
        self.last_press.is_some()
    }

    /// Take the accumulated hours if the quiet window has passed since the
    /// last press.
    pub fn settle(&mut self, at: Instant) -> Option<u64> {
        let last = self.last_press?;
        if at.saturating_duration_since(last) < self.window {
            return None;
        }
        self.flush()
    }

    /// Take the accumulated hours immediately.
    pub fn flush(&mut self) -> Option<u64> {
        self.last_press.take()?;
        Some(std::mem::take(&mut self.pending_hours))
    }
}
