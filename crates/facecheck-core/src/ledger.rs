//! The daily attendance ledger.
//!
//! Holds today's check-in events, most recent first, and enforces
//! at-most-one-check-in-per-identity-per-local-calendar-day.

use chrono::{DateTime, Local, NaiveDate};
use thiserror::Error;

use crate::types::{CheckInEvent, Identity};

#[derive(Error, Debug, PartialEq, Eq)]
#[error("{name} has already checked in today")]
pub struct AlreadyCheckedIn {
    pub name: String,
}

/// Today's check-in events, most recent first.
///
/// Day boundaries follow the session-local timezone: an event belongs to
/// the calendar day of its timestamp in `chrono::Local`, and the window
/// resets at local midnight.
#[derive(Debug, Default)]
pub struct Ledger {
    events: Vec<CheckInEvent>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted events, restoring most-recent-first order.
    pub fn from_events(mut events: Vec<CheckInEvent>) -> Self {
        events.sort_by(|a, b| b.checked_in_at.cmp(&a.checked_in_at));
        Self { events }
    }

    /// Record a check-in for `identity` at `now`.
    ///
    /// The duplicate check and the insert run back to back with no
    /// suspension point in between; with a single writer this makes the
    /// read-check-write sequence atomic.
    pub fn record(
        &mut self,
        identity: &Identity,
        now: DateTime<Local>,
    ) -> Result<&CheckInEvent, AlreadyCheckedIn> {
        if self.has_checked_in(&identity.id, now.date_naive()) {
            return Err(AlreadyCheckedIn {
                name: identity.name.clone(),
            });
        }

        let event = CheckInEvent {
            identity_id: identity.id.clone(),
            name: identity.name.clone(),
            checked_in_at: now,
        };
        tracing::info!(id = %event.identity_id, name = %event.name, "check-in recorded");
        self.events.insert(0, event);
        Ok(&self.events[0])
    }

    /// Whether the identity already has an event on the given local day.
    pub fn has_checked_in(&self, identity_id: &str, day: NaiveDate) -> bool {
        self.events
            .iter()
            .any(|e| e.identity_id == identity_id && e.checked_in_at.date_naive() == day)
    }

    /// Events whose local calendar day matches `now`, newest first.
    pub fn todays_entries(&self, now: DateTime<Local>) -> Vec<CheckInEvent> {
        let today = now.date_naive();
        let mut entries: Vec<CheckInEvent> = self
            .events
            .iter()
            .filter(|e| e.checked_in_at.date_naive() == today)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.checked_in_at.cmp(&a.checked_in_at));
        entries
    }

    /// Drop events outside the given local day. Applied when reloading
    /// persisted state, so stale days never enter the working set.
    pub fn retain_day(&mut self, day: NaiveDate) {
        self.events.retain(|e| e.checked_in_at.date_naive() == day);
    }

    /// Empty the log. Destructive and non-recoverable; callers gate this
    /// behind an explicit confirmation.
    pub fn clear(&mut self) {
        let dropped = self.events.len();
        self.events.clear();
        tracing::info!(dropped, "attendance log cleared");
    }

    pub fn events(&self) -> &[CheckInEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
