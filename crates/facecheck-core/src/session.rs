//! The session object owning the roster and today's ledger.

use chrono::{DateTime, Local};
use thiserror::Error;

use crate::directory::{Directory, EnrollError};
use crate::ledger::{AlreadyCheckedIn, Ledger};
use crate::types::{CheckInEvent, Identity, ImageData};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CheckInError {
    #[error("no enrolled identity with id {0}")]
    IdentityNotFound(String),
    #[error(transparent)]
    AlreadyCheckedIn(#[from] AlreadyCheckedIn),
}

/// Process-wide mutable state: the [`Directory`] plus the daily [`Ledger`],
/// passed explicitly to whoever drives it. The engine is the single writer;
/// in a multi-writer context this whole struct goes behind a mutex.
#[derive(Debug, Default)]
pub struct Session {
    directory: Directory,
    ledger: Ledger,
}

impl Session {
    pub fn new(directory: Directory, ledger: Ledger) -> Self {
        Self { directory, ledger }
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn enroll(&mut self, name: &str, image: ImageData) -> Result<&Identity, EnrollError> {
        self.directory.enroll(name, image)
    }

    /// Remove an identity from the roster. Today's events for it remain
    /// in the ledger until explicitly cleared.
    pub fn remove_identity(&mut self, id: &str) -> bool {
        self.directory.remove(id)
    }

    /// Record a check-in for `id` at the current local time.
    pub fn mark_attendance(&mut self, id: &str) -> Result<CheckInEvent, CheckInError> {
        self.mark_attendance_at(id, Local::now())
    }

    /// Record a check-in for `id` at an explicit instant.
    ///
    /// Resolves the identity first, then records; both halves run without
    /// an intervening suspension point.
    pub fn mark_attendance_at(
        &mut self,
        id: &str,
        now: DateTime<Local>,
    ) -> Result<CheckInEvent, CheckInError> {
        let identity = self
            .directory
            .get(id)
            .ok_or_else(|| CheckInError::IdentityNotFound(id.to_string()))?;
        let event = self.ledger.record(identity, now)?;
        Ok(event.clone())
    }

    pub fn todays_log(&self, now: DateTime<Local>) -> Vec<CheckInEvent> {
        self.ledger.todays_entries(now)
    }

    pub fn clear_log(&mut self) {
        self.ledger.clear();
    }
}
