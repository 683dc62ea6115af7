//! Reconciliation of recognition results with the ledger.
//!
//! One kiosk capture can yield zero or more claimed matches. Each match is
//! settled against the ledger independently, so a single capture can produce
//! a partial-success result set (one person newly checked in, another
//! already checked in earlier). A reply with no matches never touches the
//! ledger and yields a distinct no-match outcome.

use chrono::{DateTime, Local};

use crate::session::{CheckInError, Session};
use crate::types::{CheckInStatus, KioskOutcome, MatchOutcome, RecognitionReply};

impl Session {
    /// Settle a recognition reply against the ledger at the current time.
    pub fn reconcile(&mut self, reply: RecognitionReply) -> KioskOutcome {
        self.reconcile_at(reply, Local::now())
    }

    /// Settle a recognition reply at an explicit instant.
    ///
    /// Matches are processed in service order, each through the same
    /// check-in path as a manual check-in. A duplicate id within one reply
    /// therefore settles as `CheckedIn` then `AlreadyCheckedIn`, and both
    /// outcomes are reported.
    pub fn reconcile_at(&mut self, reply: RecognitionReply, now: DateTime<Local>) -> KioskOutcome {
        if reply.matches.is_empty() {
            return KioskOutcome::NoMatch {
                reason: reply.reason,
            };
        }

        let mut outcomes = Vec::with_capacity(reply.matches.len());
        for claimed in reply.matches {
            let status = match self.mark_attendance_at(&claimed.identity_id, now) {
                Ok(_) => CheckInStatus::CheckedIn,
                Err(CheckInError::AlreadyCheckedIn(_)) => CheckInStatus::AlreadyCheckedIn,
                Err(CheckInError::IdentityNotFound(_)) => CheckInStatus::NotFound,
            };
            // Prefer the roster's name over the service's claimed copy.
            let name = self
                .directory()
                .get(&claimed.identity_id)
                .map(|identity| identity.name.clone())
                .unwrap_or(claimed.name);
            outcomes.push(MatchOutcome {
                identity_id: claimed.identity_id,
                name,
                status,
            });
        }
        KioskOutcome::Reconciled { outcomes }
    }
}
