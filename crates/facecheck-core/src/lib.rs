//! facecheck-core — Enrollment roster and daily attendance ledger.
//!
//! Pure domain state machine for the attendance kiosk: the [`Directory`]
//! of enrolled identities, the daily check-in [`Ledger`], and the
//! [`Session`] that owns both and reconciles recognition results.
//! No I/O lives here; persistence and the recognition service are
//! collaborators of the daemon.

pub mod directory;
pub mod ledger;
pub mod reconcile;
pub mod session;
pub mod types;

pub use directory::{Directory, EnrollError};
pub use ledger::{AlreadyCheckedIn, Ledger};
pub use session::{CheckInError, Session};
pub use types::{
    CheckInEvent, CheckInStatus, Identity, ImageData, ImageDataError, KioskOutcome, MatchOutcome,
    RecognitionReply, RecognizedMatch,
};
