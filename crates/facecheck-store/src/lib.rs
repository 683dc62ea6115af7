//! facecheck-store — SQLite-backed persistence for the kiosk state.
//!
//! The domain treats storage as an opaque key-value store holding two
//! named records: the serialized roster and the serialized attendance log.
//! Records are loaded once at startup and rewritten on every mutation.

pub mod store;

pub use store::{StateStore, StoreError};
