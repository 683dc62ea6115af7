//! The roster of enrolled identities, in insertion order.

use thiserror::Error;
use uuid::Uuid;

use crate::types::{Identity, ImageData};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum EnrollError {
    #[error("name must not be empty")]
    EmptyName,
    #[error("a reference image is required")]
    EmptyImage,
}

/// Ordered roster of enrolled identities.
#[derive(Debug, Default)]
pub struct Directory {
    entries: Vec<Identity>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from previously persisted entries, preserving their order.
    pub fn from_entries(entries: Vec<Identity>) -> Self {
        Self { entries }
    }

    /// Enroll a new identity with a fresh opaque id.
    ///
    /// Ids are UUIDv4 so they cannot collide regardless of name or
    /// enrollment time. The name is stored trimmed.
    pub fn enroll(&mut self, name: &str, image: ImageData) -> Result<&Identity, EnrollError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EnrollError::EmptyName);
        }
        if image.is_empty() {
            return Err(EnrollError::EmptyImage);
        }

        let identity = Identity {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            image,
        };
        tracing::info!(id = %identity.id, name = %identity.name, "identity enrolled");
        self.entries.push(identity);
        Ok(self.entries.last().expect("roster non-empty after push"))
    }

    /// Remove an identity by id. Returns false if no such identity exists.
    /// Historical check-in events are never cascade-deleted.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|identity| identity.id != id);
        let removed = self.entries.len() != before;
        if removed {
            tracing::info!(id, "identity removed");
        }
        removed
    }

    pub fn get(&self, id: &str) -> Option<&Identity> {
        self.entries.iter().find(|identity| identity.id == id)
    }

    /// All enrolled identities in insertion order.
    pub fn list(&self) -> &[Identity] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
