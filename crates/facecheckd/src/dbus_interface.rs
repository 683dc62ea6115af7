use serde::Serialize;
use zbus::interface;

use crate::engine::{EngineError, EngineHandle};

/// D-Bus interface for the FaceCheck kiosk daemon.
///
/// Bus name: org.facecheck.Kiosk1
/// Object path: /org/facecheck/Kiosk1
///
/// Structured payloads travel as JSON strings. Domain outcomes that are
/// normal results (already checked in, no match, unknown id) are encoded
/// in the reply JSON; only hard failures (capture, recognition, busy,
/// store) become D-Bus errors.
pub struct KioskService {
    engine: EngineHandle,
}

impl KioskService {
    pub fn new(engine: EngineHandle) -> Self {
        Self { engine }
    }
}

#[interface(name = "org.facecheck.Kiosk1")]
impl KioskService {
    /// Run one kiosk interaction with a captured frame (data URI).
    /// Returns the reconciliation outcome as JSON.
    async fn check_in(&self, frame: &str) -> zbus::fdo::Result<String> {
        tracing::info!("kiosk check-in requested");
        let outcome = self.engine.check_in(frame.to_string()).await.map_err(to_fdo)?;
        to_json(&outcome)
    }

    /// Enroll a new user from a reference photo (data URI).
    async fn enroll(&self, name: &str, image: &str) -> zbus::fdo::Result<String> {
        tracing::info!(name, "enroll requested");
        let entry = self
            .engine
            .enroll(name.to_string(), image.to_string())
            .await
            .map_err(to_fdo)?;
        to_json(&entry)
    }

    /// Remove an enrolled user by id. Returns false if no such user.
    async fn remove_user(&self, id: &str) -> zbus::fdo::Result<bool> {
        tracing::info!(id, "remove requested");
        self.engine.remove(id.to_string()).await.map_err(to_fdo)
    }

    /// Check a user in by id without a recognition pass.
    async fn manual_check_in(&self, id: &str) -> zbus::fdo::Result<String> {
        tracing::info!(id, "manual check-in requested");
        let outcome = self
            .engine
            .manual_check_in(id.to_string())
            .await
            .map_err(to_fdo)?;
        to_json(&outcome)
    }

    /// List enrolled users with today's check-in flags.
    async fn list_users(&self) -> zbus::fdo::Result<String> {
        let roster = self.engine.roster().await.map_err(to_fdo)?;
        to_json(&roster)
    }

    /// Today's attendance log, newest first.
    async fn todays_log(&self) -> zbus::fdo::Result<String> {
        let log = self.engine.todays_log().await.map_err(to_fdo)?;
        to_json(&log)
    }

    /// Clear today's attendance log. Destructive; clients confirm first.
    async fn clear_log(&self) -> zbus::fdo::Result<()> {
        tracing::info!("clear log requested");
        self.engine.clear_log().await.map_err(to_fdo)
    }

    /// Daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let report = self.engine.status().await.map_err(to_fdo)?;
        to_json(&report)
    }
}

fn to_fdo(error: EngineError) -> zbus::fdo::Error {
    zbus::fdo::Error::Failed(error.to_string())
}

fn to_json<T: Serialize>(value: &T) -> zbus::fdo::Result<String> {
    serde_json::to_string(value).map_err(|error| zbus::fdo::Error::Failed(error.to_string()))
}
