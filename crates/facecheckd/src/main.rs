use std::time::Duration;

use anyhow::Result;
use chrono::Local;
use facecheck_core::{Directory, Ledger, Session};
use facecheck_recognizer::GeminiRecognizer;
use facecheck_store::StateStore;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;

use config::Config;
use dbus_interface::KioskService;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("facecheckd starting");

    let config = Config::from_env()?;

    let store = StateStore::open(&config.db_path).await?;
    let roster = store.load_roster().await?;
    let events = store.load_log().await?;

    // Working state only ever holds today's window; prior-day events are
    // pruned from the record on the next save.
    let mut ledger = Ledger::from_events(events);
    ledger.retain_day(Local::now().date_naive());
    let session = Session::new(Directory::from_entries(roster), ledger);
    tracing::info!(
        enrolled = session.directory().len(),
        todays_check_ins = session.ledger().len(),
        "state loaded"
    );

    let recognizer = GeminiRecognizer::new(&config.api_key, &config.model, &config.api_base_url);
    let handle = engine::spawn_engine(
        session,
        store,
        recognizer,
        Duration::from_secs(config.recognize_timeout_secs),
        config.max_image_bytes,
        config.model.clone(),
    );

    let _conn = zbus::connection::Builder::session()?
        .name("org.facecheck.Kiosk1")?
        .serve_at("/org/facecheck/Kiosk1", KioskService::new(handle))?
        .build()
        .await?;

    tracing::info!("facecheckd ready");

    // Keep running until signaled
    tokio::signal::ctrl_c().await?;
    tracing::info!("facecheckd shutting down");

    Ok(())
}
