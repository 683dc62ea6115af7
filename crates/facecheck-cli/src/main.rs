use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use facecheck_core::ImageData;
use image::ImageFormat;
use serde_json::Value;

// D-Bus proxy for the kiosk daemon.
#[zbus::proxy(
    interface = "org.facecheck.Kiosk1",
    default_service = "org.facecheck.Kiosk1",
    default_path = "/org/facecheck/Kiosk1"
)]
trait Kiosk {
    async fn check_in(&self, frame: &str) -> zbus::Result<String>;
    async fn enroll(&self, name: &str, image: &str) -> zbus::Result<String>;
    async fn remove_user(&self, id: &str) -> zbus::Result<bool>;
    async fn manual_check_in(&self, id: &str) -> zbus::Result<String>;
    async fn list_users(&self) -> zbus::Result<String>;
    async fn todays_log(&self) -> zbus::Result<String>;
    async fn clear_log(&self) -> zbus::Result<()>;
    async fn status(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "facecheck", about = "FaceCheck attendance kiosk CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a captured webcam frame for recognition check-in
    Checkin {
        /// Path to the captured frame (png/jpeg/webp)
        #[arg(short, long)]
        image: PathBuf,
    },
    /// Enroll a new user from a reference photo
    Enroll {
        /// Display name for the new user
        #[arg(short, long)]
        name: String,
        /// Path to the reference photo
        #[arg(short, long)]
        image: PathBuf,
    },
    /// List enrolled users with today's check-in status
    List,
    /// Remove an enrolled user
    Remove {
        /// User id to remove
        id: String,
    },
    /// Check a user in manually, without a recognition pass
    ManualCheckin {
        /// User id to check in
        id: String,
    },
    /// Show today's attendance log
    Log,
    /// Clear today's attendance log (cannot be undone)
    ClearLog {
        /// Skip the confirmation requirement
        #[arg(long)]
        yes: bool,
    },
    /// Show daemon status
    Status,
}

/// Read an image file and wrap it as the data URI the daemon expects.
fn load_image(path: &Path) -> Result<String> {
    let bytes =
        std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let format = image::guess_format(&bytes)
        .with_context(|| format!("{} is not a recognizable image", path.display()))?;
    let mime = match format {
        ImageFormat::Png => "image/png",
        ImageFormat::Jpeg => "image/jpeg",
        ImageFormat::WebP => "image/webp",
        ImageFormat::Gif => "image/gif",
        ImageFormat::Bmp => "image/bmp",
        other => bail!("unsupported image format {other:?}"),
    };
    Ok(ImageData::new(mime, bytes).data_uri())
}

fn print_outcome(raw: &str) -> Result<()> {
    let outcome: Value = serde_json::from_str(raw).context("parsing daemon reply")?;
    match outcome["outcome"].as_str() {
        Some("no_match") => {
            let reason = outcome["reason"].as_str().unwrap_or("No matching user");
            println!("No match: {reason}");
        }
        Some("reconciled") => {
            for entry in outcome["outcomes"].as_array().into_iter().flatten() {
                print_match(entry);
            }
        }
        _ => println!("{raw}"),
    }
    Ok(())
}

fn print_match(entry: &Value) {
    let name = entry["name"].as_str().unwrap_or("?");
    let id = entry["userId"].as_str().unwrap_or("?");
    match entry["status"].as_str() {
        Some("checked_in") => println!("Welcome, {name}! Checked in."),
        Some("already_checked_in") => println!("{name} has already checked in today."),
        Some("not_found") => println!("No enrolled user with id {id}."),
        _ => println!("{entry}"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let conn = zbus::Connection::session()
        .await
        .context("connecting to the session bus")?;
    let proxy = KioskProxy::new(&conn)
        .await
        .context("is facecheckd running?")?;

    match cli.command {
        Commands::Checkin { image } => {
            let frame = load_image(&image)?;
            let reply = proxy.check_in(&frame).await?;
            print_outcome(&reply)?;
        }
        Commands::Enroll { name, image } => {
            let photo = load_image(&image)?;
            let reply = proxy.enroll(&name, &photo).await?;
            let entry: Value = serde_json::from_str(&reply).context("parsing daemon reply")?;
            println!(
                "Enrolled {} ({})",
                entry["name"].as_str().unwrap_or(&name),
                entry["userId"].as_str().unwrap_or("?")
            );
        }
        Commands::List => {
            let reply = proxy.list_users().await?;
            let roster: Value = serde_json::from_str(&reply).context("parsing daemon reply")?;
            let users = roster.as_array().cloned().unwrap_or_default();
            if users.is_empty() {
                println!("No users enrolled");
            }
            for user in users {
                let badge = if user["checkedInToday"].as_bool().unwrap_or(false) {
                    "checked in"
                } else {
                    "not checked in"
                };
                println!(
                    "{}  {}  [{badge}]",
                    user["userId"].as_str().unwrap_or("?"),
                    user["name"].as_str().unwrap_or("?"),
                );
            }
        }
        Commands::Remove { id } => {
            if proxy.remove_user(&id).await? {
                println!("Removed {id}");
            } else {
                println!("No enrolled user with id {id}");
            }
        }
        Commands::ManualCheckin { id } => {
            let reply = proxy.manual_check_in(&id).await?;
            let entry: Value = serde_json::from_str(&reply).context("parsing daemon reply")?;
            print_match(&entry);
        }
        Commands::Log => {
            let reply = proxy.todays_log().await?;
            let log: Value = serde_json::from_str(&reply).context("parsing daemon reply")?;
            let entries = log.as_array().cloned().unwrap_or_default();
            if entries.is_empty() {
                println!("No check-ins yet today");
            }
            for entry in entries {
                println!(
                    "{}  {}",
                    entry["checkInTime"].as_str().unwrap_or("?"),
                    entry["name"].as_str().unwrap_or("?"),
                );
            }
        }
        Commands::ClearLog { yes } => {
            if !yes {
                bail!("clearing today's log cannot be undone; re-run with --yes to confirm");
            }
            proxy.clear_log().await?;
            println!("Today's attendance log cleared");
        }
        Commands::Status => {
            let reply = proxy.status().await?;
            let status: Value = serde_json::from_str(&reply).context("parsing daemon reply")?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
    }

    Ok(())
}
