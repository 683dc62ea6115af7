//! Kiosk engine: a single-writer actor owning the session and the store.
//!
//! All state mutation flows through one task fed by an mpsc channel, so
//! the ledger's read-check-write sequence never interleaves. One kiosk
//! interaction runs to completion before the next request is dequeued:
//! `Idle -> Capturing -> AwaitingRecognition -> Reconciling -> Idle`. The
//! recognition call is the only suspension point; a result that misses
//! the deadline is discarded together with its future, so stale replies
//! can never touch the session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate};
use facecheck_core::{
    CheckInError, CheckInStatus, EnrollError, ImageData, KioskOutcome, MatchOutcome, Session,
};
use facecheck_recognizer::{Recognize, RecognizeError};
use facecheck_store::{StateStore, StoreError};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("could not read the captured image: {0}")]
    Capture(String),
    #[error("recognition service failure: {0}")]
    Recognition(#[from] RecognizeError),
    #[error("recognition timed out after {0}s")]
    RecognitionTimeout(u64),
    #[error("a check-in is already in progress")]
    Busy,
    #[error(transparent)]
    Enroll(#[from] EnrollError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("engine task exited")]
    ChannelClosed,
}

/// One roster row for display: identity plus today's check-in flag.
#[derive(Debug, Clone, Serialize)]
pub struct RosterEntry {
    #[serde(rename = "userId")]
    pub id: String,
    pub name: String,
    #[serde(rename = "imageSrc")]
    pub image: String,
    #[serde(rename = "checkedInToday")]
    pub checked_in_today: bool,
}

/// One daily-log row, joined with the roster photo when the identity
/// still exists.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    #[serde(rename = "userId")]
    pub identity_id: String,
    pub name: String,
    #[serde(rename = "checkInTime")]
    pub checked_in_at: DateTime<Local>,
    #[serde(rename = "imageSrc", skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub version: &'static str,
    pub enrolled: usize,
    #[serde(rename = "checkedInToday")]
    pub checked_in_today: usize,
    pub model: String,
}

/// Messages sent from D-Bus handlers to the engine task.
enum EngineRequest {
    CheckIn {
        frame: String,
        reply: oneshot::Sender<Result<KioskOutcome, EngineError>>,
    },
    Enroll {
        name: String,
        image: String,
        reply: oneshot::Sender<Result<RosterEntry, EngineError>>,
    },
    Remove {
        id: String,
        reply: oneshot::Sender<Result<bool, EngineError>>,
    },
    ManualCheckIn {
        id: String,
        reply: oneshot::Sender<Result<MatchOutcome, EngineError>>,
    },
    Roster {
        reply: oneshot::Sender<Vec<RosterEntry>>,
    },
    TodaysLog {
        reply: oneshot::Sender<Vec<LogEntry>>,
    },
    ClearLog {
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    Status {
        reply: oneshot::Sender<StatusReport>,
    },
}

/// Clone-safe handle to the engine task.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    kiosk_busy: Arc<AtomicBool>,
}

impl EngineHandle {
    /// Run one kiosk interaction: capture, recognition, reconciliation.
    ///
    /// Rejects with [`EngineError::Busy`] while another interaction is in
    /// flight, which is the daemon-side half of "disable the trigger
    /// while an interaction is running".
    pub async fn check_in(&self, frame: String) -> Result<KioskOutcome, EngineError> {
        if self.kiosk_busy.swap(true, Ordering::SeqCst) {
            return Err(EngineError::Busy);
        }
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .tx
            .send(EngineRequest::CheckIn {
                frame,
                reply: reply_tx,
            })
            .await
            .is_err()
        {
            self.kiosk_busy.store(false, Ordering::SeqCst);
            return Err(EngineError::ChannelClosed);
        }
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    pub async fn enroll(&self, name: String, image: String) -> Result<RosterEntry, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Enroll {
                name,
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    pub async fn remove(&self, id: String) -> Result<bool, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Remove { id, reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    pub async fn manual_check_in(&self, id: String) -> Result<MatchOutcome, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::ManualCheckIn { id, reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    pub async fn roster(&self) -> Result<Vec<RosterEntry>, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Roster { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    pub async fn todays_log(&self) -> Result<Vec<LogEntry>, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::TodaysLog { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    pub async fn clear_log(&self) -> Result<(), EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::ClearLog { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    pub async fn status(&self) -> Result<StatusReport, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Status { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }
}

/// Spawn the engine task and return a handle to it.
pub fn spawn_engine<R>(
    session: Session,
    store: StateStore,
    recognizer: R,
    recognize_timeout: Duration,
    max_image_bytes: usize,
    model: String,
) -> EngineHandle
where
    R: Recognize + 'static,
{
    let (tx, rx) = mpsc::channel::<EngineRequest>(4);
    let kiosk_busy = Arc::new(AtomicBool::new(false));

    let engine = Engine {
        session,
        store,
        recognizer,
        recognize_timeout,
        max_image_bytes,
        model,
        interaction_seq: 0,
    };
    tokio::spawn(engine.run(rx, kiosk_busy.clone()));

    EngineHandle { tx, kiosk_busy }
}

struct Engine<R: Recognize> {
    session: Session,
    store: StateStore,
    recognizer: R,
    recognize_timeout: Duration,
    max_image_bytes: usize,
    model: String,
    interaction_seq: u64,
}

impl<R: Recognize> Engine<R> {
    async fn run(mut self, mut rx: mpsc::Receiver<EngineRequest>, kiosk_busy: Arc<AtomicBool>) {
        tracing::info!("engine task started");
        while let Some(req) = rx.recv().await {
            match req {
                EngineRequest::CheckIn { frame, reply } => {
                    let result = self.handle_check_in(&frame).await;
                    kiosk_busy.store(false, Ordering::SeqCst);
                    let _ = reply.send(result);
                }
                EngineRequest::Enroll { name, image, reply } => {
                    let _ = reply.send(self.handle_enroll(&name, &image).await);
                }
                EngineRequest::Remove { id, reply } => {
                    let _ = reply.send(self.handle_remove(&id).await);
                }
                EngineRequest::ManualCheckIn { id, reply } => {
                    let _ = reply.send(self.handle_manual_check_in(&id).await);
                }
                EngineRequest::Roster { reply } => {
                    let _ = reply.send(self.roster_entries(Local::now().date_naive()));
                }
                EngineRequest::TodaysLog { reply } => {
                    let _ = reply.send(self.log_entries(Local::now()));
                }
                EngineRequest::ClearLog { reply } => {
                    let _ = reply.send(self.handle_clear_log().await);
                }
                EngineRequest::Status { reply } => {
                    let _ = reply.send(self.status_report(Local::now()));
                }
            }
        }
        tracing::info!("engine task exiting");
    }

    /// Decode and validate a submitted `data:` URI frame.
    fn decode_frame(&self, uri: &str) -> Result<ImageData, EngineError> {
        let image =
            ImageData::from_data_uri(uri).map_err(|error| EngineError::Capture(error.to_string()))?;
        if image.is_empty() {
            return Err(EngineError::Capture("image is empty".into()));
        }
        if image.bytes.len() > self.max_image_bytes {
            return Err(EngineError::Capture(format!(
                "image exceeds the {}-byte limit",
                self.max_image_bytes
            )));
        }
        if image::guess_format(&image.bytes).is_err() {
            return Err(EngineError::Capture("unrecognized image format".into()));
        }
        Ok(image)
    }

    async fn handle_check_in(&mut self, frame_uri: &str) -> Result<KioskOutcome, EngineError> {
        self.interaction_seq += 1;
        let seq = self.interaction_seq;

        // Capturing
        let frame = self.decode_frame(frame_uri)?;
        tracing::debug!(seq, frame_bytes = frame.bytes.len(), "frame accepted");

        // AwaitingRecognition — the only suspension point. On timeout the
        // in-flight future is dropped, discarding any late result.
        let roster = self.session.directory().list();
        let reply = match tokio::time::timeout(
            self.recognize_timeout,
            self.recognizer.recognize(&frame, roster),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(seq, "recognition timed out; discarding interaction");
                return Err(EngineError::RecognitionTimeout(
                    self.recognize_timeout.as_secs(),
                ));
            }
        };

        // Reconciling
        let outcome = self.session.reconcile(reply);
        if newly_checked_in(&outcome) {
            self.store.save_log(self.session.ledger().events()).await?;
        }
        tracing::info!(seq, outcome = outcome_kind(&outcome), "kiosk interaction complete");
        Ok(outcome)
    }

    async fn handle_enroll(&mut self, name: &str, image_uri: &str) -> Result<RosterEntry, EngineError> {
        let image = self.decode_frame(image_uri)?;
        let entry = {
            let identity = self.session.enroll(name, image)?;
            RosterEntry {
                id: identity.id.clone(),
                name: identity.name.clone(),
                image: identity.image.data_uri(),
                checked_in_today: false,
            }
        };
        self.store.save_roster(self.session.directory().list()).await?;
        Ok(entry)
    }

    async fn handle_remove(&mut self, id: &str) -> Result<bool, EngineError> {
        let removed = self.session.remove_identity(id);
        if removed {
            // Historical check-in events stay in the log untouched.
            self.store.save_roster(self.session.directory().list()).await?;
        }
        Ok(removed)
    }

    async fn handle_manual_check_in(&mut self, id: &str) -> Result<MatchOutcome, EngineError> {
        match self.session.mark_attendance(id) {
            Ok(event) => {
                self.store.save_log(self.session.ledger().events()).await?;
                Ok(MatchOutcome {
                    identity_id: event.identity_id,
                    name: event.name,
                    status: CheckInStatus::CheckedIn,
                })
            }
            Err(CheckInError::AlreadyCheckedIn(already)) => Ok(MatchOutcome {
                identity_id: id.to_string(),
                name: already.name,
                status: CheckInStatus::AlreadyCheckedIn,
            }),
            Err(CheckInError::IdentityNotFound(_)) => Ok(MatchOutcome {
                identity_id: id.to_string(),
                name: String::new(),
                status: CheckInStatus::NotFound,
            }),
        }
    }

    async fn handle_clear_log(&mut self) -> Result<(), EngineError> {
        self.session.clear_log();
        self.store.save_log(self.session.ledger().events()).await?;
        Ok(())
    }

    fn roster_entries(&self, today: NaiveDate) -> Vec<RosterEntry> {
        self.session
            .directory()
            .list()
            .iter()
            .map(|identity| RosterEntry {
                id: identity.id.clone(),
                name: identity.name.clone(),
                image: identity.image.data_uri(),
                checked_in_today: self.session.ledger().has_checked_in(&identity.id, today),
            })
            .collect()
    }

    fn log_entries(&self, now: DateTime<Local>) -> Vec<LogEntry> {
        self.session
            .todays_log(now)
            .into_iter()
            .map(|event| {
                let image = self
                    .session
                    .directory()
                    .get(&event.identity_id)
                    .map(|identity| identity.image.data_uri());
                LogEntry {
                    identity_id: event.identity_id,
                    name: event.name,
                    checked_in_at: event.checked_in_at,
                    image,
                }
            })
            .collect()
    }

    fn status_report(&self, now: DateTime<Local>) -> StatusReport {
        StatusReport {
            version: env!("CARGO_PKG_VERSION"),
            enrolled: self.session.directory().len(),
            checked_in_today: self.session.todays_log(now).len(),
            model: self.model.clone(),
        }
    }
}

fn newly_checked_in(outcome: &KioskOutcome) -> bool {
    match outcome {
        KioskOutcome::Reconciled { outcomes } => outcomes
            .iter()
            .any(|o| o.status == CheckInStatus::CheckedIn),
        KioskOutcome::NoMatch { .. } => false,
    }
}

fn outcome_kind(outcome: &KioskOutcome) -> &'static str {
    match outcome {
        KioskOutcome::Reconciled { .. } => "reconciled",
        KioskOutcome::NoMatch { .. } => "no_match",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facecheck_core::{Identity, RecognitionReply, RecognizedMatch};
    use std::sync::Mutex;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

    fn frame_uri() -> String {
        ImageData::new("image/png", PNG_MAGIC.to_vec()).data_uri()
    }

    /// Recognizer returning scripted replies, newest last.
    struct Scripted {
        replies: Mutex<Vec<Result<RecognitionReply, RecognizeError>>>,
    }

    impl Scripted {
        fn with(reply: RecognitionReply) -> Self {
            Self {
                replies: Mutex::new(vec![Ok(reply)]),
            }
        }
    }

    impl Recognize for Scripted {
        async fn recognize(
            &self,
            _frame: &ImageData,
            _roster: &[Identity],
        ) -> Result<RecognitionReply, RecognizeError> {
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok(RecognitionReply::default()))
        }
    }

    /// Recognizer that never answers in time.
    struct Slow;

    impl Recognize for Slow {
        async fn recognize(
            &self,
            _frame: &ImageData,
            _roster: &[Identity],
        ) -> Result<RecognitionReply, RecognizeError> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(RecognitionReply::default())
        }
    }

    fn session_with_alice() -> (Session, String) {
        let mut session = Session::default();
        let id = session
            .enroll("Alice", ImageData::new("image/png", PNG_MAGIC.to_vec()))
            .unwrap()
            .id
            .clone();
        (session, id)
    }

    async fn engine_with<R: Recognize>(session: Session, recognizer: R) -> Engine<R> {
        Engine {
            session,
            store: StateStore::open_in_memory().await.unwrap(),
            recognizer,
            recognize_timeout: Duration::from_secs(5),
            max_image_bytes: 8 * 1024 * 1024,
            model: "test-model".into(),
            interaction_seq: 0,
        }
    }

    fn claimed(id: &str) -> RecognizedMatch {
        RecognizedMatch {
            identity_id: id.into(),
            name: "Alice".into(),
        }
    }

    #[tokio::test]
    async fn check_in_records_match_and_persists() {
        let (session, alice) = session_with_alice();
        let reply = RecognitionReply {
            matches: vec![claimed(&alice)],
            reason: None,
        };
        let mut engine = engine_with(session, Scripted::with(reply)).await;

        let outcome = engine.handle_check_in(&frame_uri()).await.unwrap();
        let KioskOutcome::Reconciled { outcomes } = outcome else {
            panic!("expected Reconciled");
        };
        assert_eq!(outcomes[0].status, CheckInStatus::CheckedIn);

        // The log record was rewritten.
        let persisted = engine.store.load_log().await.unwrap();
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].identity_id, alice);
    }

    #[tokio::test]
    async fn no_match_is_not_an_error_and_mutates_nothing() {
        let (session, _) = session_with_alice();
        let mut engine = engine_with(
            session,
            Scripted::with(RecognitionReply::no_match("No face detected")),
        )
        .await;

        let outcome = engine.handle_check_in(&frame_uri()).await.unwrap();
        assert!(matches!(outcome, KioskOutcome::NoMatch { .. }));
        assert!(engine.session.ledger().is_empty());
        assert!(engine.store.load_log().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn garbage_frame_is_a_capture_failure() {
        let (session, _) = session_with_alice();
        let mut engine = engine_with(session, Scripted::with(RecognitionReply::default())).await;

        let err = engine.handle_check_in("not a data uri").await.unwrap_err();
        assert!(matches!(err, EngineError::Capture(_)));

        // Valid data URI, but not an image.
        let text = ImageData::new("text/plain", b"hello".to_vec()).data_uri();
        let err = engine.handle_check_in(&text).await.unwrap_err();
        assert!(matches!(err, EngineError::Capture(_)));
        assert!(engine.session.ledger().is_empty());
    }

    #[tokio::test]
    async fn slow_recognition_times_out() {
        let (session, _) = session_with_alice();
        let mut engine = engine_with(session, Slow).await;
        engine.recognize_timeout = Duration::from_millis(10);

        let err = engine.handle_check_in(&frame_uri()).await.unwrap_err();
        assert!(matches!(err, EngineError::RecognitionTimeout(_)));
        assert!(engine.session.ledger().is_empty());
    }

    #[tokio::test]
    async fn second_kiosk_trigger_is_rejected_while_busy() {
        let (session, _) = session_with_alice();
        let store = StateStore::open_in_memory().await.unwrap();
        let handle = spawn_engine(
            session,
            store,
            Slow,
            Duration::from_secs(5),
            8 * 1024 * 1024,
            "test-model".into(),
        );

        let (first, second) = tokio::join!(
            handle.check_in(frame_uri()),
            handle.check_in(frame_uri()),
        );
        assert!(first.is_ok());
        assert!(matches!(second, Err(EngineError::Busy)));

        // Once the first interaction settles, the trigger is live again.
        assert!(handle.check_in(frame_uri()).await.is_ok());
    }

    #[tokio::test]
    async fn manual_check_in_reports_each_status() {
        let (session, alice) = session_with_alice();
        let mut engine = engine_with(session, Scripted::with(RecognitionReply::default())).await;

        let first = engine.handle_manual_check_in(&alice).await.unwrap();
        assert_eq!(first.status, CheckInStatus::CheckedIn);

        let second = engine.handle_manual_check_in(&alice).await.unwrap();
        assert_eq!(second.status, CheckInStatus::AlreadyCheckedIn);
        assert_eq!(second.name, "Alice");

        let ghost = engine.handle_manual_check_in("ghost").await.unwrap();
        assert_eq!(ghost.status, CheckInStatus::NotFound);
    }

    #[tokio::test]
    async fn enroll_persists_and_roster_flags_follow_check_ins() {
        let mut engine =
            engine_with(Session::default(), Scripted::with(RecognitionReply::default())).await;

        let entry = engine.handle_enroll("Bob", &frame_uri()).await.unwrap();
        assert!(!entry.checked_in_today);
        assert_eq!(engine.store.load_roster().await.unwrap().len(), 1);

        engine.handle_manual_check_in(&entry.id).await.unwrap();
        let roster = engine.roster_entries(Local::now().date_naive());
        assert!(roster[0].checked_in_today);
    }

    #[tokio::test]
    async fn enroll_rejects_blank_name() {
        let mut engine =
            engine_with(Session::default(), Scripted::with(RecognitionReply::default())).await;
        let err = engine.handle_enroll("   ", &frame_uri()).await.unwrap_err();
        assert!(matches!(err, EngineError::Enroll(EnrollError::EmptyName)));
    }

    #[tokio::test]
    async fn clear_log_rewrites_the_record() {
        let (session, alice) = session_with_alice();
        let mut engine = engine_with(session, Scripted::with(RecognitionReply::default())).await;
        engine.handle_manual_check_in(&alice).await.unwrap();

        engine.handle_clear_log().await.unwrap();
        assert!(engine.session.ledger().is_empty());
        assert!(engine.store.load_log().await.unwrap().is_empty());
        assert_eq!(engine.session.directory().len(), 1);
    }

    #[tokio::test]
    async fn removing_identity_keeps_log_entries() {
        let (session, alice) = session_with_alice();
        let mut engine = engine_with(session, Scripted::with(RecognitionReply::default())).await;
        engine.handle_manual_check_in(&alice).await.unwrap();

        assert!(engine.handle_remove(&alice).await.unwrap());
        let log = engine.log_entries(Local::now());
        assert_eq!(log.len(), 1);
        // Roster photo is gone, the denormalized name remains.
        assert!(log[0].image.is_none());
        assert_eq!(log[0].name, "Alice");
    }
}
