//! facecheck-recognizer — Client for the external recognition model.
//!
//! Matching is fully delegated: the service receives the captured frame
//! plus every enrolled reference photo and replies with the identities it
//! claims to see. Claimed matches are trusted as-is; nothing is
//! re-verified locally.

pub mod client;
pub mod prompt;
pub mod response;

pub use client::{GeminiRecognizer, RecognizeError, DEFAULT_API_BASE};

use std::future::Future;

use facecheck_core::{Identity, ImageData, RecognitionReply};

/// Recognition service seam.
///
/// The daemon engine is generic over this trait so tests can script
/// replies without a network.
pub trait Recognize: Send + Sync {
    fn recognize(
        &self,
        frame: &ImageData,
        roster: &[Identity],
    ) -> impl Future<Output = Result<RecognitionReply, RecognizeError>> + Send;
}
