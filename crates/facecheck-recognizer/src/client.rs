//! HTTP client for the `generateContent` recognition endpoint.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use facecheck_core::{Identity, ImageData, RecognitionReply};
use serde_json::{json, Value};
use thiserror::Error;

use crate::{prompt, response, Recognize};

/// Canonical API base for the hosted model.
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// How much of an error body to keep for diagnostics.
const MAX_ERROR_BODY_BYTES: usize = 512;

#[derive(Error, Debug)]
pub enum RecognizeError {
    #[error("recognition request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("recognition service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed recognition reply: {0}")]
    MalformedReply(String),
}

/// Client for a Gemini-style multimodal endpoint.
///
/// One request per kiosk interaction: instruction text, the captured
/// frame, and every enrolled reference photo as inline image parts.
/// No retries — a failed call is a terminal outcome for the interaction.
pub struct GeminiRecognizer {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiRecognizer {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: base_url.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }

    fn image_part(image: &ImageData) -> Value {
        json!({
            "inlineData": {
                "mimeType": image.mime,
                "data": BASE64.encode(&image.bytes),
            }
        })
    }

    /// Build the single-turn request: instructions, captioned frame,
    /// then one captioned reference photo per enrolled user.
    fn build_request_body(&self, frame: &ImageData, roster: &[Identity]) -> Value {
        let mut parts = vec![
            json!({ "text": prompt::INSTRUCTIONS }),
            json!({ "text": prompt::FRAME_CAPTION }),
            Self::image_part(frame),
        ];
        for identity in roster {
            parts.push(json!({ "text": prompt::roster_caption(identity) }));
            parts.push(Self::image_part(&identity.image));
        }

        json!({
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": {
                "temperature": 0.0,
                "responseMimeType": "application/json",
            }
        })
    }
}

impl Recognize for GeminiRecognizer {
    async fn recognize(
        &self,
        frame: &ImageData,
        roster: &[Identity],
    ) -> Result<RecognitionReply, RecognizeError> {
        // Nothing to compare against; don't spend a model call.
        if roster.is_empty() {
            return Ok(RecognitionReply::no_match(
                "No users are enrolled in the system.",
            ));
        }

        let body = self.build_request_body(frame, roster);
        tracing::debug!(
            model = %self.model,
            roster = roster.len(),
            frame_bytes = frame.bytes.len(),
            "sending recognition request"
        );

        let resp = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let mut body = resp.text().await.unwrap_or_default();
            body.truncate(MAX_ERROR_BODY_BYTES);
            return Err(RecognizeError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let payload: Value = resp.json().await?;
        let reply = response::parse_reply(&payload)?;
        tracing::info!(
            matches = reply.matches.len(),
            reason = reply.reason.as_deref().unwrap_or(""),
            "recognition reply"
        );
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn photo(byte: u8) -> ImageData {
        ImageData::new("image/jpeg", vec![byte])
    }

    #[test]
    fn request_body_carries_frame_and_roster_images() {
        let client = GeminiRecognizer::new("key", "test-model", DEFAULT_API_BASE);
        let roster = vec![
            Identity { id: "u1".into(), name: "Alice".into(), image: photo(1) },
            Identity { id: "u2".into(), name: "Bob".into(), image: photo(2) },
        ];
        let body = client.build_request_body(&photo(0), &roster);

        let parts = body["contents"][0]["parts"].as_array().unwrap();
        // instructions + frame caption + frame + 2 * (caption + photo)
        assert_eq!(parts.len(), 7);
        let images = parts.iter().filter(|p| p.get("inlineData").is_some()).count();
        assert_eq!(images, 3);
        assert_eq!(
            body["generationConfig"]["responseMimeType"],
            "application/json"
        );
    }

    #[test]
    fn roster_captions_precede_their_photos() {
        let client = GeminiRecognizer::new("key", "test-model", DEFAULT_API_BASE);
        let roster = vec![Identity { id: "u1".into(), name: "Alice".into(), image: photo(1) }];
        let body = client.build_request_body(&photo(0), &roster);

        let parts = body["contents"][0]["parts"].as_array().unwrap();
        let caption = parts[3]["text"].as_str().unwrap();
        assert!(caption.contains("u1"));
        assert!(parts[4].get("inlineData").is_some());
    }

    #[test]
    fn endpoint_joins_base_and_model() {
        let client = GeminiRecognizer::new("key", "test-model", "https://example.test/v1beta/");
        assert_eq!(
            client.endpoint(),
            "https://example.test/v1beta/models/test-model:generateContent"
        );
    }
}
