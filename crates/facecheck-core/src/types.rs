use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Local};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ImageDataError {
    #[error("not a data URI")]
    NotADataUri,
    #[error("data URI is not base64-encoded")]
    NotBase64,
    #[error("invalid base64 payload")]
    InvalidPayload,
}

/// An image blob with its MIME type.
///
/// Serialized as a `data:<mime>;base64,<payload>` URI, which is the format
/// captured frames and enrolled reference photos travel in end to end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl ImageData {
    pub fn new(mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            mime: mime.into(),
            bytes,
        }
    }

    /// Render as a `data:` URI.
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime, BASE64.encode(&self.bytes))
    }

    /// Parse a `data:<mime>;base64,<payload>` URI.
    pub fn from_data_uri(uri: &str) -> Result<Self, ImageDataError> {
        let rest = uri.strip_prefix("data:").ok_or(ImageDataError::NotADataUri)?;
        let (header, payload) = rest.split_once(',').ok_or(ImageDataError::NotADataUri)?;
        let mime = header
            .strip_suffix(";base64")
            .ok_or(ImageDataError::NotBase64)?;
        let bytes = BASE64
            .decode(payload.trim())
            .map_err(|_| ImageDataError::InvalidPayload)?;
        let mime = if mime.is_empty() {
            "application/octet-stream"
        } else {
            mime
        };
        Ok(Self::new(mime, bytes))
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl Serialize for ImageData {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.data_uri())
    }
}

impl<'de> Deserialize<'de> for ImageData {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let uri = String::deserialize(deserializer)?;
        ImageData::from_data_uri(&uri).map_err(D::Error::custom)
    }
}

/// An enrolled person: opaque id, display name, reference photo.
///
/// Ids are assigned at enrollment and immutable. Names are not keys; two
/// identities may share a name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub name: String,
    #[serde(rename = "imageSrc")]
    pub image: ImageData,
}

/// A single check-in, never mutated after creation.
///
/// `name` is a denormalized copy so the event stays renderable after the
/// identity is removed from the roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckInEvent {
    #[serde(rename = "userId")]
    pub identity_id: String,
    pub name: String,
    #[serde(rename = "checkInTime")]
    pub checked_in_at: DateTime<Local>,
}

/// One claimed match from the recognition service. Unverified — trust is
/// delegated entirely to the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognizedMatch {
    #[serde(rename = "userId")]
    pub identity_id: String,
    #[serde(default)]
    pub name: String,
}

/// Normalized recognition service output: zero or more claimed matches,
/// with an optional reason when nothing matched (e.g. "No face detected").
#[derive(Debug, Clone, Default)]
pub struct RecognitionReply {
    pub matches: Vec<RecognizedMatch>,
    pub reason: Option<String>,
}

impl RecognitionReply {
    /// A no-match reply with the given reason.
    pub fn no_match(reason: impl Into<String>) -> Self {
        Self {
            matches: Vec::new(),
            reason: Some(reason.into()),
        }
    }
}

/// Per-match result of reconciling one recognition pass with the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckInStatus {
    CheckedIn,
    AlreadyCheckedIn,
    NotFound,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchOutcome {
    #[serde(rename = "userId")]
    pub identity_id: String,
    pub name: String,
    pub status: CheckInStatus,
}

/// Terminal result of one kiosk interaction.
///
/// `NoMatch` is a normal outcome, distinct from a recognition service
/// failure (which is surfaced as an error and never reaches the ledger).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum KioskOutcome {
    Reconciled { outcomes: Vec<MatchOutcome> },
    NoMatch { reason: Option<String> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_uri_round_trip() {
        let img = ImageData::new("image/jpeg", vec![0xff, 0xd8, 0xff, 0xe0]);
        let uri = img.data_uri();
        assert!(uri.starts_with("data:image/jpeg;base64,"));
        assert_eq!(ImageData::from_data_uri(&uri).unwrap(), img);
    }

    #[test]
    fn data_uri_rejects_plain_strings() {
        assert_eq!(
            ImageData::from_data_uri("hello"),
            Err(ImageDataError::NotADataUri)
        );
        assert_eq!(
            ImageData::from_data_uri("data:image/png,rawpayload"),
            Err(ImageDataError::NotBase64)
        );
        assert_eq!(
            ImageData::from_data_uri("data:image/png;base64,@@@"),
            Err(ImageDataError::InvalidPayload)
        );
    }

    #[test]
    fn identity_serializes_with_wire_field_names() {
        let identity = Identity {
            id: "abc".into(),
            name: "Alice".into(),
            image: ImageData::new("image/png", vec![1, 2, 3]),
        };
        let json = serde_json::to_value(&identity).unwrap();
        assert_eq!(json["id"], "abc");
        assert_eq!(json["name"], "Alice");
        assert!(json["imageSrc"].as_str().unwrap().starts_with("data:image/png"));
    }

    #[test]
    fn check_in_event_uses_user_id_key() {
        let event = CheckInEvent {
            identity_id: "u1".into(),
            name: "Bob".into(),
            checked_in_at: Local::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["userId"], "u1");
        assert!(json["checkInTime"].is_string());
    }
}
