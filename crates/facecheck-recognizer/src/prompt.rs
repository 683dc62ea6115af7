//! Prompt construction for the recognition request.

use facecheck_core::Identity;

/// Instruction text sent ahead of the images. The model must reply with
/// JSON only; [`crate::response`] parses exactly this shape.
pub const INSTRUCTIONS: &str = "\
You are an advanced facial recognition system. Your task is to identify every \
person visible in a webcam image by comparing it against the reference photos \
of enrolled users provided after it. Report ALL enrolled users you can \
confidently match to a face in the webcam image.

Respond with JSON only, in exactly this shape:
{\"matches\": [{\"userId\": \"<id>\", \"name\": \"<name>\"}], \"reason\": \"<string, optional>\"}

- Include one entry in \"matches\" for each enrolled user you confidently recognize.
- If no enrolled user matches, return an empty \"matches\" array and set \"reason\" to \"No matching user\".
- If you cannot detect a clear face in the webcam image, return an empty \"matches\" array and set \"reason\" to \"No face detected\".";

/// Caption preceding the captured webcam frame.
pub const FRAME_CAPTION: &str = "Webcam image:";

/// Caption preceding one enrolled user's reference photo.
pub fn roster_caption(identity: &Identity) -> String {
    format!(
        "Enrolled user - ID: {}, Name: {}. Reference photo:",
        identity.id, identity.name
    )
}
