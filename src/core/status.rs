use crate::common::DeviceError;
use std::fmt;

/// The one user-facing line the login screen shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusMessage {
    Idle,
    Welcome(String),
    Ready,
    CameraError(DeviceError),
    CameraStopped,
    CameraWarmingUp,
    Authenticating,
    PhotoDetected,
    MoveSlightly,
    NoFace,
    MultipleFaces,
    FaceVisible,
    NoFaceData,
    FeaturesUnclear,
    DetectionFailed,
    FirstTimeLogin,
    ReadyToRegister,
    UnderReview,
    Rejected(Option<String>),
    TechnicalIssue,
    LoggedIn,
    RegisteringPhoto,
    RegistrationSaved,
    RegistrationFailed,
}

impl StatusMessage {
    /// Messages the periodic face-presence hint may overwrite.
    pub fn is_hint(&self) -> bool {
        matches!(
            self,
            StatusMessage::Ready
                | StatusMessage::Welcome(_)
                | StatusMessage::CameraWarmingUp
                | StatusMessage::NoFace
                | StatusMessage::MultipleFaces
                | StatusMessage::FaceVisible
                | StatusMessage::DetectionFailed
        )
    }
}

impl fmt::Display for StatusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusMessage::Idle => f.write_str("Start the camera to log in with your face."),
            StatusMessage::Welcome(email) => write!(f, "Welcome {}! Start the camera to log in.", email),
            StatusMessage::Ready => f.write_str("Camera ready. Look at the camera and press authenticate."),
            StatusMessage::CameraError(e) => write!(
                f,
                "Error accessing camera ({}). Please make sure you have granted camera permissions.",
                e
            ),
            StatusMessage::CameraStopped => f.write_str("Camera stopped."),
            StatusMessage::CameraWarmingUp => f.write_str("Camera is warming up. Please try again in a moment."),
            StatusMessage::Authenticating => f.write_str("Authenticating..."),
            StatusMessage::PhotoDetected => f.write_str(
                "Login using cellphone pictures is not allowed. Please use the live camera directly.",
            ),
            StatusMessage::MoveSlightly => f.write_str("Please move slightly to confirm you are using a live camera."),
            StatusMessage::NoFace => f.write_str("No face detected. Try moving closer to the camera."),
            StatusMessage::MultipleFaces => f.write_str("Multiple faces detected. Make sure only your face is visible."),
            StatusMessage::FaceVisible => f.write_str("Face detected! You can now press authenticate to log in."),
            StatusMessage::NoFaceData => f.write_str("Error: Could not extract face data. Please try again."),
            StatusMessage::FeaturesUnclear => {
                f.write_str("Face features not clear. Try adjusting your position or lighting.")
            }
            StatusMessage::DetectionFailed => f.write_str("Error detecting faces. Please try again."),
            StatusMessage::FirstTimeLogin => f.write_str("First-time login detected. Please register your face."),
            StatusMessage::ReadyToRegister => {
                f.write_str("Look at the camera and press register to save your face photo.")
            }
            StatusMessage::UnderReview => {
                f.write_str("Your application is currently being reviewed by our administrators.")
            }
            StatusMessage::Rejected(Some(reason)) => f.write_str(reason),
            StatusMessage::Rejected(None) => f.write_str(
                "Facial recognition unsuccessful. Your face could not be matched with our records. \
                 Please ensure proper lighting and positioning, or contact support if this issue persists.",
            ),
            StatusMessage::TechnicalIssue => f.write_str(
                "Authentication failed: We encountered a technical issue during facial verification. \
                 Please try again or use an alternative login method.",
            ),
            StatusMessage::LoggedIn => f.write_str("Authentication successful! Redirecting..."),
            StatusMessage::RegisteringPhoto => f.write_str("Registering face photo..."),
            StatusMessage::RegistrationSaved => f.write_str("Face photo registered successfully!"),
            StatusMessage::RegistrationFailed => f.write_str("Error registering face photo. Please try again."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_shows_server_reason_verbatim() {
        let msg = StatusMessage::Rejected(Some("Account suspended".into()));
        assert_eq!(msg.to_string(), "Account suspended");
        assert!(StatusMessage::Rejected(None).to_string().starts_with("Facial recognition unsuccessful"));
    }

    #[test]
    fn transport_and_mismatch_messages_differ() {
        let technical = StatusMessage::TechnicalIssue.to_string();
        assert!(technical.contains("technical issue"));
        assert!(!technical.contains("could not be matched"));
    }

    #[test]
    fn unclear_features_have_their_own_prompt() {
        assert_eq!(
            StatusMessage::FeaturesUnclear.to_string(),
            "Face features not clear. Try adjusting your position or lighting."
        );
        assert_ne!(StatusMessage::FeaturesUnclear.to_string(), StatusMessage::NoFaceData.to_string());
        assert!(!StatusMessage::FeaturesUnclear.is_hint());
    }

    #[test]
    fn only_hints_are_overwritable() {
        assert!(StatusMessage::FaceVisible.is_hint());
        assert!(!StatusMessage::UnderReview.is_hint());
        assert!(!StatusMessage::Rejected(None).is_hint());
    }
}
