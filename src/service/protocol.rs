use crate::common::config::RolesConfig;
use crate::common::RegistrationError;
use crate::core::recognizer::Descriptor;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const AUTHENTICATE_PATH: &str = "/api/authenticate-face";
pub const UPDATE_PROFILE_PATH: &str = "/updateUserProfile";

/// User ids come back as numbers or strings depending on the backing table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserId {
    Number(i64),
    Text(String),
}

impl UserId {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().parse::<i64>() {
            Ok(n) => UserId::Number(n),
            Err(_) => UserId::Text(raw.trim().to_string()),
        }
    }

    /// Zero and empty ids name no account.
    pub fn is_blank(&self) -> bool {
        match self {
            UserId::Number(n) => *n == 0,
            UserId::Text(s) => s.trim().is_empty(),
        }
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserId::Number(n) => write!(f, "{}", n),
            UserId::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Which account table the record came from (`admin`, `superadmin`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl User {
    /// Fill in `role` from the table fallback when the server omitted it.
    pub fn resolve_role(&mut self, roles: &RolesConfig) -> &str {
        let role = match self.role.take().filter(|r| !r.is_empty()) {
            Some(role) => role,
            None => roles.role_for_table(self.table.as_deref()).to_string(),
        };
        self.role.insert(role).as_str()
    }
}

/// Portal route a role lands on after login.
pub fn landing_path(role: &str) -> &'static str {
    match role {
        "admin" => "/admin-dashboard",
        "superadmin" => "/superadmin/sdashboard",
        _ => "/user",
    }
}

#[derive(Debug, Serialize)]
pub struct AuthenticateRequest<'a> {
    pub descriptor: &'a Descriptor,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthenticateReply {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    user: Option<User>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    is_pending_status: Option<bool>,
    #[serde(default)]
    user_status: Option<String>,
    #[serde(default)]
    user_id: Option<UserId>,
}

/// Result of one remote authentication call.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthOutcome {
    Matched(User),
    NeedsRegistration(UserId),
    PendingReview,
    Rejected(Option<String>),
    TransportError(String),
}

impl AuthOutcome {
    /// Classify an HTTP status and body from the authenticate endpoint.
    pub fn from_response(status: u16, body: &str) -> Self {
        let reply: AuthenticateReply = match serde_json::from_str(body) {
            Ok(reply) => reply,
            Err(e) => return AuthOutcome::TransportError(format!("unparseable response ({}): {}", status, e)),
        };

        if status == 403 && reply.is_pending_status == Some(true) {
            return match (reply.user_status.as_deref(), reply.user_id) {
                (Some("created"), Some(user_id)) if !user_id.is_blank() => AuthOutcome::NeedsRegistration(user_id),
                _ => AuthOutcome::PendingReview,
            };
        }

        if (200..300).contains(&status) && reply.success == Some(true) {
            if let Some(user) = reply.user {
                return AuthOutcome::Matched(user);
            }
        }

        AuthOutcome::Rejected(reply.error.filter(|e| !e.trim().is_empty()))
    }
}

#[derive(Debug, Deserialize)]
pub struct UploadReply {
    pub secure_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePhotoUpdate<'a> {
    pub user_id: &'a UserId,
    pub face_recognition_photo: &'a str,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProfileUpdateReply {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// Classify the image host's reply to a snapshot upload. Yields the stored URL.
pub fn upload_result(status: u16, body: &str) -> Result<String, RegistrationError> {
    if !(200..300).contains(&status) {
        return Err(RegistrationError::Upload(format!("image host returned {}", status)));
    }
    let reply: UploadReply =
        serde_json::from_str(body).map_err(|e| RegistrationError::Upload(e.to_string()))?;
    if reply.secure_url.trim().is_empty() {
        return Err(RegistrationError::Upload("image host returned no URL".into()));
    }
    Ok(reply.secure_url)
}

/// Classify the portal's reply to a profile photo update.
pub fn profile_update_result(status: u16, body: &str) -> Result<(), RegistrationError> {
    let reply: ProfileUpdateReply = serde_json::from_str(body).unwrap_or_default();
    if (200..300).contains(&status) && reply.success {
        return Ok(());
    }
    Err(RegistrationError::ProfileUpdate(
        reply
            .error
            .filter(|e| !e.trim().is_empty())
            .unwrap_or_else(|| format!("profile update returned {}", status)),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matched_user_keeps_unknown_fields() {
        let body = r#"{"success":true,"user":{"id":7,"email":"a@b.c","table":"admin","barangay":"San Isidro"}}"#;
        let AuthOutcome::Matched(user) = AuthOutcome::from_response(200, body) else {
            panic!("expected match");
        };
        assert_eq!(user.id, Some(UserId::Number(7)));
        assert_eq!(user.role, None);
        assert_eq!(user.extra.get("barangay").and_then(|v| v.as_str()), Some("San Isidro"));
    }

    #[test]
    fn created_user_needs_registration() {
        let body = r#"{"isPendingStatus":true,"userStatus":"created","userId":42}"#;
        assert_eq!(
            AuthOutcome::from_response(403, body),
            AuthOutcome::NeedsRegistration(UserId::Number(42))
        );
    }

    #[test]
    fn blank_created_user_id_is_under_review() {
        for body in [
            r#"{"isPendingStatus":true,"userStatus":"created","userId":""}"#,
            r#"{"isPendingStatus":true,"userStatus":"created","userId":"  "}"#,
            r#"{"isPendingStatus":true,"userStatus":"created","userId":0}"#,
        ] {
            assert_eq!(AuthOutcome::from_response(403, body), AuthOutcome::PendingReview, "{}", body);
        }
        assert_eq!(
            AuthOutcome::from_response(403, r#"{"isPendingStatus":true,"userStatus":"created","userId":"64af"}"#),
            AuthOutcome::NeedsRegistration(UserId::Text("64af".into()))
        );
    }

    #[test]
    fn upload_reply_yields_secure_url() {
        assert_eq!(
            upload_result(200, r#"{"secure_url":"https://img/u/42.jpg","public_id":"x"}"#),
            Ok("https://img/u/42.jpg".to_string())
        );
    }

    #[test]
    fn failed_upload_is_registration_error() {
        assert!(matches!(
            upload_result(500, r#"{"error":{"message":"boom"}}"#),
            Err(RegistrationError::Upload(_))
        ));
        assert!(matches!(upload_result(200, "not json"), Err(RegistrationError::Upload(_))));
        assert!(matches!(upload_result(200, r#"{"secure_url":""}"#), Err(RegistrationError::Upload(_))));
    }

    #[test]
    fn profile_update_requires_success_flag() {
        assert_eq!(profile_update_result(200, r#"{"success":true}"#), Ok(()));
        assert!(matches!(
            profile_update_result(200, r#"{"success":false}"#),
            Err(RegistrationError::ProfileUpdate(_))
        ));
        assert_eq!(
            profile_update_result(404, r#"{"success":false,"error":"User not found"}"#),
            Err(RegistrationError::ProfileUpdate("User not found".into()))
        );
        assert!(matches!(profile_update_result(502, "<html>"), Err(RegistrationError::ProfileUpdate(_))));
    }

    #[test]
    fn pending_without_user_is_under_review() {
        assert_eq!(AuthOutcome::from_response(403, r#"{"isPendingStatus":true}"#), AuthOutcome::PendingReview);
        assert_eq!(
            AuthOutcome::from_response(403, r#"{"isPendingStatus":true,"userStatus":"created"}"#),
            AuthOutcome::PendingReview
        );
    }

    #[test]
    fn rejections_carry_server_reason() {
        assert_eq!(
            AuthOutcome::from_response(401, r#"{"success":false,"error":"Face not recognized"}"#),
            AuthOutcome::Rejected(Some("Face not recognized".into()))
        );
        assert_eq!(AuthOutcome::from_response(200, r#"{"success":false}"#), AuthOutcome::Rejected(None));
        // success without a user is not a match
        assert_eq!(AuthOutcome::from_response(200, r#"{"success":true}"#), AuthOutcome::Rejected(None));
    }

    #[test]
    fn garbage_body_is_transport_error() {
        assert!(matches!(
            AuthOutcome::from_response(502, "<html>Bad Gateway</html>"),
            AuthOutcome::TransportError(_)
        ));
    }

    #[test]
    fn role_fallback_only_when_missing() {
        let roles = RolesConfig::default();

        let mut admin: User = serde_json::from_str(r#"{"id":1,"table":"admin"}"#).unwrap();
        assert_eq!(admin.resolve_role(&roles), "admin");

        let mut explicit: User = serde_json::from_str(r#"{"id":2,"table":"admin","role":"superadmin"}"#).unwrap();
        assert_eq!(explicit.resolve_role(&roles), "superadmin");

        let mut member: User = serde_json::from_str(r#"{"id":"u-3","table":"users"}"#).unwrap();
        assert_eq!(member.resolve_role(&roles), "user");
        assert_eq!(landing_path("user"), "/user");
        assert_eq!(landing_path("admin"), "/admin-dashboard");
    }

    #[test]
    fn user_id_parses_numbers_and_text() {
        assert_eq!(UserId::parse("42"), UserId::Number(42));
        assert_eq!(UserId::parse("64af"), UserId::Text("64af".into()));
        assert_eq!(UserId::Number(42).to_string(), "42");
    }

    #[test]
    fn profile_update_uses_camel_case() {
        let id = UserId::Number(42);
        let body = serde_json::to_value(ProfilePhotoUpdate { user_id: &id, face_recognition_photo: "https://x/y.jpg" }).unwrap();
        assert_eq!(body["userId"], 42);
        assert_eq!(body["faceRecognitionPhoto"], "https://x/y.jpg");
    }
}
