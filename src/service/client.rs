use crate::camera::Frame;
use crate::common::config::{ServerConfig, UploadConfig};
use crate::common::{Config, RegistrationError, Result};
use crate::core::recognizer::Descriptor;
use crate::service::protocol::{
    profile_update_result, upload_result, AuthOutcome, AuthenticateRequest, ProfilePhotoUpdate, UserId,
    AUTHENTICATE_PATH, UPDATE_PROFILE_PATH,
};
use reqwest::multipart::{Form, Part};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

const SNAPSHOT_FILE_NAME: &str = "face_recognition.jpg";
const SNAPSHOT_JPEG_QUALITY: u8 = 90;

/// Matches a descriptor against the enrolled users.
pub trait RemoteVerifier: Send + Sync + 'static {
    fn authenticate(&self, descriptor: Descriptor) -> BoxFuture<AuthOutcome>;
}

/// Stores a face photo and links it to the user's profile. Resolves to the
/// stored photo URL.
pub trait FaceRegistrar: Send + Sync + 'static {
    fn register(&self, user_id: UserId, snapshot: Frame) -> BoxFuture<std::result::Result<String, RegistrationError>>;
}

/// HTTP client for the portal backend and its image host.
#[derive(Clone)]
pub struct PortalClient {
    http: reqwest::Client,
    api_base: String,
    upload: UploadConfig,
}

impl PortalClient {
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_settings(&config.server, &config.upload)
    }

    pub fn with_settings(server: &ServerConfig, upload: &UploadConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(server.request_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            api_base: server.api_base_url.trim_end_matches('/').to_string(),
            upload: upload.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    /// POST the descriptor. Never fails; network trouble is reported as
    /// `AuthOutcome::TransportError`.
    pub async fn authenticate_descriptor(&self, descriptor: &Descriptor) -> AuthOutcome {
        let response = match self
            .http
            .post(self.url(AUTHENTICATE_PATH))
            .json(&AuthenticateRequest { descriptor })
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return AuthOutcome::TransportError(e.to_string()),
        };

        let status = response.status().as_u16();
        match response.text().await {
            Ok(body) => {
                tracing::debug!("Authenticate response {}: {} bytes", status, body.len());
                AuthOutcome::from_response(status, &body)
            }
            Err(e) => AuthOutcome::TransportError(e.to_string()),
        }
    }

    /// Upload the snapshot, then point the user's profile at it.
    pub async fn register_snapshot(&self, user_id: &UserId, snapshot: &Frame) -> std::result::Result<String, RegistrationError> {
        let jpeg = snapshot
            .to_jpeg(SNAPSHOT_JPEG_QUALITY)
            .map_err(|e| RegistrationError::Encode(e.to_string()))?;

        let photo_url = self.upload_photo(user_id, jpeg).await?;
        self.update_profile(user_id, &photo_url).await?;
        Ok(photo_url)
    }

    async fn upload_photo(&self, user_id: &UserId, jpeg: Vec<u8>) -> std::result::Result<String, RegistrationError> {
        let part = Part::bytes(jpeg)
            .file_name(SNAPSHOT_FILE_NAME)
            .mime_str("image/jpeg")
            .map_err(|e| RegistrationError::Upload(e.to_string()))?;

        let form = Form::new()
            .part("file", part)
            .text("upload_preset", self.upload.upload_preset.clone())
            .text("folder", self.upload_folder(user_id));

        let response = self
            .http
            .post(&self.upload.upload_url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| RegistrationError::Upload(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| RegistrationError::Upload(e.to_string()))?;
        upload_result(status, &body)
    }

    async fn update_profile(&self, user_id: &UserId, photo_url: &str) -> std::result::Result<(), RegistrationError> {
        let response = self
            .http
            .post(self.url(UPDATE_PROFILE_PATH))
            .json(&ProfilePhotoUpdate {
                user_id,
                face_recognition_photo: photo_url,
            })
            .send()
            .await
            .map_err(|e| RegistrationError::ProfileUpdate(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| RegistrationError::ProfileUpdate(e.to_string()))?;
        profile_update_result(status, &body)
    }

    pub fn upload_folder(&self, user_id: &UserId) -> String {
        format!("{}/users/{}/face_recognition", self.upload.folder_prefix, user_id)
    }
}

impl RemoteVerifier for PortalClient {
    fn authenticate(&self, descriptor: Descriptor) -> BoxFuture<AuthOutcome> {
        let client = self.clone();
        Box::pin(async move { client.authenticate_descriptor(&descriptor).await })
    }
}

impl FaceRegistrar for PortalClient {
    fn register(&self, user_id: UserId, snapshot: Frame) -> BoxFuture<std::result::Result<String, RegistrationError>> {
        let client = self.clone();
        Box::pin(async move { client.register_snapshot(&user_id, &snapshot).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload() -> UploadConfig {
        UploadConfig {
            upload_url: "http://127.0.0.1:9/upload".to_string(),
            upload_preset: "preset".to_string(),
            folder_prefix: "soloparent".to_string(),
        }
    }

    fn client() -> PortalClient {
        let server = ServerConfig {
            api_base_url: "http://localhost:8081/".to_string(),
            request_timeout_secs: 5,
        };
        PortalClient::with_settings(&server, &upload()).unwrap()
    }

    #[test]
    fn builds_urls_without_double_slash() {
        assert_eq!(client().url(AUTHENTICATE_PATH), "http://localhost:8081/api/authenticate-face");
    }

    #[test]
    fn upload_folder_is_per_user() {
        assert_eq!(
            client().upload_folder(&UserId::Number(12)),
            "soloparent/users/12/face_recognition"
        );
    }

    #[tokio::test]
    async fn unreachable_server_is_a_transport_error() {
        let server = ServerConfig {
            api_base_url: "http://127.0.0.1:9".to_string(),
            request_timeout_secs: 2,
        };
        let client = PortalClient::with_settings(&server, &upload()).unwrap();
        let descriptor = Descriptor::new(vec![0.1; 128], 128).unwrap();
        assert!(matches!(
            client.authenticate_descriptor(&descriptor).await,
            AuthOutcome::TransportError(_)
        ));
    }
}
