use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use crate::common::error::{FaceLoginError, Result};
use crate::common::paths::system_models_dir;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub camera: CameraConfig,
    pub models: ModelConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub recognizer: RecognizerConfig,
    #[serde(default)]
    pub liveness: LivenessConfig,
    #[serde(default)]
    pub session: SessionConfig,
    pub server: ServerConfig,
    pub upload: UploadConfig,
    #[serde(default)]
    pub roles: RolesConfig,
    #[serde(default)]
    pub performance: PerformanceConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CameraConfig {
    /// 999 picks the first color capture device.
    #[serde(default)]
    pub device_index: u32,
    #[serde(default = "default_camera_width")]
    pub width: u32,
    #[serde(default = "default_camera_height")]
    pub height: u32,
    #[serde(default = "default_warmup_frames")]
    pub warmup_frames: u32,
    #[serde(default = "default_warmup_delay")]
    pub warmup_delay_ms: u64,
}

fn default_camera_width() -> u32 { 480 }
fn default_camera_height() -> u32 { 360 }
fn default_warmup_frames() -> u32 { 3 }
fn default_warmup_delay() -> u64 { 50 }

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            width: default_camera_width(),
            height: default_camera_height(),
            warmup_frames: default_warmup_frames(),
            warmup_delay_ms: default_warmup_delay(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ModelConfig {
    pub detector_path: PathBuf,
    pub recognizer_path: PathBuf,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DetectorConfig {
    #[serde(default = "default_detector_input")]
    pub input_width: u32,
    #[serde(default = "default_detector_input")]
    pub input_height: u32,
    #[serde(default = "default_detection_confidence")]
    pub detection_confidence: f32,
}

fn default_detector_input() -> u32 { 160 }
fn default_detection_confidence() -> f32 { 0.4 }

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            input_width: default_detector_input(),
            input_height: default_detector_input(),
            detection_confidence: default_detection_confidence(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RecognizerConfig {
    #[serde(default = "default_recognizer_input")]
    pub input_size: u32,
    #[serde(default = "default_normalization")]
    pub normalization_value: f32,
    #[serde(default = "default_descriptor_length")]
    pub descriptor_length: usize,
}

fn default_recognizer_input() -> u32 { 150 }
fn default_normalization() -> f32 { 127.5 }
fn default_descriptor_length() -> usize { 128 }

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            input_size: default_recognizer_input(),
            normalization_value: default_normalization(),
            descriptor_length: default_descriptor_length(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LivenessConfig {
    #[serde(default = "default_window_capacity")]
    pub window_capacity: usize,
    #[serde(default = "default_sample_stride")]
    pub sample_stride: usize,
    #[serde(default = "default_static_threshold")]
    pub static_threshold: f32,
    #[serde(default = "default_static_run_limit")]
    pub static_run_limit: u32,
    #[serde(default = "default_inactivity_timeout")]
    pub inactivity_timeout_ms: u64,
}

fn default_window_capacity() -> usize { 5 }
fn default_sample_stride() -> usize { 16 }
fn default_static_threshold() -> f32 { 2.0 }
fn default_static_run_limit() -> u32 { 15 }
fn default_inactivity_timeout() -> u64 { 3000 }

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            window_capacity: default_window_capacity(),
            sample_stride: default_sample_stride(),
            static_threshold: default_static_threshold(),
            static_run_limit: default_static_run_limit(),
            inactivity_timeout_ms: default_inactivity_timeout(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionConfig {
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    /// Run the face-presence hint on every Nth capture tick.
    #[serde(default = "default_presence_check_every")]
    pub presence_check_every: u32,
}

fn default_tick_interval() -> u64 { 30 }
fn default_presence_check_every() -> u32 { 3 }

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval(),
            presence_check_every: default_presence_check_every(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    pub api_base_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout() -> u64 { 30 }

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UploadConfig {
    pub upload_url: String,
    pub upload_preset: String,
    #[serde(default = "default_folder_prefix")]
    pub folder_prefix: String,
}

fn default_folder_prefix() -> String { "soloparent".to_string() }

/// Role assigned when the verifier returns a user without one, keyed by the
/// `table` the user record came from.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RolesConfig {
    #[serde(default = "default_role_fallback")]
    pub fallback: BTreeMap<String, String>,
    #[serde(default = "default_role")]
    pub default_role: String,
}

fn default_role_fallback() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("admin".to_string(), "admin".to_string()),
        ("superadmin".to_string(), "superadmin".to_string()),
    ])
}

fn default_role() -> String { "user".to_string() }

impl Default for RolesConfig {
    fn default() -> Self {
        Self {
            fallback: default_role_fallback(),
            default_role: default_role(),
        }
    }
}

impl RolesConfig {
    pub fn role_for_table(&self, table: Option<&str>) -> &str {
        table
            .and_then(|t| self.fallback.get(t))
            .map(String::as_str)
            .unwrap_or(&self.default_role)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PerformanceConfig {
    #[serde(default = "default_optimization_level")]
    pub optimization_level: u32,
}

fn default_optimization_level() -> u32 { 3 }

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self { optimization_level: default_optimization_level() }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from_path(Path::new("configs/face-login.toml"))
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(FaceLoginError::Config(format!(
                "Config file not found: {}. Please create it from the example.", path.display()
            )));
        }

        tracing::info!("Loading config from: {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml(&contents)?;
        config.resolve_model_paths(path.parent().unwrap_or(Path::new(".")));
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)
            .map_err(|e| FaceLoginError::Config(format!("Config parse error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Relative model paths are tried against the working directory, then the
    /// config file's directory, then the system models directory.
    fn resolve_model_paths(&mut self, base: &Path) {
        for path in [&mut self.models.detector_path, &mut self.models.recognizer_path] {
            if path.is_absolute() || path.exists() {
                continue;
            }
            let beside_config = base.join(&*path);
            let in_system_dir = system_models_dir().join(&*path);
            *path = if !beside_config.exists() && in_system_dir.exists() {
                in_system_dir
            } else {
                beside_config
            };
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.camera.width == 0 || self.camera.width > 4096 {
            return Err(invalid(format!("Camera width must be between 1 and 4096, got {}", self.camera.width)));
        }
        if self.camera.height == 0 || self.camera.height > 4096 {
            return Err(invalid(format!("Camera height must be between 1 and 4096, got {}", self.camera.height)));
        }

        if !(0.0..=1.0).contains(&self.detector.detection_confidence) {
            return Err(invalid(format!(
                "Detection confidence must be between 0.0 and 1.0, got {}",
                self.detector.detection_confidence
            )));
        }
        if self.detector.input_width == 0 || self.detector.input_width > 4096
            || self.detector.input_height == 0 || self.detector.input_height > 4096
        {
            return Err(invalid(format!(
                "Detector input must be between 1 and 4096 per side, got {}x{}",
                self.detector.input_width, self.detector.input_height
            )));
        }

        if self.recognizer.input_size == 0 || self.recognizer.input_size > 1024 {
            return Err(invalid(format!(
                "Recognizer input size must be between 1 and 1024, got {}", self.recognizer.input_size
            )));
        }
        if self.recognizer.descriptor_length == 0 || self.recognizer.descriptor_length > 4096 {
            return Err(invalid(format!(
                "Descriptor length must be between 1 and 4096, got {}", self.recognizer.descriptor_length
            )));
        }

        if self.liveness.window_capacity < 2 {
            return Err(invalid(format!(
                "Liveness window needs room for at least 2 frames, got {}", self.liveness.window_capacity
            )));
        }
        if self.liveness.sample_stride < 4 || self.liveness.sample_stride % 4 != 0 {
            return Err(invalid(format!(
                "Sample stride must be a positive multiple of 4 bytes, got {}", self.liveness.sample_stride
            )));
        }
        if !self.liveness.static_threshold.is_finite() || self.liveness.static_threshold <= 0.0 {
            return Err(invalid(format!(
                "Static threshold must be positive, got {}", self.liveness.static_threshold
            )));
        }
        if self.liveness.inactivity_timeout_ms == 0 {
            return Err(invalid("Inactivity timeout must be positive".to_string()));
        }

        if self.session.tick_interval_ms < 5 || self.session.tick_interval_ms > 1000 {
            return Err(invalid(format!(
                "Tick interval must be between 5 and 1000 ms, got {}", self.session.tick_interval_ms
            )));
        }
        if self.session.presence_check_every == 0 {
            return Err(invalid("presence_check_every must be at least 1".to_string()));
        }

        if self.server.api_base_url.trim().is_empty() {
            return Err(invalid("server.api_base_url must be set".to_string()));
        }
        if self.server.request_timeout_secs < 1 || self.server.request_timeout_secs > 120 {
            return Err(invalid(format!(
                "Request timeout must be between 1 and 120 seconds, got {}", self.server.request_timeout_secs
            )));
        }
        if self.upload.upload_url.trim().is_empty() || self.upload.upload_preset.trim().is_empty() {
            return Err(invalid("upload.upload_url and upload.upload_preset must be set".to_string()));
        }

        Ok(())
    }
}

fn invalid(message: String) -> FaceLoginError {
    FaceLoginError::Config(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [models]
        detector_path = "models/face_detector.onnx"
        recognizer_path = "models/face_descriptor.onnx"

        [server]
        api_base_url = "http://localhost:8081"

        [upload]
        upload_url = "https://media.example.org/v1_1/demo/image/upload"
        upload_preset = "soloparent"
    "#;

    #[test]
    fn minimal_config_uses_liveness_defaults() {
        let config = Config::from_toml(MINIMAL).unwrap();
        assert_eq!(config.liveness.window_capacity, 5);
        assert_eq!(config.liveness.sample_stride, 16);
        assert_eq!(config.liveness.static_threshold, 2.0);
        assert_eq!(config.liveness.static_run_limit, 15);
        assert_eq!(config.liveness.inactivity_timeout_ms, 3000);
        assert_eq!(config.recognizer.descriptor_length, 128);
        assert_eq!(config.camera.width, 480);
        assert_eq!(config.session.presence_check_every, 3);
        assert_eq!(config.upload.folder_prefix, "soloparent");
    }

    #[test]
    fn shipped_example_config_is_valid() {
        let config = Config::from_toml(include_str!("../../configs/face-login.toml")).unwrap();
        assert_eq!(config.server.api_base_url, "http://localhost:8081");
    }

    #[test]
    fn rejects_out_of_range_values() {
        let bad_threshold = MINIMAL.to_string() + "\n[detector]\ndetection_confidence = 1.5\n";
        assert!(matches!(Config::from_toml(&bad_threshold), Err(FaceLoginError::Config(_))));

        let bad_stride = MINIMAL.to_string() + "\n[liveness]\nsample_stride = 6\n";
        assert!(Config::from_toml(&bad_stride).is_err());

        let tiny_window = MINIMAL.to_string() + "\n[liveness]\nwindow_capacity = 1\n";
        assert!(Config::from_toml(&tiny_window).is_err());
    }

    #[test]
    fn role_fallback_uses_table_then_default() {
        let roles = RolesConfig::default();
        assert_eq!(roles.role_for_table(Some("admin")), "admin");
        assert_eq!(roles.role_for_table(Some("superadmin")), "superadmin");
        assert_eq!(roles.role_for_table(Some("users")), "user");
        assert_eq!(roles.role_for_table(None), "user");
    }
}
