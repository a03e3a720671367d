use std::path::PathBuf;
use std::fs;
use crate::common::error::Result;

/// Local-data mode for development: identity cache and captures go under
/// `./dev_data` instead of the system locations.
#[derive(Debug, Clone)]
pub struct DevMode {
    enabled: bool,
    base_dir: PathBuf,
}

impl DevMode {
    pub fn new(enabled: bool) -> Result<Self> {
        Self::with_base_dir(enabled, PathBuf::from("./dev_data"))
    }

    pub fn with_base_dir(enabled: bool, base_dir: PathBuf) -> Result<Self> {
        if enabled {
            for sub in ["identity", "captures", "debug"] {
                fs::create_dir_all(base_dir.join(sub))?;
            }
            tracing::info!("Development mode enabled - data will be saved to: {}", base_dir.display());
        }

        Ok(Self { enabled, base_dir })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn identity_dir(&self) -> Option<PathBuf> {
        self.enabled.then(|| self.base_dir.join("identity"))
    }

    pub fn get_capture_path(&self, prefix: &str) -> PathBuf {
        self.timestamped("captures", prefix)
    }

    pub fn get_debug_path(&self, prefix: &str) -> PathBuf {
        self.timestamped("debug", prefix)
    }

    fn timestamped(&self, sub: &str, prefix: &str) -> PathBuf {
        if self.enabled {
            let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
            self.base_dir.join(sub).join(format!("{}_{}.jpg", prefix, timestamp))
        } else {
            PathBuf::from(format!("{}.jpg", prefix))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dev_mode_routes_captures_under_base_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let dev = DevMode::with_base_dir(true, tmp.path().to_path_buf()).unwrap();

        assert!(tmp.path().join("identity").is_dir());
        assert_eq!(dev.identity_dir(), Some(tmp.path().join("identity")));

        let capture = dev.get_capture_path("test_capture");
        assert!(capture.starts_with(tmp.path().join("captures")));
        assert!(capture.to_string_lossy().ends_with(".jpg"));
    }

    #[test]
    fn disabled_mode_writes_to_working_dir() {
        let dev = DevMode::with_base_dir(false, PathBuf::from("/nonexistent")).unwrap();
        assert_eq!(dev.identity_dir(), None);
        assert_eq!(dev.get_debug_path("detection"), PathBuf::from("detection.jpg"));
    }
}
