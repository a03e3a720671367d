use crate::common::{DevMode, FaceLoginError, Result};
use crate::service::protocol::User;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

const STORAGE_VERSION: u32 = 1;
const IDENTITY_FILE: &str = "last_login.bincode";

/// Who last logged in on this machine, used to greet them on the next run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedIdentity {
    pub version: u32,
    pub email: Option<String>,
    pub user_id: Option<String>,
    pub role: Option<String>,
}

impl CachedIdentity {
    pub fn from_user(user: &User) -> Self {
        Self {
            version: STORAGE_VERSION,
            email: user.email.clone(),
            user_id: user.id.as_ref().map(|id| id.to_string()),
            role: user.role.clone(),
        }
    }
}

pub struct IdentityStore {
    data_dir: PathBuf,
}

impl IdentityStore {
    pub fn new_with_dir(data_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&data_dir)?;
        Ok(Self { data_dir })
    }

    pub fn new_with_dev_mode(dev_mode: &DevMode) -> Result<Self> {
        let data_dir = match dev_mode.identity_dir() {
            Some(dir) => dir,
            None => ProjectDirs::from("com", "facelogin", "FaceLogin")
                .ok_or_else(|| FaceLoginError::Storage("Failed to get project dirs".into()))?
                .data_dir()
                .to_path_buf(),
        };

        if dev_mode.is_enabled() {
            tracing::debug!("IdentityStore using dev directory: {:?}", data_dir);
        }
        Self::new_with_dir(data_dir)
    }

    fn identity_file(&self) -> PathBuf {
        self.data_dir.join(IDENTITY_FILE)
    }

    /// Missing or unreadable cache is not an error; the user is just not
    /// greeted.
    pub fn load(&self) -> Option<CachedIdentity> {
        let data = fs::read(self.identity_file()).ok()?;
        match bincode::deserialize::<CachedIdentity>(&data) {
            Ok(mut identity) => {
                if identity.version < STORAGE_VERSION {
                    identity.version = STORAGE_VERSION;
                }
                Some(identity)
            }
            Err(e) => {
                tracing::warn!("Ignoring corrupt identity cache: {}", e);
                None
            }
        }
    }

    pub fn save(&self, identity: &CachedIdentity) -> Result<()> {
        let encoded = bincode::serialize(identity)
            .map_err(|e| FaceLoginError::Storage(format!("Failed to serialize: {}", e)))?;
        fs::write(self.identity_file(), encoded)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::protocol::UserId;
    use tempfile::tempdir;

    fn user() -> User {
        User {
            id: Some(UserId::Number(3)),
            email: Some("ana@example.com".to_string()),
            role: Some("admin".to_string()),
            table: None,
            extra: Default::default(),
        }
    }

    #[test]
    fn saves_and_loads_last_identity() {
        let dir = tempdir().unwrap();
        let store = IdentityStore::new_with_dir(dir.path().to_path_buf()).unwrap();
        assert_eq!(store.load(), None);

        let identity = CachedIdentity::from_user(&user());
        store.save(&identity).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded.email.as_deref(), Some("ana@example.com"));
        assert_eq!(loaded.user_id.as_deref(), Some("3"));
    }

    #[test]
    fn corrupt_cache_is_ignored() {
        let dir = tempdir().unwrap();
        let store = IdentityStore::new_with_dir(dir.path().to_path_buf()).unwrap();
        fs::write(dir.path().join(IDENTITY_FILE), b"\x01").unwrap();
        assert_eq!(store.load(), None);
    }

    #[test]
    fn dev_mode_keeps_identity_local() {
        let dir = tempdir().unwrap();
        let dev_mode = DevMode::with_base_dir(true, dir.path().to_path_buf()).unwrap();
        let store = IdentityStore::new_with_dev_mode(&dev_mode).unwrap();
        store.save(&CachedIdentity::from_user(&user())).unwrap();
        assert!(dir.path().join("identity").join(IDENTITY_FILE).exists());
    }
}
