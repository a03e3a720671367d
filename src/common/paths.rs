use std::path::PathBuf;

pub fn system_config_file() -> PathBuf {
    PathBuf::from("/etc/face-login/face-login.toml")
}

pub fn system_models_dir() -> PathBuf {
    PathBuf::from("/usr/share/face-login/models")
}
