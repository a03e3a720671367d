use thiserror::Error;

#[derive(Error, Debug)]
pub enum FaceLoginError {
    #[error("Camera error: {0}")]
    Camera(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("ORT error: {0}")]
    Ort(#[from] ort::OrtError),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, FaceLoginError>;

/// Why the camera could not be acquired.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("camera permission denied")]
    PermissionDenied,

    #[error("no camera device found")]
    NoDevice,

    #[error("camera is in use by another process")]
    Busy,

    #[error("camera failure: {0}")]
    Failed(String),
}

impl DeviceError {
    /// Map an OS error from opening or configuring `/dev/videoN`.
    pub fn from_io(index: u32, err: &std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => DeviceError::PermissionDenied,
            std::io::ErrorKind::NotFound => DeviceError::NoDevice,
            // EBUSY / ENODEV
            _ if err.raw_os_error() == Some(16) => DeviceError::Busy,
            _ if err.raw_os_error() == Some(19) => DeviceError::NoDevice,
            _ => DeviceError::Failed(format!("/dev/video{}: {}", index, err)),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// The stream is not running or has not produced a usable frame yet.
    #[error("camera not ready")]
    NotReady,

    #[error("capture failed: {0}")]
    Device(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("descriptor is empty")]
    Empty,

    #[error("descriptor has {actual} values, expected {expected}")]
    WrongLength { expected: usize, actual: usize },

    #[error("descriptor value at index {index} is not finite")]
    NonFinite { index: usize },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("could not encode snapshot: {0}")]
    Encode(String),

    #[error("photo upload failed: {0}")]
    Upload(String),

    #[error("profile update failed: {0}")]
    ProfileUpdate(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn maps_open_errors_to_device_errors() {
        let denied = io::Error::from(io::ErrorKind::PermissionDenied);
        assert_eq!(DeviceError::from_io(0, &denied), DeviceError::PermissionDenied);

        let missing = io::Error::from(io::ErrorKind::NotFound);
        assert_eq!(DeviceError::from_io(0, &missing), DeviceError::NoDevice);

        let busy = io::Error::from_raw_os_error(16);
        assert_eq!(DeviceError::from_io(2, &busy), DeviceError::Busy);

        let other = io::Error::new(io::ErrorKind::Other, "ioctl failed");
        assert!(matches!(DeviceError::from_io(3, &other), DeviceError::Failed(msg) if msg.contains("/dev/video3")));
    }
}
