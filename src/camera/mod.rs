pub mod frame;
pub mod v4l2;

pub use frame::{Frame, BYTES_PER_PIXEL};
pub use v4l2::{Camera, CameraInfo, AUTO_DETECT_INDEX};

use crate::common::{CaptureError, DeviceError};

/// Owner of the camera device.
///
/// `start` acquires the device and keeps the stream inside the source; `stop`
/// releases it and must be safe to call any number of times. Implementations
/// also release on drop.
pub trait FrameSource {
    fn start(&mut self) -> Result<(), DeviceError>;

    fn stop(&mut self);

    fn is_active(&self) -> bool;

    /// Most recent decoded frame, or `CaptureError::NotReady` before the stream
    /// has produced a usable one.
    fn capture_frame(&mut self) -> Result<Frame, CaptureError>;
}
