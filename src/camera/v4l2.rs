use crate::camera::{Frame, FrameSource};
use crate::common::config::CameraConfig;
use crate::common::{CaptureError, DeviceError, FaceLoginError, Result};
use image::{DynamicImage, ImageBuffer, ImageFormat, Luma, Rgb};
use std::fs;
use std::time::Duration;
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, Format, FourCC};

/// Device index that asks for auto-detection of a color capture device.
pub const AUTO_DETECT_INDEX: u32 = 999;

#[derive(Debug, Clone)]
pub struct CameraInfo {
    pub index: u32,
    pub name: String,
    pub formats: Vec<String>,
    pub can_capture: bool,
    pub has_color: bool,
}

/// V4L2 camera. Holds no device until `start`.
pub struct Camera {
    config: CameraConfig,
    handle: Option<CameraHandle>,
}

/// An open, streaming device. Dropping it stops the stream and closes the fd.
struct CameraHandle {
    index: u32,
    // Declared before `_device` so the stream is torn down first.
    stream: Stream<'static>,
    _device: Device,
    format: Format,
    warmup_remaining: u32,
}

impl Drop for CameraHandle {
    fn drop(&mut self) {
        tracing::info!("Released camera /dev/video{}", self.index);
    }
}

impl Camera {
    pub fn new(config: &CameraConfig) -> Self {
        Self {
            config: config.clone(),
            handle: None,
        }
    }

    /// List all V4L2 devices with their capture formats.
    pub fn list_all_cameras() -> Result<Vec<CameraInfo>> {
        let mut cameras = Vec::new();

        for entry in fs::read_dir("/dev")? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(index) = name
                .to_str()
                .and_then(|n| n.strip_prefix("video"))
                .and_then(|i| i.parse::<u32>().ok())
            else {
                continue;
            };

            let Ok(device) = Device::new(index as usize) else { continue };
            let Ok(caps) = device.query_caps() else { continue };

            let can_capture = caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE);
            let mut formats = Vec::new();
            let mut has_color = false;
            for fmt in device.enum_formats().unwrap_or_default() {
                let fourcc = fmt.fourcc.str().unwrap_or("UNKNOWN").to_string();
                if matches!(&fmt.fourcc.repr, b"MJPG" | b"YUYV") {
                    has_color = true;
                }
                formats.push(fourcc);
            }

            cameras.push(CameraInfo {
                index,
                name: caps.card.clone(),
                formats,
                can_capture,
                has_color,
            });
        }

        cameras.sort_by_key(|c| c.index);
        Ok(cameras)
    }

    /// First device that can capture in a color format, else device 0.
    pub fn detect_color_camera() -> Result<u32> {
        let cameras = Self::list_all_cameras()?;
        match cameras.iter().find(|c| c.can_capture && c.has_color) {
            Some(camera) => {
                tracing::info!("Selected camera: /dev/video{} ({})", camera.index, camera.name);
                Ok(camera.index)
            }
            None => {
                tracing::warn!("No color capture device detected, falling back to /dev/video0");
                Ok(0)
            }
        }
    }

    fn open(&self) -> std::result::Result<CameraHandle, DeviceError> {
        let index = if self.config.device_index == AUTO_DETECT_INDEX {
            Self::detect_color_camera().map_err(|e| DeviceError::Failed(e.to_string()))?
        } else {
            self.config.device_index
        };

        tracing::info!("Opening camera device {}...", index);
        let device = Device::new(index as usize).map_err(|e| DeviceError::from_io(index, &e))?;

        let caps = device.query_caps().map_err(|e| DeviceError::from_io(index, &e))?;
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            tracing::warn!("Device {} may not support standard video capture: {:?}", index, caps.capabilities);
        }

        let mut fmt = device.format().map_err(|e| DeviceError::from_io(index, &e))?;
        fmt.width = self.config.width;
        fmt.height = self.config.height;
        if !matches!(&fmt.fourcc.repr, b"YUYV" | b"GREY") {
            fmt.fourcc = FourCC::new(b"MJPG");
        }

        if let Err(e) = device.set_format(&fmt) {
            tracing::warn!("Could not set exact format: {}. Using device defaults.", e);
        }

        let format = device.format().map_err(|e| DeviceError::from_io(index, &e))?;
        if format.width != self.config.width || format.height != self.config.height {
            tracing::warn!(
                "Camera resolution {}x{} differs from requested {}x{}",
                format.width, format.height, self.config.width, self.config.height
            );
        }
        tracing::debug!("Camera format: {}x{} {}", format.width, format.height, format.fourcc);

        let stream = Stream::with_buffers(&device, Type::VideoCapture, 4)
            .map_err(|e| DeviceError::from_io(index, &e))?;

        Ok(CameraHandle {
            index,
            stream,
            _device: device,
            format,
            warmup_remaining: self.config.warmup_frames,
        })
    }

    /// Block through warmup and return the first usable frame.
    pub fn capture_blocking(&mut self) -> Result<Frame> {
        let delay = Duration::from_millis(self.config.warmup_delay_ms);
        loop {
            match self.capture_frame() {
                Ok(frame) => return Ok(frame),
                Err(CaptureError::NotReady) if self.is_active() => std::thread::sleep(delay),
                Err(e) => return Err(FaceLoginError::Camera(e.to_string())),
            }
        }
    }
}

impl FrameSource for Camera {
    fn start(&mut self) -> std::result::Result<(), DeviceError> {
        if self.handle.is_some() {
            return Ok(());
        }
        self.handle = Some(self.open()?);
        Ok(())
    }

    fn stop(&mut self) {
        // Dropping the handle releases the device.
        self.handle = None;
    }

    fn is_active(&self) -> bool {
        self.handle.is_some()
    }

    fn capture_frame(&mut self) -> std::result::Result<Frame, CaptureError> {
        let handle = self.handle.as_mut().ok_or(CaptureError::NotReady)?;

        let (buf, meta) = handle
            .stream
            .next()
            .map_err(|e| CaptureError::Device(e.to_string()))?;

        if handle.warmup_remaining > 0 {
            handle.warmup_remaining -= 1;
            return Err(CaptureError::NotReady);
        }

        let used = (meta.bytesused as usize).min(buf.len());
        let payload = if used > 0 { &buf[..used] } else { buf };
        let image = decode(payload, &handle.format)?;
        Ok(Frame::from_image(&image))
    }
}

fn decode(buf: &[u8], format: &Format) -> std::result::Result<DynamicImage, CaptureError> {
    let (width, height) = (format.width, format.height);
    match &format.fourcc.repr {
        b"MJPG" => image::load_from_memory_with_format(buf, ImageFormat::Jpeg)
            .map_err(|e| CaptureError::Device(format!("MJPG decode failed: {}", e))),
        b"GREY" => {
            let len = width as usize * height as usize;
            let data = buf.get(..len).ok_or_else(|| short_buffer(buf.len(), len))?;
            ImageBuffer::<Luma<u8>, _>::from_raw(width, height, data.to_vec())
                .map(DynamicImage::ImageLuma8)
                .ok_or_else(|| CaptureError::Device("Failed to create grayscale image buffer".into()))
        }
        b"YUYV" => yuyv_to_rgb(buf, width, height),
        _ => Err(CaptureError::Device(format!("Unsupported pixel format {}", format.fourcc))),
    }
}

fn short_buffer(actual: usize, expected: usize) -> CaptureError {
    CaptureError::Device(format!("Short frame: {} bytes, expected {}", actual, expected))
}

/// Packed YUYV 4:2:2 to RGB8 (BT.601).
fn yuyv_to_rgb(buf: &[u8], width: u32, height: u32) -> std::result::Result<DynamicImage, CaptureError> {
    let pixels = width as usize * height as usize;
    let expected = pixels * 2;
    let data = buf.get(..expected).ok_or_else(|| short_buffer(buf.len(), expected))?;

    let mut rgb = Vec::with_capacity(pixels * 3);
    for chunk in data.chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0] as f32, chunk[1] as f32 - 128.0, chunk[2] as f32, chunk[3] as f32 - 128.0);
        for y in [y0, y1] {
            rgb.push((y + 1.402 * v).clamp(0.0, 255.0) as u8);
            rgb.push((y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8);
            rgb.push((y + 1.772 * u).clamp(0.0, 255.0) as u8);
        }
    }

    ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, rgb)
        .map(DynamicImage::ImageRgb8)
        .ok_or_else(|| CaptureError::Device("Failed to create RGB image buffer".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yuyv_gray_pixels_decode_to_gray() {
        // Two pixels with Y=128 and neutral chroma.
        let buf = [128u8, 128, 128, 128];
        let image = yuyv_to_rgb(&buf, 2, 1).unwrap().to_rgb8();
        assert_eq!(image.get_pixel(0, 0).0, [128, 128, 128]);
        assert_eq!(image.get_pixel(1, 0).0, [128, 128, 128]);
    }

    #[test]
    fn yuyv_rejects_short_buffer() {
        assert!(matches!(yuyv_to_rgb(&[0u8; 6], 2, 2), Err(CaptureError::Device(_))));
    }

    #[test]
    fn unstarted_camera_is_not_ready_and_stop_is_idempotent() {
        let mut camera = Camera::new(&CameraConfig::default());
        assert!(!camera.is_active());
        assert_eq!(camera.capture_frame().unwrap_err(), CaptureError::NotReady);
        camera.stop();
        camera.stop();
        assert!(!camera.is_active());
    }
}
