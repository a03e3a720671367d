use crate::common::{FaceLoginError, Result};
use image::{DynamicImage, ImageBuffer, ImageOutputFormat, Rgba};
use std::io::Cursor;

/// Bytes per pixel in a frame buffer (RGBA8).
pub const BYTES_PER_PIXEL: usize = 4;

/// One decoded camera image. Captured, used for one computation, dropped.
#[derive(Debug, Clone)]
pub struct Frame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Frame {
    /// Wrap an RGBA8 buffer. Returns `None` when the buffer length does not
    /// match the dimensions.
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        let expected = width as usize * height as usize * BYTES_PER_PIXEL;
        if data.len() != expected {
            return None;
        }
        Some(Self { width, height, data })
    }

    pub fn from_image(image: &DynamicImage) -> Self {
        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        Self {
            width,
            height,
            data: rgba.into_raw(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn same_dimensions(&self, other: &Frame) -> bool {
        self.width == other.width && self.height == other.height
    }

    pub fn to_image(&self) -> Result<DynamicImage> {
        let buffer = ImageBuffer::<Rgba<u8>, _>::from_raw(self.width, self.height, self.data.clone())
            .ok_or_else(|| FaceLoginError::Camera("Frame buffer does not match its dimensions".into()))?;
        Ok(DynamicImage::ImageRgba8(buffer))
    }

    /// Encode as a JPEG for upload. Alpha is dropped.
    pub fn to_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        let rgb = DynamicImage::ImageRgb8(self.to_image()?.to_rgb8());
        let mut out = Cursor::new(Vec::new());
        rgb.write_to(&mut out, ImageOutputFormat::Jpeg(quality))?;
        Ok(out.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_buffer_with_wrong_length() {
        assert!(Frame::from_rgba(4, 4, vec![0; 63]).is_none());
        assert!(Frame::from_rgba(4, 4, vec![0; 64]).is_some());
    }

    #[test]
    fn grayscale_image_is_expanded_to_rgba() {
        let gray = DynamicImage::ImageLuma8(ImageBuffer::from_pixel(3, 2, image::Luma([200u8])));
        let frame = Frame::from_image(&gray);
        assert_eq!(frame.data().len(), 3 * 2 * BYTES_PER_PIXEL);
        assert_eq!(&frame.data()[..4], &[200, 200, 200, 255]);
    }

    #[test]
    fn encodes_snapshot_as_jpeg() {
        let frame = Frame::from_rgba(8, 8, vec![128; 8 * 8 * 4]).unwrap();
        let jpeg = frame.to_jpeg(85).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }
}
