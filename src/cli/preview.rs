use crate::core::detector::FaceBox;
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

const ACCEPTED: Rgb<u8> = Rgb([0, 255, 255]);

fn confidence_color(confidence: f32) -> Rgb<u8> {
    if confidence > 0.7 {
        Rgb([0, 255, 0])
    } else if confidence > 0.5 {
        Rgb([255, 255, 0])
    } else {
        Rgb([255, 0, 0])
    }
}

/// Clamp a box to the image, optionally grown by `pad` pixels. `None` for
/// degenerate boxes.
fn clamped_rect(img: &RgbImage, face: &FaceBox, pad: f32) -> Option<Rect> {
    if face.x2 <= face.x1 || face.y2 <= face.y1 {
        return None;
    }
    let x1 = (face.x1 - pad).max(0.0) as i32;
    let y1 = (face.y1 - pad).max(0.0) as i32;
    let x2 = (face.x2 + pad).min(img.width() as f32) as i32;
    let y2 = (face.y2 + pad).min(img.height() as f32) as i32;
    Some(Rect::at(x1, y1).of_size((x2 - x1).max(1) as u32, (y2 - y1).max(1) as u32))
}

/// Draw every raw detection colored by confidence, then outline the ones
/// that survived thresholding and NMS.
pub fn annotate_detections(image: &DynamicImage, candidates: &[FaceBox], accepted: &[FaceBox]) -> DynamicImage {
    let mut img = image.to_rgb8();

    for face in candidates {
        if let Some(rect) = clamped_rect(&img, face, 0.0) {
            draw_hollow_rect_mut(&mut img, rect, confidence_color(face.confidence));
        }
    }
    for face in accepted {
        if let Some(rect) = clamped_rect(&img, face, 2.0) {
            draw_hollow_rect_mut(&mut img, rect, ACCEPTED);
        }
    }

    DynamicImage::ImageRgb8(img)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepted_faces_are_outlined() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(40, 40));
        let face = FaceBox { x1: 10.0, y1: 10.0, x2: 30.0, y2: 30.0, confidence: 0.9 };
        let out = annotate_detections(&image, &[face.clone()], &[face]).to_rgb8();
        assert_eq!(*out.get_pixel(10, 10), Rgb([0, 255, 0]));
        assert_eq!(*out.get_pixel(8, 8), ACCEPTED);
    }

    #[test]
    fn degenerate_boxes_are_skipped() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(20, 20));
        let face = FaceBox { x1: 5.0, y1: 5.0, x2: 5.0, y2: 9.0, confidence: 0.9 };
        let out = annotate_detections(&image, &[face], &[]).to_rgb8();
        assert!(out.pixels().all(|p| *p == Rgb([0, 0, 0])));
    }
}
