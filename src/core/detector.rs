use crate::common::{Config, FaceLoginError, Result};
use crate::common::config::DetectorConfig;
use crate::core::onnx::load_session;
use image::{imageops::FilterType, DynamicImage};
use ndarray::{Array4, CowArray};
use ort::{Environment, Session, Value};
use std::sync::Arc;

const NMS_IOU_THRESHOLD: f32 = 0.45;
const MAX_FACES: usize = 5;
const MIN_BOX_SIDE: f32 = 10.0;

#[derive(Debug, Clone, PartialEq)]
pub struct FaceBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
}

impl FaceBox {
    fn area(&self) -> f32 {
        (self.x2 - self.x1) * (self.y2 - self.y1)
    }

    fn iou(&self, other: &FaceBox) -> f32 {
        let x1 = self.x1.max(other.x1);
        let y1 = self.y1.max(other.y1);
        let x2 = self.x2.min(other.x2);
        let y2 = self.y2.min(other.y2);

        let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = self.area() + other.area() - intersection;
        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }
}

/// YOLO-style single-class face detector.
pub struct FaceDetector {
    session: Session,
    _environment: Arc<Environment>,
    config: DetectorConfig,
}

impl FaceDetector {
    pub fn new(config: &Config) -> Result<Self> {
        let (session, environment) = load_session(
            "face_detector",
            &config.models.detector_path,
            config.performance.optimization_level,
        )?;

        Ok(Self {
            session,
            _environment: environment,
            config: config.detector.clone(),
        })
    }

    /// Faces at or above the configured confidence, best first.
    pub fn detect(&self, image: &DynamicImage) -> Result<Vec<FaceBox>> {
        let mut faces = self.detect_with_threshold(image, self.config.detection_confidence)?;
        faces.truncate(MAX_FACES);
        Ok(faces)
    }

    /// Raw candidates and the filtered result, for annotated debug images.
    pub fn detect_debug(&self, image: &DynamicImage) -> Result<(Vec<FaceBox>, Vec<FaceBox>)> {
        let mut all = self.detect_with_threshold(image, 0.05)?;
        all.truncate(20);
        let filtered = all
            .iter()
            .filter(|f| f.confidence >= self.config.detection_confidence)
            .cloned()
            .collect();
        Ok((all, filtered))
    }

    fn detect_with_threshold(&self, image: &DynamicImage, min_confidence: f32) -> Result<Vec<FaceBox>> {
        let orig_width = image.width() as f32;
        let orig_height = image.height() as f32;

        let img_array = if image.width() == self.config.input_width && image.height() == self.config.input_height {
            self.image_to_array(image)
        } else {
            let resized = image.resize_exact(self.config.input_width, self.config.input_height, FilterType::Nearest);
            self.image_to_array(&resized)
        };

        let cow_array = CowArray::from(img_array.into_dyn());
        let input_tensor = Value::from_array(self.session.allocator(), &cow_array)?;
        let outputs = self.session.run(vec![input_tensor])?;

        let mut faces = self.parse_detections(&outputs)?;
        faces = apply_nms(faces, NMS_IOU_THRESHOLD);
        faces.retain(|face| face.confidence >= min_confidence);

        let scale_x = orig_width / self.config.input_width as f32;
        let scale_y = orig_height / self.config.input_height as f32;
        for face in &mut faces {
            face.x1 *= scale_x;
            face.x2 *= scale_x;
            face.y1 *= scale_y;
            face.y2 *= scale_y;
        }

        Ok(faces)
    }

    fn image_to_array(&self, img: &DynamicImage) -> Array4<f32> {
        let rgb = img.to_rgb8();
        let (width, height) = (rgb.width() as usize, rgb.height() as usize);
        let mut array = Array4::<f32>::zeros((1, 3, height, width));

        for (x, y, pixel) in rgb.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            for c in 0..3 {
                array[[0, c, y, x]] = pixel[c] as f32 / 255.0;
            }
        }

        array
    }

    fn parse_detections(&self, outputs: &[Value]) -> Result<Vec<FaceBox>> {
        let mut faces = Vec::new();
        let Some(first) = outputs.first() else {
            return Ok(faces);
        };

        let output = first.try_extract::<f32>()?.view().to_owned();
        let shape = output.shape().to_vec();
        let values = output
            .as_slice()
            .ok_or_else(|| FaceLoginError::Model("Detector output is not contiguous".into()))?;

        // [1, N, 5+] or transposed [1, 5+, N]
        let (num_predictions, prediction_length, is_transposed) = match shape.as_slice() {
            [_, a, b] if b > a && *a <= 10 => (*b, *a, true),
            [_, a, b] => (*a, *b, false),
            [a, b] => (*a, *b, false),
            _ => {
                tracing::warn!("Unexpected detector output shape: {:?}", shape);
                return Ok(faces);
            }
        };
        if prediction_length < 5 {
            tracing::warn!("Detector output has no confidence column: {:?}", shape);
            return Ok(faces);
        }

        let at = |i: usize, field: usize| {
            if is_transposed {
                values[field * num_predictions + i]
            } else {
                values[i * prediction_length + field]
            }
        };

        let (in_w, in_h) = (self.config.input_width as f32, self.config.input_height as f32);
        for i in 0..num_predictions {
            let confidence = at(i, 4);
            if confidence <= 0.001 {
                continue;
            }

            let (cx, cy, w, h) = (at(i, 0), at(i, 1), at(i, 2), at(i, 3));
            // Normalized coordinates need scaling to input pixels.
            let (sx, sy) = if cx > 1.0 || cy > 1.0 || w > 1.0 || h > 1.0 { (1.0, 1.0) } else { (in_w, in_h) };

            let x1 = (cx * sx - w * sx / 2.0).max(0.0);
            let y1 = (cy * sy - h * sy / 2.0).max(0.0);
            let x2 = (cx * sx + w * sx / 2.0).min(in_w);
            let y2 = (cy * sy + h * sy / 2.0).min(in_h);

            if x2 - x1 > MIN_BOX_SIDE && y2 - y1 > MIN_BOX_SIDE {
                faces.push(FaceBox { x1, y1, x2, y2, confidence });
            }
        }

        Ok(faces)
    }
}

/// Greedy non-maximum suppression, result sorted by confidence.
pub fn apply_nms(mut boxes: Vec<FaceBox>, iou_threshold: f32) -> Vec<FaceBox> {
    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<FaceBox> = Vec::new();
    for candidate in boxes {
        if keep.iter().all(|kept| kept.iou(&candidate) < iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}
