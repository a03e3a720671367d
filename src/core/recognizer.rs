use crate::common::config::RecognizerConfig;
use crate::common::{Config, DescriptorError, Result};
use crate::core::detector::FaceBox;
use crate::core::onnx::load_session;
use image::{imageops::FilterType, DynamicImage};
use ndarray::{Array4, CowArray};
use ort::{Environment, Session, Value};
use serde::Serialize;
use std::sync::Arc;

/// Face descriptor sent to the verifier: fixed length, every value finite.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Descriptor(Vec<f32>);

impl Descriptor {
    pub fn new(values: Vec<f32>, expected_len: usize) -> std::result::Result<Self, DescriptorError> {
        if values.is_empty() {
            return Err(DescriptorError::Empty);
        }
        if values.len() != expected_len {
            return Err(DescriptorError::WrongLength {
                expected: expected_len,
                actual: values.len(),
            });
        }
        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(DescriptorError::NonFinite { index });
        }
        Ok(Self(values))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

pub struct FaceRecognizer {
    session: Session,
    _environment: Arc<Environment>,
    config: RecognizerConfig,
}

impl FaceRecognizer {
    pub fn new(config: &Config) -> Result<Self> {
        let (session, environment) = load_session(
            "face_descriptor",
            &config.models.recognizer_path,
            config.performance.optimization_level,
        )?;

        Ok(Self {
            session,
            _environment: environment,
            config: config.recognizer.clone(),
        })
    }

    /// Raw model output for one face; validation happens at the caller.
    pub fn get_descriptor(&self, image: &DynamicImage, face: &FaceBox) -> Result<Vec<f32>> {
        let face_img = crop_face(image, face);
        let resized = face_img.resize_exact(self.config.input_size, self.config.input_size, FilterType::Triangle);

        let input_array = self.preprocess_face(&resized);
        let cow_array = CowArray::from(input_array.into_dyn());
        let input_tensor = Value::from_array(self.session.allocator(), &cow_array)?;
        let outputs = self.session.run(vec![input_tensor])?;

        let descriptor = outputs[0].try_extract::<f32>()?.view().iter().copied().collect();
        Ok(descriptor)
    }

    fn preprocess_face(&self, img: &DynamicImage) -> Array4<f32> {
        let rgb = img.to_rgb8();
        let size = self.config.input_size as usize;
        let norm = self.config.normalization_value;
        let mut array = Array4::<f32>::zeros((1, 3, size, size));

        for (x, y, pixel) in rgb.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            for c in 0..3 {
                array[[0, c, y, x]] = (pixel[c] as f32 - norm) / norm;
            }
        }

        array
    }
}

fn crop_face(image: &DynamicImage, face: &FaceBox) -> DynamicImage {
    let x = face.x1.max(0.0) as u32;
    let y = face.y1.max(0.0) as u32;
    let width = (face.x2 - face.x1).max(1.0) as u32;
    let height = (face.y2 - face.y1).max(1.0) as u32;
    image.crop_imm(x, y, width, height)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_requires_model_length_and_finite_values() {
        assert_eq!(Descriptor::new(vec![], 128), Err(DescriptorError::Empty));
        assert_eq!(
            Descriptor::new(vec![0.1; 64], 128),
            Err(DescriptorError::WrongLength { expected: 128, actual: 64 })
        );

        let mut values = vec![0.1; 128];
        values[7] = f32::NAN;
        assert_eq!(Descriptor::new(values, 128), Err(DescriptorError::NonFinite { index: 7 }));

        let ok = Descriptor::new(vec![0.25; 128], 128).unwrap();
        assert_eq!(ok.len(), 128);
    }

    #[test]
    fn descriptor_serializes_as_plain_array() {
        let descriptor = Descriptor::new(vec![0.5, -1.0], 2).unwrap();
        assert_eq!(serde_json::to_string(&descriptor).unwrap(), "[0.5,-1.0]");
    }
}
