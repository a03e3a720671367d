use crate::camera::Frame;
use crate::common::{Config, Result};
use crate::core::detector::FaceDetector;
use crate::core::recognizer::FaceRecognizer;

/// What the pipeline found in one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    NoFace,
    MultipleFaces { count: usize },
    /// One face was found but no descriptor could be computed from it.
    FeaturesUnclear,
    /// Exactly one face; the descriptor is unvalidated model output.
    SingleFace { descriptor: Vec<f32> },
}

/// Face counting and descriptor extraction.
pub trait DescriptorPipeline {
    fn count_faces(&mut self, frame: &Frame) -> Result<usize>;

    fn extract(&mut self, frame: &Frame) -> Result<Extraction>;
}

/// Detector + descriptor network running on ONNX Runtime.
pub struct OnnxPipeline {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxPipeline {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            detector: FaceDetector::new(config)?,
            recognizer: FaceRecognizer::new(config)?,
        })
    }
}

impl DescriptorPipeline for OnnxPipeline {
    fn count_faces(&mut self, frame: &Frame) -> Result<usize> {
        Ok(self.detector.detect(&frame.to_image()?)?.len())
    }

    fn extract(&mut self, frame: &Frame) -> Result<Extraction> {
        let image = frame.to_image()?;
        let faces = self.detector.detect(&image)?;
        match faces.as_slice() {
            [] => Ok(Extraction::NoFace),
            [face] => match self.recognizer.get_descriptor(&image, face) {
                Ok(descriptor) => Ok(Extraction::SingleFace { descriptor }),
                Err(e) => {
                    tracing::warn!("Descriptor extraction failed: {}", e);
                    Ok(Extraction::FeaturesUnclear)
                }
            },
            many => Ok(Extraction::MultipleFaces { count: many.len() }),
        }
    }
}
