pub mod detector;
pub mod liveness;
pub(crate) mod onnx;
pub mod orchestrator;
pub mod pipeline;
pub mod recognizer;
pub mod status;

pub use detector::{FaceBox, FaceDetector};
pub use liveness::{LivenessDetector, LivenessSettings, LivenessVerdict};
pub use orchestrator::{Completion, Orchestrator, OrchestratorSettings, Reply, Request, SessionState, Ticket};
pub use pipeline::{DescriptorPipeline, Extraction, OnnxPipeline};
pub use recognizer::{Descriptor, FaceRecognizer};
pub use status::StatusMessage;
