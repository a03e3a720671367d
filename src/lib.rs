pub mod camera;
pub mod cli;
pub mod common;
pub mod core;
pub mod service;
pub mod storage;

pub use crate::camera::{Camera, Frame, FrameSource};
pub use crate::common::{Config, DevMode, FaceLoginError, Result};
pub use crate::core::{
    DescriptorPipeline, LivenessDetector, LivenessVerdict, OnnxPipeline, Orchestrator, OrchestratorSettings,
    SessionState, StatusMessage,
};
pub use crate::service::{Command, PortalClient, SessionDriver, SessionEvent};
pub use crate::storage::{CachedIdentity, IdentityStore};
