#![allow(dead_code)]

use face_login::camera::{Frame, FrameSource};
use face_login::common::{CaptureError, DeviceError, FaceLoginError, Result};
use face_login::core::{DescriptorPipeline, Extraction, Orchestrator, OrchestratorSettings};
use face_login::service::{User, UserId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const SIDE: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scene {
    /// Alternating dark and bright frames.
    Moving,
    /// The same frame over and over, like a photo held to the lens.
    Still,
}

pub struct FakeCamera {
    pub scene: Scene,
    pub start_error: Option<DeviceError>,
    pub warmup: u32,
    pub active: bool,
    pub starts: u32,
    pub stops: u32,
    pub released: Arc<AtomicBool>,
    captured: u32,
}

impl FakeCamera {
    pub fn new(scene: Scene) -> Self {
        Self {
            scene,
            start_error: None,
            warmup: 0,
            active: false,
            starts: 0,
            stops: 0,
            released: Arc::new(AtomicBool::new(false)),
            captured: 0,
        }
    }

    pub fn failing(error: DeviceError) -> Self {
        Self {
            start_error: Some(error),
            ..Self::new(Scene::Moving)
        }
    }
}

impl FrameSource for FakeCamera {
    fn start(&mut self) -> std::result::Result<(), DeviceError> {
        if let Some(error) = self.start_error.clone() {
            return Err(error);
        }
        self.active = true;
        self.starts += 1;
        self.released.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) {
        if self.active {
            self.stops += 1;
        }
        self.active = false;
        self.released.store(true, Ordering::SeqCst);
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn capture_frame(&mut self) -> std::result::Result<Frame, CaptureError> {
        if !self.active {
            return Err(CaptureError::NotReady);
        }
        if self.warmup > 0 {
            self.warmup -= 1;
            return Err(CaptureError::NotReady);
        }

        self.captured += 1;
        let value = match self.scene {
            Scene::Moving if self.captured % 2 == 0 => 0,
            Scene::Moving => 200,
            Scene::Still => 100,
        };
        let data = vec![value; (SIDE * SIDE * 4) as usize];
        Frame::from_rgba(SIDE, SIDE, data).ok_or_else(|| CaptureError::Device("bad frame".into()))
    }
}

pub struct FakePipeline {
    pub faces: usize,
    pub descriptor: Vec<f32>,
    pub fail: bool,
    pub unclear: bool,
    pub counts: usize,
    pub extractions: usize,
}

impl FakePipeline {
    pub fn with_faces(faces: usize) -> Self {
        Self {
            faces,
            descriptor: vec![0.25; 128],
            fail: false,
            unclear: false,
            counts: 0,
            extractions: 0,
        }
    }

    pub fn single_face() -> Self {
        Self::with_faces(1)
    }
}

impl DescriptorPipeline for FakePipeline {
    fn count_faces(&mut self, _frame: &Frame) -> Result<usize> {
        self.counts += 1;
        if self.fail {
            return Err(FaceLoginError::Model("detector unavailable".into()));
        }
        Ok(self.faces)
    }

    fn extract(&mut self, _frame: &Frame) -> Result<Extraction> {
        self.extractions += 1;
        if self.fail {
            return Err(FaceLoginError::Model("detector unavailable".into()));
        }
        Ok(match self.faces {
            0 => Extraction::NoFace,
            1 if self.unclear => Extraction::FeaturesUnclear,
            1 => Extraction::SingleFace {
                descriptor: self.descriptor.clone(),
            },
            count => Extraction::MultipleFaces { count },
        })
    }
}

pub fn orchestrator(camera: FakeCamera, pipeline: FakePipeline, now: Instant) -> Orchestrator<FakeCamera, FakePipeline> {
    Orchestrator::new(camera, pipeline, OrchestratorSettings::default(), now)
}

pub fn at(start: Instant, millis: u64) -> Instant {
    start + Duration::from_millis(millis)
}

pub fn user_from_table(table: &str) -> User {
    User {
        id: Some(UserId::Number(7)),
        email: Some("maria@example.com".to_string()),
        role: None,
        table: Some(table.to_string()),
        extra: Default::default(),
    }
}
