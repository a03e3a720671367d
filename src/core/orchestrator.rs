//! Authentication state machine.
//!
//! The orchestrator owns the frame source, the liveness detector and the
//! descriptor pipeline, and decides frame by frame what the login flow does.
//! It never performs network I/O itself: `authenticate` and `register` hand
//! back a [`Request`] for the caller to execute, and the answer comes back
//! through [`Orchestrator::complete`]. Every request carries a [`Ticket`]; a
//! reply whose ticket is not the one in flight (the camera was stopped in the
//! meantime) is discarded.

use crate::camera::{Frame, FrameSource};
use crate::common::config::RolesConfig;
use crate::common::{CaptureError, Config, RegistrationError};
use crate::core::liveness::{LivenessDetector, LivenessSettings, LivenessVerdict};
use crate::core::pipeline::{DescriptorPipeline, Extraction};
use crate::core::recognizer::Descriptor;
use crate::core::status::StatusMessage;
use crate::service::protocol::{AuthOutcome, User, UserId};
use std::time::Instant;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Idle,
    CameraActive,
    Authenticating,
    /// Waiting for (or running) a face-photo registration for this user.
    Registering { user_id: UserId },
    Succeeded { user: User },
    Failed,
}

/// Identifies one remote call within one capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    generation: u64,
    sequence: u64,
}

#[derive(Debug, Clone)]
pub enum Request {
    Verify { ticket: Ticket, descriptor: Descriptor },
    Register { ticket: Ticket, user_id: UserId, snapshot: Frame },
}

impl Request {
    pub fn ticket(&self) -> Ticket {
        match self {
            Request::Verify { ticket, .. } | Request::Register { ticket, .. } => *ticket,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Reply {
    Verified { ticket: Ticket, outcome: AuthOutcome },
    Registered { ticket: Ticket, result: Result<String, RegistrationError> },
}

impl Reply {
    pub fn ticket(&self) -> Ticket {
        match self {
            Reply::Verified { ticket, .. } | Reply::Registered { ticket, .. } => *ticket,
        }
    }
}

/// What applying a reply did.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// The reply belonged to a call the session no longer waits for.
    Stale,
    Applied,
    LoggedIn(User),
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub liveness: LivenessSettings,
    pub descriptor_length: usize,
    pub presence_check_every: u32,
    pub roles: RolesConfig,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            liveness: LivenessSettings::default(),
            descriptor_length: 128,
            presence_check_every: 3,
            roles: RolesConfig::default(),
        }
    }
}

impl From<&Config> for OrchestratorSettings {
    fn from(config: &Config) -> Self {
        Self {
            liveness: LivenessSettings::from(&config.liveness),
            descriptor_length: config.recognizer.descriptor_length,
            presence_check_every: config.session.presence_check_every,
            roles: config.roles.clone(),
        }
    }
}

pub struct Orchestrator<S: FrameSource, P: DescriptorPipeline> {
    source: S,
    pipeline: P,
    liveness: LivenessDetector,
    settings: OrchestratorSettings,
    state: SessionState,
    status: StatusMessage,
    generation: u64,
    sequence: u64,
    in_flight: Option<Ticket>,
    ticks: u64,
}

impl<S: FrameSource, P: DescriptorPipeline> Orchestrator<S, P> {
    pub fn new(source: S, pipeline: P, settings: OrchestratorSettings, now: Instant) -> Self {
        Self {
            source,
            pipeline,
            liveness: LivenessDetector::new(settings.liveness.clone(), now),
            settings,
            state: SessionState::Idle,
            status: StatusMessage::Idle,
            generation: 0,
            sequence: 0,
            in_flight: None,
            ticks: 0,
        }
    }

    /// Greet a returning user by the cached identifier.
    pub fn welcome(&mut self, email: &str) {
        if self.state == SessionState::Idle {
            self.status = StatusMessage::Welcome(email.to_string());
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn status(&self) -> &StatusMessage {
        &self.status
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    pub fn liveness(&self) -> &LivenessDetector {
        &self.liveness
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn camera_active(&self) -> bool {
        self.source.is_active()
    }

    /// Acquire the camera. From Succeeded with the camera still running this
    /// re-arms instead.
    pub fn start(&mut self, now: Instant) {
        match self.state {
            SessionState::CameraActive | SessionState::Authenticating | SessionState::Registering { .. } => {
                tracing::debug!("start ignored in {:?}", self.state);
                return;
            }
            SessionState::Succeeded { .. } if self.source.is_active() => {
                self.rearm();
                return;
            }
            _ => {}
        }

        match self.source.start() {
            Ok(()) => {
                self.liveness.reset(now);
                self.ticks = 0;
                self.transition(SessionState::CameraActive, StatusMessage::Ready);
            }
            Err(e) => {
                tracing::warn!("Camera start failed: {}", e);
                self.source.stop();
                self.transition(SessionState::Failed, StatusMessage::CameraError(e));
            }
        }
    }

    /// Release the camera and drop all capture history. Safe from any state
    /// and idempotent; a call still in flight becomes stale.
    pub fn stop(&mut self, now: Instant) {
        if self.state == SessionState::Idle && !self.source.is_active() && self.liveness.window().is_empty() {
            return;
        }

        self.source.stop();
        self.liveness.reset(now);
        if let Some(ticket) = self.in_flight.take() {
            tracing::info!("Camera stopped with call {:?} in flight; its result will be discarded", ticket);
        }
        self.generation += 1;
        self.transition(SessionState::Idle, StatusMessage::CameraStopped);
    }

    /// Back to CameraActive after a finished attempt or to abandon a pending
    /// registration. Not allowed mid-call.
    pub fn rearm(&mut self) {
        if self.in_flight.is_some() {
            tracing::debug!("rearm ignored: call in flight");
            return;
        }
        match self.state {
            SessionState::Succeeded { .. } | SessionState::Failed | SessionState::Registering { .. } => {
                if self.source.is_active() {
                    self.transition(SessionState::CameraActive, StatusMessage::Ready);
                } else {
                    self.transition(SessionState::Idle, StatusMessage::Idle);
                }
            }
            _ => {}
        }
    }

    /// One capture tick: feed the liveness window, and on every Nth tick
    /// refresh the face-presence hint. An unreadable frame skips the tick.
    pub fn tick(&mut self, now: Instant) -> Option<LivenessVerdict> {
        if !self.source.is_active() {
            return None;
        }

        let frame = match self.source.capture_frame() {
            Ok(frame) => frame,
            Err(CaptureError::NotReady) => return None,
            Err(e) => {
                tracing::debug!("Skipping tick: {}", e);
                return None;
            }
        };

        self.ticks += 1;
        let verdict = self.liveness.evaluate(frame, now);

        let presence_due = self.ticks % self.settings.presence_check_every.max(1) as u64 == 0;
        if presence_due && self.state == SessionState::CameraActive && self.in_flight.is_none() && self.status.is_hint() {
            self.refresh_presence_hint();
        }

        Some(verdict)
    }

    fn refresh_presence_hint(&mut self) {
        let Some(frame) = self.liveness.window().latest() else {
            return;
        };
        self.status = match self.pipeline.count_faces(frame) {
            Ok(0) => StatusMessage::NoFace,
            Ok(1) => StatusMessage::FaceVisible,
            Ok(_) => StatusMessage::MultipleFaces,
            Err(e) => {
                tracing::debug!("Face presence check failed: {}", e);
                StatusMessage::DetectionFailed
            }
        };
    }

    /// User pressed authenticate. Returns the verification call to make, if
    /// the attempt got that far.
    pub fn authenticate(&mut self, now: Instant) -> Option<Request> {
        if self.in_flight.is_some() {
            tracing::debug!("authenticate ignored: call in flight");
            return None;
        }
        if self.state != SessionState::CameraActive {
            tracing::debug!("authenticate ignored in {:?}", self.state);
            return None;
        }

        let frame = match self.source.capture_frame() {
            Ok(frame) => frame,
            Err(CaptureError::NotReady) => {
                self.status = StatusMessage::CameraWarmingUp;
                return None;
            }
            Err(e) => {
                tracing::warn!("Capture failed on authenticate: {}", e);
                self.status = StatusMessage::DetectionFailed;
                return None;
            }
        };

        match self.liveness.evaluate(frame, now) {
            LivenessVerdict::Live => {}
            LivenessVerdict::Static => {
                tracing::info!("Liveness check failed: static feed");
                self.status = StatusMessage::PhotoDetected;
                return None;
            }
            LivenessVerdict::Inactive => {
                tracing::info!("Liveness check failed: no recent movement");
                self.status = StatusMessage::MoveSlightly;
                return None;
            }
        }

        let frame = self.liveness.window().latest()?;
        let extraction = match self.pipeline.extract(frame) {
            Ok(extraction) => extraction,
            Err(e) => {
                tracing::warn!("Descriptor extraction failed: {}", e);
                self.status = StatusMessage::DetectionFailed;
                return None;
            }
        };

        let raw = match extraction {
            Extraction::NoFace => {
                self.status = StatusMessage::NoFace;
                return None;
            }
            Extraction::MultipleFaces { count } => {
                tracing::info!("Rejected capture with {} faces", count);
                self.status = StatusMessage::MultipleFaces;
                return None;
            }
            Extraction::FeaturesUnclear => {
                self.status = StatusMessage::FeaturesUnclear;
                return None;
            }
            Extraction::SingleFace { descriptor } => descriptor,
        };

        let descriptor = match Descriptor::new(raw, self.settings.descriptor_length) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                tracing::warn!("Invalid face descriptor: {}", e);
                self.status = StatusMessage::NoFaceData;
                return None;
            }
        };

        let ticket = self.issue_ticket();
        self.transition(SessionState::Authenticating, StatusMessage::Authenticating);
        tracing::info!("Sending descriptor with length {}", descriptor.len());
        Some(Request::Verify { ticket, descriptor })
    }

    /// Enter registration for a user who is already known (profile page).
    pub fn arm_registration(&mut self, user_id: UserId) {
        if self.in_flight.is_some() || self.state != SessionState::CameraActive {
            tracing::debug!("arm_registration ignored in {:?}", self.state);
            return;
        }
        self.transition(SessionState::Registering { user_id }, StatusMessage::ReadyToRegister);
    }

    /// User pressed register. Captures one frame for upload; no liveness
    /// gate, this is an explicit enrollment action.
    pub fn register(&mut self) -> Option<Request> {
        if self.in_flight.is_some() {
            tracing::debug!("register ignored: call in flight");
            return None;
        }
        let SessionState::Registering { user_id } = &self.state else {
            tracing::debug!("register ignored in {:?}", self.state);
            return None;
        };
        let user_id = user_id.clone();

        let snapshot = match self.source.capture_frame() {
            Ok(frame) => frame,
            Err(CaptureError::NotReady) => {
                self.status = StatusMessage::CameraWarmingUp;
                return None;
            }
            Err(e) => {
                tracing::warn!("Capture failed on register: {}", e);
                self.status = StatusMessage::RegistrationFailed;
                return None;
            }
        };

        let ticket = self.issue_ticket();
        self.status = StatusMessage::RegisteringPhoto;
        tracing::info!("Registering face photo for user {}", user_id);
        Some(Request::Register { ticket, user_id, snapshot })
    }

    /// Apply the answer to a request handed out earlier.
    pub fn complete(&mut self, reply: Reply) -> Completion {
        let ticket = reply.ticket();
        if self.in_flight != Some(ticket) {
            tracing::info!("Discarding stale reply {:?}", ticket);
            return Completion::Stale;
        }
        self.in_flight = None;

        match reply {
            Reply::Verified { outcome, .. } => self.apply_outcome(outcome),
            Reply::Registered { result, .. } => {
                self.apply_registration(result);
                Completion::Applied
            }
        }
    }

    fn apply_outcome(&mut self, outcome: AuthOutcome) -> Completion {
        match outcome {
            AuthOutcome::Matched(mut user) => {
                let role = user.resolve_role(&self.settings.roles).to_string();
                tracing::info!("Authenticated user {:?} with role {}", user.id, role);
                self.transition(SessionState::Succeeded { user: user.clone() }, StatusMessage::LoggedIn);
                Completion::LoggedIn(user)
            }
            AuthOutcome::NeedsRegistration(user_id) => {
                tracing::info!("User {} has no face photo yet", user_id);
                self.transition(SessionState::Registering { user_id }, StatusMessage::FirstTimeLogin);
                Completion::Applied
            }
            AuthOutcome::PendingReview => {
                self.transition(SessionState::CameraActive, StatusMessage::UnderReview);
                Completion::Applied
            }
            AuthOutcome::Rejected(reason) => {
                tracing::info!("Verifier rejected the face: {:?}", reason);
                self.transition(SessionState::CameraActive, StatusMessage::Rejected(reason));
                Completion::Applied
            }
            AuthOutcome::TransportError(detail) => {
                tracing::warn!("Authentication transport error: {}", detail);
                self.transition(SessionState::CameraActive, StatusMessage::TechnicalIssue);
                Completion::Applied
            }
        }
    }

    fn apply_registration(&mut self, result: Result<String, RegistrationError>) {
        match result {
            Ok(url) => {
                tracing::info!("Face photo stored at {}", url);
                self.transition(SessionState::CameraActive, StatusMessage::RegistrationSaved);
            }
            Err(e) => {
                // Stay in Registering with the same user so the user can retry.
                tracing::warn!("Face registration failed: {}", e);
                self.status = StatusMessage::RegistrationFailed;
            }
        }
    }

    fn issue_ticket(&mut self) -> Ticket {
        self.sequence += 1;
        let ticket = Ticket {
            generation: self.generation,
            sequence: self.sequence,
        };
        self.in_flight = Some(ticket);
        ticket
    }

    fn transition(&mut self, state: SessionState, status: StatusMessage) {
        if self.state != state {
            tracing::info!("Session {:?} -> {:?}", self.state, state);
        }
        self.state = state;
        self.status = status;
    }
}

impl<S: FrameSource, P: DescriptorPipeline> Drop for Orchestrator<S, P> {
    fn drop(&mut self) {
        self.source.stop();
    }
}
