//! Async shell around the [`Orchestrator`].
//!
//! One task owns the orchestrator and multiplexes four inputs: user commands,
//! the capture ticker, replies from network calls and the shutdown signal.
//! Network calls run as spawned tasks and report back over a channel, so the
//! ticker keeps feeding the liveness window while a verification is pending.

use crate::camera::FrameSource;
use crate::core::orchestrator::{Completion, Orchestrator, Reply, Request, SessionState};
use crate::core::pipeline::DescriptorPipeline;
use crate::core::status::StatusMessage;
use crate::service::client::{FaceRegistrar, RemoteVerifier};
use crate::service::protocol::{User, UserId};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    StartCamera,
    Authenticate,
    Register,
    ArmRegistration(UserId),
    Rearm,
    StopCamera,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Status { state: SessionState, message: StatusMessage },
    LoggedIn(User),
}

pub struct SessionDriver<S, P, V, R>
where
    S: FrameSource,
    P: DescriptorPipeline,
{
    orchestrator: Orchestrator<S, P>,
    verifier: Arc<V>,
    registrar: Arc<R>,
    tick_interval: Duration,
    published: Option<(SessionState, StatusMessage)>,
}

impl<S, P, V, R> SessionDriver<S, P, V, R>
where
    S: FrameSource,
    P: DescriptorPipeline,
    V: RemoteVerifier,
    R: FaceRegistrar,
{
    pub fn new(orchestrator: Orchestrator<S, P>, verifier: Arc<V>, registrar: Arc<R>, tick_interval: Duration) -> Self {
        Self {
            orchestrator,
            verifier,
            registrar,
            tick_interval,
            published: None,
        }
    }

    /// Run until shutdown is signalled or the command channel closes. The
    /// camera is always released before the orchestrator is handed back.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        events: mpsc::UnboundedSender<SessionEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Orchestrator<S, P> {
        let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<Reply>();
        let mut ticker = interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        self.publish(&events);

        while !*shutdown.borrow() {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                Some(reply) = reply_rx.recv() => {
                    if let Completion::LoggedIn(user) = self.orchestrator.complete(reply) {
                        let _ = events.send(SessionEvent::LoggedIn(user));
                    }
                }
                command = commands.recv() => {
                    let Some(command) = command else {
                        tracing::debug!("Command channel closed");
                        break;
                    };
                    self.handle(command, &reply_tx);
                }
                _ = ticker.tick(), if self.orchestrator.camera_active() => {
                    self.orchestrator.tick(Instant::now());
                }
            }
            self.publish(&events);
        }

        self.orchestrator.stop(Instant::now());
        self.publish(&events);
        self.orchestrator
    }

    fn handle(&mut self, command: Command, replies: &mpsc::UnboundedSender<Reply>) {
        tracing::debug!("Command {:?}", command);
        let now = Instant::now();
        let request = match command {
            Command::StartCamera => {
                self.orchestrator.start(now);
                None
            }
            Command::Authenticate => self.orchestrator.authenticate(now),
            Command::Register => self.orchestrator.register(),
            Command::ArmRegistration(user_id) => {
                self.orchestrator.arm_registration(user_id);
                None
            }
            Command::Rearm => {
                self.orchestrator.rearm();
                None
            }
            Command::StopCamera => {
                self.orchestrator.stop(now);
                None
            }
        };

        if let Some(request) = request {
            self.dispatch(request, replies.clone());
        }
    }

    fn dispatch(&self, request: Request, replies: mpsc::UnboundedSender<Reply>) {
        match request {
            Request::Verify { ticket, descriptor } => {
                let call = self.verifier.authenticate(descriptor);
                tokio::spawn(async move {
                    let outcome = call.await;
                    let _ = replies.send(Reply::Verified { ticket, outcome });
                });
            }
            Request::Register { ticket, user_id, snapshot } => {
                let call = self.registrar.register(user_id, snapshot);
                tokio::spawn(async move {
                    let result = call.await;
                    let _ = replies.send(Reply::Registered { ticket, result });
                });
            }
        }
    }

    fn publish(&mut self, events: &mpsc::UnboundedSender<SessionEvent>) {
        let current = (self.orchestrator.state().clone(), self.orchestrator.status().clone());
        if self.published.as_ref() == Some(&current) {
            return;
        }
        let (state, message) = current.clone();
        self.published = Some(current);
        let _ = events.send(SessionEvent::Status { state, message });
    }
}
