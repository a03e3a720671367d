pub mod client;
pub mod driver;
pub mod protocol;

pub use client::{BoxFuture, FaceRegistrar, PortalClient, RemoteVerifier};
pub use driver::{Command, SessionDriver, SessionEvent};
pub use protocol::{landing_path, AuthOutcome, User, UserId};
