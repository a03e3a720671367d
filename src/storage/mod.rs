pub mod identity_store;

pub use identity_store::{CachedIdentity, IdentityStore};
