//! Credential and session management.
//!
//! # Architecture
//!
//! - [`Credential`]: renewable token as persisted on disk
//! - [`CredentialStore`]: load / save of the single credential
//! - [`Authenticator`]: platform-specific renew / acquire protocol
//! - [`AuthenticationSession`]: keeps the credential usable across polls

mod authenticator;
mod error;
mod session;
mod store;
mod types;

// Platform-specific implementations
pub mod platforms;

pub use authenticator::Authenticator;
pub use error::{AuthError, StorageError};
pub use session::{AuthenticationSession, SessionConfig};
pub use store::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use types::{AuthContext, Credential, CredentialStatus, DEFAULT_EXPIRY_SKEW, SessionState};
