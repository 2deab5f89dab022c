//! Authentication module for managing user sessions and credentials.
//!
//! This module provides:
//! - `SessionManager`: the session lifecycle (login, logout, refresh, startup check)
//! - `CredentialStore`: durable access/refresh token storage with expiry policy
//! - `token`: client-side decoding and expiry checks for bearer tokens
//! - `LoginFailure`: what a presenter should do with a failed login

pub mod backend;
pub mod credentials;
pub mod flow;
pub mod session;
pub mod token;

pub use backend::{CredentialBackend, FileBackend, KeyringBackend, MemoryBackend};
pub use credentials::{CredentialKind, CredentialPolicy, CredentialRecord, CredentialStore};
pub use flow::LoginFailure;
pub use session::{SessionManager, SessionPhase, SessionState, StartupCheck};
pub use token::{Claims, TokenIdentity};
