//! Client-side session lifecycle for a remote account API.
//!
//! `gatekeep-core` keeps a signed-in session alive against an external
//! identity service: it stores the issued bearer tokens, decides when they
//! are usable, refreshes them when the API rejects one, and normalizes
//! every API failure into a small closed set presenters can act on.
//!
//! - [`auth`]: credential storage, token inspection, the session coordinator
//! - [`api`]: transport, failure taxonomy, and the request gateway
//! - [`models`]: wire types and the user record
//! - [`config`]: client configuration

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{ApiClient, ApiError, Gateway, Navigator};
pub use auth::{CredentialStore, LoginFailure, SessionManager, SessionPhase, SessionState};
pub use config::Config;
