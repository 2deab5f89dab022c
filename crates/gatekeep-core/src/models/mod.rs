//! Data models for the remote account API.
//!
//! This module contains the request and response shapes exchanged with
//! the authentication service, plus the client-side user record:
//!
//! - Auth payloads: `LoginCredentials`, `TokenPair`, `RegisterRequest`, etc.
//! - `User`, `UserProfile`: the signed-in account as seen by presenters

pub mod auth;
pub mod user;

pub use auth::{
    ChangePasswordRequest, DataExport, EmailConfirmationResponse, LoginCredentials,
    MessageResponse, PasswordResetConfirm, PasswordResetRequest, PasswordResetResponse,
    RefreshRequest, RegisterRequest, RegisterResponse, ResendConfirmationRequest, TokenPair,
};
pub use user::{User, UserProfile};
