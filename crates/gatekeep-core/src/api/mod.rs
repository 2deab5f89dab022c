//! REST API client module for the account service.
//!
//! This module provides the `ApiClient` transport and the `Gateway` that
//! issues calls on behalf of a session: registration, login, token
//! refresh, password reset, email verification, and account settings.
//!
//! The API uses JWT bearer token authentication; tokens are issued by
//! `POST /auth/login` and rotated by `POST /auth/refresh`.

pub mod client;
pub mod error;
pub mod gateway;

pub use client::{ApiClient, ApiRequest, DEFAULT_API_URL, REQUEST_TIMEOUT_SECS};
pub use error::ApiError;
pub use gateway::{Gateway, Navigator, NoopNavigator};
