//! REST API access for the user-management service.
//!
//! This module provides:
//! - `ApiRequest` / `ApiResponse`: transport-neutral request descriptors
//! - `Transport`: the HTTP seam, with `ReqwestTransport` for production use
//! - `ApiClient`: typed login, profile and admin operations
//! - `ApiError`: the error taxonomy surfaced to callers
//!
//! Authenticated calls go through `auth::SessionGuard`, which attaches the
//! bearer token and renews the session on a 401.

pub mod client;
pub mod error;
pub mod request;
pub mod transport;

pub use client::ApiClient;
pub use error::ApiError;
pub use request::{ApiRequest, ApiResponse};
pub use transport::{ReqwestTransport, Transport, TransportError};
