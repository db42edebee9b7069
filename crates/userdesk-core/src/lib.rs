//! Client library for the userdesk user-management API.
//!
//! The interesting part is [`auth::SessionGuard`]: every authenticated call
//! goes through it, so access-token expiry and renewal stay invisible to the
//! rest of the client. [`api::ApiClient`] layers the typed REST operations
//! on top.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{ApiClient, ApiError};
pub use auth::{Credential, SessionGuard};
pub use config::Config;
