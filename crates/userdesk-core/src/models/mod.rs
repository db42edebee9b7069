//! Data models for the user-management API.
//!
//! - `User`, `Role`: account records and their role
//! - `LoginRequest`, `RegisterRequest`, `UserUpdate`: request bodies
//! - `ApiEnvelope`: the response wrapper every endpoint returns

pub mod envelope;
pub mod user;

pub use envelope::ApiEnvelope;
pub use user::{LoginRequest, RegisterRequest, Role, User, UserUpdate};
