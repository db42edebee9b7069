//! Authentication module for managing sessions and credentials.
//!
//! This module provides:
//! - `SessionGuard`: bearer attachment and single-flight token refresh
//! - `Credential`: access + refresh token pair
//! - `CredentialStore`: memory, session-file and OS keyring backends
//! - `Navigator`: the "go back to login" signal raised when a session ends
//! - `TokenFormat` / `TokenPlacement`: per-deployment token wire conventions

pub mod credentials;
pub mod guard;
pub mod navigation;
pub mod session;
pub mod token_format;

pub use credentials::{CredentialStore, KeyringCredentialStore, MemoryCredentialStore};
pub use guard::{GuardConfig, SessionGuard};
pub use navigation::{ChannelNavigator, LoginRedirect, Navigator, NoopNavigator};
pub use session::{Credential, FileCredentialStore};
pub use token_format::{TokenFormat, TokenPlacement};
