//! `herald-client`
//!
//! **Responsibility:** Session and authorization layer for operators of the
//! Herald notification API.
//!
//! This crate provides:
//! - Credential persistence (memory and file backed)
//! - A hypermedia (HAL) client that follows server-offered links
//! - Access-token renewal with single-flight refresh and a background worker
//! - The session manager: login, logout, bootstrap and invalidation
//!
//! The server stays the authority. Anything decided here from a token's
//! claims or a cached identity is advisory and is revalidated on use.

pub mod client;
pub mod config;
pub mod error;
pub mod hal;
pub mod session;
pub mod store;
pub mod token;
pub mod transport;

pub use client::HalClient;
pub use config::{ClientConfig, ConfigError};
pub use error::{ApiError, ErrorKind, FieldError, ProblemDocument};
pub use hal::{Action, HttpMethod, Link, Links, Page, Resource};
pub use session::{LoginRequest, SessionError, SessionManager};
pub use store::{Credential, CredentialStore, FileCredentialStore, MemoryCredentialStore, StoreError};
pub use token::{TokenManager, TokenState};
pub use transport::{Auth, Transport};
