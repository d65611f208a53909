//! `herald-core` — shared building blocks for the Herald client workspace.
//!
//! Pure types only (no IO, no async).

pub mod error;
pub mod id;

pub use error::{DomainError, DomainResult};
pub use id::{OrganizationId, UserId};
