//! `herald-auth` — pure authorization boundary for the operator client.
//!
//! This crate is intentionally decoupled from HTTP and storage: everything in
//! here is a value or a pure function over values, so the navigation guard
//! and the permission predicates can be tested against fabricated sessions.

pub mod authorize;
pub mod claims;
pub mod guard;
pub mod identity;
pub mod permissions;
pub mod roles;
pub mod session;

pub use authorize::{AuthzError, authorize};
pub use claims::{ClaimsError, Freshness, TokenClaims, classify, is_expired};
pub use guard::{GuardConfig, GuardDecision, RouteMeta, RouteRequest, decide};
pub use identity::{Identity, Organization};
pub use permissions::Permission;
pub use roles::Role;
pub use session::Session;
