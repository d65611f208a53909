//! Navigation guard: decides whether a view transition may proceed.
//!
//! The decision is a pure function of the route metadata and a session
//! snapshot. It never touches the network and never mutates the session.

use serde::{Deserialize, Serialize};

use crate::authorize::authorize_session;
use crate::{Permission, Session};

/// Access requirements declared by a route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteMeta {
    pub name: String,

    #[serde(default = "default_requires_auth")]
    pub requires_auth: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_permission: Option<Permission>,
}

fn default_requires_auth() -> bool {
    true
}

impl RouteMeta {
    /// A route that requires a signed-in operator (the default).
    pub fn protected(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            requires_auth: true,
            requires_permission: None,
        }
    }

    /// A route anyone may open.
    pub fn public(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            requires_auth: false,
            requires_permission: None,
        }
    }

    pub fn with_permission(mut self, permission: impl Into<Permission>) -> Self {
        self.requires_permission = Some(permission.into());
        self
    }
}

/// A requested transition: the target route plus the full path the user asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRequest {
    pub meta: RouteMeta,
    pub path: String,
}

impl RouteRequest {
    pub fn new(meta: RouteMeta, path: impl Into<String>) -> Self {
        Self {
            meta,
            path: path.into(),
        }
    }
}

/// Names of the two routes the guard redirects to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardConfig {
    pub login_route: String,
    pub default_route: String,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            login_route: "login".to_string(),
            default_route: "dashboard".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    /// Send the user to the login view and come back to `return_to` afterwards.
    RedirectToLogin { route: String, return_to: String },
    /// Send the user to the default view they are known to be allowed on.
    RedirectToDefault { route: String },
}

/// Decide what happens when the user navigates to `target`.
///
/// Rules, first match wins:
/// 1. signed in and asking for the login view → default view
/// 2. route does not require authentication → allow
/// 3. nobody signed in → login view, remembering the requested path
/// 4. route requires a permission the identity lacks → default view
/// 5. otherwise → allow
pub fn decide(config: &GuardConfig, target: &RouteRequest, session: &Session) -> GuardDecision {
    let meta = &target.meta;

    let decision = if session.is_authenticated() && meta.name == config.login_route {
        GuardDecision::RedirectToDefault {
            route: config.default_route.clone(),
        }
    } else if !meta.requires_auth {
        GuardDecision::Allow
    } else if !session.is_authenticated() {
        GuardDecision::RedirectToLogin {
            route: config.login_route.clone(),
            return_to: target.path.clone(),
        }
    } else if let Some(Err(denied)) = meta
        .requires_permission
        .as_ref()
        .map(|required| authorize_session(session, required))
    {
        tracing::debug!(route = %meta.name, error = %denied, "route denied");
        GuardDecision::RedirectToDefault {
            route: config.default_route.clone(),
        }
    } else {
        GuardDecision::Allow
    };

    tracing::debug!(route = %meta.name, ?decision, "navigation guard decision");
    decision
}
