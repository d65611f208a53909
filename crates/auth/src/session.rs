//! Application-wide session snapshot and its permission predicates.

use serde::{Deserialize, Serialize};

use crate::{Identity, Organization};

/// What the client currently knows about who is signed in.
///
/// One instance is owned by the session manager; consumers (views, the
/// navigation guard) receive it explicitly, usually as a cloned snapshot.
/// Every predicate answers `false` when nobody is signed in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub identity: Option<Identity>,
    pub organization: Option<Organization>,
    pub loading: bool,
    pub last_error: Option<String>,
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    pub fn has_permission(&self, name: &str) -> bool {
        self.identity
            .as_ref()
            .is_some_and(|identity| identity.has_permission(name))
    }

    /// True when at least one of `names` is held. An empty list is never satisfied.
    pub fn has_any<S: AsRef<str>>(&self, names: &[S]) -> bool {
        names.iter().any(|n| self.has_permission(n.as_ref()))
    }

    /// True when every one of `names` is held. An empty list is satisfied by
    /// any signed-in identity.
    pub fn has_all<S: AsRef<str>>(&self, names: &[S]) -> bool {
        self.is_authenticated() && names.iter().all(|n| self.has_permission(n.as_ref()))
    }

    pub fn has_role(&self, name: &str) -> bool {
        self.identity
            .as_ref()
            .is_some_and(|identity| identity.has_role(name))
    }

    /// Drop identity and organization. Returns whether anything was cleared.
    pub fn clear(&mut self) -> bool {
        let had_state = self.identity.is_some() || self.organization.is_some();
        self.identity = None;
        self.organization = None;
        self.loading = false;
        had_state
    }
}
