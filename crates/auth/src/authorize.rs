use thiserror::Error;

use crate::{Identity, Permission, Session};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("not authenticated")]
    Unauthenticated,

    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Check one permission against an identity.
///
/// - No IO
/// - No panics
/// - Exact match only
pub fn authorize(identity: &Identity, required: &Permission) -> Result<(), AuthzError> {
    if identity.has_permission(required.as_str()) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

/// Check one permission against whatever the session currently holds.
pub fn authorize_session(session: &Session, required: &Permission) -> Result<(), AuthzError> {
    let identity = session.identity.as_ref().ok_or(AuthzError::Unauthenticated)?;
    authorize(identity, required)
}

#[cfg(test)]
mod tests {
    use herald_core::UserId;

    use super::*;

    #[test]
    fn forbidden_names_the_missing_permission() {
        let identity = Identity::new(UserId::new(), "a@b.com", "A").with_permissions(["audit:view"]);

        assert_eq!(authorize(&identity, &Permission::new("audit:view")), Ok(()));
        assert_eq!(
            authorize(&identity, &Permission::new("user:manage")),
            Err(AuthzError::Forbidden("user:manage".to_string()))
        );
    }

    #[test]
    fn empty_session_is_unauthenticated() {
        assert_eq!(
            authorize_session(&Session::default(), &Permission::new("audit:view")),
            Err(AuthzError::Unauthenticated)
        );
    }
}
