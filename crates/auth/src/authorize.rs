use thiserror::Error;

use crate::{Permission, Role, UserProfile};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("not authenticated")]
    NotAuthenticated,

    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),

    #[error("forbidden: requires one of roles {0:?}")]
    MissingRole(Vec<String>),

    #[error("forbidden: requires one of permissions {0:?}")]
    MissingPermission(Vec<String>),
}

/// Authorize a single permission against the current profile.
///
/// - No IO
/// - No panics
/// - `"*"` grants everything
pub fn authorize(profile: Option<&UserProfile>, required: &Permission) -> Result<(), AuthzError> {
    let profile = profile.ok_or(AuthzError::NotAuthenticated)?;

    if profile.has_permission(required.as_str()) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

/// Authorize route requirements.
///
/// Each declared group is any-of: at least one listed role must be held when
/// `roles` is non-empty, and at least one listed permission when
/// `permissions` is non-empty. Undeclared groups always pass.
pub fn authorize_route<'r, 'p, R, P>(
    profile: Option<&UserProfile>,
    roles: R,
    permissions: P,
) -> Result<(), AuthzError>
where
    R: IntoIterator<Item = &'r Role>,
    P: IntoIterator<Item = &'p Permission>,
{
    let profile = profile.ok_or(AuthzError::NotAuthenticated)?;

    let roles: Vec<&Role> = roles.into_iter().collect();
    if !roles.is_empty() && !profile.has_any_role(roles.iter().map(|r| r.as_str())) {
        return Err(AuthzError::MissingRole(
            roles.iter().map(|r| r.as_str().to_string()).collect(),
        ));
    }

    let permissions: Vec<&Permission> = permissions.into_iter().collect();
    if !permissions.is_empty()
        && !profile.has_any_permission(permissions.iter().map(|p| p.as_str()))
    {
        return Err(AuthzError::MissingPermission(
            permissions.iter().map(|p| p.as_str().to_string()).collect(),
        ));
    }

    Ok(())
}
