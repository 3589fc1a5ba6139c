//! The authenticated user's profile.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use nova_core::UserId;

use crate::{Permission, Role};

/// Profile of the signed-in user as returned by the backend.
///
/// Immutable except through [`UserProfile::merge`]. Sets are ordered so a
/// persisted profile serializes identically every time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "WireProfile")]
pub struct UserProfile {
    pub id: UserId,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub roles: BTreeSet<Role>,
    pub permissions: BTreeSet<Permission>,
}

/// Partial update applied by [`UserProfile::merge`].
///
/// Present fields replace the current value; absent fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilePatch {
    pub username: Option<String>,
    pub email: Option<String>,
    pub avatar: Option<String>,
    pub roles: Option<BTreeSet<Role>>,
    pub permissions: Option<BTreeSet<Permission>>,
}

impl UserProfile {
    pub fn new(id: impl Into<UserId>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            email: None,
            avatar: None,
            roles: BTreeSet::new(),
            permissions: BTreeSet::new(),
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_roles<I, R>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<Role>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_permissions<I, P>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Permission>,
    {
        self.permissions = permissions.into_iter().map(Into::into).collect();
        self
    }

    pub fn has_wildcard(&self) -> bool {
        self.permissions.iter().any(Permission::is_wildcard)
    }

    pub fn has_permission(&self, name: &str) -> bool {
        self.has_wildcard() || self.permissions.iter().any(|p| p.as_str() == name)
    }

    /// Role membership. A wildcard permission also satisfies role checks.
    pub fn has_role(&self, name: &str) -> bool {
        self.has_wildcard() || self.roles.iter().any(|r| r.as_str() == name)
    }

    /// True if any of `names` is granted. An empty list grants nothing
    /// unless the wildcard is held.
    pub fn has_any_permission<I, S>(&self, names: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.has_wildcard() || names.into_iter().any(|n| self.has_permission(n.as_ref()))
    }

    /// True if every one of `names` is granted (vacuously true when empty).
    pub fn has_all_permissions<I, S>(&self, names: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.has_wildcard() || names.into_iter().all(|n| self.has_permission(n.as_ref()))
    }

    pub fn has_any_role<I, S>(&self, names: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.has_wildcard() || names.into_iter().any(|n| self.has_role(n.as_ref()))
    }

    /// Shallow merge of `patch` into this profile.
    pub fn merge(&mut self, patch: ProfilePatch) {
        let ProfilePatch {
            username,
            email,
            avatar,
            roles,
            permissions,
        } = patch;

        if let Some(username) = username {
            self.username = username;
        }
        if email.is_some() {
            self.email = email;
        }
        if avatar.is_some() {
            self.avatar = avatar;
        }
        if let Some(roles) = roles {
            self.roles = roles;
        }
        if let Some(permissions) = permissions {
            self.permissions = permissions;
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire shape
// ─────────────────────────────────────────────────────────────────────────────

/// Every profile shape the backend and older clients have produced.
///
/// Some endpoints send `role: "admin"` instead of `roles: [...]`, some omit
/// `permissions`, and ids arrive as strings or numbers.
#[derive(Debug, Deserialize)]
struct WireProfile {
    id: WireId,
    username: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    avatar: Option<String>,
    #[serde(default)]
    roles: Vec<Role>,
    #[serde(default)]
    role: Option<Role>,
    #[serde(default)]
    permissions: Vec<Permission>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireId {
    Text(String),
    Number(i64),
}

impl From<WireProfile> for UserProfile {
    fn from(raw: WireProfile) -> Self {
        let id = match raw.id {
            WireId::Text(s) => UserId::new(s),
            WireId::Number(n) => UserId::new(n.to_string()),
        };

        let mut roles: BTreeSet<Role> = raw.roles.into_iter().collect();
        roles.extend(raw.role);

        Self {
            id,
            username: raw.username,
            email: raw.email,
            avatar: raw.avatar,
            roles,
            permissions: raw.permissions.into_iter().collect(),
        }
    }
}
