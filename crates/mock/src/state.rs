use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use nova_auth::{MenuNode, UserProfile};

/// A user the mock accepts at `/auth/login`.
#[derive(Debug, Clone)]
pub struct MockUser {
    pub password: String,
    pub profile: UserProfile,
}

/// Users and issued tokens.
///
/// Tokens are opaque strings mapped to the username they were issued for.
#[derive(Debug, Default)]
pub struct MockState {
    users: HashMap<String, MockUser>,
    tokens: Mutex<HashMap<String, String>>,
    menu: Vec<MenuNode>,
    login_delay: Option<Duration>,
    stats_delay: Option<Duration>,
}

impl MockState {
    /// `admin` / `admin123456` with every permission, and
    /// `editor` / `editor123456` with dashboard and user management.
    /// Serves [`default_menu`] at `/menus`.
    pub fn new() -> Self {
        Self::empty()
            .with_menu(default_menu())
            .with_user(
                "admin123456",
                UserProfile::new("1", "admin")
                    .with_email("admin@example.com")
                    .with_roles(["admin"])
                    .with_permissions(["*"]),
            )
            .with_user(
                "editor123456",
                UserProfile::new("2", "editor")
                    .with_email("editor@example.com")
                    .with_roles(["editor"])
                    .with_permissions(["dashboard", "users"]),
            )
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, password: impl Into<String>, profile: UserProfile) -> Self {
        self.users.insert(
            profile.username.clone(),
            MockUser {
                password: password.into(),
                profile,
            },
        );
        self
    }

    pub fn with_menu(mut self, menu: Vec<MenuNode>) -> Self {
        self.menu = menu;
        self
    }

    /// Delay every login response, to exercise in-flight races.
    pub fn with_login_delay(mut self, delay: Duration) -> Self {
        self.login_delay = Some(delay);
        self
    }

    /// Delay `/dashboard/stats` before its token is checked.
    pub fn with_stats_delay(mut self, delay: Duration) -> Self {
        self.stats_delay = Some(delay);
        self
    }

    pub fn login_delay(&self) -> Option<Duration> {
        self.login_delay
    }

    pub fn stats_delay(&self) -> Option<Duration> {
        self.stats_delay
    }

    pub fn menu(&self) -> &[MenuNode] {
        &self.menu
    }

    pub fn authenticate(&self, username: &str, password: &str) -> Option<&UserProfile> {
        self.users
            .get(username)
            .filter(|u| u.password == password)
            .map(|u| &u.profile)
    }

    pub fn issue_token(&self, username: &str) -> String {
        let token = format!("mock_token_{}", uuid::Uuid::now_v7().simple());
        self.tokens
            .lock()
            .unwrap()
            .insert(token.clone(), username.to_string());
        token
    }

    pub fn user_for_token(&self, token: &str) -> Option<UserProfile> {
        let tokens = self.tokens.lock().unwrap();
        let username = tokens.get(token)?;
        self.users.get(username).map(|u| u.profile.clone())
    }

    pub fn revoke(&self, token: &str) -> bool {
        self.tokens.lock().unwrap().remove(token).is_some()
    }

    /// Invalidate every issued token, as if the backend restarted.
    pub fn revoke_all(&self) {
        self.tokens.lock().unwrap().clear();
    }

    pub fn active_tokens(&self) -> usize {
        self.tokens.lock().unwrap().len()
    }
}

/// The menu tree served by a default mock: the console sections plus a
/// reports section the built-in client menu lacks.
pub fn default_menu() -> Vec<MenuNode> {
    vec![
        MenuNode::new("dashboard", "Dashboard")
            .path("/dashboard")
            .icon("dashboard")
            .requires("dashboard"),
        MenuNode::new("system", "System")
            .path("/system")
            .icon("settings")
            .children(vec![
                MenuNode::new("system-user", "Users")
                    .path("/system/user")
                    .requires("users"),
                MenuNode::new("system-role", "Roles")
                    .path("/system/role")
                    .requires("roles"),
            ]),
        MenuNode::new("reports", "Reports")
            .path("/reports")
            .icon("chart")
            .children(vec![
                MenuNode::new("reports-sales", "Sales")
                    .path("/reports/sales")
                    .requires("reports"),
            ]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_users_authenticate() {
        let state = MockState::new();
        assert!(state.authenticate("admin", "admin123456").unwrap().has_wildcard());
        assert!(state.authenticate("admin", "wrong").is_none());
        assert!(state.authenticate("nobody", "admin123456").is_none());
    }

    #[test]
    fn tokens_resolve_until_revoked() {
        let state = MockState::new();
        let token = state.issue_token("editor");

        assert_eq!(state.user_for_token(&token).unwrap().username, "editor");
        assert!(state.revoke(&token));
        assert!(state.user_for_token(&token).is_none());
        assert!(!state.revoke(&token));
    }

    #[test]
    fn revoke_all_clears_every_token() {
        let state = MockState::new();
        state.issue_token("admin");
        state.issue_token("editor");
        assert_eq!(state.active_tokens(), 2);

        state.revoke_all();
        assert_eq!(state.active_tokens(), 0);
    }
}
