//! The session manager: single source of truth for who is signed in.
//!
//! State lives behind one mutex and every change is published on a
//! `watch` channel. Async operations never hold the lock across an await;
//! instead they remember the session epoch they started under and drop
//! their result if a logout or reset bumped it in the meantime.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use nova_auth::{Permission, ProfilePatch, Role, UserProfile};
use nova_core::{ApiError, AuthError, AuthResult};

use crate::gateway::{AuthContext, HttpGateway, LoginPayload};
use crate::storage::{CredentialStore, StoredCredentials};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    LoggedOut,
    LoggingIn,
    LoggedIn,
    LoggingOut,
}

impl SessionPhase {
    pub fn is_busy(self) -> bool {
        matches!(self, Self::LoggingIn | Self::LoggingOut)
    }
}

/// Token and profile of the signed-in user.
///
/// Authenticated iff both are present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub token: Option<String>,
    pub profile: Option<UserProfile>,
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some() && self.profile.is_some()
    }
}

/// What observers see after every state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub session: Session,
    /// Incremented on every published change.
    pub version: u64,
}

impl SessionSnapshot {
    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }

    pub fn profile(&self) -> Option<&UserProfile> {
        self.session.profile.as_ref()
    }
}

#[derive(Debug)]
struct SessionState {
    phase: SessionPhase,
    session: Session,
    /// Bumped whenever the session is replaced or torn down.
    epoch: u64,
    version: u64,
}

pub struct SessionManager {
    state: Mutex<SessionState>,
    store: CredentialStore,
    gateway: Arc<HttpGateway>,
    validate_on_start: bool,
    updates: watch::Sender<SessionSnapshot>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot();
        f.debug_struct("SessionManager")
            .field("phase", &snapshot.phase)
            .field("authenticated", &snapshot.is_authenticated())
            .field("version", &snapshot.version)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Build the manager and register it with `gateway` as its token source.
    pub fn new(gateway: Arc<HttpGateway>, store: CredentialStore, validate_on_start: bool) -> Arc<Self> {
        let initial = SessionSnapshot {
            phase: SessionPhase::LoggedOut,
            session: Session::default(),
            version: 0,
        };
        let (updates, _) = watch::channel(initial);

        let manager = Arc::new(Self {
            state: Mutex::new(SessionState {
                phase: SessionPhase::LoggedOut,
                session: Session::default(),
                epoch: 0,
                version: 0,
            }),
            store,
            gateway,
            validate_on_start,
            updates,
        });

        let ctx: Weak<dyn AuthContext> = Arc::downgrade(&manager) as Weak<dyn AuthContext>;
        manager.gateway.attach(ctx);
        manager
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &mut SessionState) {
        state.version += 1;
        self.updates.send_replace(SessionSnapshot {
            phase: state.phase,
            session: state.session.clone(),
            version: state.version,
        });
    }

    /// Tear down the session in memory and in storage. Caller holds the lock.
    fn reset_locked(&self, state: &mut SessionState) {
        state.epoch += 1;
        state.session = Session::default();
        state.phase = SessionPhase::LoggedOut;
        if let Err(e) = self.store.clear() {
            tracing::warn!("failed to clear stored credentials: {e}");
        }
        self.publish(state);
    }

    // ── lifecycle ────────────────────────────────────────────────────────────

    /// Restore a persisted session, optionally checking it with the backend.
    ///
    /// Never fails. Incomplete or rejected sessions are cleared and the
    /// manager stays logged out.
    pub async fn initialize(&self) {
        {
            let state = self.state();
            if state.phase != SessionPhase::LoggedOut || state.session.token.is_some() {
                tracing::debug!("session already initialized");
                return;
            }
        }

        let StoredCredentials { token, profile } = self.store.load();
        let (token, profile) = match (token, profile) {
            (Some(token), Some(profile)) => (token, profile),
            (None, None) => {
                tracing::debug!("no stored session");
                return;
            }
            _ => {
                tracing::info!("discarding incomplete stored session");
                if let Err(e) = self.store.clear() {
                    tracing::warn!("failed to clear stored credentials: {e}");
                }
                return;
            }
        };

        let username = profile.username.clone();
        let epoch = {
            let mut state = self.state();
            state.epoch += 1;
            state.session = Session {
                token: Some(token),
                profile: Some(profile),
            };
            state.phase = SessionPhase::LoggedIn;
            self.publish(&mut state);
            state.epoch
        };
        tracing::info!(username = %username, "restored stored session");

        if !self.validate_on_start {
            return;
        }

        match self.gateway.current_user().await {
            Ok(profile) => {
                let mut state = self.state();
                if state.epoch != epoch {
                    tracing::debug!("session changed during validation; ignoring result");
                    return;
                }
                if let Err(e) = self.store.save_profile(&profile) {
                    tracing::warn!("failed to persist validated profile: {e}");
                }
                state.session.profile = Some(profile);
                self.publish(&mut state);
                tracing::info!(username = %username, "stored session validated");
            }
            Err(err) => {
                tracing::warn!(username = %username, "stored session rejected: {err}");
                let mut state = self.state();
                if state.epoch == epoch {
                    self.reset_locked(&mut state);
                }
            }
        }
    }

    /// Exchange credentials for a session.
    ///
    /// Allowed from `LoggedOut` and `LoggedIn`; a concurrent login or logout
    /// yields [`AuthError::SessionBusy`]. If a logout lands while the request
    /// is in flight the response is dropped and [`AuthError::Superseded`]
    /// is returned.
    pub async fn login(&self, username: &str, password: &str) -> AuthResult<()> {
        let epoch = {
            let mut state = self.state();
            if state.phase.is_busy() {
                tracing::warn!(username, phase = ?state.phase, "login rejected: session busy");
                return Err(AuthError::SessionBusy);
            }
            state.phase = SessionPhase::LoggingIn;
            self.publish(&mut state);
            state.epoch
        };

        tracing::info!(username, "logging in");
        let result = self.gateway.login(username, password).await;

        let mut state = self.state();
        if state.epoch != epoch {
            tracing::info!(username, "login response arrived after logout; discarding");
            return Err(AuthError::Superseded);
        }

        match result {
            Ok(LoginPayload { token, user_info }) => {
                if let Err(e) = self.store.save(&token, &user_info) {
                    tracing::warn!("failed to persist session: {e}");
                }
                state.epoch += 1;
                state.session = Session {
                    token: Some(token),
                    profile: Some(user_info),
                };
                state.phase = SessionPhase::LoggedIn;
                self.publish(&mut state);
                tracing::info!(username, "login succeeded");
                Ok(())
            }
            Err(err) => {
                state.phase = if state.session.is_authenticated() {
                    SessionPhase::LoggedIn
                } else {
                    SessionPhase::LoggedOut
                };
                self.publish(&mut state);
                let err = AuthError::from_login_failure(err);
                tracing::warn!(username, "login failed: {err}");
                Err(err)
            }
        }
    }

    /// End the session.
    ///
    /// The backend is told on a best-effort basis; local state is cleared
    /// whatever it answers. A no-op when already logged out.
    pub async fn logout(&self) -> AuthResult<()> {
        let (epoch, had_token) = {
            let mut state = self.state();
            match state.phase {
                SessionPhase::LoggedOut => {
                    tracing::debug!("logout while logged out; nothing to do");
                    return Ok(());
                }
                SessionPhase::LoggingOut => {
                    tracing::warn!("logout rejected: already logging out");
                    return Err(AuthError::SessionBusy);
                }
                SessionPhase::LoggingIn | SessionPhase::LoggedIn => {}
            }
            state.epoch += 1;
            state.phase = SessionPhase::LoggingOut;
            self.publish(&mut state);
            (state.epoch, state.session.token.is_some())
        };

        if had_token {
            if let Err(err) = self.gateway.logout().await {
                tracing::warn!("backend logout failed, clearing local session anyway: {err}");
            }
        }

        let mut state = self.state();
        if state.epoch == epoch {
            self.reset_locked(&mut state);
        } else {
            tracing::debug!("session was reset while logging out");
        }
        tracing::info!("logged out");
        Ok(())
    }

    /// Drop the session immediately, without talking to the backend.
    pub fn force_reset(&self, reason: &str) {
        let mut state = self.state();
        tracing::warn!(reason, phase = ?state.phase, "forcing session reset");
        self.reset_locked(&mut state);
    }

    /// Swap the current token for a fresh one from `POST /auth/refresh`.
    pub async fn refresh_token(&self) -> AuthResult<()> {
        let epoch = self.require_logged_in()?;
        let token = self.gateway.refresh_token().await.map_err(AuthError::from)?;

        let mut state = self.state();
        if state.epoch != epoch || state.phase != SessionPhase::LoggedIn {
            return Err(AuthError::Superseded);
        }
        if let Err(e) = self.store.save_token(&token) {
            tracing::warn!("failed to persist refreshed token: {e}");
        }
        state.session.token = Some(token);
        self.publish(&mut state);
        tracing::info!("token refreshed");
        Ok(())
    }

    /// Replace the profile with a fresh copy from `GET /auth/user`.
    pub async fn reload_profile(&self) -> AuthResult<()> {
        let epoch = self.require_logged_in()?;
        let profile = self.gateway.current_user().await.map_err(AuthError::from)?;

        let mut state = self.state();
        if state.epoch != epoch || state.phase != SessionPhase::LoggedIn {
            return Err(AuthError::Superseded);
        }
        if let Err(e) = self.store.save_profile(&profile) {
            tracing::warn!("failed to persist reloaded profile: {e}");
        }
        state.session.profile = Some(profile);
        self.publish(&mut state);
        Ok(())
    }

    /// Shallow-merge `patch` into the profile and persist it.
    ///
    /// Ignored when nobody is signed in.
    pub fn update_profile(&self, patch: ProfilePatch) {
        let mut state = self.state();
        let Some(profile) = state.session.profile.as_mut() else {
            tracing::debug!("profile update ignored: no profile");
            return;
        };
        profile.merge(patch);
        if let Err(e) = self.store.save_profile(profile) {
            tracing::warn!("failed to persist updated profile: {e}");
        }
        self.publish(&mut state);
    }

    fn require_logged_in(&self) -> AuthResult<u64> {
        let state = self.state();
        if state.phase == SessionPhase::LoggedIn && state.session.is_authenticated() {
            Ok(state.epoch)
        } else {
            Err(AuthError::NotAuthenticated)
        }
    }

    // ── queries ──────────────────────────────────────────────────────────────

    pub fn snapshot(&self) -> SessionSnapshot {
        self.updates.borrow().clone()
    }

    /// Receiver that sees every published change.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.updates.subscribe()
    }

    pub fn phase(&self) -> SessionPhase {
        self.state().phase
    }

    pub fn is_authenticated(&self) -> bool {
        self.state().session.is_authenticated()
    }

    pub fn token(&self) -> Option<String> {
        self.state().session.token.clone()
    }

    pub fn profile(&self) -> Option<UserProfile> {
        self.state().session.profile.clone()
    }

    pub fn username(&self) -> Option<String> {
        self.state().session.profile.as_ref().map(|p| p.username.clone())
    }

    pub fn permissions(&self) -> Vec<Permission> {
        self.with_profile(|p| p.permissions.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn roles(&self) -> Vec<Role> {
        self.with_profile(|p| p.roles.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn has_permission(&self, name: &str) -> bool {
        self.with_profile(|p| p.has_permission(name)).unwrap_or(false)
    }

    pub fn has_role(&self, name: &str) -> bool {
        self.with_profile(|p| p.has_role(name)).unwrap_or(false)
    }

    pub fn has_any_permission<I, S>(&self, names: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.with_profile(|p| p.has_any_permission(names)).unwrap_or(false)
    }

    pub fn has_all_permissions<I, S>(&self, names: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.with_profile(|p| p.has_all_permissions(names)).unwrap_or(false)
    }

    fn with_profile<R>(&self, f: impl FnOnce(&UserProfile) -> R) -> Option<R> {
        let state = self.state();
        if !state.session.is_authenticated() {
            return None;
        }
        state.session.profile.as_ref().map(f)
    }
}

impl AuthContext for SessionManager {
    fn bearer_token(&self) -> Option<String> {
        self.token()
    }

    fn on_unauthorized(&self, err: &ApiError, sent_token: &str) {
        let mut state = self.state();
        if state.session.token.as_deref() != Some(sent_token) {
            tracing::debug!("401 for a token that is no longer current; session kept");
            return;
        }
        tracing::warn!(phase = ?state.phase, "forcing session reset: {err}");
        self.reset_locked(&mut state);
    }
}
