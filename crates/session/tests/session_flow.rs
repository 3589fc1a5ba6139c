//! End-to-end session flows against the mock backend over real HTTP.

use std::sync::Arc;
use std::time::Duration;

use nova_core::{ApiError, AuthError, ClientConfig};
use nova_mock::{MockState, build_app};
use async_trait::async_trait;
use nova_session::{
    App, CredentialStore, FileStorage, KeyValueStorage, Location, MemoryStorage, MenuSource,
    Plugin, PluginRegistry, SessionPhase, admin_menu, admin_routes,
};

struct TestServer {
    base_url: String,
    state: Arc<MockState>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        Self::spawn_with(MockState::new()).await
    }

    async fn spawn_with(state: MockState) -> Self {
        let state = Arc::new(state);
        let app = build_app(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}/api", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            state,
            handle,
        }
    }

    fn config(&self) -> ClientConfig {
        let mut config = ClientConfig::default();
        config.api.base_url = self.base_url.clone();
        config.api.timeout_ms = 5_000;
        config
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn app_with(config: ClientConfig, storage: Arc<dyn KeyValueStorage>) -> App {
    App::bootstrap(config, storage, admin_routes(), admin_menu())
        .await
        .expect("bootstrap failed")
}

fn stored(storage: Arc<dyn KeyValueStorage>, config: &ClientConfig) -> nova_session::StoredCredentials {
    CredentialStore::new(storage, &config.storage).load()
}

fn ids(app: &App) -> Vec<String> {
    app.menu
        .visible()
        .iter()
        .map(|n| n.id.to_string())
        .collect()
}

async fn wait_for_phase(app: &App, phase: SessionPhase) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while app.session.phase() != phase {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("session never reached the expected phase");
}

// ─────────────────────────────────────────────────────────────────────────────
// Login / logout
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn admin_login_persists_session_and_shows_full_menu() {
    let srv = TestServer::spawn().await;
    let config = srv.config();
    let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new());
    let app = app_with(config.clone(), storage.clone()).await;

    app.session.login("admin", "admin123456").await.unwrap();

    assert_eq!(app.session.phase(), SessionPhase::LoggedIn);
    assert!(app.session.has_permission("anything"));

    let persisted = stored(storage, &config);
    assert_eq!(persisted.token, app.session.token());
    assert_eq!(persisted.profile.unwrap().username, "admin");

    assert_eq!(ids(&app), vec!["dashboard", "system", "content", "monitor"]);

    let nav = app.navigate("/system/role").await.unwrap();
    assert_eq!(nav.route.path(), "/system/role");
    assert_eq!(app.guard.page_title(), "Roles - Nova Admin");
    assert_eq!(app.menu.active_id().unwrap().as_str(), "system-role");
}

#[tokio::test]
async fn editor_sees_granted_menu_and_is_forbidden_elsewhere() {
    let srv = TestServer::spawn().await;
    let app = app_with(srv.config(), Arc::new(MemoryStorage::new())).await;

    app.session.login("editor", "editor123456").await.unwrap();

    assert!(app.session.has_permission("users"));
    assert!(!app.session.has_permission("roles"));

    let visible = app.menu.visible();
    assert_eq!(ids(&app), vec!["dashboard", "system"]);
    let children: Vec<&str> = visible[1].children.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(children, vec!["system-user"]);

    let nav = app.navigate("/system/role").await.unwrap();
    assert_eq!(nav.route.path(), "/403");
    assert!(nav.was_redirected());

    let nav = app.navigate("/system/user").await.unwrap();
    assert_eq!(nav.route.path(), "/system/user");
}

#[tokio::test]
async fn bad_credentials_leave_session_logged_out() {
    let srv = TestServer::spawn().await;
    let storage = Arc::new(MemoryStorage::new());
    let app = app_with(srv.config(), storage.clone()).await;

    let err = app.session.login("admin", "wrong").await.unwrap_err();

    assert_eq!(err, AuthError::InvalidCredentials);
    assert_eq!(app.session.phase(), SessionPhase::LoggedOut);
    assert!(storage.is_empty());
}

#[tokio::test]
async fn logout_clears_everything_and_is_idempotent() {
    let srv = TestServer::spawn().await;
    let storage = Arc::new(MemoryStorage::new());
    let app = app_with(srv.config(), storage.clone()).await;

    app.session.login("admin", "admin123456").await.unwrap();
    assert_eq!(srv.state.active_tokens(), 1);

    let nav = app.logout().await.unwrap();
    assert_eq!(nav.route.path(), "/login");
    assert!(!app.session.is_authenticated());
    assert!(storage.is_empty());
    assert!(app.menu.visible().is_empty());
    assert_eq!(srv.state.active_tokens(), 0);

    app.session.logout().await.unwrap();
    assert_eq!(app.session.phase(), SessionPhase::LoggedOut);
}

#[tokio::test]
async fn unreachable_backend_is_a_network_error() {
    let mut config = ClientConfig::default();
    config.api.base_url = "http://127.0.0.1:9/api".to_string();
    config.api.timeout_ms = 2_000;
    let app = app_with(config, Arc::new(MemoryStorage::new())).await;

    let err = app.session.login("admin", "admin123456").await.unwrap_err();
    assert!(matches!(err, AuthError::NetworkError(_)), "{err:?}");
    assert_eq!(app.session.phase(), SessionPhase::LoggedOut);
}

// ─────────────────────────────────────────────────────────────────────────────
// Navigation
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn anonymous_navigation_returns_after_login() {
    let srv = TestServer::spawn().await;
    let app = app_with(srv.config(), Arc::new(MemoryStorage::new())).await;

    let nav = app.navigate("/system/user").await.unwrap();
    assert_eq!(
        nav.route.location,
        Location::new("/login").with_query("redirect", "/system/user")
    );
    assert_eq!(nav.route.full_path(), "/login?redirect=%2Fsystem%2Fuser");
    assert_eq!(app.guard.page_title(), "Login - Nova Admin");

    let nav = app.login("editor", "editor123456").await.unwrap();
    assert_eq!(nav.route.path(), "/system/user");
}

#[tokio::test]
async fn signed_in_user_is_bounced_off_login_page() {
    let srv = TestServer::spawn().await;
    let app = app_with(srv.config(), Arc::new(MemoryStorage::new())).await;
    app.session.login("admin", "admin123456").await.unwrap();

    let nav = app.navigate("/login").await.unwrap();
    assert_eq!(nav.route.path(), "/");
    assert_eq!(app.guard.page_title(), "Home - Nova Admin");
}

#[tokio::test]
async fn unknown_paths_hit_the_catch_all() {
    let srv = TestServer::spawn().await;
    let app = app_with(srv.config(), Arc::new(MemoryStorage::new())).await;

    let nav = app.navigate("/does/not/exist").await.unwrap();
    assert!(nav.route.record.is_catch_all());
    assert_eq!(nav.route.path(), "/does/not/exist");
}

// ─────────────────────────────────────────────────────────────────────────────
// Token invalidation
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn unauthorized_response_forces_logout() {
    let srv = TestServer::spawn().await;
    let storage = Arc::new(MemoryStorage::new());
    let app = app_with(srv.config(), storage.clone()).await;
    app.session.login("admin", "admin123456").await.unwrap();

    let stats: serde_json::Value = app.gateway.get_json("/dashboard/stats").await.unwrap();
    assert_eq!(stats["totalUsers"], 1250);

    let mut updates = app.session.subscribe();
    srv.state.revoke_all();

    let err = app
        .gateway
        .get_json::<serde_json::Value>("/dashboard/stats")
        .await
        .unwrap_err();
    assert!(err.is_unauthorized());

    assert!(updates.has_changed().unwrap());
    assert_eq!(updates.borrow_and_update().phase, SessionPhase::LoggedOut);
    assert!(!app.session.is_authenticated());
    assert!(storage.is_empty());

    let nav = app.navigate("/dashboard").await.unwrap();
    assert_eq!(nav.route.path(), "/login");
}

#[tokio::test]
async fn late_unauthorized_for_an_old_token_spares_the_new_session() {
    let srv = TestServer::spawn_with(MockState::new().with_stats_delay(Duration::from_millis(300))).await;
    let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new());
    let config = srv.config();
    let app = app_with(config.clone(), storage.clone()).await;

    app.session.login("admin", "admin123456").await.unwrap();
    let old = app.session.token().unwrap();

    let gateway = app.gateway.clone();
    let slow = tokio::spawn(async move {
        gateway.get_json::<serde_json::Value>("/dashboard/stats").await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    app.session.logout().await.unwrap();
    app.session.login("admin", "admin123456").await.unwrap();
    let new = app.session.token().unwrap();
    assert_ne!(old, new);

    let err = slow.await.unwrap().unwrap_err();
    assert!(err.is_unauthorized(), "{err:?}");

    assert!(app.session.is_authenticated());
    assert_eq!(app.session.token().as_deref(), Some(new.as_str()));
    assert_eq!(stored(storage, &config).token, Some(new));
}

#[tokio::test]
async fn refresh_swaps_the_token() {
    let srv = TestServer::spawn().await;
    let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new());
    let config = srv.config();
    let app = app_with(config.clone(), storage.clone()).await;
    app.session.login("admin", "admin123456").await.unwrap();

    let before = app.session.token().unwrap();
    app.session.refresh_token().await.unwrap();
    let after = app.session.token().unwrap();

    assert_ne!(before, after);
    assert_eq!(stored(storage, &config).token.as_deref(), Some(after.as_str()));

    app.session.reload_profile().await.unwrap();
    assert_eq!(app.session.username().as_deref(), Some("admin"));
}

#[tokio::test]
async fn requests_carry_cache_busting_parameter_when_enabled() {
    let srv = TestServer::spawn().await;
    let mut config = srv.config();
    config.api.cache_bust = true;
    let app = app_with(config, Arc::new(MemoryStorage::new())).await;

    app.session.login("admin", "admin123456").await.unwrap();
    let err = app.gateway.get_json::<serde_json::Value>("/missing").await.unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)), "{err:?}");
    assert!(app.session.is_authenticated());
}

// ─────────────────────────────────────────────────────────────────────────────
// Menu and plugins
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn backend_menu_replaces_the_built_in_one_until_it_fails() {
    let srv = TestServer::spawn().await;
    let app = app_with(srv.config(), Arc::new(MemoryStorage::new())).await;
    app.session.login("admin", "admin123456").await.unwrap();
    assert_eq!(ids(&app), vec!["dashboard", "system", "content", "monitor"]);

    assert_eq!(app.reload_menu("/menus").await, MenuSource::Remote);
    assert_eq!(ids(&app), vec!["dashboard", "system", "reports"]);
    assert_eq!(app.menu.breadcrumbs("/reports/sales").len(), 2);

    assert_eq!(app.reload_menu("/no-such-menu").await, MenuSource::Fallback);
    assert_eq!(ids(&app), vec!["dashboard", "system", "content", "monitor"]);
    assert!(app.session.is_authenticated());
}

#[tokio::test]
async fn restored_session_loads_backend_menu_on_start() {
    let srv = TestServer::spawn().await;
    let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new());
    let mut config = srv.config();
    config.menu_endpoint = Some("/menus".to_string());

    let app = app_with(config.clone(), storage.clone()).await;
    assert_eq!(app.menu.tree().len(), admin_menu().len());
    app.session.login("editor", "editor123456").await.unwrap();

    let app = app_with(config, storage).await;
    assert_eq!(app.session.username().as_deref(), Some("editor"));
    assert_eq!(ids(&app), vec!["dashboard", "system"]);
    assert!(app.menu.find_by_path("/reports/sales").is_none());
    assert!(app.menu.tree().iter().any(|n| n.id.as_str() == "reports"));
}

struct GreetingPlugin {
    seen: Arc<std::sync::Mutex<Option<String>>>,
}

#[async_trait]
impl Plugin for GreetingPlugin {
    fn name(&self) -> &str {
        "greeting"
    }

    async fn install(&self, app: &App) -> anyhow::Result<()> {
        *self.seen.lock().unwrap() = app.session.username();
        Ok(())
    }
}

#[tokio::test]
async fn plugins_install_after_the_session_is_restored() {
    let srv = TestServer::spawn().await;
    let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new());
    let config = srv.config();
    {
        let app = app_with(config.clone(), storage.clone()).await;
        app.session.login("admin", "admin123456").await.unwrap();
    }

    let seen = Arc::new(std::sync::Mutex::new(None));
    let plugins = PluginRegistry::new();
    plugins.register(Arc::new(GreetingPlugin { seen: seen.clone() }));

    let app = App::bootstrap_with_plugins(config, storage, admin_routes(), admin_menu(), plugins)
        .await
        .unwrap();

    assert!(app.plugins.is_registered("greeting"));
    assert_eq!(seen.lock().unwrap().as_deref(), Some("admin"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Restart
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn session_survives_restart_when_backend_accepts_it() {
    let srv = TestServer::spawn().await;
    let dir = tempfile::tempdir().unwrap();
    let mut config = srv.config();
    config.storage.dir = Some(dir.path().to_path_buf());

    {
        let storage = Arc::new(FileStorage::from_config(&config.storage).unwrap());
        let app = app_with(config.clone(), storage).await;
        app.session.login("editor", "editor123456").await.unwrap();
    }

    let storage = Arc::new(FileStorage::from_config(&config.storage).unwrap());
    let app = app_with(config, storage).await;

    assert_eq!(app.session.phase(), SessionPhase::LoggedIn);
    assert_eq!(app.session.username().as_deref(), Some("editor"));
    assert_eq!(ids(&app), vec!["dashboard", "system"]);
}

#[tokio::test]
async fn rejected_stored_session_is_cleared_on_start() {
    let srv = TestServer::spawn().await;
    let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new());
    let config = srv.config();

    {
        let app = app_with(config.clone(), storage.clone()).await;
        app.session.login("admin", "admin123456").await.unwrap();
    }
    srv.state.revoke_all();

    let app = app_with(config.clone(), storage.clone()).await;
    assert_eq!(app.session.phase(), SessionPhase::LoggedOut);
    assert!(stored(storage, &config).is_empty());
}

#[tokio::test]
async fn stored_session_is_trusted_when_validation_is_off() {
    let srv = TestServer::spawn().await;
    let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new());
    let mut config = srv.config();
    config.validate_on_start = false;

    {
        let app = app_with(config.clone(), storage.clone()).await;
        app.session.login("admin", "admin123456").await.unwrap();
    }
    srv.state.revoke_all();

    let app = app_with(config, storage).await;
    assert!(app.session.is_authenticated());
}

// ─────────────────────────────────────────────────────────────────────────────
// Concurrency
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn second_login_while_first_is_in_flight_is_busy() {
    let srv = TestServer::spawn_with(MockState::new().with_login_delay(Duration::from_millis(200))).await;
    let app = app_with(srv.config(), Arc::new(MemoryStorage::new())).await;

    let session = app.session.clone();
    let first = tokio::spawn(async move { session.login("admin", "admin123456").await });
    wait_for_phase(&app, SessionPhase::LoggingIn).await;

    assert_eq!(
        app.session.login("editor", "editor123456").await,
        Err(AuthError::SessionBusy)
    );

    first.await.unwrap().unwrap();
    assert_eq!(app.session.username().as_deref(), Some("admin"));
}

#[tokio::test]
async fn logout_supersedes_in_flight_login() {
    let srv = TestServer::spawn_with(MockState::new().with_login_delay(Duration::from_millis(200))).await;
    let storage = Arc::new(MemoryStorage::new());
    let app = app_with(srv.config(), storage.clone()).await;

    let session = app.session.clone();
    let login = tokio::spawn(async move { session.login("admin", "admin123456").await });
    wait_for_phase(&app, SessionPhase::LoggingIn).await;

    app.session.logout().await.unwrap();
    assert_eq!(login.await.unwrap(), Err(AuthError::Superseded));

    assert_eq!(app.session.phase(), SessionPhase::LoggedOut);
    assert!(!app.session.is_authenticated());
    assert!(storage.is_empty());
}
