//! Application wiring.
//!
//! Builds the gateway, session, menu, guard and router in dependency order,
//! restores any persisted session before the first navigation and installs
//! plugins last.

use std::sync::Arc;

use thiserror::Error;

use nova_auth::MenuNode;
use nova_core::{ApiError, AuthError, ClientConfig};

use crate::gateway::{AuthContext, HttpGateway};
use crate::guard::NavigationGuard;
use crate::menu::{MenuService, MenuSource, admin_menu};
use crate::plugin::PluginRegistry;
use crate::router::{Location, Navigation, NavigationError, RouteRecord, Router};
use crate::session::SessionManager;
use crate::storage::{CredentialStore, FileStorage, KeyValueStorage};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to build http gateway: {0}")]
    Gateway(#[from] ApiError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Navigation(#[from] NavigationError),
}

/// Shared services of a running admin client.
#[derive(Debug, Clone)]
pub struct App {
    pub config: Arc<ClientConfig>,
    pub gateway: Arc<HttpGateway>,
    pub session: Arc<SessionManager>,
    pub menu: Arc<MenuService>,
    pub guard: Arc<NavigationGuard>,
    pub router: Arc<Router>,
    pub plugins: Arc<PluginRegistry>,
}

impl App {
    /// Wire everything together and restore the persisted session.
    ///
    /// Guards are registered only after the session is initialized, so the
    /// first navigation already sees the restored state.
    pub async fn bootstrap(
        config: ClientConfig,
        storage: Arc<dyn KeyValueStorage>,
        routes: Vec<RouteRecord>,
        menu: Vec<MenuNode>,
    ) -> Result<Self, AppError> {
        Self::bootstrap_with_plugins(config, storage, routes, menu, PluginRegistry::new()).await
    }

    /// [`App::bootstrap`], then install `plugins` against the wired app.
    ///
    /// Plugin failures are logged and never fail the bootstrap.
    pub async fn bootstrap_with_plugins(
        config: ClientConfig,
        storage: Arc<dyn KeyValueStorage>,
        routes: Vec<RouteRecord>,
        menu: Vec<MenuNode>,
        plugins: PluginRegistry,
    ) -> Result<Self, AppError> {
        let config = Arc::new(config);
        let gateway = Arc::new(HttpGateway::new(&config.api)?);
        let store = CredentialStore::new(storage, &config.storage);
        let session = SessionManager::new(gateway.clone(), store, config.validate_on_start);

        session.initialize().await;

        let menu = Arc::new(MenuService::new(menu, session.clone()));
        if let Some(path) = config.menu_endpoint.as_deref() {
            menu.load_from(&gateway, path).await;
        }
        let guard = Arc::new(NavigationGuard::new(session.clone(), menu.clone(), &config));
        let router = Arc::new(Router::new(routes));
        router.before_each(guard.clone());
        router.after_each(guard.clone());

        let app = Self {
            config,
            gateway,
            session,
            menu,
            guard,
            router,
            plugins: Arc::new(plugins),
        };
        let installed = app.plugins.install_all(&app).await;

        tracing::info!(
            app = %app.config.app_name,
            api = %app.gateway.base_url(),
            authenticated = app.session.is_authenticated(),
            plugins = installed,
            "admin client ready"
        );
        Ok(app)
    }

    /// Fetch the menu tree again from `path`, falling back to the built-in
    /// one on failure.
    pub async fn reload_menu(&self, path: &str) -> MenuSource {
        self.menu.load_from(&self.gateway, path).await
    }

    /// Bootstrap the admin application with file-backed storage.
    pub async fn bootstrap_default(config: ClientConfig) -> anyhow::Result<Self> {
        let storage = Arc::new(FileStorage::from_config(&config.storage)?);
        let app = Self::bootstrap(config, storage, admin_routes(), admin_menu()).await?;
        Ok(app)
    }

    pub async fn navigate(&self, target: &str) -> Result<Navigation, AppError> {
        Ok(self.router.navigate(target).await?)
    }

    /// Sign in, then continue to the `redirect` target the guard attached to
    /// the login page, or to the home page.
    pub async fn login(&self, username: &str, password: &str) -> Result<Navigation, AppError> {
        self.session.login(username, password).await?;

        let redirect = self
            .router
            .current()
            .await
            .filter(|route| route.path() == self.config.routes.login_path)
            .and_then(|route| route.location.query_value("redirect").map(str::to_string))
            .filter(|target| is_local_path(target));

        let target = redirect.unwrap_or_else(|| self.config.routes.home_path.clone());
        Ok(self.router.navigate(Location::parse(&target)).await?)
    }

    /// Sign out and return to the login page.
    pub async fn logout(&self) -> Result<Navigation, AppError> {
        self.session.logout().await?;
        Ok(self.router.navigate(self.config.routes.login_path.as_str()).await?)
    }

    /// Bearer token the gateway would attach right now.
    pub fn bearer_token(&self) -> Option<String> {
        self.session.bearer_token()
    }
}

/// Only same-origin absolute paths are followed after login.
fn is_local_path(target: &str) -> bool {
    target.starts_with('/') && !target.starts_with("//")
}

/// Route table of the admin application.
pub fn admin_routes() -> Vec<RouteRecord> {
    vec![
        RouteRecord::new("/").name("home").title("Home"),
        RouteRecord::new("/login").name("login").title("Login").public(),
        RouteRecord::new("/403").name("forbidden").title("Forbidden").public(),
        RouteRecord::new("/dashboard")
            .name("dashboard")
            .title("Dashboard")
            .permissions(["dashboard"]),
        RouteRecord::new("/system/user")
            .name("system-user")
            .title("Users")
            .permissions(["users"]),
        RouteRecord::new("/system/role")
            .name("system-role")
            .title("Roles")
            .permissions(["roles"]),
        RouteRecord::new("/system/menu")
            .name("system-menu")
            .title("Menus")
            .permissions(["menus"]),
        RouteRecord::new("/content/article")
            .name("content-article")
            .title("Articles")
            .permissions(["articles"]),
        RouteRecord::new("/content/category")
            .name("content-category")
            .title("Categories")
            .permissions(["categories"]),
        RouteRecord::new("/monitor/online")
            .name("monitor-online")
            .title("Online users")
            .permissions(["online_users"]),
        RouteRecord::new("/monitor/log")
            .name("monitor-log")
            .title("Operation logs")
            .permissions(["operation_logs"]),
        RouteRecord::catch_all().name("not-found").title("Not Found").public(),
    ]
}
