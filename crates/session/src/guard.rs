//! Authentication and authorization checks on navigation.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

use nova_auth::authorize_route;
use nova_core::{ClientConfig, RouteConfig};

use crate::menu::MenuService;
use crate::router::{AfterHook, Decision, Guard, Location, Route};
use crate::session::{SessionManager, SessionSnapshot};

/// Decides whether a route may be entered, and keeps the page title and the
/// active menu entry in step with committed navigations.
///
/// Reads session state only; never touches the network.
#[derive(Debug)]
pub struct NavigationGuard {
    session: Arc<SessionManager>,
    menu: Arc<MenuService>,
    routes: RouteConfig,
    app_name: String,
    title: RwLock<String>,
}

impl NavigationGuard {
    pub fn new(session: Arc<SessionManager>, menu: Arc<MenuService>, config: &ClientConfig) -> Self {
        Self {
            session,
            menu,
            routes: config.routes.clone(),
            app_name: config.app_name.clone(),
            title: RwLock::new(config.app_name.clone()),
        }
    }

    /// Guard decision for entering `to`.
    ///
    /// 1. A signed-in user asking for the login page goes home.
    /// 2. A protected route without a session goes to login, carrying the
    ///    original target as `redirect`.
    /// 3. A signed-in user lacking the route's roles or permissions goes to
    ///    the forbidden page.
    /// 4. Anything else is allowed.
    pub fn evaluate(&self, to: &Route) -> Decision {
        self.decide(&self.session.snapshot(), to)
    }

    /// Every step reads the same `snapshot`, so a reset landing mid-decision
    /// cannot mix two sessions.
    fn decide(&self, snapshot: &SessionSnapshot, to: &Route) -> Decision {
        let authenticated = snapshot.is_authenticated();

        if authenticated && to.path() == self.routes.login_path {
            tracing::debug!("already signed in; leaving login page");
            return Decision::Redirect(Location::new(&self.routes.home_path));
        }

        if !authenticated && self.requires_auth(to) {
            tracing::debug!(target_path = %to.full_path(), "sign-in required");
            return Decision::Redirect(
                Location::new(&self.routes.login_path).with_query("redirect", to.full_path()),
            );
        }

        if authenticated {
            let meta = to.meta();
            if let Err(e) = authorize_route(
                snapshot.profile(),
                &meta.required_roles,
                &meta.required_permissions,
            ) {
                tracing::info!(path = %to.path(), "navigation denied: {e}");
                return Decision::Redirect(Location::new(&self.routes.forbidden_path));
            }
        }

        Decision::Allow
    }

    fn requires_auth(&self, route: &Route) -> bool {
        route
            .meta()
            .requires_auth
            .unwrap_or_else(|| !self.routes.is_public(route.path()))
    }

    /// `"<route title> - <app name>"`, or the app name alone.
    pub fn title_for(&self, route: &Route) -> String {
        match route.meta().title.as_deref() {
            Some(title) if !title.is_empty() => format!("{} - {}", title, self.app_name),
            _ => self.app_name.clone(),
        }
    }

    pub fn page_title(&self) -> String {
        self.title
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Guard for NavigationGuard {
    async fn before_each(&self, _from: Option<&Route>, to: &Route) -> Decision {
        self.evaluate(to)
    }
}

impl AfterHook for NavigationGuard {
    fn after_each(&self, to: &Route, from: Option<&Route>) {
        let title = self.title_for(to);
        *self.title.write().unwrap_or_else(PoisonError::into_inner) = title;
        self.menu.set_active_path(to.path());
        tracing::info!(
            from = %from.map(Route::full_path).unwrap_or_default(),
            to = %to.full_path(),
            "route changed"
        );
    }
}
