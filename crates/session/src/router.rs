//! Route table, locations and the guarded navigation loop.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use nova_auth::{Permission, Role};

/// Upper bound on guard redirects within one navigation.
pub const MAX_REDIRECTS: usize = 10;

/// Path that matches any location no other record matches.
pub const CATCH_ALL: &str = "*";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NavigationError {
    #[error("no route matches '{0}'")]
    NoMatch(String),

    #[error("too many redirects while navigating to '{0}'")]
    RedirectLoop(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// Locations
// ─────────────────────────────────────────────────────────────────────────────

/// A navigation target: a path plus ordered query pairs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Location {
    pub path: String,
    pub query: Vec<(String, String)>,
}

impl Location {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: Vec::new(),
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Parse `"/path?a=1&b=2#frag"`. Query values are percent-decoded and the
    /// fragment is dropped.
    pub fn parse(target: &str) -> Self {
        let target = target.split('#').next().unwrap_or_default();
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, query),
            None => (target, ""),
        };

        let query = query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                (decode(key), decode(value))
            })
            .collect();

        let path = if path.is_empty() { "/" } else { path };
        Self {
            path: path.to_string(),
            query,
        }
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Path plus percent-encoded query string.
    pub fn full_path(&self) -> String {
        if self.query.is_empty() {
            return self.path.clone();
        }
        let query: Vec<String> = self
            .query
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect();
        format!("{}?{}", self.path, query.join("&"))
    }
}

fn decode(raw: &str) -> String {
    let raw = raw.replace('+', " ");
    match urlencoding::decode(&raw) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => raw,
    }
}

impl From<&str> for Location {
    fn from(target: &str) -> Self {
        Self::parse(target)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Route records
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteMeta {
    /// `None` defers to the configured list of public paths.
    pub requires_auth: Option<bool>,
    pub title: Option<String>,
    /// Any one of these roles admits the user.
    pub required_roles: Vec<Role>,
    /// Any one of these permissions admits the user.
    pub required_permissions: Vec<Permission>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRecord {
    pub path: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub meta: RouteMeta,
}

impl RouteRecord {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: None,
            meta: RouteMeta::default(),
        }
    }

    pub fn catch_all() -> Self {
        Self::new(CATCH_ALL)
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.meta.title = Some(title.into());
        self
    }

    pub fn public(mut self) -> Self {
        self.meta.requires_auth = Some(false);
        self
    }

    pub fn protected(mut self) -> Self {
        self.meta.requires_auth = Some(true);
        self
    }

    pub fn roles<I, R>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<Role>,
    {
        self.meta.required_roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn permissions<I, P>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Permission>,
    {
        self.meta.required_permissions = permissions.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_catch_all(&self) -> bool {
        self.path == CATCH_ALL
    }
}

/// A location resolved against the route table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub location: Location,
    pub record: Arc<RouteRecord>,
}

impl Route {
    pub fn path(&self) -> &str {
        &self.location.path
    }

    pub fn full_path(&self) -> String {
        self.location.full_path()
    }

    pub fn meta(&self) -> &RouteMeta {
        &self.record.meta
    }

    pub fn name(&self) -> Option<&str> {
        self.record.name.as_deref()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Hooks
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome of a before-guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Redirect(Location),
}

/// Runs before every transition; may veto it with a redirect.
#[async_trait]
pub trait Guard: Send + Sync {
    async fn before_each(&self, from: Option<&Route>, to: &Route) -> Decision;
}

/// Runs after a transition is committed.
pub trait AfterHook: Send + Sync {
    fn after_each(&self, to: &Route, from: Option<&Route>);
}

/// A committed navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigation {
    pub requested: Location,
    pub route: Route,
    pub redirects: usize,
}

impl Navigation {
    pub fn was_redirected(&self) -> bool {
        self.redirects > 0
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

pub struct Router {
    routes: RwLock<Vec<Arc<RouteRecord>>>,
    guards: RwLock<Vec<Arc<dyn Guard>>>,
    after_hooks: RwLock<Vec<Arc<dyn AfterHook>>>,
    /// Holding this lock is what serializes transitions.
    current: tokio::sync::Mutex<Option<Route>>,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let routes = self.routes.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("Router")
            .field("routes", &routes.iter().map(|r| r.path.as_str()).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Router {
    pub fn new(routes: Vec<RouteRecord>) -> Self {
        Self {
            routes: RwLock::new(routes.into_iter().map(Arc::new).collect()),
            guards: RwLock::new(Vec::new()),
            after_hooks: RwLock::new(Vec::new()),
            current: tokio::sync::Mutex::new(None),
        }
    }

    /// Append routes. Exact matches are tried before the catch-all, so order
    /// only matters between records with the same path.
    pub fn add_routes(&self, routes: impl IntoIterator<Item = RouteRecord>) {
        let mut table = self.routes.write().unwrap_or_else(PoisonError::into_inner);
        table.extend(routes.into_iter().map(Arc::new));
    }

    pub fn before_each(&self, guard: Arc<dyn Guard>) {
        self.guards
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(guard);
    }

    pub fn after_each(&self, hook: Arc<dyn AfterHook>) {
        self.after_hooks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(hook);
    }

    pub fn has_route(&self, path: &str) -> bool {
        let table = self.routes.read().unwrap_or_else(PoisonError::into_inner);
        table.iter().any(|r| r.path == path)
    }

    /// Match `location` to a record: exact path first, then the catch-all.
    pub fn resolve(&self, location: Location) -> Result<Route, NavigationError> {
        let table = self.routes.read().unwrap_or_else(PoisonError::into_inner);
        let record = table
            .iter()
            .find(|r| r.path == location.path)
            .or_else(|| table.iter().find(|r| r.is_catch_all()))
            .cloned()
            .ok_or_else(|| NavigationError::NoMatch(location.full_path()))?;
        Ok(Route { location, record })
    }

    /// The committed route, if any navigation has happened yet.
    pub async fn current(&self) -> Option<Route> {
        self.current.lock().await.clone()
    }

    /// Navigate to `target`, running every guard until one redirects or all
    /// allow. Redirects restart the chain on the new target.
    ///
    /// Concurrent calls are applied one after another.
    pub async fn navigate(&self, target: impl Into<Location>) -> Result<Navigation, NavigationError> {
        let requested = target.into();
        let mut current = self.current.lock().await;

        let guards: Vec<Arc<dyn Guard>> = self
            .guards
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut to = self.resolve(requested.clone())?;
        let mut redirects = 0;

        loop {
            match run_guards(&guards, current.as_ref(), &to).await {
                Decision::Allow => break,
                Decision::Redirect(next) => {
                    redirects += 1;
                    if redirects > MAX_REDIRECTS {
                        tracing::error!(location = %requested.full_path(), "navigation redirect loop");
                        return Err(NavigationError::RedirectLoop(requested.full_path()));
                    }
                    tracing::debug!(from = %to.full_path(), to = %next.full_path(), "guard redirect");
                    to = self.resolve(next)?;
                }
            }
        }

        let previous = current.replace(to.clone());

        let hooks: Vec<Arc<dyn AfterHook>> = self
            .after_hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for hook in &hooks {
            hook.after_each(&to, previous.as_ref());
        }

        Ok(Navigation {
            requested,
            route: to,
            redirects,
        })
    }
}

async fn run_guards(guards: &[Arc<dyn Guard>], from: Option<&Route>, to: &Route) -> Decision {
    for guard in guards {
        if let Decision::Redirect(next) = guard.before_each(from, to).await {
            return Decision::Redirect(next);
        }
    }
    Decision::Allow
}
