//! The menu as the signed-in user sees it.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use nova_auth::{MenuNode, Permission, breadcrumbs_for, filter_menu, find_by_path};
use nova_core::MenuId;

use crate::gateway::HttpGateway;
use crate::session::SessionManager;

/// Where the current menu tree came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuSource {
    Remote,
    Fallback,
}

/// Filters the menu tree against the current session.
///
/// The filtered tree is cached per session snapshot version, so repeated
/// reads between session changes cost a version check. Replacing the tree
/// drops the cache.
#[derive(Debug)]
pub struct MenuService {
    tree: RwLock<Arc<Vec<MenuNode>>>,
    fallback: Arc<Vec<MenuNode>>,
    session: Arc<SessionManager>,
    cache: Mutex<Option<(u64, Arc<Vec<MenuNode>>)>>,
    active: RwLock<Option<MenuId>>,
}

impl MenuService {
    /// `tree` is served until a backend menu is loaded, and again whenever
    /// loading fails.
    pub fn new(tree: Vec<MenuNode>, session: Arc<SessionManager>) -> Self {
        let tree = Arc::new(tree);
        Self {
            tree: RwLock::new(Arc::clone(&tree)),
            fallback: tree,
            session,
            cache: Mutex::new(None),
            active: RwLock::new(None),
        }
    }

    /// The unfiltered tree.
    pub fn tree(&self) -> Arc<Vec<MenuNode>> {
        Arc::clone(&self.tree.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Fetch the menu tree from `path` on the backend.
    ///
    /// Any failure, including an empty answer, falls back to the tree the
    /// service was built with.
    pub async fn load_from(&self, gateway: &HttpGateway, path: &str) -> MenuSource {
        let (tree, source) = match gateway.get_json::<Vec<MenuNode>>(path).await {
            Ok(tree) if !tree.is_empty() => (Arc::new(tree), MenuSource::Remote),
            Ok(_) => {
                tracing::warn!(path, "backend returned an empty menu; using the default");
                (Arc::clone(&self.fallback), MenuSource::Fallback)
            }
            Err(e) => {
                tracing::warn!(path, "failed to load menu, using the default: {e}");
                (Arc::clone(&self.fallback), MenuSource::Fallback)
            }
        };
        tracing::info!(path, roots = tree.len(), ?source, "menu tree loaded");
        self.replace_tree(tree);
        source
    }

    fn replace_tree(&self, tree: Arc<Vec<MenuNode>>) {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        *self.tree.write().unwrap_or_else(PoisonError::into_inner) = tree;
        *cache = None;
    }

    /// The tree filtered by the current permissions. Empty when logged out.
    pub fn visible(&self) -> Arc<Vec<MenuNode>> {
        let snapshot = self.session.snapshot();
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some((version, menu)) = cache.as_ref() {
            if *version == snapshot.version {
                return Arc::clone(menu);
            }
        }

        let menu = match snapshot.profile() {
            Some(profile) if snapshot.is_authenticated() => {
                let granted: Vec<Permission> = profile.permissions.iter().cloned().collect();
                filter_menu(&self.tree(), &granted)
            }
            _ => Vec::new(),
        };
        tracing::debug!(version = snapshot.version, roots = menu.len(), "recomputed visible menu");

        let menu = Arc::new(menu);
        *cache = Some((snapshot.version, Arc::clone(&menu)));
        menu
    }

    pub fn breadcrumbs(&self, path: &str) -> Vec<MenuNode> {
        breadcrumbs_for(&self.visible(), path)
    }

    pub fn find_by_path(&self, path: &str) -> Option<MenuNode> {
        find_by_path(&self.visible(), path).cloned()
    }

    /// Mark the visible node at `path` as active.
    ///
    /// Leaves the previous selection alone when nothing matches.
    pub fn set_active_path(&self, path: &str) -> Option<MenuId> {
        let id = self.find_by_path(path).map(|node| node.id)?;
        *self.active.write().unwrap_or_else(PoisonError::into_inner) = Some(id.clone());
        Some(id)
    }

    pub fn active_id(&self) -> Option<MenuId> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Menu of the admin application.
pub fn admin_menu() -> Vec<MenuNode> {
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
                    .icon("user")
                    .requires("users"),
                MenuNode::new("system-role", "Roles")
                    .path("/system/role")
                    .icon("team")
                    .requires("roles"),
                MenuNode::new("system-menu", "Menus")
                    .path("/system/menu")
                    .icon("menu")
                    .requires("menus"),
            ]),
        MenuNode::new("content", "Content")
            .path("/content")
            .icon("file")
            .children(vec![
                MenuNode::new("content-article", "Articles")
                    .path("/content/article")
                    .requires("articles"),
                MenuNode::new("content-category", "Categories")
                    .path("/content/category")
                    .requires("categories"),
            ]),
        MenuNode::new("monitor", "Monitor")
            .path("/monitor")
            .icon("monitor")
            .children(vec![
                MenuNode::new("monitor-online", "Online users")
                    .path("/monitor/online")
                    .requires("online_users"),
                MenuNode::new("monitor-log", "Operation logs")
                    .path("/monitor/log")
                    .requires("operation_logs"),
            ]),
    ]
}
