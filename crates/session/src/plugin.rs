//! Extension points installed once the application is wired.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

use crate::app::App;

/// Something that hooks into a freshly bootstrapped [`App`].
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Unique name; a second plugin with the same name is not registered.
    fn name(&self) -> &str;

    async fn install(&self, app: &App) -> anyhow::Result<()>;
}

/// Ordered set of plugins, keyed by name.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: RwLock<Vec<Arc<dyn Plugin>>>,
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.names())
            .finish()
    }
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `plugin`. Returns `false` and keeps the existing entry if the
    /// name is taken.
    pub fn register(&self, plugin: Arc<dyn Plugin>) -> bool {
        let mut plugins = self.plugins.write().unwrap_or_else(PoisonError::into_inner);
        if plugins.iter().any(|p| p.name() == plugin.name()) {
            tracing::warn!(plugin = plugin.name(), "plugin already registered");
            return false;
        }
        plugins.push(plugin);
        true
    }

    pub fn register_all<I>(&self, plugins: I)
    where
        I: IntoIterator<Item = Arc<dyn Plugin>>,
    {
        for plugin in plugins {
            self.register(plugin);
        }
    }

    fn snapshot(&self) -> Vec<Arc<dyn Plugin>> {
        self.plugins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Install every plugin in registration order.
    ///
    /// A failing plugin is logged and skipped; the rest still run. Returns
    /// how many installed cleanly.
    pub async fn install_all(&self, app: &App) -> usize {
        let mut installed = 0;
        for plugin in self.snapshot() {
            match plugin.install(app).await {
                Ok(()) => {
                    tracing::info!(plugin = plugin.name(), "plugin installed");
                    installed += 1;
                }
                Err(e) => {
                    tracing::error!(plugin = plugin.name(), "failed to install plugin: {e:#}");
                }
            }
        }
        installed
    }

    pub fn names(&self) -> Vec<String> {
        self.plugins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|p| p.name().to_string())
            .collect()
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.plugins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|p| p.name() == name)
    }

    /// Remove the plugin called `name`, if any.
    pub fn unregister(&self, name: &str) -> bool {
        let mut plugins = self.plugins.write().unwrap_or_else(PoisonError::into_inner);
        let before = plugins.len();
        plugins.retain(|p| p.name() != name);
        plugins.len() != before
    }

    pub fn clear(&self) {
        self.plugins
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.plugins.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
