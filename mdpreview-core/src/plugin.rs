//! Plugin lifecycle for the preview server

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{PreviewError, Result};

/// Core plugin trait that all plugins must implement
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Get the plugin name
    fn name(&self) -> &str;

    /// Get the plugin version
    fn version(&self) -> &str;

    /// Get plugin dependencies (other plugin names)
    fn dependencies(&self) -> Vec<&str> {
        Vec::new()
    }

    /// Initialize the plugin with the given context
    async fn initialize(&mut self, context: &PluginContext) -> Result<()>;

    /// Shutdown the plugin gracefully
    async fn shutdown(&mut self) -> Result<()>;

    /// Get plugin status
    fn status(&self) -> PluginStatus {
        PluginStatus::Active
    }

    /// Get services provided by this plugin
    fn provided_services(&self) -> Vec<&str> {
        Vec::new()
    }
}

type SharedResources = HashMap<String, Arc<dyn Any + Send + Sync>>;

/// Context provided to plugins during initialization
#[derive(Clone)]
pub struct PluginContext {
    pub config: Arc<Config>,
    /// The markdown file being previewed
    pub file_path: PathBuf,
    /// Process-wide shutdown signal
    pub shutdown: CancellationToken,
    shared_resources: Arc<RwLock<SharedResources>>,
}

impl PluginContext {
    /// Create a new plugin context
    pub fn new(config: Arc<Config>, file_path: PathBuf, shutdown: CancellationToken) -> Self {
        Self {
            config,
            file_path,
            shutdown,
            shared_resources: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Publish a resource for plugins initialized later
    pub async fn set_shared_resource<T>(&self, key: impl Into<String>, resource: Arc<T>)
    where
        T: Any + Send + Sync,
    {
        let key = key.into();
        tracing::debug!("Publishing shared resource: {}", key);
        self.shared_resources.write().await.insert(key, resource);
    }

    /// Look up a resource published by another plugin
    pub async fn get_shared_resource<T>(&self, key: &str) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        let resources = self.shared_resources.read().await;
        resources
            .get(key)
            .cloned()
            .and_then(|resource| resource.downcast::<T>().ok())
    }
}

/// Plugin registry for managing loaded plugins
pub struct PluginRegistry {
    plugins: HashMap<String, Box<dyn Plugin>>,
    plugin_info: HashMap<String, PluginInfo>,
    load_order: Vec<String>,
}

impl PluginRegistry {
    /// Create a new plugin registry
    pub fn new() -> Self {
        Self {
            plugins: HashMap::new(),
            plugin_info: HashMap::new(),
            load_order: Vec::new(),
        }
    }

    /// Initialize and register a plugin. Its dependencies must already be loaded.
    pub async fn register_plugin(
        &mut self,
        mut plugin: Box<dyn Plugin>,
        context: &PluginContext,
    ) -> Result<()> {
        let name = plugin.name().to_string();
        let version = plugin.version().to_string();

        if self.plugins.contains_key(&name) {
            return Err(PreviewError::plugin(format!(
                "Plugin {} is already registered",
                name
            )));
        }

        for dep in plugin.dependencies() {
            if !self.plugins.contains_key(dep) {
                return Err(PreviewError::plugin(format!(
                    "Plugin {} depends on {}, which is not loaded",
                    name, dep
                )));
            }
        }

        tracing::info!("Registering plugin: {} v{}", name, version);
        plugin.initialize(context).await?;

        let info = PluginInfo {
            name: name.clone(),
            version,
            status: plugin.status(),
            load_time: SystemTime::now(),
            dependencies: plugin
                .dependencies()
                .iter()
                .map(|s| s.to_string())
                .collect(),
            provided_services: plugin
                .provided_services()
                .iter()
                .map(|s| s.to_string())
                .collect(),
        };

        self.plugin_info.insert(name.clone(), info);
        self.plugins.insert(name.clone(), plugin);
        self.load_order.push(name);

        Ok(())
    }

    /// Shutdown all plugins in reverse load order
    pub async fn shutdown(&mut self) -> Result<()> {
        tracing::info!("Shutting down plugins");

        for plugin_name in self.load_order.iter().rev() {
            if let Some(plugin) = self.plugins.get_mut(plugin_name) {
                if let Err(e) = plugin.shutdown().await {
                    tracing::error!("Failed to shutdown plugin {}: {}", plugin_name, e);
                }
            }
        }

        self.plugins.clear();
        self.plugin_info.clear();
        self.load_order.clear();

        Ok(())
    }

    /// Get plugin information
    pub fn get_plugin_info(&self, name: &str) -> Option<&PluginInfo> {
        self.plugin_info.get(name)
    }

    /// Names of loaded plugins in load order
    pub fn load_order(&self) -> &[String] {
        &self.load_order
    }

    /// Check if a plugin is loaded
    pub fn is_plugin_loaded(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Information about a loaded plugin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginInfo {
    pub name: String,
    pub version: String,
    pub status: PluginStatus,
    pub load_time: SystemTime,
    pub dependencies: Vec<String>,
    pub provided_services: Vec<String>,
}

/// Plugin status enumeration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PluginStatus {
    Loading,
    Active,
    Stopped,
    Error(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingPlugin {
        name: &'static str,
        deps: Vec<&'static str>,
        log: Arc<Mutex<Vec<String>>>,
        status: PluginStatus,
    }

    impl RecordingPlugin {
        fn new(name: &'static str, deps: Vec<&'static str>, log: Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                name,
                deps,
                log,
                status: PluginStatus::Loading,
            }
        }
    }

    #[async_trait]
    impl Plugin for RecordingPlugin {
        fn name(&self) -> &str {
            self.name
        }

        fn version(&self) -> &str {
            "0.1.0"
        }

        fn dependencies(&self) -> Vec<&str> {
            self.deps.clone()
        }

        async fn initialize(&mut self, _context: &PluginContext) -> Result<()> {
            self.log.lock().unwrap().push(format!("init {}", self.name));
            self.status = PluginStatus::Active;
            Ok(())
        }

        async fn shutdown(&mut self) -> Result<()> {
            self.log.lock().unwrap().push(format!("shutdown {}", self.name));
            self.status = PluginStatus::Stopped;
            Ok(())
        }

        fn status(&self) -> PluginStatus {
            self.status.clone()
        }
    }

    fn context() -> PluginContext {
        PluginContext::new(
            Arc::new(Config::default()),
            PathBuf::from("README.md"),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn test_registration_order_and_reverse_shutdown() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let ctx = context();
        let mut registry = PluginRegistry::new();

        registry
            .register_plugin(Box::new(RecordingPlugin::new("renderer", vec![], log.clone())), &ctx)
            .await
            .unwrap();
        registry
            .register_plugin(
                Box::new(RecordingPlugin::new("server", vec!["renderer"], log.clone())),
                &ctx,
            )
            .await
            .unwrap();

        assert_eq!(registry.load_order(), ["renderer", "server"]);
        assert_eq!(
            registry.get_plugin_info("server").unwrap().status,
            PluginStatus::Active
        );

        registry.shutdown().await.unwrap();
        assert!(!registry.is_plugin_loaded("server"));
        assert_eq!(
            *log.lock().unwrap(),
            ["init renderer", "init server", "shutdown server", "shutdown renderer"]
        );
    }

    #[tokio::test]
    async fn test_missing_dependency_is_rejected() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = PluginRegistry::new();

        let result = registry
            .register_plugin(
                Box::new(RecordingPlugin::new("server", vec!["renderer"], log.clone())),
                &context(),
            )
            .await;

        assert!(matches!(result, Err(PreviewError::Plugin(_))));
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_registration_is_rejected() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let ctx = context();
        let mut registry = PluginRegistry::new();

        registry
            .register_plugin(Box::new(RecordingPlugin::new("renderer", vec![], log.clone())), &ctx)
            .await
            .unwrap();
        let result = registry
            .register_plugin(Box::new(RecordingPlugin::new("renderer", vec![], log)), &ctx)
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_shared_resources_are_typed() {
        let ctx = context();
        ctx.set_shared_resource("answer", Arc::new(42u32)).await;

        assert_eq!(ctx.get_shared_resource::<u32>("answer").await.as_deref(), Some(&42));
        assert!(ctx.get_shared_resource::<String>("answer").await.is_none());
        assert!(ctx.get_shared_resource::<u32>("missing").await.is_none());
    }
}
