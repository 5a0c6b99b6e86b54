//! mdpreview Core - the foundation of the mdpreview markdown live editor
//!
//! This crate provides the configuration, error type and plugin lifecycle
//! shared by the plugins, together with the pieces every live-sync session
//! is built from: the single-file watcher, its coalescing change queue and
//! atomic persistence.

pub mod config;
pub mod error;
pub mod file_watcher;
pub mod persist;
pub mod plugin;
pub mod renderer;

pub use config::{Config, RenderConfig, RenderMode, ServerConfig, SessionConfig};
pub use error::{PreviewError, Result};
pub use file_watcher::{change_queue, ChangeKind, ChangeReceiver, ChangeSender, FileWatcher};
pub use persist::persist;
pub use plugin::{Plugin, PluginContext, PluginInfo, PluginRegistry, PluginStatus};
pub use renderer::{MarkdownRenderer, RendererHandle, RENDERER_RESOURCE};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Core engine that owns the plugins and the process-wide shutdown signal
pub struct CoreEngine {
    plugin_registry: PluginRegistry,
    config: Arc<Config>,
    file_path: PathBuf,
    shutdown: CancellationToken,
}

impl CoreEngine {
    /// Create a new CoreEngine for the given markdown file
    pub fn new(config: Config, file_path: impl Into<PathBuf>) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            plugin_registry: PluginRegistry::new(),
            config: Arc::new(config),
            file_path: file_path.into(),
            shutdown: CancellationToken::new(),
        })
    }

    /// Context handed to plugins on registration
    pub fn create_plugin_context(&self) -> PluginContext {
        PluginContext::new(
            self.config.clone(),
            self.file_path.clone(),
            self.shutdown.clone(),
        )
    }

    /// Register a plugin with the core engine
    pub async fn register_plugin(
        &mut self,
        plugin: Box<dyn Plugin>,
        context: &PluginContext,
    ) -> Result<()> {
        self.plugin_registry.register_plugin(plugin, context).await
    }

    /// Run until Ctrl+C, SIGTERM or cancellation of the shutdown token, then
    /// shut everything down
    pub async fn run(&mut self) -> Result<()> {
        tracing::info!("mdpreview engine running");

        let shutdown_signal = async {
            let ctrl_c = async {
                if let Err(e) = signal::ctrl_c().await {
                    tracing::error!("Failed to listen for Ctrl+C: {}", e);
                    std::future::pending::<()>().await;
                }
            };

            #[cfg(unix)]
            let terminate = async {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut sig) => {
                        sig.recv().await;
                    }
                    Err(e) => {
                        tracing::error!("Failed to install SIGTERM handler: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            };

            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            tokio::select! {
                _ = ctrl_c => {
                    tracing::info!("Received Ctrl+C signal");
                },
                _ = terminate => {
                    tracing::info!("Received terminate signal");
                },
            }
        };

        tokio::select! {
            _ = shutdown_signal => {}
            _ = self.shutdown.cancelled() => {
                tracing::info!("Shutdown requested programmatically");
            }
        }

        self.shutdown().await
    }

    /// Cancel every session and shut plugins down within the configured timeout
    pub async fn shutdown(&mut self) -> Result<()> {
        tracing::info!("Shutting down mdpreview engine");
        self.shutdown.cancel();

        let shutdown_timeout = self.config.server.shutdown_timeout();
        match tokio::time::timeout(shutdown_timeout, self.plugin_registry.shutdown()).await {
            Ok(Err(e)) => tracing::error!("Plugin registry shutdown failed: {}", e),
            Ok(Ok(())) => {}
            Err(_) => tracing::error!(
                "Plugin registry shutdown timed out after {:?}",
                shutdown_timeout
            ),
        }

        tracing::info!("Engine shutdown complete");
        Ok(())
    }

    /// Token cancelled when the engine shuts down
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn config(&self) -> Arc<Config> {
        self.config.clone()
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn plugin_registry(&self) -> &PluginRegistry {
        &self.plugin_registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    struct FlagPlugin {
        stopped: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Plugin for FlagPlugin {
        fn name(&self) -> &str {
            "flag"
        }

        fn version(&self) -> &str {
            "0.1.0"
        }

        async fn initialize(&mut self, _context: &PluginContext) -> Result<()> {
            Ok(())
        }

        async fn shutdown(&mut self) -> Result<()> {
            self.stopped.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_engine_rejects_invalid_config() {
        let mut config = Config::default();
        config.server.port = 0;
        assert!(CoreEngine::new(config, "README.md").is_err());
    }

    #[tokio::test]
    async fn test_run_returns_after_requested_shutdown() {
        let mut engine = CoreEngine::new(Config::default(), "README.md").unwrap();
        let stopped = Arc::new(AtomicBool::new(false));
        let context = engine.create_plugin_context();
        engine
            .register_plugin(Box::new(FlagPlugin { stopped: stopped.clone() }), &context)
            .await
            .unwrap();

        let token = engine.shutdown_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        });

        tokio::time::timeout(Duration::from_secs(2), engine.run())
            .await
            .expect("engine did not stop")
            .unwrap();

        assert!(stopped.load(Ordering::SeqCst));
        assert!(context.shutdown.is_cancelled());
        assert!(!engine.plugin_registry().is_plugin_loaded("flag"));
    }
}
