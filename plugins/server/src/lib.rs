//! Server plugin for HTTP and WebSocket handling
//!
//! Serves the preview page, the raw file content and one live-sync
//! session per WebSocket connection.

pub mod handlers;
pub mod message;
pub mod session;

pub use message::{ClientMessage, ServerMessage};
pub use session::{Session, SessionReader, SessionWriter};

use async_trait::async_trait;
use axum::{routing::get, Router};
use mdpreview_core::{
    Plugin, PluginContext, PluginStatus, PreviewError, RendererHandle, Result, SessionConfig,
    RENDERER_RESOURCE,
};
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::{error, info};

/// State shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub file_path: Arc<PathBuf>,
    pub renderer: RendererHandle,
    pub session: SessionConfig,
    /// Parent of every session's cancellation token
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        file_path: impl Into<PathBuf>,
        renderer: RendererHandle,
        session: SessionConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            file_path: Arc::new(file_path.into()),
            renderer,
            session,
            shutdown,
        }
    }
}

/// Build the router with request tracing and panic recovery
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/content", get(handlers::content))
        .route("/ws", get(handlers::websocket))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CatchPanicLayer::new()),
        )
        .with_state(state)
}

/// Server plugin implementation
pub struct ServerPlugin {
    name: String,
    version: String,
    status: PluginStatus,
    local_addr: Option<SocketAddr>,
    shutdown: Option<CancellationToken>,
    server_handle: Option<JoinHandle<()>>,
}

impl ServerPlugin {
    /// Create a new server plugin
    pub fn new() -> Self {
        Self {
            name: "server".to_string(),
            version: "0.1.0".to_string(),
            status: PluginStatus::Loading,
            local_addr: None,
            shutdown: None,
            server_handle: None,
        }
    }

    /// Address the listener is bound to once initialized
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    async fn start(&mut self, context: &PluginContext) -> Result<()> {
        let renderer = context
            .get_shared_resource::<RendererHandle>(RENDERER_RESOURCE)
            .await
            .ok_or_else(|| PreviewError::plugin("Markdown renderer is not available"))?;

        let shutdown = context.shutdown.child_token();
        let state = AppState::new(
            context.file_path(),
            (*renderer).clone(),
            context.config.session.clone(),
            shutdown.clone(),
        );

        let addr = context.config.bind_address();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| PreviewError::server(format!("Failed to bind to {}: {}", addr, e)))?;
        let local_addr = listener.local_addr()?;

        info!(
            "Serving {} on http://{} ({} renderer)",
            context.file_path().display(),
            local_addr,
            renderer.name()
        );

        let router = build_router(state);
        let stop = shutdown.clone();
        let server_handle = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move { stop.cancelled().await })
                .await;
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        });

        self.local_addr = Some(local_addr);
        self.shutdown = Some(shutdown);
        self.server_handle = Some(server_handle);
        Ok(())
    }
}

impl Default for ServerPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for ServerPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn dependencies(&self) -> Vec<&str> {
        vec!["renderer"]
    }

    async fn initialize(&mut self, context: &PluginContext) -> Result<()> {
        info!("Initializing server plugin");

        if let Err(e) = self.start(context).await {
            self.status = PluginStatus::Error(e.to_string());
            return Err(e);
        }

        self.status = PluginStatus::Active;
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<()> {
        info!("Shutting down server plugin");

        if let Some(shutdown) = self.shutdown.take() {
            shutdown.cancel();
        }
        if let Some(handle) = self.server_handle.take() {
            if let Err(e) = handle.await {
                error!("Server task failed: {}", e);
            }
        }

        self.status = PluginStatus::Stopped;
        info!("Server plugin shutdown complete");
        Ok(())
    }

    fn status(&self) -> PluginStatus {
        self.status.clone()
    }

    fn provided_services(&self) -> Vec<&str> {
        vec!["http_server", "live_sync"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdpreview_core::{Config, ServerConfig};
    use mdpreview_renderer::RendererPlugin;
    use tempfile::tempdir;

    fn context(file_path: PathBuf) -> PluginContext {
        let config = Config {
            server: ServerConfig {
                port: 0,
                ..ServerConfig::default()
            },
            ..Config::default()
        };
        PluginContext::new(Arc::new(config), file_path, CancellationToken::new())
    }

    #[tokio::test]
    async fn test_server_requires_renderer() {
        let mut plugin = ServerPlugin::new();
        let err = plugin
            .initialize(&context(PathBuf::from("README.md")))
            .await
            .unwrap_err();

        assert!(matches!(err, PreviewError::Plugin(_)));
        assert!(matches!(plugin.status(), PluginStatus::Error(_)));
    }

    #[tokio::test]
    async fn test_server_serves_and_shuts_down() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.md");
        std::fs::write(&path, "# Notes").unwrap();

        let context = context(path);
        let mut renderer = RendererPlugin::new();
        renderer.initialize(&context).await.unwrap();

        let mut plugin = ServerPlugin::new();
        plugin.initialize(&context).await.unwrap();
        assert_eq!(plugin.status(), PluginStatus::Active);
        let addr = plugin.local_addr().expect("listener not bound");

        let stream = tokio::net::TcpStream::connect(addr).await;
        assert!(stream.is_ok());
        drop(stream);

        tokio::time::timeout(std::time::Duration::from_secs(5), plugin.shutdown())
            .await
            .expect("server did not stop")
            .unwrap();
        assert_eq!(plugin.status(), PluginStatus::Stopped);
        assert!(tokio::net::TcpStream::connect(addr).await.is_err());
    }
}
