//! Markdown renderer plugin for mdpreview
//!
//! Picks the embedded GFM renderer or the GitHub API according to the
//! configured render mode and publishes it for the server plugin.

pub mod github;
pub mod local;

pub use github::GithubRenderer;
pub use local::LocalRenderer;

use async_trait::async_trait;
use mdpreview_core::{
    MarkdownRenderer, Plugin, PluginContext, PluginStatus, RenderConfig, RenderMode,
    RendererHandle, Result, RENDERER_RESOURCE,
};
use std::sync::Arc;

/// Build the renderer selected by the configuration
pub fn build_renderer(config: &RenderConfig) -> Result<Arc<dyn MarkdownRenderer>> {
    let renderer: Arc<dyn MarkdownRenderer> = match config.mode {
        RenderMode::Local => Arc::new(LocalRenderer::new()),
        RenderMode::Github => Arc::new(GithubRenderer::new(config)?),
    };
    Ok(renderer)
}

/// Renderer plugin implementation
pub struct RendererPlugin {
    name: String,
    version: String,
    status: PluginStatus,
}

impl RendererPlugin {
    /// Create a new renderer plugin
    pub fn new() -> Self {
        Self {
            name: "renderer".to_string(),
            version: "0.1.0".to_string(),
            status: PluginStatus::Loading,
        }
    }
}

impl Default for RendererPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for RendererPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        &self.version
    }

    async fn initialize(&mut self, context: &PluginContext) -> Result<()> {
        let renderer = match build_renderer(&context.config.render) {
            Ok(renderer) => renderer,
            Err(e) => {
                self.status = PluginStatus::Error(e.to_string());
                return Err(e);
            }
        };

        tracing::info!("Initializing renderer plugin ({})", renderer.name());
        context
            .set_shared_resource(RENDERER_RESOURCE, Arc::new(RendererHandle::new(renderer)))
            .await;

        self.status = PluginStatus::Active;
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<()> {
        tracing::info!("Shutting down renderer plugin");
        self.status = PluginStatus::Stopped;
        Ok(())
    }

    fn status(&self) -> PluginStatus {
        self.status.clone()
    }

    fn provided_services(&self) -> Vec<&str> {
        vec!["markdown-rendering"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdpreview_core::Config;
    use std::path::PathBuf;

    fn context_with(config: Config) -> PluginContext {
        PluginContext::new(
            Arc::new(config),
            PathBuf::from("README.md"),
            Default::default(),
        )
    }

    #[test]
    fn test_build_renderer_follows_mode() {
        let local = build_renderer(&RenderConfig::default()).unwrap();
        assert_eq!(local.name(), "local-gfm");

        let remote = build_renderer(&RenderConfig {
            mode: RenderMode::Github,
            ..RenderConfig::default()
        })
        .unwrap();
        assert_eq!(remote.name(), "github-api");
    }

    #[tokio::test]
    async fn test_plugin_publishes_renderer() {
        let context = context_with(Config::default());
        let mut plugin = RendererPlugin::new();

        plugin.initialize(&context).await.unwrap();
        assert_eq!(plugin.status(), PluginStatus::Active);

        let handle = context
            .get_shared_resource::<RendererHandle>(RENDERER_RESOURCE)
            .await
            .expect("renderer not published");
        assert_eq!(handle.name(), "local-gfm");

        let html = handle.render(b"*hi*").await.unwrap();
        assert!(String::from_utf8(html).unwrap().contains("<em>hi</em>"));

        plugin.shutdown().await.unwrap();
        assert_eq!(plugin.status(), PluginStatus::Stopped);
    }
}
