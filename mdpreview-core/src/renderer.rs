//! Markdown renderer interface shared between plugins

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;

/// Key under which the active renderer is published to other plugins
pub const RENDERER_RESOURCE: &str = "markdown_renderer";

/// Turns raw markdown bytes into displayable HTML bytes
#[async_trait]
pub trait MarkdownRenderer: Send + Sync {
    /// Render the given markdown
    async fn render(&self, markdown: &[u8]) -> Result<Vec<u8>>;

    /// Short name used in logs
    fn name(&self) -> &str;
}

/// Cloneable handle to the renderer chosen at startup
#[derive(Clone)]
pub struct RendererHandle {
    inner: Arc<dyn MarkdownRenderer>,
}

impl RendererHandle {
    pub fn new(renderer: Arc<dyn MarkdownRenderer>) -> Self {
        Self { inner: renderer }
    }

    pub async fn render(&self, markdown: &[u8]) -> Result<Vec<u8>> {
        self.inner.render(markdown).await
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }
}

impl std::fmt::Debug for RendererHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RendererHandle")
            .field("renderer", &self.name())
            .finish()
    }
}
