//! Embedded GitHub-flavored markdown renderer

use async_trait::async_trait;
use mdpreview_core::{MarkdownRenderer, PreviewError, Result};

/// Renders GFM in-process with the `markdown` crate
///
/// `markdown::Options` holds non-`Send` parse hooks, so options are built
/// per render instead of stored.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalRenderer;

impl LocalRenderer {
    pub fn new() -> Self {
        Self
    }

    /// Render markdown text to an HTML string
    pub fn render_str(&self, markdown: &str) -> Result<String> {
        markdown::to_html_with_options(markdown, &markdown::Options::gfm())
            .map_err(|e| PreviewError::rendering(e.to_string()))
    }
}

#[async_trait]
impl MarkdownRenderer for LocalRenderer {
    async fn render(&self, markdown: &[u8]) -> Result<Vec<u8>> {
        let text = String::from_utf8_lossy(markdown);
        self.render_str(&text).map(String::into_bytes)
    }

    fn name(&self) -> &str {
        "local-gfm"
    }
}
