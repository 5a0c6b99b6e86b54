//! Remote rendering through the GitHub markdown API

use async_trait::async_trait;
use mdpreview_core::{MarkdownRenderer, PreviewError, RenderConfig, Result};
use reqwest::header::CONTENT_TYPE;

/// Posts raw markdown to a rendering endpoint and returns the response body
pub struct GithubRenderer {
    client: reqwest::Client,
    endpoint: String,
}

impl GithubRenderer {
    pub fn new(config: &RenderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            // GitHub rejects requests without a user agent
            .user_agent(concat!("mdpreview/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PreviewError::rendering(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }
}

#[async_trait]
impl MarkdownRenderer for GithubRenderer {
    async fn render(&self, markdown: &[u8]) -> Result<Vec<u8>> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "text/plain")
            .body(markdown.to_vec())
            .send()
            .await
            .map_err(|e| PreviewError::rendering(format!("Render request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PreviewError::rendering(format!(
                "Render endpoint returned {}",
                status
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| PreviewError::rendering(format!("Failed to read render response: {}", e)))?;

        tracing::debug!(bytes = body.len(), "Received remote rendering");
        Ok(body.to_vec())
    }

    fn name(&self) -> &str {
        "github-api"
    }
}
