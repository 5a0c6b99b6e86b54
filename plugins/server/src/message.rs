//! JSON messages exchanged over the live-sync WebSocket
//!
//! Rendered HTML is pushed as a plain text frame and is not part of this
//! protocol; everything else is a JSON object tagged by `type`.

use serde::{Deserialize, Serialize};

/// Error text sent back when a save cannot be persisted
pub const SAVE_FAILED: &str = "Failed to save file";

/// Messages sent by the browser
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Replace the file with `content`
    #[serde(rename = "save")]
    Save { content: String },
    /// Any tag this server does not handle
    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

/// JSON messages sent to the browser
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Literal file content, sent once when a session starts
    Content { content: String },
    /// A request could not be carried out
    Error { error: String },
}

impl ServerMessage {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
