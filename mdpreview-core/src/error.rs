//! Error handling for mdpreview

use thiserror::Error;

/// Result type alias for mdpreview operations
pub type Result<T> = std::result::Result<T, PreviewError>;

/// Main error type for mdpreview
#[derive(Error, Debug)]
pub enum PreviewError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Plugin-related errors
    #[error("Plugin error: {0}")]
    Plugin(String),

    /// File system errors
    #[error("File system error: {0}")]
    FileSystem(String),

    /// File watcher errors
    #[error("Watcher error: {0}")]
    Watcher(String),

    /// Network/server errors
    #[error("Server error: {0}")]
    Server(String),

    /// Rendering errors
    #[error("Rendering error: {0}")]
    Rendering(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PreviewError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new plugin error
    pub fn plugin<S: Into<String>>(msg: S) -> Self {
        Self::Plugin(msg.into())
    }

    /// Create a new file system error
    pub fn file_system<S: Into<String>>(msg: S) -> Self {
        Self::FileSystem(msg.into())
    }

    /// Create a new server error
    pub fn server<S: Into<String>>(msg: S) -> Self {
        Self::Server(msg.into())
    }

    /// Create a new rendering error
    pub fn rendering<S: Into<String>>(msg: S) -> Self {
        Self::Rendering(msg.into())
    }
}

impl From<notify::Error> for PreviewError {
    fn from(err: notify::Error) -> Self {
        Self::Watcher(err.to_string())
    }
}
