use thiserror::Error;

use super::types::ResponseError;

/// LSP-specific errors
#[derive(Error, Debug)]
pub enum LspError {
    #[error("Failed to start language server: {0}")]
    SpawnFailed(String),

    #[error("Connection to language server closed")]
    ConnectionClosed,

    #[error("Invalid message from language server: {0}")]
    InvalidMessage(String),

    #[error("Language server returned error {}: {}", .0.code, .0.message)]
    Server(ResponseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LspError>;
