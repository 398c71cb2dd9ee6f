use thiserror::Error;

/// Main application error type that aggregates domain-specific errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration layer errors
    #[error(transparent)]
    Config(#[from] crate::config::error::ConfigError),

    /// LSP layer errors
    #[error(transparent)]
    Lsp(#[from] crate::lsp::error::LspError),

    /// Edit application errors
    #[error(transparent)]
    Edit(#[from] crate::editor::error::EditError),

    /// Generic I/O errors not covered by specific layers
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for applyedit operations
pub type Result<T> = std::result::Result<T, AppError>;
