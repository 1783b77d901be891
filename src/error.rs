use std::path::PathBuf;

use crate::extract::ExtractError;
use crate::remote::RemoteError;

/// Run-level failures. Anything that only concerns a single file is degraded
/// inside the orchestrator and never surfaces here.
#[derive(Debug, thiserror::Error)]
pub enum FolioError {
    #[error("Folder not found: {}", .0.display())]
    FolderNotFound(PathBuf),

    #[error("Semantic model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid categories: {0}")]
    InvalidCategories(String),

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Extraction error: {0}")]
    Extract(#[from] ExtractError),

    #[error("Account error: {0}")]
    Account(String),

    #[error("Invalid override: {0}")]
    InvalidOverride(String),
}

pub type Result<T> = std::result::Result<T, FolioError>;
