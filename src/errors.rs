use std::path::PathBuf;
use thiserror::Error;

/// Comprehensive error enum for the restore service using thiserror
#[derive(Error, Debug)]
pub enum RestoreServiceError {
    // Catalog errors
    #[error("Backup directory '{}' not found or not accessible: {}", .dir.display(), .source)]
    CatalogUnavailable {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read backup directory entry: {0}")]
    CatalogRead(#[source] std::io::Error),

    // Request validation errors, reported before any external command runs
    #[error("Backup archive '{0}' not found in the backup directory")]
    ArchiveNotFound(String),

    #[error("Invalid suffix '{0}': only letters, numbers, and underscores are allowed")]
    InvalidSuffix(String),

    #[error("Could not determine the source database name from '{0}'")]
    UnknownSourceDatabase(String),

    #[error("TARGET_DB_PASSWORD is not set: cannot authenticate against the database server")]
    MissingCredential,

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    // Automatic conversions from standard library errors
    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    DialogueError(#[from] dialoguer::Error),
}

pub type Result<T> = std::result::Result<T, RestoreServiceError>;
