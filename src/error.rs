use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = DupliError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum DupliError {
    #[error("Failed to walk directory tree: {0}")]
    Traversal(#[from] walkdir::Error),

    #[error("Failed to decode image {path:?}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to create quarantine directory {path:?}: {source}")]
    CreateQuarantine {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to copy {from:?} → {to:?}: {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Quarantine copy {copy:?} of {original:?} is missing; refusing to delete")]
    QuarantineMissing { original: PathBuf, copy: PathBuf },

    #[error("Failed to delete {path:?}: {source}")]
    Delete {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The only recoverable error: the audit trail reports it and carries on.
    #[error("Failed to write audit log {path:?}: {source}")]
    LogWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Threshold must be within [0, 1], got {0}")]
    InvalidThreshold(f64),
}
