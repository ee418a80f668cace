//! Store errors.

use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A create-only write found an existing object. Callers writing
    /// write-once objects usually treat this as success.
    #[error("object already exists: {key}")]
    AlreadyExists { key: String },

    #[error("object not found: {key}")]
    NotFound { key: String },

    #[error("access denied: {message}")]
    AccessDenied { message: String },

    #[error("invalid store spec '{spec}': {reason}")]
    InvalidSpec { spec: String, reason: String },

    #[error("store I/O failed: {message}")]
    Io { message: String },

    #[error("object store error: {0}")]
    ObjectStore(object_store::Error),

    /// Encoding failures of callers' payloads, surfaced through the store
    /// error they would otherwise have produced.
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl StoreError {
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Classify an `object_store` failure on `key`.
    pub fn from_object_store(err: object_store::Error, key: &str) -> Self {
        let key = key.to_string();
        match err {
            object_store::Error::NotFound { .. } => Self::NotFound { key },
            object_store::Error::AlreadyExists { .. } | object_store::Error::Precondition { .. } => {
                Self::AlreadyExists { key }
            }
            object_store::Error::PermissionDenied { .. }
            | object_store::Error::Unauthenticated { .. } => Self::AccessDenied {
                message: format!("{key}: {err}"),
            },
            other => Self::ObjectStore(other),
        }
    }
}
