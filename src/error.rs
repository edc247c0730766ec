use std::io;

/// Failures reported by an object store backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The platform refused access to the backing store.
    #[error("store unavailable: {reason}")]
    Unavailable { reason: String },

    /// A put or delete failed after the store was opened.
    #[error("write failed for '{id}': {source}")]
    Write {
        id: String,
        #[source]
        source: io::Error,
    },

    /// Listing the store failed after it was opened.
    #[error("read failed: {source}")]
    Read {
        #[source]
        source: io::Error,
    },

    /// The record for `id` could not be serialized.
    #[error("failed to encode record '{id}': {reason}")]
    Encode { id: String, reason: String },
}

impl StoreError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        StoreError::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn write(id: impl Into<String>, source: io::Error) -> Self {
        StoreError::Write {
            id: id.into(),
            source,
        }
    }

    pub fn read(source: io::Error) -> Self {
        StoreError::Read { source }
    }

    /// Short label used in structured log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::Unavailable { .. } => "store_unavailable",
            StoreError::Write { .. } => "write_error",
            StoreError::Read { .. } => "read_error",
            StoreError::Encode { .. } => "encode_error",
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
