use serde::{Deserialize, Serialize};

use crate::storage::fingerprint::fingerprint;

/// A persisted file: payload plus the metadata it was uploaded with.
///
/// `id` is always derived from `(name, last_modified, size)`; construct values
/// through [`StoredObject::from_new`] so the key cannot drift from the metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    /// Milliseconds since the Unix epoch.
    pub last_modified: i64,
    pub payload: Vec<u8>,
}

/// An incoming blob before it has been keyed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewObject {
    pub name: String,
    pub mime_type: String,
    pub last_modified: i64,
    pub payload: Vec<u8>,
}

impl NewObject {
    pub fn new(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        last_modified: i64,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            last_modified,
            payload,
        }
    }

    pub fn size(&self) -> u64 {
        self.payload.len() as u64
    }
}

impl StoredObject {
    pub fn from_new(object: NewObject) -> Self {
        let size = object.size();
        Self {
            id: fingerprint(&object.name, object.last_modified, size),
            name: object.name,
            mime_type: object.mime_type,
            size,
            last_modified: object.last_modified,
            payload: object.payload,
        }
    }

    /// Mime type for display; browsers report unknown types as an empty string.
    pub fn display_type(&self) -> &str {
        if self.mime_type.is_empty() {
            "unknown"
        } else {
            &self.mime_type
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_new_derives_id_and_size() {
        let object = StoredObject::from_new(NewObject::new(
            "report.pdf",
            "application/pdf",
            1000,
            vec![7u8; 1024],
        ));
        assert_eq!(object.id, "report.pdf-1000-1024");
        assert_eq!(object.size, 1024);
        assert_eq!(object.display_type(), "application/pdf");
    }

    #[test]
    fn empty_mime_displays_unknown() {
        let object = StoredObject::from_new(NewObject::new("blob", "", 5, vec![1, 2, 3]));
        assert_eq!(object.display_type(), "unknown");
    }
}
