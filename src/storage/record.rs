//! On-disk record layout for the local backend.
//!
//! ```text
//! +-------+---------+-------+--------------------------+
//! | magic | version | crc32 | bincode(StoredObject)    |
//! | 4B    | u16 LE  | u32 LE| ...                      |
//! +-------+---------+-------+--------------------------+
//! ```

use sha2::{Digest, Sha256};

use crate::storage::StoredObject;

pub const RECORD_MAGIC: &[u8; 4] = b"FDRV";
pub const RECORD_VERSION: u16 = 1;
pub const RECORD_EXTENSION: &str = "rec";
const HEADER_LEN: usize = 4 + 2 + 4;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("record truncated ({0} bytes)")]
    Truncated(usize),
    #[error("invalid record magic")]
    BadMagic,
    #[error("unsupported record version {0}")]
    UnsupportedVersion(u16),
    #[error("checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },
    #[error("record body could not be decoded: {0}")]
    Decode(String),
}

/// File name for the record holding `id`.
///
/// Ids embed user-supplied file names, so they are hashed rather than used as
/// path components.
pub fn record_file_name(id: &str) -> String {
    let digest = Sha256::digest(id.as_bytes());
    format!("{}.{}", hex::encode(digest), RECORD_EXTENSION)
}

pub fn encode(object: &StoredObject) -> Result<Vec<u8>, bincode::Error> {
    let body = bincode::serialize(object)?;
    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    out.extend_from_slice(RECORD_MAGIC);
    out.extend_from_slice(&RECORD_VERSION.to_le_bytes());
    out.extend_from_slice(&crc32fast::hash(&body).to_le_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}

pub fn decode(bytes: &[u8]) -> Result<StoredObject, RecordError> {
    if bytes.len() < HEADER_LEN {
        return Err(RecordError::Truncated(bytes.len()));
    }
    if &bytes[0..4] != RECORD_MAGIC {
        return Err(RecordError::BadMagic);
    }

    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != RECORD_VERSION {
        return Err(RecordError::UnsupportedVersion(version));
    }

    let expected = u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]);
    let body = &bytes[HEADER_LEN..];
    let actual = crc32fast::hash(body);
    if actual != expected {
        return Err(RecordError::ChecksumMismatch { expected, actual });
    }

    bincode::deserialize(body).map_err(|e| RecordError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::NewObject;

    fn sample() -> StoredObject {
        StoredObject::from_new(NewObject::new(
            "photo.png",
            "image/png",
            1_700_000_000_000,
            vec![0x89, b'P', b'N', b'G', 0, 1, 2, 3],
        ))
    }

    #[test]
    fn decode_recovers_encoded_object() {
        let object = sample();
        let bytes = encode(&object).unwrap();
        assert_eq!(&bytes[0..4], RECORD_MAGIC);
        assert_eq!(decode(&bytes).unwrap(), object);
    }

    #[test]
    fn flipped_body_byte_fails_checksum() {
        let mut bytes = encode(&sample()).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(matches!(
            decode(&bytes),
            Err(RecordError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn short_and_foreign_input_rejected() {
        assert_eq!(decode(b"FDR"), Err(RecordError::Truncated(3)));
        assert_eq!(decode(b"XXXX\x01\x00\x00\x00\x00\x00"), Err(RecordError::BadMagic));

        let mut bytes = encode(&sample()).unwrap();
        bytes[4] = 9;
        assert_eq!(decode(&bytes), Err(RecordError::UnsupportedVersion(9)));
    }

    #[test]
    fn file_names_are_stable_and_path_safe() {
        let a = record_file_name("../../etc/passwd-1-2");
        assert_eq!(a, record_file_name("../../etc/passwd-1-2"));
        assert!(!a.contains('/'));
        assert!(a.ends_with(".rec"));
        assert_eq!(a.len(), 64 + 4);
        assert_ne!(a, record_file_name("other-1-2"));
    }
}
