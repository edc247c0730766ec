use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::storage::StoredObject;

const FALLBACK_NAME: &str = "download";
const MAX_COPIES: u32 = 1000;

/// Save a copy of `object`'s payload into `dest_dir`, the way a browser
/// download would. Never overwrites: a taken name gets a ` (n)` suffix.
///
/// Only the destination directory is touched, never the object store.
pub async fn export_object(object: &StoredObject, dest_dir: &Path) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dest_dir)
        .await
        .with_context(|| format!("failed to create {}", dest_dir.display()))?;

    let base = safe_file_name(&object.name);
    for copy in 0..MAX_COPIES {
        let candidate = dest_dir.join(numbered(&base, copy));
        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => {
                return Err(e).with_context(|| format!("failed to create {}", candidate.display()))
            }
        };

        file.write_all(&object.payload)
            .await
            .with_context(|| format!("failed to write {}", candidate.display()))?;
        file.flush().await?;

        info!(id = %object.id, path = %candidate.display(), bytes = object.payload.len(), "object exported");
        return Ok(candidate);
    }

    anyhow::bail!(
        "no free file name for '{}' in {}",
        base,
        dest_dir.display()
    )
}

/// Strip directory components so a stored name cannot escape `dest_dir`.
fn safe_file_name(name: &str) -> String {
    let last = name.rsplit(|c| c == '/' || c == '\\').next().unwrap_or("");
    match last {
        "" | "." | ".." => FALLBACK_NAME.to_string(),
        other => other.to_string(),
    }
}

fn numbered(base: &str, copy: u32) -> String {
    if copy == 0 {
        return base.to_string();
    }
    match base.rfind('.') {
        Some(dot) if dot > 0 => format!("{} ({}){}", &base[..dot], copy, &base[dot..]),
        _ => format!("{} ({})", base, copy),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::NewObject;
    use tempfile::TempDir;

    fn object(name: &str, payload: &[u8]) -> StoredObject {
        StoredObject::from_new(NewObject::new(name, "", 1, payload.to_vec()))
    }

    #[tokio::test]
    async fn writes_payload_under_original_name() {
        let tmp = TempDir::new().unwrap();
        let path = export_object(&object("notes.txt", b"hello"), tmp.path())
            .await
            .unwrap();

        assert_eq!(path, tmp.path().join("notes.txt"));
        assert_eq!(std::fs::read(&path).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn taken_names_get_numbered() {
        let tmp = TempDir::new().unwrap();
        let obj = object("notes.txt", b"v");

        export_object(&obj, tmp.path()).await.unwrap();
        let second = export_object(&obj, tmp.path()).await.unwrap();
        let third = export_object(&obj, tmp.path()).await.unwrap();

        assert_eq!(second, tmp.path().join("notes (1).txt"));
        assert_eq!(third, tmp.path().join("notes (2).txt"));
    }

    #[tokio::test]
    async fn path_components_are_stripped() {
        let tmp = TempDir::new().unwrap();
        let path = export_object(&object("../../evil.sh", b"x"), tmp.path())
            .await
            .unwrap();
        assert_eq!(path, tmp.path().join("evil.sh"));

        let path = export_object(&object("..", b"x"), tmp.path()).await.unwrap();
        assert_eq!(path, tmp.path().join("download"));
    }

    #[test]
    fn numbering_respects_extensions() {
        assert_eq!(numbered("a.tar.gz", 1), "a.tar (1).gz");
        assert_eq!(numbered(".bashrc", 2), ".bashrc (2)");
        assert_eq!(numbered("README", 3), "README (3)");
    }
}
