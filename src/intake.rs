//! Turns files on disk into [`NewObject`]s, standing in for a browser file
//! picker: name, reported mime type, modification time in milliseconds and
//! the bytes.

use std::path::Path;
use std::time::UNIX_EPOCH;

use anyhow::{Context, Result};

use crate::storage::NewObject;

pub async fn read_file(path: &Path, max_size: u64) -> Result<NewObject> {
    let meta = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("cannot stat {}", path.display()))?;
    if !meta.is_file() {
        anyhow::bail!("{} is not a regular file", path.display());
    }
    if meta.len() > max_size {
        anyhow::bail!(
            "{} is {} bytes, above the {} byte limit",
            path.display(),
            meta.len(),
            max_size
        );
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .with_context(|| format!("{} has no file name", path.display()))?;

    let last_modified = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0);

    let payload = tokio::fs::read(path)
        .await
        .with_context(|| format!("cannot read {}", path.display()))?;

    Ok(NewObject::new(
        name.clone(),
        mime_type_for(&name),
        last_modified,
        payload,
    ))
}

/// Mime type from the file extension. Unknown extensions map to an empty
/// string, as browsers report them.
pub fn mime_type_for(name: &str) -> &'static str {
    let ext = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext.to_ascii_lowercase(),
        _ => return "",
    };

    match ext.as_str() {
        "txt" | "log" => "text/plain",
        "md" => "text/markdown",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" | "mjs" => "text/javascript",
        "json" => "application/json",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "tar" => "application/x-tar",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "ppt" => "application/vnd.ms-powerpoint",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn known_and_unknown_extensions() {
        assert_eq!(mime_type_for("report.PDF"), "application/pdf");
        assert_eq!(mime_type_for("photo.jpeg"), "image/jpeg");
        assert_eq!(mime_type_for("archive.tar.gz"), "application/gzip");
        assert_eq!(mime_type_for("Makefile"), "");
        assert_eq!(mime_type_for(".bashrc"), "");
        assert_eq!(mime_type_for("data.weird"), "");
    }

    #[tokio::test]
    async fn reads_name_bytes_and_mtime() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("notes.txt");
        std::fs::write(&path, b"remember the milk").unwrap();

        let object = read_file(&path, 1024).await.unwrap();
        assert_eq!(object.name, "notes.txt");
        assert_eq!(object.mime_type, "text/plain");
        assert_eq!(object.payload, b"remember the milk");
        assert!(object.last_modified > 0);
    }

    #[tokio::test]
    async fn oversized_and_directories_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("big.bin");
        std::fs::write(&path, vec![0u8; 64]).unwrap();

        assert!(read_file(&path, 63).await.is_err());
        assert!(read_file(tmp.path(), 1024).await.is_err());
    }
}
