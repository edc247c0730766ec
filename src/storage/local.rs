use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::storage::record::{self, RECORD_EXTENSION};
use crate::storage::{ObjectStore, StoreHandle, StoredObject};

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Temp files untouched for this long belong to a writer that died.
const STALE_TMP_AGE: Duration = Duration::from_secs(15 * 60);

/// Filesystem backend: one checksummed record file per id under
/// `<root>/<database_name>/<store_name>/`.
pub struct LocalObjectStore {
    table_dir: PathBuf,
}

/// Result of scanning every record file in a table.
#[derive(Debug, Clone, Default, Serialize)]
pub struct VerifyReport {
    pub total_records: u64,
    pub valid_records: u64,
    pub corrupt_records: Vec<String>,
    pub total_payload_bytes: u64,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>, config: &StoreConfig) -> Self {
        let table_dir = root
            .into()
            .join(&config.database_name)
            .join(&config.store_name);
        Self { table_dir }
    }

    pub fn table_dir(&self) -> &Path {
        &self.table_dir
    }

    /// Check every record's framing and checksum without loading it into a
    /// session.
    pub async fn verify(&self) -> StoreResult<VerifyReport> {
        let handle = self.open().await?;
        let mut report = VerifyReport::default();

        for path in record_paths(handle.table()).await? {
            let bytes = match fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(_) => {
                    report.total_records += 1;
                    report.corrupt_records.push(file_name(&path));
                    continue;
                }
            };
            report.total_records += 1;

            match decode_checked(&path, &bytes) {
                Ok(object) => {
                    report.valid_records += 1;
                    report.total_payload_bytes += object.size;
                }
                Err(_) => report.corrupt_records.push(file_name(&path)),
            }
        }

        report.corrupt_records.sort();
        Ok(report)
    }
}

#[async_trait::async_trait]
impl ObjectStore for LocalObjectStore {
    async fn open(&self) -> StoreResult<StoreHandle> {
        fs::create_dir_all(&self.table_dir).await.map_err(|e| {
            StoreError::unavailable(format!(
                "cannot create {}: {}",
                self.table_dir.display(),
                e
            ))
        })?;

        let meta = fs::metadata(&self.table_dir).await.map_err(|e| {
            StoreError::unavailable(format!("cannot stat {}: {}", self.table_dir.display(), e))
        })?;
        if !meta.is_dir() {
            return Err(StoreError::unavailable(format!(
                "{} is not a directory",
                self.table_dir.display()
            )));
        }
        // a read-only table still lists; each write then fails on its own
        if meta.permissions().readonly() {
            warn!(table = %self.table_dir.display(), "table is read-only");
        }

        Ok(StoreHandle::new(&self.table_dir))
    }

    async fn put_object(
        &self,
        handle: &StoreHandle,
        object: &StoredObject,
    ) -> StoreResult<()> {
        let bytes = record::encode(object).map_err(|e| StoreError::Encode {
            id: object.id.clone(),
            reason: e.to_string(),
        })?;

        let name = record::record_file_name(&object.id);
        let target = handle.table().join(&name);
        let tmp = handle.table().join(format!(
            ".{}.{}-{}.tmp",
            name,
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        if let Err(e) = write_synced(&tmp, &bytes).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(StoreError::write(&object.id, e));
        }
        // rename replaces the old record in one step; readers see either the
        // previous record or the new one
        if let Err(e) = fs::rename(&tmp, &target).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(StoreError::write(&object.id, e));
        }
        sync_dir(handle.table())
            .await
            .map_err(|e| StoreError::write(&object.id, e))?;

        debug!(id = %object.id, bytes = bytes.len(), "record written");
        Ok(())
    }

    async fn delete_object(&self, handle: &StoreHandle, id: &str) -> StoreResult<()> {
        let target = handle.table().join(record::record_file_name(id));
        match fs::remove_file(&target).await {
            Ok(()) => {
                sync_dir(handle.table())
                    .await
                    .map_err(|e| StoreError::write(id, e))?;
                debug!(id = %id, "record deleted");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::write(id, e)),
        }
    }

    async fn list_all(&self, handle: &StoreHandle) -> StoreResult<Vec<StoredObject>> {
        let mut objects = Vec::new();
        sweep_stale_temps(handle.table()).await;

        for path in record_paths(handle.table()).await? {
            // a concurrent delete may remove the file after it was listed
            let bytes = match fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    warn!(record = %path.display(), error = %e, "skipping unreadable record");
                    continue;
                }
            };

            match decode_checked(&path, &bytes) {
                Ok(object) => objects.push(object),
                Err(reason) => {
                    warn!(record = %path.display(), %reason, "skipping unreadable record");
                }
            }
        }

        Ok(objects)
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    Ok(())
}

/// Make a rename or unlink in `dir` survive a crash.
#[cfg(unix)]
async fn sync_dir(dir: &Path) -> std::io::Result<()> {
    fs::File::open(dir).await?.sync_all().await
}

// no directory handle to sync outside unix
#[cfg(not(unix))]
async fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Remove temp files a crashed writer left behind. Only files older than
/// `STALE_TMP_AGE` go, so writes still in flight keep theirs.
async fn sweep_stale_temps(table: &Path) {
    let Ok(mut entries) = fs::read_dir(table).await else {
        return;
    };

    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let name = file_name(&path);
        if !(name.starts_with('.') && name.ends_with(".tmp")) {
            continue;
        }
        let stale = match entry.metadata().await.and_then(|meta| meta.modified()) {
            Ok(modified) => modified
                .elapsed()
                .map(|age| age >= STALE_TMP_AGE)
                .unwrap_or(false),
            Err(_) => false,
        };
        if !stale {
            continue;
        }
        match fs::remove_file(&path).await {
            Ok(()) => debug!(file = %path.display(), "removed stale temp file"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(file = %path.display(), error = %e, "cannot remove stale temp file"),
        }
    }
}

async fn record_paths(table: &Path) -> StoreResult<Vec<PathBuf>> {
    let mut entries = match fs::read_dir(table).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::read(e)),
    };

    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(StoreError::read)? {
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) == Some(RECORD_EXTENSION) {
            paths.push(path);
        }
    }
    Ok(paths)
}

/// Decode a record and confirm it lives under the file name its id hashes to.
fn decode_checked(path: &Path, bytes: &[u8]) -> Result<StoredObject, String> {
    let object = record::decode(bytes).map_err(|e| e.to_string())?;
    let expected = record::record_file_name(&object.id);
    if file_name(path) != expected {
        return Err(format!("record for '{}' stored under wrong name", object.id));
    }
    Ok(object)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
