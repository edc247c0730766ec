use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::storage::StoredObject;

/// Location of an opened table.
///
/// A handle carries no open connection; every operation re-acquires access to
/// the backing store through it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreHandle {
    table: PathBuf,
}

impl StoreHandle {
    pub fn new(table: impl Into<PathBuf>) -> Self {
        Self {
            table: table.into(),
        }
    }

    pub fn table(&self) -> &Path {
        &self.table
    }
}

/// Durable keyed storage for [`StoredObject`] entries.
///
/// Implementations must make `put_object` an atomic upsert per id, treat a
/// delete of an absent id as success, and tolerate the store being modified
/// by someone else between calls.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Open the table, creating it if absent. Idempotent.
    async fn open(&self) -> StoreResult<StoreHandle>;

    async fn put_object(
        &self,
        handle: &StoreHandle,
        object: &StoredObject,
    ) -> StoreResult<()>;

    async fn delete_object(
        &self,
        handle: &StoreHandle,
        id: &str,
    ) -> StoreResult<()>;

    /// Every committed entry, in no particular order.
    async fn list_all(
        &self,
        handle: &StoreHandle,
    ) -> StoreResult<Vec<StoredObject>>;
}
