use std::collections::HashMap;
use std::sync::RwLock;

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::storage::{ObjectStore, StoreHandle, StoredObject};

/// In-process store for ephemeral sessions and tests. Nothing survives the
/// process.
pub struct MemoryObjectStore {
    table: String,
    objects: RwLock<HashMap<String, StoredObject>>,
}

impl MemoryObjectStore {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            table: format!("{}/{}", config.database_name, config.store_name),
            objects: RwLock::new(HashMap::new()),
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.objects.read().map(|map| map.len()).unwrap_or(0)
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check(&self, handle: &StoreHandle) -> StoreResult<()> {
        if handle.table().to_string_lossy() != self.table {
            return Err(StoreError::unavailable(format!(
                "handle for {} used against {}",
                handle.table().display(),
                self.table
            )));
        }
        Ok(())
    }
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new(&StoreConfig::default())
    }
}

#[async_trait::async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn open(&self) -> StoreResult<StoreHandle> {
        if self.objects.is_poisoned() {
            return Err(StoreError::unavailable("memory table lock poisoned"));
        }
        Ok(StoreHandle::new(&self.table))
    }

    async fn put_object(&self, handle: &StoreHandle, object: &StoredObject) -> StoreResult<()> {
        self.check(handle)?;
        let mut map = self
            .objects
            .write()
            .map_err(|_| StoreError::unavailable("memory table lock poisoned"))?;
        map.insert(object.id.clone(), object.clone());
        Ok(())
    }

    async fn delete_object(&self, handle: &StoreHandle, id: &str) -> StoreResult<()> {
        self.check(handle)?;
        let mut map = self
            .objects
            .write()
            .map_err(|_| StoreError::unavailable("memory table lock poisoned"))?;
        map.remove(id);
        Ok(())
    }

    async fn list_all(&self, handle: &StoreHandle) -> StoreResult<Vec<StoredObject>> {
        self.check(handle)?;
        let map = self
            .objects
            .read()
            .map_err(|_| StoreError::unavailable("memory table lock poisoned"))?;
        Ok(map.values().cloned().collect())
    }
}
