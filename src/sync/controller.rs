//! Reconciles the in-memory file list with the durable store.
//!
//! Mutations land in memory synchronously and are then written to the store
//! in the background. Store failures never reach the caller: they are logged,
//! reflected in [`Durability`] and the sync counters, and the session keeps
//! working from memory.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::StoreResult;
use crate::storage::{NewObject, ObjectStore, StoredObject};
use crate::sync::ordering::KeyedQueue;
use crate::sync::status::{SyncCounters, SyncStatus, SyncTracker};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Durability {
    /// Write issued, not yet resolved.
    Pending,
    Persisted,
    /// The write failed; the object only exists for this session.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Loading,
    Ready,
}

/// The session's view of one file.
#[derive(Debug, Clone)]
pub struct InMemoryObject {
    pub object: Arc<StoredObject>,
    pub durability: Durability,
    revision: u64,
}

impl InMemoryObject {
    pub fn id(&self) -> &str {
        &self.object.id
    }
}

#[derive(Debug, Clone)]
pub struct DriveSnapshot {
    pub objects: Vec<InMemoryObject>,
    pub status: SyncStatus,
    pub counters: SyncCounters,
    pub is_loading: bool,
    pub degraded: bool,
}

struct DriveState {
    phase: Phase,
    load_started: bool,
    degraded: bool,
    objects: Vec<InMemoryObject>,
    removed_while_loading: HashSet<String>,
    next_revision: u64,
}

impl DriveState {
    fn bump(&mut self) -> u64 {
        self.next_revision += 1;
        self.next_revision
    }
}

pub struct Reconciler<S: ObjectStore + ?Sized> {
    store: Arc<S>,
    state: Arc<Mutex<DriveState>>,
    tracker: Arc<SyncTracker>,
    queue: Arc<KeyedQueue>,
}

impl<S: ObjectStore + ?Sized + 'static> Reconciler<S> {
    /// A reconciler in the `Loading` phase with an empty collection.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            state: Arc::new(Mutex::new(DriveState {
                phase: Phase::Loading,
                load_started: false,
                degraded: false,
                objects: Vec::new(),
                removed_while_loading: HashSet::new(),
                next_revision: 0,
            })),
            tracker: Arc::new(SyncTracker::new()),
            queue: Arc::new(KeyedQueue::new()),
        }
    }

    /// Drain the store into memory and move to `Ready`.
    ///
    /// If the store cannot be opened or listed the session continues with
    /// whatever is in memory and is marked degraded. Returns the number of
    /// objects taken from the store. Only the first call drains; any later
    /// or concurrent call returns 0 straight away.
    pub async fn load(&self) -> usize {
        {
            let mut state = lock(&self.state);
            if state.load_started {
                debug!("load skipped: already started");
                return 0;
            }
            state.load_started = true;
        }

        let listed = match read_all(self.store.as_ref()).await {
            Ok(objects) => Some(objects),
            Err(e) => {
                warn!(error = %e, kind = e.kind(), "store unreadable at startup, continuing in memory only");
                None
            }
        };

        let mut state = lock(&self.state);
        let mut loaded = 0;
        match listed {
            Some(mut objects) => {
                objects.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));

                let mut merged = Vec::with_capacity(objects.len() + state.objects.len());
                for object in objects {
                    // local mutations made while loading take precedence
                    if state.removed_while_loading.contains(&object.id)
                        || state.objects.iter().any(|o| o.object.id == object.id)
                    {
                        continue;
                    }
                    let revision = state.bump();
                    merged.push(InMemoryObject {
                        object: Arc::new(object),
                        durability: Durability::Persisted,
                        revision,
                    });
                    loaded += 1;
                }
                merged.append(&mut state.objects);
                state.objects = merged;
            }
            None => state.degraded = true,
        }

        state.removed_while_loading.clear();
        state.phase = Phase::Ready;
        info!(
            loaded,
            total = state.objects.len(),
            degraded = state.degraded,
            "drive ready"
        );
        loaded
    }

    /// Add a file. It is visible in [`objects`](Self::objects) before this
    /// returns; the durable write completes in the background.
    ///
    /// Must be called within a Tokio runtime.
    pub fn add(&self, file: NewObject) -> String {
        let object = Arc::new(StoredObject::from_new(file));
        let id = object.id.clone();

        let revision = {
            let mut state = lock(&self.state);
            let revision = state.bump();
            let entry = InMemoryObject {
                object: Arc::clone(&object),
                durability: Durability::Pending,
                revision,
            };
            match state.objects.iter_mut().find(|o| o.object.id == id) {
                Some(slot) => *slot = entry,
                None => state.objects.push(entry),
            }
            state.removed_while_loading.remove(&id);
            revision
        };
        info!(id = %id, size = object.size, mime_type = %object.mime_type, "object added");

        self.tracker.begin();
        let store = Arc::clone(&self.store);
        let state = Arc::clone(&self.state);
        let tracker = Arc::clone(&self.tracker);
        let key = id.clone();
        self.queue.submit(&id, async move {
            let result = put_durable(store.as_ref(), &object).await;
            let durability = match &result {
                Ok(()) => {
                    debug!(id = %key, "object persisted");
                    Durability::Persisted
                }
                Err(e) => {
                    warn!(id = %key, error = %e, kind = e.kind(), "durable write failed, object kept for this session only");
                    Durability::Failed
                }
            };
            mark(&state, &key, revision, durability);
            tracker.complete(result.is_ok());
        });

        id
    }

    /// Remove a file from memory and, in the background, from the store.
    ///
    /// Returns whether the id was present in memory. The durable delete is
    /// issued either way.
    pub fn remove(&self, id: &str) -> bool {
        let was_present = {
            let mut state = lock(&self.state);
            let before = state.objects.len();
            state.objects.retain(|o| o.object.id != id);
            if state.phase == Phase::Loading {
                state.removed_while_loading.insert(id.to_string());
            }
            state.objects.len() != before
        };
        info!(id = %id, was_present, "object removed");

        self.tracker.begin();
        let store = Arc::clone(&self.store);
        let tracker = Arc::clone(&self.tracker);
        let key = id.to_string();
        self.queue.submit(id, async move {
            let result = delete_durable(store.as_ref(), &key).await;
            match &result {
                Ok(()) => debug!(id = %key, "object deleted from store"),
                Err(e) => {
                    warn!(id = %key, error = %e, kind = e.kind(), "durable delete failed, object may reappear on reload")
                }
            }
            tracker.complete(result.is_ok());
        });

        was_present
    }

    pub fn objects(&self) -> Vec<InMemoryObject> {
        lock(&self.state).objects.clone()
    }

    pub fn get(&self, id: &str) -> Option<InMemoryObject> {
        lock(&self.state)
            .objects
            .iter()
            .find(|o| o.object.id == id)
            .cloned()
    }

    pub fn status(&self) -> SyncStatus {
        self.tracker.status()
    }

    #[allow(dead_code)] // Push updates for long-running frontends
    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.tracker.subscribe()
    }

    pub fn is_loading(&self) -> bool {
        lock(&self.state).phase == Phase::Loading
    }

    pub fn is_degraded(&self) -> bool {
        lock(&self.state).degraded
    }

    pub fn snapshot(&self) -> DriveSnapshot {
        let state = lock(&self.state);
        DriveSnapshot {
            objects: state.objects.clone(),
            status: self.tracker.status(),
            counters: self.tracker.counters(),
            is_loading: state.phase == Phase::Loading,
            degraded: state.degraded,
        }
    }

    /// Wait until every issued write has resolved. Hangs for as long as the
    /// backing store does.
    pub async fn settle(&self) {
        self.tracker.settled().await;
    }
}

fn lock(state: &Mutex<DriveState>) -> MutexGuard<'_, DriveState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn mark(state: &Mutex<DriveState>, id: &str, revision: u64, durability: Durability) {
    let mut state = lock(state);
    // a newer add for the same id owns the entry now
    if let Some(entry) = state
        .objects
        .iter_mut()
        .find(|o| o.object.id == id && o.revision == revision)
    {
        entry.durability = durability;
    }
}

async fn read_all<S: ObjectStore + ?Sized>(store: &S) -> StoreResult<Vec<StoredObject>> {
    let handle = store.open().await?;
    store.list_all(&handle).await
}

async fn put_durable<S: ObjectStore + ?Sized>(store: &S, object: &StoredObject) -> StoreResult<()> {
    let handle = store.open().await?;
    store.put_object(&handle, object).await
}

async fn delete_durable<S: ObjectStore + ?Sized>(store: &S, id: &str) -> StoreResult<()> {
    let handle = store.open().await?;
    store.delete_object(&handle, id).await
}
