//! Durable checkpoint store with change notification
//!
//! Writes go through one async lock so the read-modify-write in
//! [`CheckpointStore::update`] never interleaves with another write. Every
//! successful write publishes exactly one [`StoreChange`]; subscribers that
//! fall behind get `Lagged` from the broadcast channel and are expected to
//! rescan.

use chrono::{DateTime, SubsecRound, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::debug;
use uuid::Uuid;
use walk_common::{Coordinate, Error, Result};

use crate::db::checkpoints;
use crate::models::{Checkpoint, CheckpointFilter, GalleryEntry};

const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// What changed in the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreChange {
    Created(Uuid),
    Updated(Uuid),
    Cleared,
}

#[derive(Clone)]
pub struct CheckpointStore {
    pool: SqlitePool,
    changes: broadcast::Sender<StoreChange>,
    write_lock: Arc<Mutex<()>>,
}

impl CheckpointStore {
    pub fn new(pool: SqlitePool) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            pool,
            changes,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Record a new checkpoint with no pipeline progress
    pub async fn create(&self, coordinate: Coordinate, captured_at: DateTime<Utc>) -> Result<Uuid> {
        if !coordinate.is_valid() {
            return Err(Error::InvalidInput(format!(
                "coordinate out of range ({}, {})",
                coordinate.latitude, coordinate.longitude
            )));
        }

        // Storage keeps microseconds; truncate up front so the caller's view
        // matches what a later read returns
        let checkpoint = Checkpoint::new(coordinate, captured_at.trunc_subsecs(6));

        let _guard = self.write_lock.lock().await;
        checkpoints::insert_checkpoint(&self.pool, &checkpoint).await?;
        self.notify(StoreChange::Created(checkpoint.id));

        debug!(checkpoint_id = %checkpoint.id, "Checkpoint created");
        Ok(checkpoint.id)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Checkpoint>> {
        checkpoints::load_checkpoint(&self.pool, id).await
    }

    /// Checkpoints matching `filter`, oldest first
    pub async fn query(&self, filter: CheckpointFilter) -> Result<Vec<Checkpoint>> {
        checkpoints::query_checkpoints(&self.pool, filter).await
    }

    pub async fn count(&self, filter: CheckpointFilter) -> Result<u64> {
        checkpoints::count_checkpoints(&self.pool, filter).await
    }

    /// Checkpoints with a stored photo, oldest first
    pub async fn gallery(&self) -> Result<Vec<GalleryEntry>> {
        let with_photo = self.query(CheckpointFilter::WithPhoto).await?;
        Ok(with_photo.iter().filter_map(GalleryEntry::from_checkpoint).collect())
    }

    /// Apply `mutate` to the current record and persist it atomically
    ///
    /// The id and capture data are not mutable. A mutation that would break
    /// a record invariant is rejected with `InvalidInput` and nothing is
    /// written.
    pub async fn update<F>(&self, id: Uuid, mutate: F) -> Result<Checkpoint>
    where
        F: FnOnce(&mut Checkpoint),
    {
        let _guard = self.write_lock.lock().await;

        let current = checkpoints::load_checkpoint(&self.pool, id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("checkpoint {}", id)))?;

        let mut next = current.clone();
        mutate(&mut next);
        next.id = current.id;
        next.captured_at = current.captured_at;
        next.latitude = current.latitude;
        next.longitude = current.longitude;

        next.validate()
            .map_err(|violation| Error::InvalidInput(format!("checkpoint {}: {}", id, violation)))?;

        checkpoints::save_checkpoint(&self.pool, &next).await?;
        self.notify(StoreChange::Updated(id));

        Ok(next)
    }

    /// Remove every checkpoint
    pub async fn delete_all(&self) -> Result<u64> {
        let _guard = self.write_lock.lock().await;
        let removed = checkpoints::delete_all_checkpoints(&self.pool).await?;
        self.notify(StoreChange::Cleared);

        debug!(removed, "Checkpoints cleared");
        Ok(removed)
    }

    /// Receive a [`StoreChange`] for every write made after this call
    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    fn notify(&self, change: StoreChange) {
        // No subscribers is fine
        let _ = self.changes.send(change);
    }
}
