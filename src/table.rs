//! The handle application code actually holds: one live row set shared
//! with every other handle on the same table, plus a change tracker that
//! is private to this handle (spec.md §4.6/§4.7). `#[derive(Context)]`
//! generates one `Table<E>` field per declared table and wires these up
//! in `open`.

use std::sync::Arc;

use crate::change_tracker::{ChangeTracker, Handle};
use crate::error::EngineError;
use crate::schema::Entity;
use crate::shared_cache::FileCache;
use crate::storage_file::{load_table_at, ChangeSet};
use crate::table_buffer::TypedTableBuffer;

pub struct Table<T: Entity> {
    name: &'static str,
    cache: Arc<FileCache>,
    buffer: Arc<TypedTableBuffer<T>>,
    tracker: ChangeTracker<T>,
}

impl<T: Entity> Table<T> {
    /// Joins the shared live buffer for `name` (loading it from disk the
    /// first time any handle opens this table in the process) and starts
    /// a fresh, private change tracker.
    pub fn new(name: &'static str, cache: Arc<FileCache>) -> Result<Self, EngineError> {
        let buffer = cache.buffer_or_init(name, || {
            let info = cache.table_info(name)?;
            let rows = load_table_at::<T>(cache.path(), info)?;
            Ok(TypedTableBuffer::from_loaded(name, rows))
        })?;
        Ok(Table {
            name,
            cache,
            buffer,
            tracker: ChangeTracker::new(),
        })
    }

    pub fn cache(&self) -> &Arc<FileCache> {
        &self.cache
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Assigns an Id (or preserves the caller's explicit one), adds the
    /// record to the live set, and marks it for the next commit. Fails
    /// with `DuplicateKey` if an explicit Id collides with a live record
    /// (spec.md §4.7).
    pub fn add(&self, entity: T) -> Result<Handle<T>, EngineError> {
        let handle = self.buffer.insert(entity)?;
        self.tracker.track_added(&handle);
        Ok(handle)
    }

    /// Marks `handle` dirty. The caller mutates the record through the
    /// handle's own lock beforehand; this only schedules it for write-back.
    pub fn update(&self, handle: &Handle<T>) {
        self.tracker.track_modified(handle);
    }

    /// Drops `handle` from the live set and schedules its on-disk slot to
    /// be tombstoned.
    pub fn remove(&self, handle: &Handle<T>) {
        self.buffer.remove(handle);
        self.tracker.track_deleted(handle);
    }

    pub fn iterate(&self) -> Vec<Handle<T>> {
        self.buffer.iterate()
    }

    pub fn count(&self) -> usize {
        self.buffer.count()
    }

    pub fn collect_commit_batch(&self) -> Option<ChangeSet> {
        self.tracker.collect_commit_batch()
    }

    pub fn clear_tracked(&self) {
        self.tracker.clear_tracked();
    }
}
