//! In-memory live record set for one table: the rows loaded from disk
//! plus whatever has been added since, kept as `Arc<RwLock<T>>` handles
//! so callers can mutate a record in place and have that mutation be
//! visible through every other handle to the same record (spec.md §4.6).
//!
//! Reads and writes against this buffer are synchronous -- a plain
//! `std::sync::RwLock`, never held across an `.await` -- because nothing
//! here ever touches the file; only a commit does that, through the
//! write queue.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, RwLock};

use crate::change_tracker::Handle;
use crate::error::EngineError;
use crate::schema::Entity;

pub struct TypedTableBuffer<T: Entity> {
    table: &'static str,
    records: RwLock<Vec<Handle<T>>>,
    next_id: AtomicI32,
}

impl<T: Entity> TypedTableBuffer<T> {
    /// Builds the buffer from rows already read off disk. The next
    /// auto-assigned Id picks up one past the largest Id on record, so a
    /// table reopened after prior commits keeps handing out fresh Ids.
    pub fn from_loaded(table: &'static str, rows: Vec<T>) -> Self {
        let next_id = rows.iter().map(Entity::id).max().unwrap_or(0) + 1;
        let records = rows.into_iter().map(|row| Arc::new(RwLock::new(row))).collect();
        TypedTableBuffer {
            table,
            records: RwLock::new(records),
            next_id: AtomicI32::new(next_id),
        }
    }

    /// Assigns the next Id when `entity.id() == 0`; otherwise preserves the
    /// caller's explicit Id, bumping the auto-assign counter past it if
    /// needed, and rejects the insert if that Id already belongs to a live
    /// record (spec.md §4.7).
    pub fn insert(&self, mut entity: T) -> Result<Handle<T>, EngineError> {
        let mut records = self.records.write().expect("table buffer lock poisoned");
        let explicit_id = entity.id();
        let id = if explicit_id == 0 {
            self.next_id.fetch_add(1, Ordering::SeqCst)
        } else {
            let collides = records
                .iter()
                .any(|existing| existing.read().expect("record lock poisoned").id() == explicit_id);
            if collides {
                return Err(EngineError::DuplicateKey {
                    table: self.table.to_string(),
                    id: explicit_id,
                });
            }
            self.next_id.fetch_max(explicit_id + 1, Ordering::SeqCst);
            explicit_id
        };
        entity.set_id(id);
        let handle = Arc::new(RwLock::new(entity));
        records.push(Arc::clone(&handle));
        Ok(handle)
    }

    /// Drops `handle` from the live set by identity. The handle itself
    /// may still be held elsewhere; it simply stops being returned by
    /// `iterate` or counted by `count`.
    pub fn remove(&self, handle: &Handle<T>) {
        let mut records = self.records.write().expect("table buffer lock poisoned");
        records.retain(|existing| !Arc::ptr_eq(existing, handle));
    }

    pub fn iterate(&self) -> Vec<Handle<T>> {
        self.records.read().expect("table buffer lock poisoned").clone()
    }

    pub fn count(&self) -> usize {
        self.records.read().expect("table buffer lock poisoned").len()
    }
}
