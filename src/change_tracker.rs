//! Tracks which records a `Table<T>` handle has added, modified, or
//! removed since the last commit, keyed by each record's own `Arc`
//! pointer identity rather than a synthetic handle counter (spec.md §9:
//! languages without native reference identity need the counter, Rust's
//! `Arc` already gives us one for free via `Arc::as_ptr`).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use indexmap::IndexSet;

use crate::schema::Entity;
use crate::storage_file::ChangeSet;

pub type Handle<T> = Arc<RwLock<T>>;

fn identity_key<T>(handle: &Handle<T>) -> usize {
    Arc::as_ptr(handle) as *const () as usize
}

struct Inner<T: Entity> {
    /// Insertion order matters: records are appended to the file in the
    /// order they were added (spec.md §4.3).
    added: IndexSet<usize>,
    modified: IndexSet<usize>,
    deleted: IndexSet<usize>,
    handles: HashMap<usize, Handle<T>>,
}

impl<T: Entity> Default for Inner<T> {
    fn default() -> Self {
        Inner {
            added: IndexSet::new(),
            modified: IndexSet::new(),
            deleted: IndexSet::new(),
            handles: HashMap::new(),
        }
    }
}

pub struct ChangeTracker<T: Entity> {
    inner: Mutex<Inner<T>>,
}

impl<T: Entity> Default for ChangeTracker<T> {
    fn default() -> Self {
        ChangeTracker {
            inner: Mutex::new(Inner::default()),
        }
    }
}

impl<T: Entity> ChangeTracker<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track_added(&self, handle: &Handle<T>) {
        let key = identity_key(handle);
        let mut inner = self.inner.lock().expect("change tracker lock poisoned");
        inner.handles.insert(key, Arc::clone(handle));
        inner.added.insert(key);
    }

    pub fn track_modified(&self, handle: &Handle<T>) {
        let key = identity_key(handle);
        let mut inner = self.inner.lock().expect("change tracker lock poisoned");
        inner.handles.entry(key).or_insert_with(|| Arc::clone(handle));
        if !inner.added.contains(&key) {
            inner.modified.insert(key);
        }
    }

    /// A record added and then removed before ever being committed never
    /// needs to touch disk at all.
    pub fn track_deleted(&self, handle: &Handle<T>) {
        let key = identity_key(handle);
        let mut inner = self.inner.lock().expect("change tracker lock poisoned");
        if inner.added.shift_remove(&key) {
            inner.handles.remove(&key);
            return;
        }
        inner.handles.entry(key).or_insert_with(|| Arc::clone(handle));
        inner.modified.shift_remove(&key);
        inner.deleted.insert(key);
    }

    /// Encodes every pending change into a `ChangeSet` ready for the
    /// write queue. Returns `None` when there is nothing to commit, so
    /// callers can skip untouched tables entirely (spec.md §4.8).
    pub fn collect_commit_batch(&self) -> Option<ChangeSet> {
        let inner = self.inner.lock().expect("change tracker lock poisoned");
        if inner.added.is_empty() && inner.modified.is_empty() && inner.deleted.is_empty() {
            return None;
        }

        let width = T::schema().record_width;
        let encode = |key: &usize| -> (i32, Vec<u8>) {
            let handle = inner.handles.get(key).expect("tracked key has a handle");
            let guard = handle.read().expect("record lock poisoned");
            let mut buf = vec![0u8; width];
            guard.encode(&mut buf);
            (guard.id(), buf)
        };

        let added = inner.added.iter().map(encode).collect();
        let modified = inner.modified.iter().map(encode).collect();
        let deleted = inner
            .deleted
            .iter()
            .map(|key| inner.handles.get(key).expect("tracked key has a handle").read().expect("record lock poisoned").id())
            .collect();

        Some(ChangeSet {
            added,
            modified,
            deleted,
        })
    }

    pub fn clear_tracked(&self) {
        let mut inner = self.inner.lock().expect("change tracker lock poisoned");
        inner.added.clear();
        inner.modified.clear();
        inner.deleted.clear();
        inner.handles.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CodecError;
    use crate::schema::EntitySchema;

    struct Row {
        id: i32,
        value: i32,
    }

    impl Entity for Row {
        fn schema() -> &'static EntitySchema {
            static SCHEMA: EntitySchema = EntitySchema {
                fields: &[],
                record_width: 9,
            };
            &SCHEMA
        }
        fn id(&self) -> i32 {
            self.id
        }
        fn set_id(&mut self, id: i32) {
            self.id = id;
        }
        fn encode(&self, buf: &mut [u8]) {
            buf[0] = 0;
            crate::codec::write_i32_le(&mut buf[1..5], &self.id);
            crate::codec::write_i32_le(&mut buf[5..9], &self.value);
        }
        fn decode(buf: &[u8]) -> Result<Self, CodecError> {
            Ok(Row {
                id: crate::codec::read_i32_le(&buf[1..5]),
                value: crate::codec::read_i32_le(&buf[5..9]),
            })
        }
    }

    #[test]
    fn add_then_remove_before_commit_tracks_nothing() {
        let tracker = ChangeTracker::<Row>::new();
        let handle: Handle<Row> = Arc::new(RwLock::new(Row { id: 1, value: 10 }));
        tracker.track_added(&handle);
        tracker.track_deleted(&handle);
        assert!(tracker.collect_commit_batch().is_none());
    }

    #[test]
    fn modify_after_add_still_counts_as_one_addition() {
        let tracker = ChangeTracker::<Row>::new();
        let handle: Handle<Row> = Arc::new(RwLock::new(Row { id: 1, value: 10 }));
        tracker.track_added(&handle);
        handle.write().unwrap().value = 20;
        tracker.track_modified(&handle);

        let batch = tracker.collect_commit_batch().unwrap();
        assert_eq!(batch.added.len(), 1);
        assert!(batch.modified.is_empty());
        assert_eq!(batch.added[0].0, 1);
    }

    #[test]
    fn delete_of_a_previously_committed_record_is_separate_from_modify() {
        let tracker = ChangeTracker::<Row>::new();
        let handle: Handle<Row> = Arc::new(RwLock::new(Row { id: 7, value: 1 }));
        tracker.track_modified(&handle);
        tracker.track_deleted(&handle);

        let batch = tracker.collect_commit_batch().unwrap();
        assert!(batch.modified.is_empty());
        assert_eq!(batch.deleted, vec![7]);
    }

    #[test]
    fn clear_tracked_empties_everything() {
        let tracker = ChangeTracker::<Row>::new();
        let handle: Handle<Row> = Arc::new(RwLock::new(Row { id: 1, value: 10 }));
        tracker.track_added(&handle);
        tracker.clear_tracked();
        assert!(tracker.collect_commit_batch().is_none());
    }
}
