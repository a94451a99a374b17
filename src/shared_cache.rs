//! Process-wide file cache: every `Context::open` on the same path
//! shares one `FileCache`, so two open contexts never fight over the
//! file handle or the write queue (spec.md §4.5).
//!
//! The registry tracks an explicit open-count per path rather than
//! relying on `Arc::strong_count` — a `Table<T>` handle also holds a
//! clone of the cache `Arc` to reach the write queue, so strong-count
//! alone would never reach zero at the point a caller actually means
//! "I'm done with this path." `release()` is the caller's explicit
//! signal; the `Arc` itself is reclaimed whenever its last clone drops.

use std::any::Any;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use crate::error::EngineError;
use crate::schema::EntitySchema;
use crate::storage_file::{StorageFileManager, TableInfo};
use crate::write_queue::{FileWriteQueue, FileWriteQueueHandle};

pub struct FileCache {
    path: PathBuf,
    table_infos: HashMap<String, TableInfo>,
    write_queue: FileWriteQueueHandle,
    buffers: Mutex<HashMap<String, Arc<dyn Any + Send + Sync>>>,
    open_count: AtomicUsize,
    /// One permit: two `Context`s sharing this cache never have commits
    /// in flight at the same time, so a commit's collect-then-clear
    /// sequence is never interleaved with another one's.
    commit_semaphore: tokio::sync::Semaphore,
}

impl FileCache {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn table_info(&self, name: &str) -> Result<&TableInfo, EngineError> {
        self.table_infos
            .get(name)
            .ok_or_else(|| EngineError::UnknownTable(name.to_string()))
    }

    pub fn write_queue(&self) -> FileWriteQueue {
        self.write_queue.queue()
    }

    pub fn commit_semaphore(&self) -> &tokio::sync::Semaphore {
        &self.commit_semaphore
    }

    /// Returns the existing typed buffer for `name`, or builds one with
    /// `init` and stores it. `init` only ever runs once per table per
    /// process, the first time any `Context` opens this path (spec.md
    /// §4.5's "load once, reuse across handles").
    pub fn buffer_or_init<T, F>(&self, name: &str, init: F) -> Result<Arc<T>, EngineError>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Result<T, EngineError>,
    {
        let mut buffers = self.buffers.lock().expect("file cache buffer lock poisoned");
        if let Some(existing) = buffers.get(name) {
            return Ok(Arc::clone(existing).downcast::<T>().unwrap_or_else(|_| {
                panic!("table buffer type mismatch for previously registered table `{name}`")
            }));
        }
        let built = Arc::new(init()?);
        buffers.insert(name.to_string(), Arc::clone(&built) as Arc<dyn Any + Send + Sync>);
        Ok(built)
    }
}

static REGISTRY: OnceLock<Mutex<HashMap<PathBuf, Arc<FileCache>>>> = OnceLock::new();
static ATEXIT_REGISTERED: AtomicBool = AtomicBool::new(false);

fn registry() -> &'static Mutex<HashMap<PathBuf, Arc<FileCache>>> {
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Opens (or joins) the shared cache for `path`. `schema` is only
/// consulted the first time a path is opened in this process; later
/// callers join the already-loaded cache regardless of their own
/// declared schema (schema evolution is a non-goal).
pub fn acquire(
    path: &Path,
    schema: &[(&str, &'static EntitySchema)],
) -> Result<Arc<FileCache>, EngineError> {
    register_atexit_hook();
    let canonical = canonical_key(path);
    let mut registry = registry().lock().expect("file cache registry lock poisoned");
    if let Some(existing) = registry.get(&canonical) {
        let count = existing.open_count.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(path = %canonical.display(), open_count = count, "joined existing recordstore cache");
        return Ok(Arc::clone(existing));
    }

    let existed = path.exists();
    let manager = StorageFileManager::open(path, schema)?;
    let table_infos = manager.table_infos().clone();
    let write_queue = FileWriteQueue::spawn(manager);
    let cache = Arc::new(FileCache {
        path: canonical.clone(),
        table_infos,
        write_queue,
        buffers: Mutex::new(HashMap::new()),
        open_count: AtomicUsize::new(1),
        commit_semaphore: tokio::sync::Semaphore::new(1),
    });
    tracing::info!(
        path = %canonical.display(),
        created = !existed,
        tables = cache.table_infos.len(),
        "opened recordstore file"
    );
    registry.insert(canonical, Arc::clone(&cache));
    Ok(cache)
}

/// Drops this path's registry slot once every open handle has released
/// it. Contexts that still hold a clone of the `Arc` keep the cache (and
/// its write-queue thread) alive until they drop too.
pub fn release(path: &Path) -> Result<(), EngineError> {
    let canonical = canonical_key(path);
    let mut registry = registry().lock().expect("file cache registry lock poisoned");
    let Some(cache) = registry.get(&canonical) else {
        return Err(EngineError::UnknownTable(format!(
            "no open recordstore cache for {}",
            canonical.display()
        )));
    };
    if cache.open_count.fetch_sub(1, Ordering::SeqCst) == 1 {
        tracing::debug!(path = %canonical.display(), "releasing recordstore cache, last handle closed");
        registry.remove(&canonical);
    }
    Ok(())
}

fn canonical_key(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

fn register_atexit_hook() {
    if ATEXIT_REGISTERED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok()
    {
        unsafe {
            libc::atexit(drain_registry_at_exit);
        }
    }
}

/// Forces every still-open cache to drop at process exit, which joins
/// each write-queue thread cleanly instead of letting the OS tear the
/// process down mid-write.
extern "C" fn drain_registry_at_exit() {
    if let Some(lock) = REGISTRY.get() {
        if let Ok(mut registry) = lock.lock() {
            registry.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Entity, FieldDescriptor};

    struct Probe {
        id: i32,
    }

    impl Entity for Probe {
        fn schema() -> &'static EntitySchema {
            static FIELDS: &[FieldDescriptor] = &[];
            static SCHEMA: EntitySchema = EntitySchema {
                fields: FIELDS,
                record_width: 5,
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
        }
        fn decode(buf: &[u8]) -> Result<Self, crate::error::CodecError> {
            Ok(Probe {
                id: crate::codec::read_i32_le(&buf[1..5]),
            })
        }
    }

    #[test]
    fn repeated_acquire_shares_one_cache_and_release_unwinds_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("probe.mdb");
        let schema: &[(&str, &'static EntitySchema)] = &[("probes", Probe::schema())];

        let first = acquire(&path, schema).unwrap();
        let second = acquire(&path, schema).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        release(&path).unwrap();
        release(&path).unwrap();
        assert!(release(&path).is_err());
    }
}
