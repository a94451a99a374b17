//! Free functions the `#[derive(Context)]`-generated `commit`/
//! `commit_async` call into. The derive only knows how to collect each
//! declared `Table<E>` field's pending batch; everything about actually
//! getting those batches onto disk lives here (spec.md §4.8).

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::EngineError;
use crate::shared_cache::FileCache;
use crate::storage_file::ChangeSet;

/// Submits every non-empty table batch to `cache`'s write queue and
/// waits for the result. Callers must hold `cache.commit_semaphore()`
/// for the whole collect-submit-clear sequence (the generated
/// `commit_async` does) so that two commits sharing a cache never read
/// the same pending change twice.
pub async fn commit_changes(
    cache: &Arc<FileCache>,
    batches: Vec<(&'static str, ChangeSet)>,
    cancel: CancellationToken,
) -> Result<(), EngineError> {
    if batches.iter().all(|(_, changes)| changes.is_empty()) {
        return Ok(());
    }
    cache.write_queue().submit_commit(batches, cancel).await
}
