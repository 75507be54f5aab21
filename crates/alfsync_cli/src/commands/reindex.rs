//! Reindex command implementation.

use super::DEFAULT_CHECKPOINT;
use alfsync_engine::{ChangeFeed, DispatchCounts, FileSyncHost, SyncConfig, SyncEngine};
use std::io::Write;
use tracing::info;

/// Dispatches the documents under `path` from index `start` to `end`.
///
/// The checkpoint file is never read or written.
pub fn run<F, W>(
    config: SyncConfig,
    feed: F,
    path: &str,
    start: u64,
    end: u64,
    output: W,
) -> Result<DispatchCounts, Box<dyn std::error::Error>>
where
    F: ChangeFeed,
    W: Write + Send,
{
    if end < start {
        return Err(format!("End index {} is before start index {}", end, start).into());
    }

    let host = FileSyncHost::new(DEFAULT_CHECKPOINT, output);
    let engine = SyncEngine::new(config, feed, host);

    let counts = engine.reindex(path, start, end)?;
    info!(
        "Reindexed {}: {} upserted, {} deleted",
        path, counts.upserted, counts.deleted
    );

    Ok(counts)
}
