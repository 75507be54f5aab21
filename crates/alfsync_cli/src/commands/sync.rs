//! Sync command implementation.

use alfsync_engine::{ChangeFeed, FileSyncHost, SyncConfig, SyncCycleResult, SyncEngine};
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Runs one incremental synchronization.
///
/// Every dispatched document is written to `output` as one JSON line. The
/// checkpoint file is rewritten only when the feed converged.
pub fn run<F, W>(
    config: SyncConfig,
    feed: F,
    checkpoint: &Path,
    output: W,
) -> Result<SyncCycleResult, Box<dyn std::error::Error>>
where
    F: ChangeFeed,
    W: Write + Send,
{
    let host = FileSyncHost::new(checkpoint, output);
    let engine = SyncEngine::new(config, feed, host);

    let result = engine.synchronize()?;
    info!(
        "Converged at {} after {} polls: {} upserted, {} deleted in {:?}",
        result.final_cursor,
        result.polls,
        result.dispatched.upserted,
        result.dispatched.deleted,
        result.duration
    );

    Ok(result)
}
