//! Sync engine state machine.

use crate::config::SyncConfig;
use crate::enrich::MetadataEnricher;
use crate::error::{SyncError, SyncResult};
use crate::host::SyncHost;
use crate::transport::ChangeFeed;
use alfsync_protocol::{ChangeBatch, CursorState, DocumentDescriptor, RawDocument};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// The current state of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Engine has not run yet.
    Idle,
    /// Engine is paging through the changes feed.
    Polling,
    /// The last invocation drained the feed.
    Converged,
    /// The last invocation failed.
    Error,
}

impl SyncState {
    /// Returns true if the engine is in an active sync state.
    pub fn is_active(&self) -> bool {
        matches!(self, SyncState::Polling)
    }

    /// Returns true if the engine can start a new sync.
    pub fn can_start_sync(&self) -> bool {
        !self.is_active()
    }
}

/// Statistics about sync operations.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Total number of invocations that converged.
    pub cycles_completed: u64,
    /// Total number of pages fetched.
    pub polls: u64,
    /// Total number of documents upserted.
    pub documents_upserted: u64,
    /// Total number of documents deleted.
    pub documents_deleted: u64,
    /// Last persisted cursor.
    pub last_cursor: Option<CursorState>,
    /// Last sync time.
    pub last_sync_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Documents dispatched to the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchCounts {
    /// Number of upserts.
    pub upserted: u64,
    /// Number of deletes.
    pub deleted: u64,
}

impl DispatchCounts {
    fn add(&mut self, other: DispatchCounts) {
        self.upserted += other.upserted;
        self.deleted += other.deleted;
    }
}

/// Result of a synchronization invocation.
#[derive(Debug, Clone)]
pub struct SyncCycleResult {
    /// Cursor the invocation started from.
    pub start_cursor: CursorState,
    /// Cursor persisted at convergence.
    pub final_cursor: CursorState,
    /// Number of pages fetched.
    pub polls: u64,
    /// Documents dispatched.
    pub dispatched: DispatchCounts,
    /// Duration of the invocation.
    pub duration: Duration,
}

/// The sync engine mirrors a repository's changes feed into a host.
pub struct SyncEngine<F: ChangeFeed, H: SyncHost> {
    config: SyncConfig,
    feed: Arc<F>,
    host: Arc<H>,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
}

impl<F: ChangeFeed, H: SyncHost> SyncEngine<F, H> {
    /// Creates a new sync engine.
    pub fn new(config: SyncConfig, feed: F, host: H) -> Self {
        Self {
            config,
            feed: Arc::new(feed),
            host: Arc::new(host),
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
        }
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Gets the change feed.
    pub fn feed(&self) -> &F {
        &self.feed
    }

    /// Gets the host.
    pub fn host(&self) -> &H {
        &self.host
    }

    fn set_state(&self, state: SyncState) {
        *self.state.write() = state;
    }

    /// Runs one synchronization invocation.
    ///
    /// Starts from the host's checkpoint, polls until neither counter
    /// advances, and persists the final cursor. On any error the
    /// checkpoint is left untouched.
    pub fn synchronize(&self) -> SyncResult<SyncCycleResult> {
        let start = Instant::now();

        {
            let mut state = self.state.write();
            if !state.can_start_sync() {
                return Err(SyncError::InvalidStateTransition {
                    from: format!("{:?}", *state),
                    to: "Polling".into(),
                });
            }
            *state = SyncState::Polling;
        }

        let outcome = self
            .host
            .load_checkpoint()
            .map(|token| CursorState::from_token(token.as_deref()))
            .and_then(|start_cursor| {
                info!(
                    "Starting from transaction id: {} and acl changeset id: {}",
                    start_cursor.last_transaction_id, start_cursor.last_acl_changeset_id
                );
                let (final_cursor, polls, dispatched) = self.poll_until_converged(start_cursor)?;
                info!(
                    "Recording {} as last transaction id and {} as last changeset id",
                    final_cursor.last_transaction_id, final_cursor.last_acl_changeset_id
                );
                self.host.save_checkpoint(&final_cursor.to_token())?;
                Ok((start_cursor, final_cursor, polls, dispatched))
            });

        let (start_cursor, final_cursor, polls, dispatched) = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                self.handle_error(&e);
                return Err(e);
            }
        };

        self.set_state(SyncState::Converged);
        {
            let mut stats = self.stats.write();
            stats.cycles_completed += 1;
            stats.polls += polls;
            stats.documents_upserted += dispatched.upserted;
            stats.documents_deleted += dispatched.deleted;
            stats.last_cursor = Some(final_cursor);
            stats.last_sync_time = Some(Instant::now());
            stats.last_error = None;
        }

        Ok(SyncCycleResult {
            start_cursor,
            final_cursor,
            polls,
            dispatched,
            duration: start.elapsed(),
        })
    }

    /// Pages through the feed until a page reports no progress.
    fn poll_until_converged(
        &self,
        start: CursorState,
    ) -> SyncResult<(CursorState, u64, DispatchCounts)> {
        let mut cursor = start;
        let mut polls = 0u64;
        let mut dispatched = DispatchCounts::default();

        loop {
            let batch = self
                .feed
                .fetch_incremental(cursor, self.config.page_limits)?;
            polls += 1;

            let reported = batch.cursor();
            let count = batch.documents.len();
            dispatched.add(self.dispatch_batch(batch)?);
            info!("Fetched and dispatched {} documents", count);

            let advanced = cursor.is_advanced_by(&reported);
            if cursor.is_regressed_by(&reported) {
                warn!("Feed reported cursor {} behind {}, keeping the higher values", reported, cursor);
            }
            cursor = cursor.advance_to(&reported);
            info!(
                "transaction_id={}, acl_changeset_id={}",
                cursor.last_transaction_id, cursor.last_acl_changeset_id
            );

            if !advanced {
                break;
            }
        }

        Ok((cursor, polls, dispatched))
    }

    /// Reindexes one range under `path`.
    ///
    /// Fetches a single batch and dispatches it; the checkpoint is neither
    /// read nor written.
    pub fn reindex(&self, path: &str, start_index: u64, end_index: u64) -> SyncResult<DispatchCounts> {
        info!("Reindexing {} from {} to {}", path, start_index, end_index);
        let batch = self.feed.fetch_full_reindex(path, start_index, end_index)?;
        let counts = self.dispatch_batch(batch)?;

        let mut stats = self.stats.write();
        stats.documents_upserted += counts.upserted;
        stats.documents_deleted += counts.deleted;
        Ok(counts)
    }

    fn dispatch_batch(&self, batch: ChangeBatch) -> SyncResult<DispatchCounts> {
        let mut counts = DispatchCounts::default();
        for document in batch.documents {
            if self.dispatch(document)? {
                counts.deleted += 1;
            } else {
                counts.upserted += 1;
            }
        }
        Ok(counts)
    }

    /// Sends one document to the host. Returns true for a delete.
    pub fn dispatch(&self, mut document: RawDocument) -> SyncResult<bool> {
        let uuid = document.uuid()?.to_string();

        if document.is_deleted()? {
            debug!("Deleting {}", uuid);
            self.host.delete(&uuid)?;
            return Ok(true);
        }

        if self.config.enrich_metadata {
            MetadataEnricher::new(self.feed.as_ref()).enrich(&mut document)?;
        }
        debug!("Ingesting {}", uuid);
        self.host.upsert(&DocumentDescriptor::from_document(document)?)?;
        Ok(false)
    }

    /// Handles an error by updating state and stats.
    fn handle_error(&self, error: &SyncError) {
        warn!("Synchronization failed: {}", error);
        self.set_state(SyncState::Error);
        self.stats.write().last_error = Some(error.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RepositoryConfig;
    use crate::host::{DispatchEvent, MemorySyncHost};
    use crate::transport::MockChangeFeed;
    use alfsync_protocol::{FieldMap, PageLimits, DELETED, STORE_ID, STORE_PROTOCOL, UUID};
    use serde_json::json;

    fn config() -> SyncConfig {
        SyncConfig::new(RepositoryConfig::default())
    }

    fn doc(uuid: &str, deleted: bool) -> RawDocument {
        RawDocument::new().with(UUID, uuid).with(DELETED, deleted)
    }

    fn engine(config: SyncConfig, feed: MockChangeFeed) -> SyncEngine<MockChangeFeed, MemorySyncHost> {
        SyncEngine::new(config, feed, MemorySyncHost::new())
    }

    #[test]
    fn sync_state_checks() {
        assert!(SyncState::Idle.can_start_sync());
        assert!(SyncState::Converged.can_start_sync());
        assert!(SyncState::Error.can_start_sync());
        assert!(!SyncState::Polling.can_start_sync());
        assert!(SyncState::Polling.is_active());
    }

    #[test]
    fn refuses_to_start_while_polling() {
        let feed = MockChangeFeed::new();
        feed.push_batch(ChangeBatch::new(0, 0));

        let engine = SyncEngine::new(config(), feed, MemorySyncHost::with_checkpoint("3|2"));
        engine.set_state(SyncState::Polling);

        let result = engine.synchronize();
        assert!(matches!(result, Err(SyncError::InvalidStateTransition { .. })));
        assert!(engine.feed().incremental_calls().is_empty());
        assert_eq!(engine.state(), SyncState::Polling);
        assert_eq!(engine.host().checkpoint().as_deref(), Some("3|2"));
    }

    #[test]
    fn sync_engine_initial_state() {
        let engine = engine(config(), MockChangeFeed::new());
        assert_eq!(engine.state(), SyncState::Idle);
        assert_eq!(engine.stats().cycles_completed, 0);
    }

    #[test]
    fn acl_only_progress_keeps_polling() {
        let feed = MockChangeFeed::new();
        feed.push_batch(ChangeBatch::new(0, 1));
        feed.push_batch(ChangeBatch::new(0, 2));
        feed.push_batch(ChangeBatch::new(0, 2));

        let engine = engine(config(), feed);
        let result = engine.synchronize().unwrap();

        assert_eq!(result.polls, 3);
        assert_eq!(engine.feed().incremental_calls().len(), 3);
        assert_eq!(engine.host().checkpoint().as_deref(), Some("0|2"));
        assert_eq!(engine.state(), SyncState::Converged);
    }

    #[test]
    fn uses_previously_reported_cursor() {
        let feed = MockChangeFeed::new();
        feed.push_batch(ChangeBatch::new(5, 5));
        feed.push_batch(ChangeBatch::new(5, 5));

        let engine = engine(config(), feed);
        engine.synchronize().unwrap();

        let cursors: Vec<_> = engine
            .feed()
            .incremental_calls()
            .into_iter()
            .map(|(cursor, limits)| {
                assert_eq!(limits, PageLimits::unset());
                cursor
            })
            .collect();
        assert_eq!(cursors, vec![CursorState::new(0, 0), CursorState::new(5, 5)]);
    }

    #[test]
    fn resumes_from_host_checkpoint() {
        let feed = MockChangeFeed::new();
        feed.push_batch(ChangeBatch::new(120, 45));

        let engine = SyncEngine::new(config(), feed, MemorySyncHost::with_checkpoint("120|45"));
        let result = engine.synchronize().unwrap();

        assert_eq!(result.start_cursor, CursorState::new(120, 45));
        assert_eq!(result.polls, 1);
        assert_eq!(engine.host().checkpoint().as_deref(), Some("120|45"));
    }

    #[test]
    fn unparsable_checkpoint_starts_from_zero() {
        let feed = MockChangeFeed::new();
        feed.push_batch(ChangeBatch::new(0, 0));

        let engine = SyncEngine::new(config(), feed, MemorySyncHost::with_checkpoint("garbage"));
        engine.synchronize().unwrap();

        assert_eq!(engine.feed().incremental_calls()[0].0, CursorState::default());
        assert_eq!(engine.host().checkpoint().as_deref(), Some("0|0"));
    }

    #[test]
    fn page_of_deleted_and_live_documents() {
        let feed = MockChangeFeed::new();
        feed.push_batch(
            ChangeBatch::new(0, 0)
                .with_store("workspace", "SpacesStore")
                .with_document(doc("A", true))
                .with_document(doc("B", false).with("type", "cm:content")),
        );

        let engine = engine(config(), feed);
        let result = engine.synchronize().unwrap();

        let events = engine.host().events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], DispatchEvent::Delete { uuid: "A".into() });
        match &events[1] {
            DispatchEvent::Upsert(descriptor) => {
                assert_eq!(descriptor.id, "B");
                assert_eq!(descriptor.label, "B");
                assert_eq!(descriptor.fields.get(UUID), Some(&json!("B")));
                assert_eq!(descriptor.fields.get("type"), Some(&json!("cm:content")));
                assert_eq!(descriptor.fields.get(STORE_ID), Some(&json!("SpacesStore")));
                assert_eq!(descriptor.fields.get(STORE_PROTOCOL), Some(&json!("workspace")));
            }
            other => panic!("expected upsert, got {other:?}"),
        }

        assert_eq!(result.polls, 1);
        assert_eq!(result.dispatched, DispatchCounts { upserted: 1, deleted: 1 });
        assert!(engine.feed().metadata_calls().is_empty());
    }

    #[test]
    fn deleted_documents_skip_enrichment() {
        let feed = MockChangeFeed::new();
        feed.push_batch(ChangeBatch::new(1, 0).with_document(doc("A", true)));
        feed.push_batch(ChangeBatch::new(1, 0));

        let engine = engine(config().with_metadata_enrichment(true), feed);
        engine.synchronize().unwrap();

        assert!(engine.feed().metadata_calls().is_empty());
        assert_eq!(
            engine.host().events(),
            vec![DispatchEvent::Delete { uuid: "A".into() }]
        );
    }

    #[test]
    fn enrichment_merges_metadata_with_metadata_winning() {
        let feed = MockChangeFeed::new();
        let mut metadata = FieldMap::new();
        metadata.insert("type".into(), json!("cm:folder"));
        metadata.insert("cm:title".into(), json!("Budget"));
        feed.set_metadata("B", metadata);
        feed.push_batch(ChangeBatch::new(0, 0).with_document(doc("B", false).with("type", "cm:content")));

        let engine = engine(config().with_metadata_enrichment(true), feed);
        engine.synchronize().unwrap();

        assert_eq!(engine.feed().metadata_calls(), vec!["B".to_string()]);
        let events = engine.host().events();
        let DispatchEvent::Upsert(descriptor) = &events[0] else {
            panic!("expected upsert");
        };
        assert_eq!(descriptor.fields.get("type"), Some(&json!("cm:folder")));
        assert_eq!(descriptor.fields.get("cm:title"), Some(&json!("Budget")));
        assert_eq!(descriptor.fields.get(DELETED), Some(&json!(false)));
        assert_eq!(descriptor.fields.get(STORE_ID), Some(&json!("")));
    }

    #[test]
    fn metadata_fetched_in_document_order() {
        let feed = MockChangeFeed::new();
        feed.push_batch(
            ChangeBatch::new(0, 0)
                .with_document(doc("C", false))
                .with_document(doc("A", false))
                .with_document(doc("B", false)),
        );

        let engine = engine(config().with_metadata_enrichment(true), feed);
        engine.synchronize().unwrap();

        assert_eq!(engine.feed().metadata_calls(), vec!["C", "A", "B"]);
    }

    #[test]
    fn unreachable_leaves_checkpoint_untouched() {
        let feed = MockChangeFeed::new();
        feed.push_batch(ChangeBatch::new(3, 1).with_document(doc("A", false)));
        feed.push_error(SyncError::unreachable("connection reset"));

        let engine = SyncEngine::new(config(), feed, MemorySyncHost::with_checkpoint("2|1"));
        let result = engine.synchronize();

        assert!(matches!(result, Err(SyncError::Unreachable { .. })));
        assert_eq!(engine.host().checkpoint().as_deref(), Some("2|1"));
        assert_eq!(engine.state(), SyncState::Error);
        assert!(engine.stats().last_error.is_some());
        assert_eq!(engine.stats().cycles_completed, 0);
    }

    #[test]
    fn contract_violation_aborts_invocation() {
        let feed = MockChangeFeed::new();
        feed.push_batch(
            ChangeBatch::new(4, 0)
                .with_document(doc("A", false))
                .with_document(RawDocument::new().with(UUID, "B"))
                .with_document(doc("C", false)),
        );

        let engine = engine(config(), feed);
        let result = engine.synchronize();

        assert!(matches!(result, Err(SyncError::FeedContractViolation(_))));
        assert_eq!(engine.host().checkpoint(), None);
        // Documents before the violation were already dispatched
        assert_eq!(engine.host().events().len(), 1);
        assert_eq!(engine.feed().incremental_calls().len(), 1);
    }

    #[test]
    fn regressed_cursor_is_not_persisted() {
        let feed = MockChangeFeed::new();
        feed.push_batch(ChangeBatch::new(3, 3));

        let engine = SyncEngine::new(config(), feed, MemorySyncHost::with_checkpoint("10|10"));
        let result = engine.synchronize().unwrap();

        assert_eq!(result.polls, 1);
        assert_eq!(result.final_cursor, CursorState::new(10, 10));
        assert_eq!(engine.host().checkpoint().as_deref(), Some("10|10"));
    }

    #[test]
    fn partial_regression_keeps_advancing_counter() {
        let feed = MockChangeFeed::new();
        feed.push_batch(ChangeBatch::new(4, 12));
        feed.push_batch(ChangeBatch::new(4, 12));

        let engine = SyncEngine::new(config(), feed, MemorySyncHost::with_checkpoint("6|10"));
        let result = engine.synchronize().unwrap();

        assert_eq!(result.polls, 2);
        assert_eq!(engine.feed().incremental_calls()[1].0, CursorState::new(6, 12));
        assert_eq!(engine.host().checkpoint().as_deref(), Some("6|12"));
    }

    #[test]
    fn configured_page_limits_are_sent() {
        let feed = MockChangeFeed::new();
        feed.push_batch(ChangeBatch::new(0, 0));
        let limits = PageLimits::unset().with_max_transactions(500);

        let engine = engine(config().with_page_limits(limits), feed);
        engine.synchronize().unwrap();

        assert_eq!(engine.feed().incremental_calls()[0].1, limits);
    }

    #[test]
    fn stats_accumulate_across_invocations() {
        let feed = MockChangeFeed::new();
        feed.push_batch(ChangeBatch::new(1, 0).with_document(doc("A", false)));
        feed.push_batch(ChangeBatch::new(1, 0));
        feed.push_batch(ChangeBatch::new(2, 0).with_document(doc("A", true)));
        feed.push_batch(ChangeBatch::new(2, 0));

        let engine = engine(config(), feed);
        engine.synchronize().unwrap();
        engine.synchronize().unwrap();

        let stats = engine.stats();
        assert_eq!(stats.cycles_completed, 2);
        assert_eq!(stats.polls, 4);
        assert_eq!(stats.documents_upserted, 1);
        assert_eq!(stats.documents_deleted, 1);
        assert_eq!(stats.last_cursor, Some(CursorState::new(2, 0)));
    }

    #[test]
    fn reindex_dispatches_without_checkpoint() {
        let feed = MockChangeFeed::new();
        feed.set_reindex_batch(
            ChangeBatch::new(99, 7)
                .with_document(doc("A", false))
                .with_document(doc("B", true)),
        );

        let engine = SyncEngine::new(config(), feed, MemorySyncHost::with_checkpoint("1|1"));
        let counts = engine.reindex("/app:company_home", 0, 100).unwrap();

        assert_eq!(counts, DispatchCounts { upserted: 1, deleted: 1 });
        assert_eq!(engine.host().checkpoint().as_deref(), Some("1|1"));
        assert!(engine.feed().incremental_calls().is_empty());
        let calls = engine.feed().reindex_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].path, "/app:company_home");
        assert_eq!((calls[0].start_index, calls[0].end_index), (0, 100));
    }
}
