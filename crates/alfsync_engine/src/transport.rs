//! Change feed abstraction.

use crate::error::{SyncError, SyncResult};
use alfsync_protocol::{AlfrescoUser, ChangeBatch, CursorState, FieldMap, PageLimits};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

/// A change feed handles communication with the repository.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (HTTP, mock for testing, etc.).
pub trait ChangeFeed: Send + Sync {
    /// Fetches the page of changes following `cursor`.
    fn fetch_incremental(&self, cursor: CursorState, limits: PageLimits) -> SyncResult<ChangeBatch>;

    /// Fetches one range of a full reindex under `path`.
    fn fetch_full_reindex(&self, path: &str, start_index: u64, end_index: u64) -> SyncResult<ChangeBatch>;

    /// Fetches the flattened metadata of a node.
    fn fetch_metadata(&self, node_uuid: &str) -> SyncResult<FieldMap>;

    /// Resolves the authorities of one user.
    fn fetch_user_authorities(&self, username: &str) -> SyncResult<AlfrescoUser>;

    /// Resolves the authorities of every user.
    fn fetch_all_user_authorities(&self) -> SyncResult<Vec<AlfrescoUser>>;
}

/// A full reindex request recorded by [`MockChangeFeed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReindexCall {
    /// Path the reindex was rooted at.
    pub path: String,
    /// First index requested.
    pub start_index: u64,
    /// Last index requested.
    pub end_index: u64,
}

/// A mock change feed for testing.
///
/// Incremental responses are served in the order they were queued; every
/// call is recorded.
#[derive(Debug, Default)]
pub struct MockChangeFeed {
    unreachable: Mutex<bool>,
    incremental: Mutex<VecDeque<SyncResult<ChangeBatch>>>,
    incremental_calls: Mutex<Vec<(CursorState, PageLimits)>>,
    reindex: Mutex<Option<ChangeBatch>>,
    reindex_calls: Mutex<Vec<ReindexCall>>,
    metadata: Mutex<HashMap<String, FieldMap>>,
    metadata_calls: Mutex<Vec<String>>,
    users: Mutex<Vec<AlfrescoUser>>,
}

impl MockChangeFeed {
    /// Creates a new mock change feed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an incremental response.
    pub fn push_batch(&self, batch: ChangeBatch) {
        self.incremental.lock().push_back(Ok(batch));
    }

    /// Queues an incremental failure.
    pub fn push_error(&self, error: SyncError) {
        self.incremental.lock().push_back(Err(error));
    }

    /// Sets the full reindex response.
    pub fn set_reindex_batch(&self, batch: ChangeBatch) {
        *self.reindex.lock() = Some(batch);
    }

    /// Sets the metadata returned for a node.
    pub fn set_metadata(&self, node_uuid: impl Into<String>, metadata: FieldMap) {
        self.metadata.lock().insert(node_uuid.into(), metadata);
    }

    /// Adds a user to the authority listing.
    pub fn add_user(&self, user: AlfrescoUser) {
        self.users.lock().push(user);
    }

    /// Makes every subsequent call fail as unreachable.
    pub fn set_unreachable(&self, unreachable: bool) {
        *self.unreachable.lock() = unreachable;
    }

    /// Cursors (and limits) passed to `fetch_incremental`, in call order.
    pub fn incremental_calls(&self) -> Vec<(CursorState, PageLimits)> {
        self.incremental_calls.lock().clone()
    }

    /// Full reindex requests, in call order.
    pub fn reindex_calls(&self) -> Vec<ReindexCall> {
        self.reindex_calls.lock().clone()
    }

    /// Node uuids passed to `fetch_metadata`, in call order.
    pub fn metadata_calls(&self) -> Vec<String> {
        self.metadata_calls.lock().clone()
    }

    fn check_reachable(&self) -> SyncResult<()> {
        if *self.unreachable.lock() {
            Err(SyncError::unreachable("mock repository is down"))
        } else {
            Ok(())
        }
    }
}

impl ChangeFeed for MockChangeFeed {
    fn fetch_incremental(&self, cursor: CursorState, limits: PageLimits) -> SyncResult<ChangeBatch> {
        self.check_reachable()?;
        self.incremental_calls.lock().push((cursor, limits));
        self.incremental
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(SyncError::unreachable("no mock incremental response queued")))
    }

    fn fetch_full_reindex(&self, path: &str, start_index: u64, end_index: u64) -> SyncResult<ChangeBatch> {
        self.check_reachable()?;
        self.reindex_calls.lock().push(ReindexCall {
            path: path.to_string(),
            start_index,
            end_index,
        });
        self.reindex
            .lock()
            .clone()
            .ok_or_else(|| SyncError::unreachable("no mock reindex response set"))
    }

    fn fetch_metadata(&self, node_uuid: &str) -> SyncResult<FieldMap> {
        self.check_reachable()?;
        self.metadata_calls.lock().push(node_uuid.to_string());
        Ok(self
            .metadata
            .lock()
            .get(node_uuid)
            .cloned()
            .unwrap_or_default())
    }

    fn fetch_user_authorities(&self, username: &str) -> SyncResult<AlfrescoUser> {
        self.check_reachable()?;
        self.users
            .lock()
            .iter()
            .find(|user| user.username == username)
            .cloned()
            .ok_or_else(|| SyncError::unreachable(format!("no mock user {username}")))
    }

    fn fetch_all_user_authorities(&self) -> SyncResult<Vec<AlfrescoUser>> {
        self.check_reachable()?;
        Ok(self.users.lock().clone())
    }
}
