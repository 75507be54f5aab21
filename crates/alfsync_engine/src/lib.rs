//! # alfsync Sync Engine
//!
//! Incremental synchronization of an Alfresco repository's changes feed.
//!
//! This crate provides:
//! - Convergence loop over the changes feed (polling → converged)
//! - Cursor checkpointing through the host
//! - Delete/upsert dispatch with optional metadata enrichment
//! - Bounded full reindex over a path and index range
//! - HTTP change feed over a pluggable client
//!
//! ## Architecture
//!
//! The engine repeatedly fetches the page following its cursor, dispatches
//! every document to the [`SyncHost`], and advances the cursor. It stops as
//! soon as a page advances neither the transaction id nor the ACL
//! changeset id, then hands the final cursor to the host as the new
//! checkpoint.
//!
//! ## Key Invariants
//!
//! - Documents are dispatched in feed order
//! - The persisted cursor never moves backwards
//! - A failed invocation never writes a checkpoint
//! - Deleted documents never trigger a metadata fetch

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod enrich;
mod error;
mod host;
mod http;
mod state;
mod transport;

pub use config::{RepositoryConfig, SyncConfig};
pub use enrich::MetadataEnricher;
pub use error::{SyncError, SyncResult};
pub use host::{DispatchEvent, FileSyncHost, MemorySyncHost, SyncHost};
pub use http::{
    basic_authorization, BlockingHttpClient, HttpChangeFeed, HttpClient, HttpRequest,
    LoopbackClient, LoopbackServer,
};
pub use state::{DispatchCounts, SyncCycleResult, SyncEngine, SyncState, SyncStats};
pub use transport::{ChangeFeed, MockChangeFeed, ReindexCall};
