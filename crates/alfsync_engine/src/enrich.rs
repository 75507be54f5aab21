//! Metadata enrichment of upserted documents.

use crate::error::SyncResult;
use crate::transport::ChangeFeed;
use alfsync_protocol::RawDocument;

/// Fetches a node's metadata and folds it into the document.
pub struct MetadataEnricher<'a, F: ChangeFeed + ?Sized> {
    feed: &'a F,
}

impl<'a, F: ChangeFeed + ?Sized> MetadataEnricher<'a, F> {
    /// Creates an enricher reading from `feed`.
    pub fn new(feed: &'a F) -> Self {
        Self { feed }
    }

    /// Merges the flattened metadata of the document's node into its
    /// fields. Metadata wins on key collisions.
    pub fn enrich(&self, document: &mut RawDocument) -> SyncResult<()> {
        let uuid = document.uuid()?.to_string();
        let metadata = self.feed.fetch_metadata(&uuid)?;
        tracing::debug!("Merging {} metadata fields into {}", metadata.len(), uuid);
        document.merge(metadata);
        Ok(())
    }
}
