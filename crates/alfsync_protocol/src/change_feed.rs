//! Change feed batches.

use crate::cursor::CursorState;
use crate::document::{RawDocument, STORE_ID, STORE_PROTOCOL};
use crate::error::{ProtocolError, ProtocolResult};
use crate::FieldMap;
use serde_json::Value;
use tracing::warn;

const LAST_TXN_ID: &str = "last_txn_id";
const LAST_ACL_CS_ID: &str = "last_acl_changeset_id";
const DOCS: &str = "docs";

/// Page size limits for an incremental fetch.
///
/// `None` leaves the page size to the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageLimits {
    /// Maximum transactions per page.
    pub max_transactions: Option<u64>,
    /// Maximum ACL changesets per page.
    pub max_acl_changesets: Option<u64>,
}

impl PageLimits {
    /// Limits that let the server choose both page sizes.
    pub fn unset() -> Self {
        Self::default()
    }

    /// Sets the maximum transactions per page.
    pub fn with_max_transactions(mut self, max: u64) -> Self {
        self.max_transactions = Some(max);
        self
    }

    /// Sets the maximum ACL changesets per page.
    pub fn with_max_acl_changesets(mut self, max: u64) -> Self {
        self.max_acl_changesets = Some(max);
        self
    }
}

/// One page of the changes feed.
///
/// Documents are kept in feed order, which is the order in which the
/// repository applied the underlying transactions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeBatch {
    /// Last transaction id covered by this page.
    pub last_txn_id: u64,
    /// Last ACL changeset id covered by this page.
    pub last_acl_changeset_id: u64,
    /// Store id from the envelope.
    pub store_id: String,
    /// Store protocol from the envelope.
    pub store_protocol: String,
    /// Documents in feed order.
    pub documents: Vec<RawDocument>,
}

impl ChangeBatch {
    /// Creates a batch with no documents reporting the given counters.
    pub fn new(last_txn_id: u64, last_acl_changeset_id: u64) -> Self {
        Self {
            last_txn_id,
            last_acl_changeset_id,
            ..Self::default()
        }
    }

    /// Sets the store identity.
    pub fn with_store(mut self, store_protocol: impl Into<String>, store_id: impl Into<String>) -> Self {
        self.store_protocol = store_protocol.into();
        self.store_id = store_id.into();
        self
    }

    /// Appends a document, stamping it with the store identity.
    pub fn with_document(mut self, mut document: RawDocument) -> Self {
        document.insert(STORE_ID, self.store_id.clone());
        document.insert(STORE_PROTOCOL, self.store_protocol.clone());
        self.documents.push(document);
        self
    }

    /// Returns the cursor reported by this page.
    pub fn cursor(&self) -> CursorState {
        CursorState::new(self.last_txn_id, self.last_acl_changeset_id)
    }

    /// Parses a response body from the changes endpoint.
    pub fn parse(body: &[u8]) -> ProtocolResult<Self> {
        match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(envelope)) => Self::from_envelope(&envelope),
            Ok(other) => Err(ProtocolError::InvalidJson(format!(
                "expected a JSON object, got {other}"
            ))),
            Err(e) => Err(ProtocolError::InvalidJson(e.to_string())),
        }
    }

    /// Builds a batch from a decoded envelope.
    ///
    /// Store identity and the document list degrade to empty values with a
    /// warning; counters must be numeric when present.
    pub fn from_envelope(envelope: &FieldMap) -> ProtocolResult<Self> {
        let mut batch = Self::new(
            counter(envelope, LAST_TXN_ID)?,
            counter(envelope, LAST_ACL_CS_ID)?,
        )
        .with_store(
            lenient_string(envelope, STORE_PROTOCOL),
            lenient_string(envelope, STORE_ID),
        );

        match envelope.get(DOCS) {
            Some(Value::Array(docs)) => {
                for doc in docs {
                    let document = match doc {
                        Value::Object(fields) => RawDocument::from_fields(fields.clone()),
                        other => {
                            warn!("Document entry is not an object: {}", other);
                            RawDocument::new()
                        }
                    };
                    batch = batch.with_document(document);
                }
            }
            _ => warn!("No documents found in response"),
        }

        Ok(batch)
    }
}

fn counter(envelope: &FieldMap, key: &str) -> ProtocolResult<u64> {
    match envelope.get(key) {
        None | Some(Value::Null) => Ok(0),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(0),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map_err(|_| ProtocolError::malformed(format!("{key} is not a counter"), &Value::String(s.clone()))),
        Some(Value::Number(n)) => n
            .as_u64()
            .ok_or_else(|| ProtocolError::malformed(format!("{key} is not a counter"), &Value::Number(n.clone()))),
        Some(other) => {
            warn!("The {} property (={}) is not a string", key, other);
            Ok(0)
        }
    }
}

fn lenient_string(envelope: &FieldMap, key: &str) -> String {
    match envelope.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => {
            warn!("The {} property (={}) is not a string", key, other);
            String::new()
        }
        None => {
            warn!("The key {} is missing from response", key);
            String::new()
        }
    }
}
