//! Feed documents and the descriptors handed to the index.

use crate::error::{ProtocolError, ProtocolResult};
use crate::FieldMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Key holding the node identifier.
pub const UUID: &str = "uuid";
/// Key holding the delete marker.
pub const DELETED: &str = "deleted";
/// Key holding the store id inherited from the batch envelope.
pub const STORE_ID: &str = "store_id";
/// Key holding the store protocol inherited from the batch envelope.
pub const STORE_PROTOCOL: &str = "store_protocol";

/// One item reported by the changes feed.
///
/// The field set is open: the feed always reports `uuid` and `deleted`,
/// everything else is passed through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawDocument {
    fields: FieldMap,
}

impl RawDocument {
    /// Creates an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing field mapping.
    pub fn from_fields(fields: FieldMap) -> Self {
        Self { fields }
    }

    /// Sets a field, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Builder form of [`RawDocument::insert`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Returns a field value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Returns all fields.
    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    /// Consumes the document, returning its fields.
    pub fn into_fields(self) -> FieldMap {
        self.fields
    }

    /// Merges `other` into this document. Colliding keys take the value
    /// from `other`.
    pub fn merge(&mut self, other: FieldMap) {
        for (key, value) in other {
            self.fields.insert(key, value);
        }
    }

    /// Returns the node uuid.
    pub fn uuid(&self) -> ProtocolResult<&str> {
        match self.fields.get(UUID) {
            Some(Value::String(uuid)) => Ok(uuid),
            Some(other) => Err(ProtocolError::ContractViolation(format!(
                "uuid must be a string, it was {other}"
            ))),
            None => Err(ProtocolError::ContractViolation(format!(
                "document is missing uuid: {}",
                Value::Object(self.fields.clone())
            ))),
        }
    }

    /// Returns the delete marker.
    pub fn is_deleted(&self) -> ProtocolResult<bool> {
        match self.fields.get(DELETED) {
            Some(Value::Bool(deleted)) => Ok(*deleted),
            Some(other) => Err(ProtocolError::ContractViolation(format!(
                "deleted must be a boolean, it was {other}"
            ))),
            None => Err(ProtocolError::ContractViolation(format!(
                "document is missing deleted: {}",
                Value::Object(self.fields.clone())
            ))),
        }
    }
}

/// A normalized document ready for ingestion, keyed by node uuid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentDescriptor {
    /// Document identifier (the node uuid).
    pub id: String,
    /// Human-readable label; defaults to the uuid.
    pub label: String,
    /// Full field mapping.
    pub fields: FieldMap,
}

impl DocumentDescriptor {
    /// Builds a descriptor from a feed document.
    pub fn from_document(document: RawDocument) -> ProtocolResult<Self> {
        let id = document.uuid()?.to_string();
        Ok(Self {
            label: id.clone(),
            id,
            fields: document.into_fields(),
        })
    }
}
