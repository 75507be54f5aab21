//! # alfsync Protocol
//!
//! Change feed protocol types and JSON parsing for alfsync.
//!
//! This crate provides:
//! - `CursorState` and its persisted `"txn|acl"` checkpoint token
//! - `ChangeBatch` envelopes parsed from the changes endpoint
//! - `RawDocument` open field mappings and `DocumentDescriptor`
//! - Metadata property flattening
//! - `AlfrescoUser` authority records
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod authority;
mod change_feed;
mod cursor;
mod document;
mod error;
mod metadata;

pub use authority::{parse_user, parse_users, AlfrescoUser};
pub use change_feed::{ChangeBatch, PageLimits};
pub use cursor::CursorState;
pub use document::{DocumentDescriptor, RawDocument, DELETED, STORE_ID, STORE_PROTOCOL, UUID};
pub use error::{ProtocolError, ProtocolResult};
pub use metadata::{flatten_metadata, parse_metadata};

/// JSON object type used for open field mappings.
pub type FieldMap = serde_json::Map<String, serde_json::Value>;
