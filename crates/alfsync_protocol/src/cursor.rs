//! Synchronization cursor and its checkpoint token.

use crate::error::{ProtocolError, ProtocolResult};
use std::fmt;
use std::str::FromStr;

const TOKEN_SEPARATOR: char = '|';

/// The last-seen transaction id and ACL changeset id.
///
/// The cursor is the durable checkpoint of synchronization progress. It is
/// persisted between runs as a `"{txn}|{acl}"` token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CursorState {
    /// Last transaction id applied.
    pub last_transaction_id: u64,
    /// Last ACL changeset id applied.
    pub last_acl_changeset_id: u64,
}

impl CursorState {
    /// Creates a cursor from its two counters.
    pub fn new(last_transaction_id: u64, last_acl_changeset_id: u64) -> Self {
        Self {
            last_transaction_id,
            last_acl_changeset_id,
        }
    }

    /// Parses a persisted token, falling back to `0|0`.
    ///
    /// An absent or unparsable token starts synchronization from the
    /// beginning of the feed.
    pub fn from_token(token: Option<&str>) -> Self {
        match token {
            None => Self::default(),
            Some(raw) => raw.parse().unwrap_or_else(|err| {
                tracing::warn!("Ignoring checkpoint token: {}", err);
                Self::default()
            }),
        }
    }

    /// Serializes the cursor to its persisted token form.
    pub fn to_token(&self) -> String {
        self.to_string()
    }

    /// Returns true if `reported` moved past this cursor on either counter.
    pub fn is_advanced_by(&self, reported: &CursorState) -> bool {
        reported.last_transaction_id > self.last_transaction_id
            || reported.last_acl_changeset_id > self.last_acl_changeset_id
    }

    /// Advances to `reported` without ever moving a counter backwards.
    pub fn advance_to(&self, reported: &CursorState) -> CursorState {
        CursorState {
            last_transaction_id: self.last_transaction_id.max(reported.last_transaction_id),
            last_acl_changeset_id: self
                .last_acl_changeset_id
                .max(reported.last_acl_changeset_id),
        }
    }

    /// Returns true if `reported` is behind this cursor on either counter.
    pub fn is_regressed_by(&self, reported: &CursorState) -> bool {
        reported.last_transaction_id < self.last_transaction_id
            || reported.last_acl_changeset_id < self.last_acl_changeset_id
    }
}

impl fmt::Display for CursorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            self.last_transaction_id, TOKEN_SEPARATOR, self.last_acl_changeset_id
        )
    }
}

impl FromStr for CursorState {
    type Err = ProtocolError;

    fn from_str(s: &str) -> ProtocolResult<Self> {
        let mut parts = s.trim().split(TOKEN_SEPARATOR);
        let (Some(txn), Some(acl), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(ProtocolError::InvalidToken(s.to_string()));
        };

        let parse = |part: &str| {
            part.trim()
                .parse::<u64>()
                .map_err(|_| ProtocolError::InvalidToken(s.to_string()))
        };

        Ok(Self::new(parse(txn)?, parse(acl)?))
    }
}
