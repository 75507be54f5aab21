//! User authority records.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const USERNAME: &str = "username";
const AUTHORITIES: &str = "authorities";

/// A repository user and the authorities (groups, roles) it resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlfrescoUser {
    /// User name.
    pub username: String,
    /// Authorities in the order reported by the repository.
    pub authorities: Vec<String>,
}

impl AlfrescoUser {
    /// Creates a user record.
    pub fn new(username: impl Into<String>, authorities: Vec<String>) -> Self {
        Self {
            username: username.into(),
            authorities,
        }
    }

    /// Parses a user object, requiring both fields with exact types.
    pub fn from_json(value: &Value) -> ProtocolResult<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| ProtocolError::malformed("user must be a JSON object", value))?;

        let username = match object.get(USERNAME) {
            Some(Value::String(username)) => username.clone(),
            Some(_) => return Err(ProtocolError::malformed("username must be a string", value)),
            None => return Err(ProtocolError::malformed("response is missing username", value)),
        };

        let entries = match object.get(AUTHORITIES) {
            Some(Value::Array(entries)) => entries,
            Some(_) => {
                return Err(ProtocolError::malformed(
                    "authorities must be a JSON array",
                    value,
                ))
            }
            None => {
                return Err(ProtocolError::malformed(
                    "response is missing authorities",
                    value,
                ))
            }
        };

        let authorities = entries
            .iter()
            .map(|entry| {
                entry.as_str().map(str::to_string).ok_or_else(|| {
                    ProtocolError::malformed("authority entry must be a string", value)
                })
            })
            .collect::<ProtocolResult<Vec<_>>>()?;

        Ok(Self {
            username,
            authorities,
        })
    }
}

/// Parses a single user response body.
pub fn parse_user(body: &[u8]) -> ProtocolResult<AlfrescoUser> {
    let value = decode(body)?;
    AlfrescoUser::from_json(&value)
}

/// Parses a response body holding a JSON array of users.
pub fn parse_users(body: &[u8]) -> ProtocolResult<Vec<AlfrescoUser>> {
    let value = decode(body)?;
    let users = value
        .as_array()
        .ok_or_else(|| ProtocolError::malformed("users must be a JSON array", &value))?;
    users.iter().map(AlfrescoUser::from_json).collect()
}

fn decode(body: &[u8]) -> ProtocolResult<Value> {
    serde_json::from_slice(body).map_err(|e| ProtocolError::InvalidJson(e.to_string()))
}
