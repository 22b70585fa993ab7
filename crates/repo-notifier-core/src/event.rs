//! Repository change events.
//!
//! A change event is the JSON document published by Cloud Source Repositories
//! whenever refs are created, moved, or deleted:
//!
//! ```json
//! {
//!   "name": "projects/my-project/repos/my-repo",
//!   "url": "https://source.developers.google.com/p/my-project/r/my-repo",
//!   "eventTime": "2024-03-01T12:00:00.123456Z",
//!   "refUpdateEvent": {
//!     "email": "dev@example.com",
//!     "refUpdates": {
//!       "refs/heads/main": {
//!         "refName": "refs/heads/main",
//!         "updateType": "UPDATE_FAST_FORWARD",
//!         "oldId": "c7a28dd5de3403cc384a025",
//!         "newId": "f00768887da8de62061210"
//!       }
//!     }
//!   }
//! }
//! ```
//!
//! Missing and `null` fields decode to empty values. Values of the wrong type,
//! or input that is not JSON at all, are rejected with [`DecodeError`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;

/// Errors raised while decoding a change event
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Malformed payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),
}

/// One repository change event
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChangeEnvelope {
    /// Resource name of the repository, `projects/{project}/repos/{repo}`
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub url: String,
    pub event_time: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "null_as_default")]
    pub ref_update_event: RefUpdateEvent,
}

/// The ref updates carried by an event, together with the pushing user
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RefUpdateEvent {
    #[serde(deserialize_with = "null_as_default")]
    pub email: String,
    /// Updates keyed by ref; ordered so that processing is deterministic
    #[serde(deserialize_with = "null_as_default")]
    pub ref_updates: BTreeMap<String, RefUpdate>,
}

/// A single ref movement
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RefUpdate {
    #[serde(deserialize_with = "null_as_default")]
    pub ref_name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub update_type: UpdateType,
    #[serde(deserialize_with = "null_as_default")]
    pub old_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub new_id: String,
}

/// Classification of a ref update
///
/// Unknown values are kept verbatim so they can still be reported.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(from = "String", into = "String")]
pub enum UpdateType {
    Create,
    UpdateFastForward,
    UpdateNonFastForward,
    Delete,
    Unrecognized(String),
}

impl UpdateType {
    /// Wire representation of the classification
    pub fn as_str(&self) -> &str {
        match self {
            Self::Create => "CREATE",
            Self::UpdateFastForward => "UPDATE_FAST_FORWARD",
            Self::UpdateNonFastForward => "UPDATE_NON_FAST_FORWARD",
            Self::Delete => "DELETE",
            Self::Unrecognized(raw) => raw,
        }
    }
}

impl Default for UpdateType {
    fn default() -> Self {
        Self::Unrecognized(String::new())
    }
}

impl From<String> for UpdateType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "CREATE" => Self::Create,
            "UPDATE_FAST_FORWARD" => Self::UpdateFastForward,
            "UPDATE_NON_FAST_FORWARD" => Self::UpdateNonFastForward,
            "DELETE" => Self::Delete,
            _ => Self::Unrecognized(value),
        }
    }
}

impl From<UpdateType> for String {
    fn from(value: UpdateType) -> Self {
        match value {
            UpdateType::Unrecognized(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for UpdateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read an optional value, mapping `null` to the type's empty value
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Decode a raw queue payload into a change event
pub fn decode_envelope(payload: &[u8]) -> Result<ChangeEnvelope, DecodeError> {
    Ok(serde_json::from_slice(payload)?)
}
