//! Wire messages exchanged between peers.
//!
//! Frames are JSON objects tagged by `type`; CRDT payloads travel as
//! base64 strings.

use serde::{Deserialize, Serialize};

use super::CollabError;
use super::awareness::UserState;

mod base64_bytes {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WireMessage {
    /// "Here is what I have"; answered with `SyncStep2`.
    #[serde(rename_all = "camelCase")]
    SyncStep1 {
        #[serde(with = "base64_bytes")]
        state_vector: Vec<u8>,
    },
    /// The updates the requester is missing.
    SyncStep2 {
        #[serde(with = "base64_bytes")]
        update: Vec<u8>,
    },
    /// An incremental local change.
    Update {
        #[serde(with = "base64_bytes")]
        update: Vec<u8>,
    },
    /// Presence of `client`; `None` means the peer left.
    Awareness { client: u64, state: Option<UserState> },
}

impl WireMessage {
    pub fn encode(&self) -> Result<String, CollabError> {
        serde_json::to_string(self).map_err(|e| CollabError::Decode(e.to_string()))
    }

    pub fn decode(frame: &str) -> Result<Self, CollabError> {
        serde_json::from_str(frame).map_err(|e| CollabError::Decode(e.to_string()))
    }
}
