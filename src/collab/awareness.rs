//! Peer presence: who is in the room and where their cursor is.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

const ADJECTIVES: [&str; 16] = [
    "Amber", "Brave", "Calm", "Dapper", "Eager", "Fuzzy", "Gentle", "Happy", "Jolly", "Keen",
    "Lucky", "Mellow", "Nimble", "Quiet", "Rapid", "Witty",
];

const ANIMALS: [&str; 16] = [
    "Badger", "Crane", "Dolphin", "Falcon", "Gecko", "Heron", "Ibis", "Jaguar", "Koala", "Lemur",
    "Marmot", "Narwhal", "Otter", "Panda", "Quokka", "Walrus",
];

const COLORS: [&str; 8] = [
    "#e06c75", "#98c379", "#e5c07b", "#61afef", "#c678dd", "#56b6c2", "#d19a66", "#be5046",
];

/// "Adjective Animal", picked from the id's bytes.
pub fn generated_name(id: &Uuid) -> String {
    let bytes = id.as_bytes();
    let adjective = ADJECTIVES[usize::from(bytes[0]) % ADJECTIVES.len()];
    let animal = ANIMALS[usize::from(bytes[1]) % ANIMALS.len()];
    format!("{adjective} {animal}")
}

pub fn color_for(client: u64) -> String {
    let index = usize::try_from(client % COLORS.len() as u64).unwrap_or(0);
    COLORS[index].to_string()
}

/// What a peer publishes about itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserState {
    pub name: String,
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    pub client: u64,
    pub state: UserState,
}

#[derive(Debug)]
pub struct Awareness {
    client: u64,
    local: UserState,
    peers: BTreeMap<u64, UserState>,
}

impl Awareness {
    /// Local presence for `client`. Without a name one is generated.
    pub fn new(client: u64, name: Option<&str>) -> Self {
        let name = name
            .filter(|name| !name.trim().is_empty())
            .map_or_else(|| generated_name(&Uuid::new_v4()), str::to_string);
        Self {
            client,
            local: UserState {
                name,
                color: color_for(client),
                cursor: None,
            },
            peers: BTreeMap::new(),
        }
    }

    pub const fn client(&self) -> u64 {
        self.client
    }

    pub const fn local(&self) -> &UserState {
        &self.local
    }

    /// Returns true when the cursor moved.
    pub fn set_cursor(&mut self, cursor: Option<usize>) -> bool {
        let changed = self.local.cursor != cursor;
        self.local.cursor = cursor;
        changed
    }

    /// Record a remote peer's state, or forget it on `None`.
    pub fn apply(&mut self, client: u64, state: Option<UserState>) {
        if client == self.client {
            return;
        }
        match state {
            Some(state) => {
                self.peers.insert(client, state);
            }
            None => {
                self.peers.remove(&client);
            }
        }
    }

    pub fn peers(&self) -> Vec<Peer> {
        self.peers
            .iter()
            .map(|(client, state)| Peer {
                client: *client,
                state: state.clone(),
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.peers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_name_has_two_words() {
        let name = generated_name(&Uuid::from_bytes([3; 16]));
        assert_eq!(name, "Dapper Falcon");
    }

    #[test]
    fn test_blank_name_is_replaced() {
        let awareness = Awareness::new(1, Some("  "));
        assert_eq!(awareness.local().name.split(' ').count(), 2);
        assert_eq!(Awareness::new(1, Some("Ada")).local().name, "Ada");
    }

    #[test]
    fn test_peers_ignore_own_client() {
        let mut awareness = Awareness::new(1, Some("me"));
        let state = UserState {
            name: "you".to_string(),
            color: color_for(2),
            cursor: Some(3),
        };
        awareness.apply(1, Some(state.clone()));
        awareness.apply(2, Some(state.clone()));
        assert_eq!(awareness.peers(), vec![Peer { client: 2, state }]);
        awareness.apply(2, None);
        assert!(awareness.peers().is_empty());
    }
}
