//! The documents the engine keeps mutually consistent.
//!
//! All five documents for a user are created together at account
//! creation and deleted together at account removal; in between they
//! are mutated exclusively through the daemon's handlers.

use serde::{Deserialize, Serialize};

use crate::api::ids::{IdSet, UserId};

//------------ UserProfile ---------------------------------------------------

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl UserProfile {
    pub fn new(id: UserId, email: String, image: Option<String>) -> Self {
        UserProfile { id, email, image }
    }
}

//------------ FriendList ----------------------------------------------------

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct FriendList {
    pub owner: UserId,
    #[serde(default)]
    pub friends: IdSet,
}

impl FriendList {
    pub fn new(owner: UserId) -> Self {
        FriendList {
            owner,
            friends: IdSet::new(),
        }
    }
}

//------------ RequestState --------------------------------------------------

/// A user's side of the friend-request protocol.
///
/// `request_to` holds outgoing intent filed by the owner, mirrored by
/// the engine into the target's `request_from`. `remove` holds pending
/// unfriend requests; ids stay there only until the unfriend
/// transaction clears them.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RequestState {
    pub owner: UserId,
    #[serde(default)]
    pub request_to: IdSet,
    #[serde(default)]
    pub request_from: IdSet,
    #[serde(default)]
    pub remove: IdSet,
}

impl RequestState {
    pub fn new(owner: UserId) -> Self {
        RequestState {
            owner,
            request_to: IdSet::new(),
            request_from: IdSet::new(),
            remove: IdSet::new(),
        }
    }
}

//------------ Pantry --------------------------------------------------------

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Pantry {
    pub owner: UserId,
    #[serde(default)]
    pub ingredients: Vec<String>,
}

impl Pantry {
    pub fn new(owner: UserId) -> Self {
        Pantry {
            owner,
            ingredients: Vec::new(),
        }
    }
}

//------------ PantryCache ---------------------------------------------------

/// A user's locally-replicated copy of every friend's pantry and
/// profile fields, one entry per current friend.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PantryCache {
    pub owner: UserId,
    #[serde(default)]
    pub entries: Vec<CacheEntry>,
}

impl PantryCache {
    pub fn new(owner: UserId) -> Self {
        PantryCache {
            owner,
            entries: Vec::new(),
        }
    }

    pub fn entry(&self, friend: &UserId) -> Option<&CacheEntry> {
        self.entries.iter().find(|entry| &entry.friend == friend)
    }

    pub fn entry_mut(&mut self, friend: &UserId) -> Option<&mut CacheEntry> {
        self.entries.iter_mut().find(|entry| &entry.friend == friend)
    }

    /// Removes the entry for the friend. Returns whether one was there.
    pub fn remove_entry(&mut self, friend: &UserId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| &entry.friend != friend);
        self.entries.len() != before
    }
}

//------------ CacheEntry ----------------------------------------------------

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub friend: UserId,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default)]
    pub ingredients: Vec<String>,
}

//------------ Tests ---------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_state_fields_default_to_empty() {
        let state: RequestState = serde_json::from_str(r#"{"owner": "alice"}"#).unwrap();
        assert_eq!(state.owner, UserId::new("alice"));
        assert!(state.request_to.is_empty());
        assert!(state.request_from.is_empty());
        assert!(state.remove.is_empty());
    }

    #[test]
    fn cache_entry_lookup_and_removal() {
        let mut cache = PantryCache::new(UserId::new("alice"));
        cache.entries.push(CacheEntry {
            friend: UserId::new("bob"),
            email: "bob@example.org".to_string(),
            image: None,
            ingredients: vec!["egg".to_string()],
        });

        assert!(cache.entry(&UserId::new("bob")).is_some());
        assert!(cache.entry(&UserId::new("carol")).is_none());

        assert!(cache.remove_entry(&UserId::new("bob")));
        assert!(!cache.remove_entry(&UserId::new("bob")));
        assert!(cache.entries.is_empty());
    }
}
