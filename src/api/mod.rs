//! Data types shared between the engine and its embedders.

pub use self::ids::{IdSet, ParseUserIdError, UserId};
pub use self::models::{CacheEntry, FriendList, Pantry, PantryCache, RequestState, UserProfile};

mod ids;
mod models;

use crate::commons::storage::{DocPath, Segment};
use crate::constants::{
    COL_PANTRY, COL_SOCIAL, COL_USERS, DOC_CACHE, DOC_FRIENDS, DOC_ITEMS, DOC_REQUESTS,
};

//------------ Document paths ------------------------------------------------

// All documents owned by one user live under the user's profile
// document, so account deletion is a single subtree walk.

fn segment(name: &str) -> Segment {
    Segment::parse(name).expect("collection names are valid segments")
}

/// `users/{id}` — profile document, and root of the owned subtree.
pub fn user_doc(id: &UserId) -> DocPath {
    DocPath::new(vec![segment(COL_USERS), id.to_segment()])
}

/// `users/{id}/social/friends`
pub fn friends_doc(id: &UserId) -> DocPath {
    user_doc(id).with_child(segment(COL_SOCIAL)).with_child(segment(DOC_FRIENDS))
}

/// `users/{id}/social/requests`
pub fn requests_doc(id: &UserId) -> DocPath {
    user_doc(id).with_child(segment(COL_SOCIAL)).with_child(segment(DOC_REQUESTS))
}

/// `users/{id}/pantry/items`
pub fn pantry_doc(id: &UserId) -> DocPath {
    user_doc(id).with_child(segment(COL_PANTRY)).with_child(segment(DOC_ITEMS))
}

/// `users/{id}/pantry/cache`
pub fn cache_doc(id: &UserId) -> DocPath {
    user_doc(id).with_child(segment(COL_PANTRY)).with_child(segment(DOC_CACHE))
}
