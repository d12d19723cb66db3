//! Pairwise friendship mutations.
//!
//! Every function here runs inside a caller-supplied transaction whose
//! document set already names everything touched, so a whole promotion
//! (friend lists, request cleanup, cache seeding) commits or retries as
//! one unit. All of them are idempotent and safe to run again after a
//! conflict retry.

use log::debug;

use crate::api::{
    cache_doc, friends_doc, pantry_doc, requests_doc, user_doc, CacheEntry, FriendList, Pantry,
    PantryCache, RequestState, UserId, UserProfile,
};
use crate::commons::error::Error;
use crate::commons::storage::Transaction;
use crate::commons::EngineResult;

/// Adds each user to the other's friend list.
///
/// Returns whether anything changed. A pair that is already friends is
/// left alone.
pub fn make_friends(txn: &mut Transaction, a: &UserId, b: &UserId) -> EngineResult<bool> {
    if a == b {
        return Err(Error::SelfReference(a.clone()));
    }

    let mut list_a = friend_list(txn, a)?;
    let mut list_b = friend_list(txn, b)?;

    let changed_a = list_a.friends.insert(b.clone());
    let changed_b = list_b.friends.insert(a.clone());

    if changed_a {
        txn.set(&friends_doc(a), &list_a)?;
    }
    if changed_b {
        txn.set(&friends_doc(b), &list_b)?;
    }

    Ok(changed_a || changed_b)
}

/// Removes each user from the other's friend list.
///
/// Returns whether anything changed. Unfriending a non-friend is a
/// no-op.
pub fn unfriend(txn: &mut Transaction, a: &UserId, b: &UserId) -> EngineResult<bool> {
    if a == b {
        return Err(Error::SelfReference(a.clone()));
    }

    let mut list_a = friend_list(txn, a)?;
    let mut list_b = friend_list(txn, b)?;

    let changed_a = list_a.friends.remove(b);
    let changed_b = list_b.friends.remove(a);

    if changed_a {
        txn.set(&friends_doc(a), &list_a)?;
    }
    if changed_b {
        txn.set(&friends_doc(b), &list_b)?;
    }

    Ok(changed_a || changed_b)
}

/// Purges every request entry between the pair, in both directions.
///
/// Cleanup after a promotion to friendship or an explicit cancellation.
pub fn resolve_requests(txn: &mut Transaction, a: &UserId, b: &UserId) -> EngineResult<()> {
    for (owner, other) in [(a, b), (b, a)] {
        let mut state = request_state(txn, owner)?;
        let cleared_to = state.request_to.remove(other);
        let cleared_from = state.request_from.remove(other);
        if cleared_to || cleared_from {
            txn.set(&requests_doc(owner), &state)?;
        }
    }
    Ok(())
}

/// Creates the owner's cache entry for a new friend, seeded with the
/// friend's current profile and pantry snapshot.
///
/// Returns whether an entry was created. An existing entry is kept
/// as-is; a friend whose profile is gone (account deletion racing the
/// promotion) is skipped.
pub fn seed_cache_entry(txn: &mut Transaction, owner: &UserId, friend: &UserId) -> EngineResult<bool> {
    let mut cache = txn
        .get::<PantryCache>(&cache_doc(owner))?
        .unwrap_or_else(|| PantryCache::new(owner.clone()));
    if cache.entry(friend).is_some() {
        return Ok(false);
    }

    let Some(profile) = txn.get::<UserProfile>(&user_doc(friend))? else {
        debug!("no profile for {}; not seeding cache entry at {}", friend, owner);
        return Ok(false);
    };
    let pantry = txn
        .get::<Pantry>(&pantry_doc(friend))?
        .unwrap_or_else(|| Pantry::new(friend.clone()));

    cache.entries.push(CacheEntry {
        friend: friend.clone(),
        email: profile.email,
        image: profile.image,
        ingredients: pantry.ingredients,
    });
    txn.set(&cache_doc(owner), &cache)?;
    Ok(true)
}

fn friend_list(txn: &Transaction, id: &UserId) -> EngineResult<FriendList> {
    Ok(txn
        .get::<FriendList>(&friends_doc(id))?
        .unwrap_or_else(|| FriendList::new(id.clone())))
}

fn request_state(txn: &Transaction, id: &UserId) -> EngineResult<RequestState> {
    Ok(txn
        .get::<RequestState>(&requests_doc(id))?
        .unwrap_or_else(|| RequestState::new(id.clone())))
}

//------------ Tests ---------------------------------------------------------
