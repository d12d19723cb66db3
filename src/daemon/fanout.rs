//! Propagation of pantry and profile changes into friends' caches.

use futures_util::future::join_all;
use log::{debug, warn};

use crate::api::{
    cache_doc, friends_doc, pantry_doc, user_doc, FriendList, Pantry, PantryCache, UserId,
    UserProfile,
};
use crate::commons::{EngineEmptyResult, EngineResult};
use crate::commons::storage::Store;
use crate::daemon::diff::SetDelta;
use crate::daemon::friendship;

//------------ FanOutPropagator ----------------------------------------------

/// Keeps every friend's cache entry for a user in step with that
/// user's canonical documents.
///
/// Cost is one transaction per friend per change. Each friend's
/// propagation succeeds or fails on its own; a failure is logged and
/// leaves that one cache stale until the next change comes through.
#[derive(Clone, Debug)]
pub struct FanOutPropagator {
    store: Store,
}

impl FanOutPropagator {
    pub fn new(store: Store) -> Self {
        FanOutPropagator { store }
    }

    /// Handles a change of one user's pantry document.
    pub async fn pantry_changed(
        &self,
        owner: &UserId,
        before: Option<&Pantry>,
        after: Option<&Pantry>,
    ) -> EngineEmptyResult {
        let Some(after) = after else {
            return Ok(());
        };
        if before.map(|b| b.ingredients == after.ingredients).unwrap_or(false) {
            return Ok(());
        }
        self.propagate(owner, CachePatch::Ingredients(after.ingredients.clone()))
            .await
    }

    /// Handles a change of one user's profile document.
    pub async fn profile_changed(
        &self,
        owner: &UserId,
        before: Option<&UserProfile>,
        after: Option<&UserProfile>,
    ) -> EngineEmptyResult {
        let Some(after) = after else {
            return Ok(());
        };
        let unchanged = before
            .map(|b| b.email == after.email && b.image == after.image)
            .unwrap_or(false);
        if unchanged {
            return Ok(());
        }
        self.propagate(
            owner,
            CachePatch::Profile {
                email: after.email.clone(),
                image: after.image.clone(),
            },
        )
        .await
    }

    /// Handles a change of one user's friend list by aligning the
    /// user's own cache with it.
    ///
    /// A lost friend's entry is dropped; a gained friend's entry is
    /// seeded if the promotion step did not get to it. Both sides of an
    /// unfriend receive their own list change, so each cleans its own
    /// cache.
    pub async fn friend_list_changed(
        &self,
        owner: &UserId,
        before: Option<&FriendList>,
        after: Option<&FriendList>,
    ) -> EngineEmptyResult {
        let Some(after) = after else {
            return Ok(());
        };
        let empty = FriendList::new(owner.clone());
        let before = before.unwrap_or(&empty);
        let delta = SetDelta::between(&before.friends, &after.friends);

        for lost in &delta.removed {
            self.store.run_transaction(&[cache_doc(owner)], |txn| -> EngineEmptyResult {
                let Some(mut cache) = txn.get::<PantryCache>(&cache_doc(owner))? else {
                    return Ok(());
                };
                if cache.remove_entry(lost) {
                    txn.set(&cache_doc(owner), &cache)?;
                    debug!("dropped cache entry for {} at {}", lost, owner);
                }
                Ok(())
            })?;
        }

        for gained in &delta.added {
            let paths = [cache_doc(owner), user_doc(gained), pantry_doc(gained)];
            let seeded: bool = self
                .store
                .run_transaction(&paths, |txn| friendship::seed_cache_entry(txn, owner, gained))?;
            if seeded {
                debug!("seeded missing cache entry for {} at {}", gained, owner);
            }
        }

        Ok(())
    }

    /// Applies the patch to every friend's cache entry, concurrently.
    async fn propagate(&self, owner: &UserId, patch: CachePatch) -> EngineEmptyResult {
        let friends = self
            .store
            .get::<FriendList>(&friends_doc(owner))?
            .map(|list| list.friends)
            .unwrap_or_default();
        if friends.is_empty() {
            return Ok(());
        }

        let mut targets = Vec::with_capacity(friends.len());
        let mut tasks = Vec::with_capacity(friends.len());
        for friend in friends {
            let store = self.store.clone();
            let owner = owner.clone();
            let patch = patch.clone();
            targets.push(friend.clone());
            tasks.push(tokio::spawn(async move {
                patch_cache(&store, &friend, &owner, &patch)
            }));
        }

        for (friend, joined) in targets.iter().zip(join_all(tasks).await) {
            match joined {
                Ok(Ok(true)) => debug!("updated cache entry for {} at {}", owner, friend),
                Ok(Ok(false)) => {
                    debug!("no cache entry for {} at {}; nothing to update", owner, friend)
                }
                Ok(Err(e)) => {
                    warn!("cache propagation to friend {} of {} failed: {}", friend, owner, e)
                }
                Err(e) => {
                    warn!("cache propagation task for friend {} of {} aborted: {}", friend, owner, e)
                }
            }
        }

        Ok(())
    }
}

/// Patches the cache entry for `subject` in `cache_owner`'s cache.
///
/// Returns whether an entry was updated. A missing cache document or
/// entry means the friendship is gone or still forming; fan-out never
/// creates entries, so both cases are skips.
fn patch_cache(
    store: &Store,
    cache_owner: &UserId,
    subject: &UserId,
    patch: &CachePatch,
) -> EngineResult<bool> {
    store.run_transaction(&[cache_doc(cache_owner)], |txn| {
        let Some(mut cache) = txn.get::<PantryCache>(&cache_doc(cache_owner))? else {
            return Ok(false);
        };
        let Some(entry) = cache.entry_mut(subject) else {
            return Ok(false);
        };
        match patch {
            CachePatch::Ingredients(ingredients) => {
                entry.ingredients = ingredients.clone();
            }
            CachePatch::Profile { email, image } => {
                entry.email = email.clone();
                entry.image = image.clone();
            }
        }
        txn.set(&cache_doc(cache_owner), &cache)?;
        Ok(true)
    })
}

//------------ CachePatch ----------------------------------------------------

#[derive(Clone, Debug)]
enum CachePatch {
    Ingredients(Vec<String>),
    Profile {
        email: String,
        image: Option<String>,
    },
}
