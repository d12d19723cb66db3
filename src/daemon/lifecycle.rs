//! Account creation and cascading deletion.

use log::{debug, info, warn};

use crate::api::{
    cache_doc, friends_doc, pantry_doc, requests_doc, user_doc, FriendList, IdSet, Pantry,
    PantryCache, RequestState, UserId, UserProfile,
};
use crate::commons::storage::{self, delete_subtree, Store, Write};
use crate::commons::{error::Error, EngineEmptyResult};

//------------ LifecycleManager ----------------------------------------------

/// Creates and tears down the document set a user owns.
#[derive(Clone, Debug)]
pub struct LifecycleManager {
    store: Store,
}

impl LifecycleManager {
    pub fn new(store: Store) -> Self {
        LifecycleManager { store }
    }

    /// Creates all five documents for a new account in one batch.
    ///
    /// All five land or none do. A redelivered creation event finds the
    /// profile in place and leaves the account alone.
    pub async fn create_account(
        &self,
        id: &UserId,
        email: &str,
        image: Option<&str>,
    ) -> EngineEmptyResult {
        let profile = UserProfile::new(id.clone(), email.to_string(), image.map(str::to_string));
        let writes = vec![
            Write::create(&user_doc(id), &profile)?,
            Write::create(&friends_doc(id), &FriendList::new(id.clone()))?,
            Write::create(&requests_doc(id), &RequestState::new(id.clone()))?,
            Write::create(&pantry_doc(id), &Pantry::new(id.clone()))?,
            Write::create(&cache_doc(id), &PantryCache::new(id.clone()))?,
        ];
        match self.store.batch(writes) {
            Ok(()) => {
                info!("created account documents for user {}", id);
                Ok(())
            }
            Err(storage::Error::AlreadyExists(path)) => {
                warn!("account documents for user {} exist ('{}'); skipping creation", id, path);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Deletes everything the user owns, then scrubs references to the
    /// user out of each former friend's documents.
    ///
    /// The scrub is best-effort: each friend is cleaned in its own
    /// transaction and one failure does not stop the rest. A failed
    /// cleanup leaves a dangling reference in that friend's list and
    /// cache; there is no compensating sweep.
    pub async fn delete_account(&self, id: &UserId) -> EngineEmptyResult {
        // The friend list dies with the subtree, so read it first.
        let friends = self
            .store
            .get::<FriendList>(&friends_doc(id))?
            .map(|list| list.friends)
            .unwrap_or_else(IdSet::new);

        let removed = delete_subtree(&self.store, &user_doc(id))?;
        info!("deleted {} documents owned by departed user {}", removed, id);

        for friend in &friends {
            match self.scrub_friend(id, friend) {
                Ok(()) => debug!("removed {} from documents of former friend {}", id, friend),
                Err(e) => warn!(
                    "cleanup of former friend {} after deleting {} failed: {}. A stale reference remains.",
                    friend, id, e
                ),
            }
        }

        Ok(())
    }

    /// Removes the departed user from one friend's list and cache.
    fn scrub_friend(&self, departed: &UserId, friend: &UserId) -> Result<(), Error> {
        let paths = [friends_doc(friend), cache_doc(friend)];
        self.store.run_transaction(&paths, |txn| {
            if let Some(mut list) = txn.get::<FriendList>(&friends_doc(friend))? {
                if list.friends.remove(departed) {
                    txn.set(&friends_doc(friend), &list)?;
                }
            }
            if let Some(mut cache) = txn.get::<PantryCache>(&cache_doc(friend))? {
                if cache.remove_entry(departed) {
                    txn.set(&cache_doc(friend), &cache)?;
                }
            }
            Ok(())
        })
    }
}

//------------ Tests ---------------------------------------------------------
