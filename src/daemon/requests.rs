//! Reconciliation of friend-request state changes.

use log::{debug, info, warn};

use crate::api::{
    cache_doc, friends_doc, pantry_doc, requests_doc, user_doc, FriendList, RequestState, UserId,
    UserProfile,
};
use crate::commons::storage::{DocPath, Store};
use crate::commons::{EngineEmptyResult, EngineResult};
use crate::daemon::diff::SetDelta;
use crate::daemon::friendship;

//------------ RequestReconciler ---------------------------------------------

/// Drives the mutual-intent protocol off request-state changes.
///
/// Outgoing intent lives in the initiator's `request_to` and is
/// mirrored into the target's `request_from`; mutuality is detected on
/// `request_from` of both sides. Every step is idempotent, so
/// duplicate or reordered event delivery converges on the same state.
#[derive(Clone, Debug)]
pub struct RequestReconciler {
    store: Store,
}

impl RequestReconciler {
    pub fn new(store: Store) -> Self {
        RequestReconciler { store }
    }

    /// Handles a change of one user's request-state document.
    pub async fn request_state_changed(
        &self,
        owner: &UserId,
        before: Option<&RequestState>,
        after: Option<&RequestState>,
    ) -> EngineEmptyResult {
        // The document disappears only with its account; deletion is
        // handled by the lifecycle cascade.
        let Some(after) = after else {
            return Ok(());
        };
        let empty = RequestState::new(owner.clone());
        let before = before.unwrap_or(&empty);

        let outgoing = SetDelta::between(&before.request_to, &after.request_to);
        let incoming = SetDelta::between(&before.request_from, &after.request_from);
        let removals = SetDelta::between(&before.remove, &after.remove);

        for target in &outgoing.added {
            if target == owner {
                warn!("user {} filed a friend request for themselves; dropping it", owner);
                continue;
            }
            self.propagate_intent(owner, target)?;
            // The mirrored entry may have completed the pair; the
            // change event it triggers will check again, but checking
            // here as well promotes without waiting for redelivery.
            self.detect_mutual_intent(target, owner)?;
        }

        for target in &outgoing.removed {
            if target == owner {
                continue;
            }
            self.retract_intent(owner, target)?;
        }

        for initiator in &incoming.added {
            if initiator == owner {
                warn!("request-from entry of {} names themselves; ignoring", owner);
                continue;
            }
            self.detect_mutual_intent(owner, initiator)?;
        }

        for target in &removals.added {
            self.apply_removal(owner, target)?;
        }

        Ok(())
    }

    /// Mirrors outgoing intent of `initiator` into the target's
    /// `request_from`. Skips silently if already mirrored, and never
    /// creates documents for users that do not exist.
    fn propagate_intent(&self, initiator: &UserId, target: &UserId) -> EngineEmptyResult {
        let paths = [requests_doc(target), user_doc(target)];
        self.store.run_transaction(&paths, |txn| {
            if txn.get::<UserProfile>(&user_doc(target))?.is_none() {
                debug!("request {} -> {} names an unknown user; dropped", initiator, target);
                return Ok(());
            }
            let mut state = txn
                .get::<RequestState>(&requests_doc(target))?
                .unwrap_or_else(|| RequestState::new(target.clone()));
            if state.request_from.insert(initiator.clone()) {
                txn.set(&requests_doc(target), &state)?;
                debug!("mirrored request {} -> {}", initiator, target);
            }
            Ok(())
        })
    }

    /// Withdraws a mirrored entry after the initiator cancelled an
    /// outgoing request, keeping the two sides' lists dual.
    ///
    /// A promotion clears both sides itself, so by the time its own
    /// writes come back as change events this is a no-op.
    fn retract_intent(&self, initiator: &UserId, target: &UserId) -> EngineEmptyResult {
        self.store.run_transaction(&[requests_doc(target)], |txn| {
            let Some(mut state) = txn.get::<RequestState>(&requests_doc(target))? else {
                return Ok(());
            };
            if state.request_from.remove(initiator) {
                txn.set(&requests_doc(target), &state)?;
                debug!("withdrew request {} -> {}", initiator, target);
            }
            Ok(())
        })
    }

    /// Checks whether intent between the pair is now mutual and, if so,
    /// promotes the pair to friendship.
    ///
    /// `owner` is the side whose `request_from` gained `initiator`.
    /// The transaction re-reads both sides, so a stale event snapshot
    /// cannot promote a pair that has since cancelled.
    fn detect_mutual_intent(&self, owner: &UserId, initiator: &UserId) -> EngineEmptyResult {
        let paths = promotion_paths(owner, initiator);
        let outcome = self.store.run_transaction(&paths, |txn| -> EngineResult<Promotion> {
            let owner_friends = txn
                .get::<FriendList>(&friends_doc(owner))?
                .unwrap_or_else(|| FriendList::new(owner.clone()));
            if owner_friends.friends.contains(initiator) {
                friendship::resolve_requests(txn, owner, initiator)?;
                return Ok(Promotion::AlreadyFriends);
            }

            let owner_state = txn
                .get::<RequestState>(&requests_doc(owner))?
                .unwrap_or_else(|| RequestState::new(owner.clone()));
            let initiator_state = txn
                .get::<RequestState>(&requests_doc(initiator))?
                .unwrap_or_else(|| RequestState::new(initiator.clone()));

            let mutual = owner_state.request_from.contains(initiator)
                && initiator_state.request_from.contains(owner);
            if !mutual {
                return Ok(Promotion::Pending);
            }

            friendship::make_friends(txn, owner, initiator)?;
            friendship::resolve_requests(txn, owner, initiator)?;
            friendship::seed_cache_entry(txn, owner, initiator)?;
            friendship::seed_cache_entry(txn, initiator, owner)?;
            Ok(Promotion::Promoted)
        })?;

        match outcome {
            Promotion::Promoted => info!("users {} and {} are now friends", owner, initiator),
            Promotion::AlreadyFriends => {
                debug!("{} and {} were already friends; cleared stale request entries", owner, initiator)
            }
            Promotion::Pending => {
                debug!("request {} -> {} is pending reciprocation", initiator, owner)
            }
        }
        Ok(())
    }

    /// Executes a pending unfriend request and clears it.
    fn apply_removal(&self, owner: &UserId, target: &UserId) -> EngineEmptyResult {
        let paths = vec![friends_doc(owner), friends_doc(target), requests_doc(owner)];
        self.store.run_transaction(&paths, |txn| -> EngineEmptyResult {
            if target == owner {
                warn!("user {} asked to unfriend themselves; clearing the entry", owner);
            } else {
                friendship::unfriend(txn, owner, target)?;
            }
            let mut state = txn
                .get::<RequestState>(&requests_doc(owner))?
                .unwrap_or_else(|| RequestState::new(owner.clone()));
            if state.remove.remove(target) {
                txn.set(&requests_doc(owner), &state)?;
            }
            Ok(())
        })?;
        debug!("processed unfriend request {} -> {}", owner, target);
        Ok(())
    }
}

/// The document set a promotion may touch: both sides' friend lists and
/// request states for the decision, plus profiles, pantries and caches
/// for seeding the new cache entries in the same transaction.
fn promotion_paths(a: &UserId, b: &UserId) -> Vec<DocPath> {
    vec![
        friends_doc(a),
        friends_doc(b),
        requests_doc(a),
        requests_doc(b),
        user_doc(a),
        user_doc(b),
        pantry_doc(a),
        pantry_doc(b),
        cache_doc(a),
        cache_doc(b),
    ]
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Promotion {
    Promoted,
    AlreadyFriends,
    Pending,
}
