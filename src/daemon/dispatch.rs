//! Event routing.
//!
//! The substrate watches documents and identities and hands each change
//! to [`Dispatcher::dispatch`] as a typed event with before/after
//! snapshots. Events for unrelated users may be dispatched
//! concurrently; every handler is idempotent, so duplicate or
//! out-of-order delivery converges.

use std::fmt;

use log::{debug, warn};

use crate::api::{FriendList, Pantry, RequestState, UserId, UserProfile};
use crate::commons::storage::Store;
use crate::commons::EngineEmptyResult;
use crate::daemon::fanout::FanOutPropagator;
use crate::daemon::lifecycle::LifecycleManager;
use crate::daemon::requests::RequestReconciler;

//------------ Event ---------------------------------------------------------

/// A single change delivered by the substrate.
///
/// Document events carry the owner extracted from the changed
/// document's path and the full before/after values; `None` stands for
/// a document that did not exist on that side of the change.
#[derive(Clone, Debug)]
pub enum Event {
    RequestStateChanged {
        owner: UserId,
        before: Option<RequestState>,
        after: Option<RequestState>,
    },
    PantryChanged {
        owner: UserId,
        before: Option<Pantry>,
        after: Option<Pantry>,
    },
    ProfileChanged {
        owner: UserId,
        before: Option<UserProfile>,
        after: Option<UserProfile>,
    },
    FriendListChanged {
        owner: UserId,
        before: Option<FriendList>,
        after: Option<FriendList>,
    },
    IdentityCreated {
        id: UserId,
        email: String,
        is_anonymous: bool,
    },
    IdentityDeleted {
        id: UserId,
    },
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::RequestStateChanged { owner, .. } => {
                write!(f, "request state of '{}' changed", owner)
            }
            Event::PantryChanged { owner, .. } => write!(f, "pantry of '{}' changed", owner),
            Event::ProfileChanged { owner, .. } => write!(f, "profile of '{}' changed", owner),
            Event::FriendListChanged { owner, .. } => {
                write!(f, "friend list of '{}' changed", owner)
            }
            Event::IdentityCreated { id, .. } => write!(f, "identity '{}' created", id),
            Event::IdentityDeleted { id } => write!(f, "identity '{}' deleted", id),
        }
    }
}

//------------ Dispatcher ----------------------------------------------------

/// Routes events to the engine's handlers.
///
/// Cheap to clone; clones share the underlying store.
#[derive(Clone, Debug)]
pub struct Dispatcher {
    requests: RequestReconciler,
    fanout: FanOutPropagator,
    lifecycle: LifecycleManager,
}

impl Dispatcher {
    pub fn new(store: Store) -> Self {
        Dispatcher {
            requests: RequestReconciler::new(store.clone()),
            fanout: FanOutPropagator::new(store.clone()),
            lifecycle: LifecycleManager::new(store),
        }
    }

    pub async fn dispatch(&self, event: Event) -> EngineEmptyResult {
        debug!("handling event: {}", event);
        match event {
            Event::RequestStateChanged { owner, before, after } => {
                self.requests
                    .request_state_changed(&owner, before.as_ref(), after.as_ref())
                    .await
            }
            Event::PantryChanged { owner, before, after } => {
                self.fanout
                    .pantry_changed(&owner, before.as_ref(), after.as_ref())
                    .await
            }
            Event::ProfileChanged { owner, before, after } => {
                self.fanout
                    .profile_changed(&owner, before.as_ref(), after.as_ref())
                    .await
            }
            Event::FriendListChanged { owner, before, after } => {
                self.fanout
                    .friend_list_changed(&owner, before.as_ref(), after.as_ref())
                    .await
            }
            Event::IdentityCreated { id, email, is_anonymous } => {
                if is_anonymous {
                    warn!("identity '{}' is anonymous; no account documents created", id);
                    return Ok(());
                }
                self.lifecycle.create_account(&id, &email, None).await
            }
            Event::IdentityDeleted { id } => self.lifecycle.delete_account(&id).await,
        }
    }
}
