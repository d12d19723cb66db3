//! End-to-end scenarios driving the engine the way the substrate
//! would: client-side document edits followed by change events, with
//! engine-caused friend list changes fed back as events.

use pantrysync::api::{
    cache_doc, friends_doc, pantry_doc, requests_doc, user_doc, FriendList, Pantry, PantryCache,
    RequestState, UserId, UserProfile,
};
use pantrysync::commons::storage::{Store, Write};
use pantrysync::daemon::dispatch::{Dispatcher, Event};
use pantrysync::daemon::test::*;

/// Reads a user's friend list, or an empty one.
fn friend_list(store: &Store, id: &UserId) -> FriendList {
    store
        .get::<FriendList>(&friends_doc(id))
        .unwrap()
        .unwrap_or_else(|| FriendList::new(id.clone()))
}

fn request_state(store: &Store, id: &UserId) -> RequestState {
    store
        .get::<RequestState>(&requests_doc(id))
        .unwrap()
        .unwrap_or_else(|| RequestState::new(id.clone()))
}

fn cache(store: &Store, id: &UserId) -> PantryCache {
    store
        .get::<PantryCache>(&cache_doc(id))
        .unwrap()
        .unwrap_or_else(|| PantryCache::new(id.clone()))
}

/// Replays the friend-list change the engine's own writes caused, the
/// way the substrate's document watcher would.
async fn replay_friend_list_change(
    store: &Store,
    dispatcher: &Dispatcher,
    owner: &UserId,
    before: FriendList,
) {
    let after = friend_list(store, owner);
    dispatcher
        .dispatch(Event::FriendListChanged {
            owner: owner.clone(),
            before: Some(before),
            after: Some(after),
        })
        .await
        .unwrap();
}

/// Applies a client-side pantry edit and hands the event to the engine.
async fn edit_pantry(store: &Store, dispatcher: &Dispatcher, owner: &UserId, ingredients: &[&str]) {
    let before = store
        .get::<Pantry>(&pantry_doc(owner))
        .unwrap()
        .unwrap_or_else(|| Pantry::new(owner.clone()));
    let mut after = before.clone();
    after.ingredients = ingredients.iter().map(|s| s.to_string()).collect();
    store
        .batch(vec![Write::set(&pantry_doc(owner), &after).unwrap()])
        .unwrap();
    dispatcher
        .dispatch(Event::PantryChanged {
            owner: owner.clone(),
            before: Some(before),
            after: Some(after),
        })
        .await
        .unwrap();
}

/// Befriends the pair through the full request protocol.
async fn befriend(store: &Store, dispatcher: &Dispatcher, a: &UserId, b: &UserId) {
    let a2 = b.clone();
    edit_request_state(store, dispatcher, a, |state| {
        state.request_to.insert(a2);
    })
    .await;
    let b2 = a.clone();
    edit_request_state(store, dispatcher, b, |state| {
        state.request_to.insert(b2);
    })
    .await;
}

#[tokio::test]
async fn request_then_reciprocate_promotes_to_friendship() {
    let (store, dispatcher) = test_engine();
    let alice = user("alice");
    let bob = user("bob");
    create_account(&dispatcher, "alice").await;
    create_account(&dispatcher, "bob").await;

    // alice asks first: mirrored, but no friendship yet
    let target = bob.clone();
    edit_request_state(&store, &dispatcher, &alice, |state| {
        state.request_to.insert(target);
    })
    .await;

    assert!(request_state(&store, &bob).request_from.contains(&alice));
    assert!(friend_list(&store, &alice).friends.is_empty());
    assert!(friend_list(&store, &bob).friends.is_empty());

    // bob reciprocates: mutual intent detected, pair promoted
    let target = alice.clone();
    edit_request_state(&store, &dispatcher, &bob, |state| {
        state.request_to.insert(target);
    })
    .await;

    assert!(friend_list(&store, &alice).friends.contains(&bob));
    assert!(friend_list(&store, &bob).friends.contains(&alice));

    // request entries purged in both directions
    let alice_state = request_state(&store, &alice);
    let bob_state = request_state(&store, &bob);
    assert!(!alice_state.request_to.contains(&bob));
    assert!(!alice_state.request_from.contains(&bob));
    assert!(!bob_state.request_to.contains(&alice));
    assert!(!bob_state.request_from.contains(&alice));

    // each side's cache was seeded with the other's snapshot
    assert!(cache(&store, &alice).entry(&bob).is_some());
    assert_eq!(
        cache(&store, &bob).entry(&alice).unwrap().email,
        "alice@example.org"
    );
}

#[tokio::test]
async fn duplicate_event_delivery_is_a_noop() {
    let (store, dispatcher) = test_engine();
    let alice = user("alice");
    let bob = user("bob");
    create_account(&dispatcher, "alice").await;
    create_account(&dispatcher, "bob").await;

    let before = request_state(&store, &alice);
    let mut after = before.clone();
    after.request_to.insert(bob.clone());
    store
        .batch(vec![Write::set(&requests_doc(&alice), &after).unwrap()])
        .unwrap();

    let event = Event::RequestStateChanged {
        owner: alice.clone(),
        before: Some(before),
        after: Some(after),
    };
    dispatcher.dispatch(event.clone()).await.unwrap();
    dispatcher.dispatch(event).await.unwrap();

    let bob_state = request_state(&store, &bob);
    assert_eq!(bob_state.request_from.len(), 1);
    assert!(bob_state.request_from.contains(&alice));
}

#[tokio::test]
async fn pantry_change_fans_out_to_friend_caches() {
    let (store, dispatcher) = test_engine();
    let alice = user("alice");
    let bob = user("bob");
    create_account(&dispatcher, "alice").await;
    create_account(&dispatcher, "bob").await;
    befriend(&store, &dispatcher, &alice, &bob).await;

    edit_pantry(&store, &dispatcher, &alice, &["egg", "milk"]).await;

    let bob_cache = cache(&store, &bob);
    assert_eq!(
        bob_cache.entry(&alice).unwrap().ingredients,
        vec!["egg".to_string(), "milk".to_string()]
    );

    // the canonical pantry is untouched by the propagation
    let alice_pantry: Pantry = store.get(&pantry_doc(&alice)).unwrap().unwrap();
    assert_eq!(alice_pantry.ingredients, vec!["egg".to_string(), "milk".to_string()]);

    // alice's own cache entry for bob kept its old snapshot
    assert!(cache(&store, &alice).entry(&bob).unwrap().ingredients.is_empty());
}

#[tokio::test]
async fn profile_change_fans_out_to_friend_caches() {
    let (store, dispatcher) = test_engine();
    let alice = user("alice");
    let bob = user("bob");
    create_account(&dispatcher, "alice").await;
    create_account(&dispatcher, "bob").await;
    befriend(&store, &dispatcher, &alice, &bob).await;

    let before: UserProfile = store.get(&user_doc(&alice)).unwrap().unwrap();
    let mut after = before.clone();
    after.email = "alice@elsewhere.org".to_string();
    after.image = Some("https://img.example.org/alice.png".to_string());
    store
        .batch(vec![Write::set(&user_doc(&alice), &after).unwrap()])
        .unwrap();
    dispatcher
        .dispatch(Event::ProfileChanged {
            owner: alice.clone(),
            before: Some(before),
            after: Some(after),
        })
        .await
        .unwrap();

    let entry = cache(&store, &bob);
    let entry = entry.entry(&alice).unwrap();
    assert_eq!(entry.email, "alice@elsewhere.org");
    assert_eq!(entry.image.as_deref(), Some("https://img.example.org/alice.png"));
}

#[tokio::test]
async fn fanout_never_creates_cache_entries() {
    let (store, dispatcher) = test_engine();
    let alice = user("alice");
    let bob = user("bob");
    create_account(&dispatcher, "alice").await;
    create_account(&dispatcher, "bob").await;
    befriend(&store, &dispatcher, &alice, &bob).await;

    // bob's entry for alice vanished under a racing unfriend
    let mut bob_cache = cache(&store, &bob);
    bob_cache.remove_entry(&alice);
    store
        .batch(vec![Write::set(&cache_doc(&bob), &bob_cache).unwrap()])
        .unwrap();

    edit_pantry(&store, &dispatcher, &alice, &["egg"]).await;

    assert!(cache(&store, &bob).entry(&alice).is_none());
}

#[tokio::test]
async fn unfriend_via_remove_list() {
    let (store, dispatcher) = test_engine();
    let alice = user("alice");
    let bob = user("bob");
    create_account(&dispatcher, "alice").await;
    create_account(&dispatcher, "bob").await;
    befriend(&store, &dispatcher, &alice, &bob).await;

    let alice_friends_before = friend_list(&store, &alice);
    let bob_friends_before = friend_list(&store, &bob);

    let target = bob.clone();
    edit_request_state(&store, &dispatcher, &alice, |state| {
        state.remove.insert(target);
    })
    .await;

    assert!(!friend_list(&store, &alice).friends.contains(&bob));
    assert!(!friend_list(&store, &bob).friends.contains(&alice));
    assert!(!request_state(&store, &alice).remove.contains(&bob));

    // the substrate reports the engine's friend list writes back;
    // each side then cleans its own cache
    replay_friend_list_change(&store, &dispatcher, &alice, alice_friends_before).await;
    replay_friend_list_change(&store, &dispatcher, &bob, bob_friends_before).await;

    assert!(cache(&store, &alice).entry(&bob).is_none());
    assert!(cache(&store, &bob).entry(&alice).is_none());
}

#[tokio::test]
async fn friend_list_event_seeds_missed_cache_entries() {
    let (store, dispatcher) = test_engine();
    let alice = user("alice");
    let bob = user("bob");
    create_account(&dispatcher, "alice").await;
    create_account(&dispatcher, "bob").await;
    befriend(&store, &dispatcher, &alice, &bob).await;

    // a crash window left alice without an entry for bob
    let mut alice_cache = cache(&store, &alice);
    alice_cache.remove_entry(&bob);
    store
        .batch(vec![Write::set(&cache_doc(&alice), &alice_cache).unwrap()])
        .unwrap();

    replay_friend_list_change(&store, &dispatcher, &alice, FriendList::new(alice.clone())).await;

    let entry = cache(&store, &alice);
    let entry = entry.entry(&bob).unwrap();
    assert_eq!(entry.email, "bob@example.org");
}

#[tokio::test]
async fn account_deletion_cascades() {
    let (store, dispatcher) = test_engine();
    let alice = user("alice");
    let bob = user("bob");
    create_account(&dispatcher, "alice").await;
    create_account(&dispatcher, "bob").await;
    befriend(&store, &dispatcher, &alice, &bob).await;
    edit_pantry(&store, &dispatcher, &alice, &["egg"]).await;

    dispatcher
        .dispatch(Event::IdentityDeleted { id: alice.clone() })
        .await
        .unwrap();

    // everything alice owned is gone
    assert!(store.list_subtree(&user_doc(&alice)).unwrap().is_empty());

    // bob no longer references alice anywhere
    assert!(!friend_list(&store, &bob).friends.contains(&alice));
    assert!(cache(&store, &bob).entry(&alice).is_none());
}

#[tokio::test]
async fn anonymous_identities_get_no_documents() {
    let (store, dispatcher) = test_engine();

    dispatcher
        .dispatch(Event::IdentityCreated {
            id: user("ghost"),
            email: String::new(),
            is_anonymous: true,
        })
        .await
        .unwrap();

    assert!(store.is_empty().unwrap());
}

#[tokio::test]
async fn self_request_is_rejected_not_propagated() {
    let (store, dispatcher) = test_engine();
    let alice = user("alice");
    create_account(&dispatcher, "alice").await;

    let target = alice.clone();
    edit_request_state(&store, &dispatcher, &alice, |state| {
        state.request_to.insert(target);
    })
    .await;

    let state = request_state(&store, &alice);
    assert!(state.request_from.is_empty());
    assert!(friend_list(&store, &alice).friends.is_empty());
}

/// The final graph state, for comparing runs.
fn graph_state(store: &Store, ids: &[&UserId]) -> Vec<(Vec<String>, RequestState)> {
    ids.iter()
        .map(|id| {
            let friends = friend_list(store, id)
                .friends
                .iter()
                .map(|f| f.to_string())
                .collect();
            (friends, request_state(store, id))
        })
        .collect()
}

#[tokio::test]
async fn independent_pairs_converge_under_reordering() {
    // The same client actions for two unrelated pairs, interleaved two
    // different ways, must land on the same graph.
    async fn run(interleaved: bool) -> Vec<(Vec<String>, RequestState)> {
        let (store, dispatcher) = test_engine();
        for name in ["alice", "bob", "carol", "dan"] {
            create_account(&dispatcher, name).await;
        }
        let (alice, bob) = (user("alice"), user("bob"));
        let (carol, dan) = (user("carol"), user("dan"));

        let actions: Vec<(UserId, UserId)> = if interleaved {
            vec![
                (alice.clone(), bob.clone()),
                (carol.clone(), dan.clone()),
                (dan.clone(), carol.clone()),
                (bob.clone(), alice.clone()),
            ]
        } else {
            vec![
                (carol.clone(), dan.clone()),
                (alice.clone(), bob.clone()),
                (bob.clone(), alice.clone()),
                (dan.clone(), carol.clone()),
            ]
        };
        for (from, to) in actions {
            edit_request_state(&store, &dispatcher, &from, move |state| {
                state.request_to.insert(to);
            })
            .await;
        }

        graph_state(&store, &[&alice, &bob, &carol, &dan])
    }

    assert_eq!(run(false).await, run(true).await);
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_pairs_settle_symmetrically() {
    let (store, dispatcher) = test_engine();
    for name in ["alice", "bob", "carol", "dan"] {
        create_account(&dispatcher, name).await;
    }

    async fn pair_up(store: Store, dispatcher: Dispatcher, a: UserId, b: UserId) {
        befriend(&store, &dispatcher, &a, &b).await;
    }

    let first = tokio::spawn(pair_up(
        store.clone(),
        dispatcher.clone(),
        user("alice"),
        user("bob"),
    ));
    let second = tokio::spawn(pair_up(
        store.clone(),
        dispatcher.clone(),
        user("carol"),
        user("dan"),
    ));
    first.await.unwrap();
    second.await.unwrap();

    for (a, b) in [(user("alice"), user("bob")), (user("carol"), user("dan"))] {
        assert!(friend_list(&store, &a).friends.contains(&b));
        assert!(friend_list(&store, &b).friends.contains(&a));
    }
}
