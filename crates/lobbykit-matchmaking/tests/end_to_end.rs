#![allow(clippy::unwrap_used, clippy::panic, clippy::float_cmp)] // Tests unwrap for brevity

//! Two coordinators on one loopback network: host, search, join and what
//! happens to the lobby afterwards.

mod common;

use common::{Node, Recorder, settle};
use lobbykit_matchmaking::backend::{BackendSessionId, EntryRange, StatValue, UploadMethod};
use lobbykit_matchmaking::session::{UserDataEntry, UserDataValue};
use lobbykit_matchmaking::task::{LeaderboardWrite, StatsSnapshot};
use lobbykit_matchmaking::{
    CompletionPayload, CreateFlags, LobbyError, LoopbackNetwork, PartialResult, SessionData,
    SessionEvent, SessionHandle, SessionSearchParams,
};

fn host(node: &mut Node, data: SessionData) -> SessionHandle {
    let created = Recorder::default();
    node.client
        .session_create(1, CreateFlags::SEARCHABLE, data, created.callback())
        .unwrap();
    node.step();
    created.session()
}

fn search(node: &mut Node) -> Vec<PartialResult> {
    let found = Recorder::default();
    node.client
        .session_search(0, SessionSearchParams::default(), found.callback())
        .unwrap();
    node.step();
    node.step();
    assert_eq!(found.completed(), Some(Ok(CompletionPayload::None)));
    found.partials()
}

/// Host a lobby, have the guest join it, and return both handles.
fn joined_pair(host_node: &mut Node, guest: &mut Node) -> (SessionHandle, SessionHandle) {
    let hosted = host(
        host_node,
        SessionData {
            name: "pair".to_string(),
            num_public_slots: 8,
            ..SessionData::default()
        },
    );
    let id = host_node.client.session_backend_id(hosted).unwrap().unwrap();
    let joined = Recorder::default();
    guest
        .client
        .session_join(1, CreateFlags::NONE, id, joined.callback())
        .unwrap();
    settle(&mut [&mut *guest, &mut *host_node], 3);
    (hosted, joined.session())
}

fn four_slots(name: &str) -> SessionData {
    SessionData {
        name: name.to_string(),
        num_public_slots: 4,
        ..SessionData::default()
    }
}

fn backend_id(node: &Node, h: SessionHandle) -> BackendSessionId {
    node.client.session_backend_id(h).unwrap().unwrap()
}

#[test]
fn searched_session_reports_what_was_created() {
    let network = LoopbackNetwork::new();
    let mut host_node = Node::new(&network, 1, "host");
    let mut guest = Node::new(&network, 2, "guest");

    let data = SessionData {
        name: "round-trip".to_string(),
        num_public_slots: 4,
        num_private_slots: 2,
        ranked: false,
        user_data: vec![UserDataEntry::new(1, UserDataValue::Int32(7))],
    };
    host(&mut host_node, data.clone());

    let found = search(&mut guest);
    assert_eq!(found.len(), 1);
    let PartialResult::SearchResult(result) = &found[0] else {
        panic!("expected a search result, got {:?}", found[0]);
    };
    assert_eq!(result.data, data);
    assert_eq!(result.num_filled_slots, 1);
}

#[test]
fn float_user_data_survives_search_bit_for_bit() {
    let network = LoopbackNetwork::new();
    let mut host_node = Node::new(&network, 1, "host");
    let mut guest = Node::new(&network, 2, "guest");

    let entries = vec![
        UserDataEntry::new(1, UserDataValue::Float32(0.1)),
        UserDataEntry::new(2, UserDataValue::Float64(-1.0e-300)),
        UserDataEntry::new(3, UserDataValue::Int16(-2)),
        UserDataEntry::new(4, UserDataValue::Int64(i64::MIN)),
    ];
    host(
        &mut host_node,
        SessionData {
            name: "floats".to_string(),
            num_public_slots: 2,
            user_data: entries.clone(),
            ..SessionData::default()
        },
    );

    let found = search(&mut guest);
    let Some(PartialResult::SearchResult(result)) = found.first() else {
        panic!("search found nothing");
    };
    assert_eq!(result.data.user_data, entries);
}

#[test]
fn create_search_join_raises_host_user_joined() {
    let network = LoopbackNetwork::new();
    let mut host_node = Node::new(&network, 1, "host");
    let mut guest = Node::new(&network, 2, "guest");
    network.befriend(host_node.identity(), guest.identity());

    let hosted = host(
        &mut host_node,
        SessionData {
            name: "e2e".to_string(),
            num_public_slots: 8,
            ..SessionData::default()
        },
    );
    let initial = host_node.events();
    assert!(matches!(
        initial.as_slice(),
        [SessionEvent::UserJoined { user, .. }] if user.is_local
    ));

    let found = search(&mut guest);
    let Some(PartialResult::SearchResult(target)) = found.into_iter().next() else {
        panic!("search found nothing");
    };
    assert_eq!(target.num_filled_slots, 1);
    assert_eq!(target.num_friends, 1);

    let joined = Recorder::default();
    guest
        .client
        .session_join(1, CreateFlags::NONE, target.id, joined.callback())
        .unwrap();
    settle(&mut [&mut guest, &mut host_node], 3);
    let guest_session = joined.session();

    let host_events = host_node.events();
    assert!(
        host_events.iter().any(|e| matches!(
            e,
            SessionEvent::UserJoined { session, user }
                if *session == hosted && !user.is_local && user.identity == Some(guest.identity())
        )),
        "host events: {host_events:?}"
    );

    let guest_users = guest.client.session_users(guest_session).unwrap();
    assert_eq!(guest_users.len(), 2);
    assert!(guest_users[0].is_local);
    assert!(guest_users[0].uid.is_assigned());
    assert_eq!(guest_users[1].identity, Some(host_node.identity()));
    assert_eq!(guest_users[1].name, "host");

    // The guest's initial events cover everyone it knew at completion.
    let guest_events = guest.events();
    let joins = guest_events
        .iter()
        .filter(|e| matches!(e, SessionEvent::UserJoined { .. }))
        .count();
    assert_eq!(joins, 2);

    let query = Recorder::default();
    host_node.client.session_query(hosted, query.callback()).unwrap();
    host_node.step();
    let Some(Ok(CompletionPayload::Query(described))) = query.completed() else {
        panic!("query did not complete");
    };
    assert_eq!(described.num_filled_slots, 2);
}

#[test]
fn local_user_data_reaches_the_host() {
    let network = LoopbackNetwork::new();
    let mut host_node = Node::new(&network, 1, "host");
    let mut guest = Node::new(&network, 2, "guest");
    let (hosted, joined) = joined_pair(&mut host_node, &mut guest);
    host_node.events();

    let set = Recorder::default();
    guest
        .client
        .session_set_local_user_data(joined, b"ready", set.callback())
        .unwrap();
    settle(&mut [&mut guest, &mut host_node], 2);
    assert!(matches!(set.completed(), Some(Ok(_))));

    let mut expected = [0; 16];
    expected[..5].copy_from_slice(b"ready");
    let updated = host_node.events().into_iter().find_map(|e| match e {
        SessionEvent::UserUpdated { session, user } if session == hosted => Some(user),
        _ => None,
    });
    let user = updated.expect("host saw the update");
    assert_eq!(user.user_data, expected);
    assert_eq!(user.identity, Some(guest.identity()));
}

#[test]
fn banned_guest_loses_the_session() {
    let network = LoopbackNetwork::new();
    let mut host_node = Node::new(&network, 1, "host");
    let mut guest = Node::new(&network, 2, "guest");
    let (hosted, _) = joined_pair(&mut host_node, &mut guest);
    host_node.events();
    guest.events();
    let id = backend_id(&host_node, hosted);

    network.kick(id, guest.identity(), true);
    settle(&mut [&mut guest, &mut host_node], 1);

    assert!(guest.events().iter().any(|e| matches!(
        e,
        SessionEvent::Kicked { user, banned: true, .. } if user.is_local
    )));
    assert_eq!(guest.client.active_session_count(), 0);
    assert!(guest.backend.closed_transports().contains(&host_node.identity()));

    assert!(host_node.events().iter().any(|e| matches!(
        e,
        SessionEvent::Kicked { banned: true, .. }
    )));
    assert_eq!(host_node.client.session_users(hosted).unwrap().len(), 1);

    let rejoin = Recorder::default();
    guest
        .client
        .session_join(1, CreateFlags::NONE, id, rejoin.callback())
        .unwrap();
    guest.step();
    assert_eq!(rejoin.completed(), Some(Err(LobbyError::Banned)));
    assert_eq!(guest.client.active_session_count(), 0);
}

#[test]
fn guest_sees_the_host_leave() {
    let network = LoopbackNetwork::new();
    let mut host_node = Node::new(&network, 1, "host");
    let mut guest = Node::new(&network, 2, "guest");
    let (hosted, joined) = joined_pair(&mut host_node, &mut guest);
    guest.events();

    let deleted = Recorder::default();
    host_node.client.session_delete(hosted, deleted.callback()).unwrap();
    settle(&mut [&mut host_node, &mut guest], 1);
    assert!(matches!(deleted.completed(), Some(Ok(_))));

    assert!(guest.events().iter().any(|e| matches!(
        e,
        SessionEvent::UserLeft { session, user }
            if *session == joined && user.identity == Some(host_node.identity())
    )));
    assert_eq!(guest.client.session_users(joined).unwrap().len(), 1);
    assert_eq!(network.members(backend_id(&guest, joined)), vec![guest.identity()]);
}

#[test]
fn joining_a_full_session_fails_and_frees_the_slot() {
    let network = LoopbackNetwork::new();
    let mut host_node = Node::new(&network, 1, "host");
    let mut guest = Node::new(&network, 2, "guest");
    let hosted = host(
        &mut host_node,
        SessionData {
            name: "solo".to_string(),
            num_public_slots: 1,
            ..SessionData::default()
        },
    );

    let joined = Recorder::default();
    guest
        .client
        .session_join(1, CreateFlags::NONE, backend_id(&host_node, hosted), joined.callback())
        .unwrap();
    guest.step();
    assert_eq!(joined.completed(), Some(Err(LobbyError::SessionFull)));
    assert_eq!(guest.client.active_session_count(), 0);
    assert_eq!(guest.client.active_task_count(), 0);
}

#[test]
fn newer_join_cancels_one_still_waiting_for_its_host() {
    let network = LoopbackNetwork::new();
    let mut first_host = Node::new(&network, 1, "first");
    let mut second_host = Node::new(&network, 2, "second");
    let mut guest = Node::new(&network, 3, "guest");
    let a = host(&mut first_host, four_slots("a"));
    let b = host(&mut second_host, four_slots("b"));
    let (a, b) = (backend_id(&first_host, a), backend_id(&second_host, b));

    // The first host never ticks, so no join result comes back.
    let first = Recorder::default();
    guest
        .client
        .session_join(1, CreateFlags::NONE, a, first.callback())
        .unwrap();
    guest.step();
    assert!(network.members(a).contains(&guest.identity()));
    assert!(first.completions().is_empty());

    let second = Recorder::default();
    guest
        .client
        .session_join(1, CreateFlags::NONE, b, second.callback())
        .unwrap();
    settle(&mut [&mut guest, &mut second_host], 3);

    assert_eq!(first.completed(), Some(Err(LobbyError::Cancelled)));
    let joined = second.session();
    assert_eq!(guest.client.session_backend_id(joined).unwrap(), Some(b));
    assert_eq!(guest.client.active_session_count(), 1);
    assert_eq!(network.members(a), vec![first_host.identity()]);
}

#[test]
fn leaderboard_scores_are_shared_across_users() {
    let network = LoopbackNetwork::new();
    let mut host_node = Node::new(&network, 1, "host");
    let mut guest = Node::new(&network, 2, "guest");

    for (node, score) in [(&mut host_node, 50), (&mut guest, 80)] {
        let write = Recorder::default();
        node.client
            .leaderboard_write(
                LeaderboardWrite {
                    board: "arena".to_string(),
                    score,
                    details: vec![score / 10],
                    method: UploadMethod::KeepBest,
                },
                write.callback(),
            )
            .unwrap();
        node.step();
        node.step();
        let Some(Ok(CompletionPayload::ScoreUploaded(result))) = write.completed() else {
            panic!("score upload did not complete");
        };
        assert!(result.score_changed);
    }

    let read = Recorder::default();
    host_node
        .client
        .leaderboard_read("arena", EntryRange::Global { start: 1, end: 10 }, read.callback())
        .unwrap();
    host_node.step();
    host_node.step();
    let Some(Ok(CompletionPayload::Leaderboard(entries))) = read.completed() else {
        panic!("leaderboard read did not complete");
    };
    let ranking: Vec<_> = entries.iter().map(|e| (e.rank, e.user, e.score)).collect();
    assert_eq!(
        ranking,
        vec![(1, guest.identity(), 80), (2, host_node.identity(), 50)]
    );

    let missing = Recorder::default();
    host_node
        .client
        .leaderboard_read("nowhere", EntryRange::Friends, missing.callback())
        .unwrap();
    host_node.step();
    assert_eq!(missing.completed(), Some(Err(LobbyError::InvalidArgument)));
}

#[test]
fn stats_write_then_read() {
    let network = LoopbackNetwork::new();
    let mut node = Node::new(&network, 1, "host");
    network.define_stat(node.identity(), "wins", StatValue::Int(3));
    network.define_achievement(node.identity(), "first_win", true);

    let write = Recorder::default();
    node.client
        .stats_write(vec![("wins".to_string(), StatValue::Int(4))], write.callback())
        .unwrap();
    node.step();
    node.step();
    assert_eq!(write.completed(), Some(Ok(CompletionPayload::None)));
    assert_eq!(network.stat_of(node.identity(), "wins"), Some(StatValue::Int(4)));

    let read = Recorder::default();
    node.client
        .stats_read(vec!["wins".to_string()], vec!["first_win".to_string()], read.callback())
        .unwrap();
    node.step();
    assert_eq!(
        read.completed(),
        Some(Ok(CompletionPayload::Stats(StatsSnapshot {
            stats: vec![("wins".to_string(), StatValue::Int(4))],
            achievements: vec![("first_win".to_string(), true)],
        })))
    );

    let unknown = Recorder::default();
    node.client
        .stats_read(vec!["losses".to_string()], Vec::new(), unknown.callback())
        .unwrap();
    node.step();
    assert_eq!(unknown.completed(), Some(Err(LobbyError::InvalidArgument)));
}
