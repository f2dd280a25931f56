#![allow(clippy::unwrap_used)] // Integration tests use unwrap for brevity

//! Task lifecycle against a single coordinator: pool limits, supersession,
//! stale handles, timeouts, cancellation and teardown.

mod common;

use std::time::{Duration, Instant};

use common::{Node, Recorder};
use lobbykit_core::Config;
use lobbykit_matchmaking::backend::{BackendResult, EntryRange};
use lobbykit_matchmaking::session::{UserDataEntry, UserDataValue};
use lobbykit_matchmaking::{
    AsyncOp, CreateFlags, LobbyError, LoopbackNetwork, SessionData, SessionHandle,
    SessionSearchParams,
};

fn lobby(public: u32) -> SessionData {
    SessionData {
        name: "lobby".to_string(),
        num_public_slots: public,
        ..SessionData::default()
    }
}

fn host_session(node: &mut Node) -> SessionHandle {
    let created = Recorder::default();
    node.client
        .session_create(1, CreateFlags::SEARCHABLE, lobby(4), created.callback())
        .unwrap();
    node.step();
    created.session()
}

#[test]
fn full_task_pool_rejects_without_allocating() {
    let network = LoopbackNetwork::new();
    let mut config = Config::default();
    config.matchmaking.max_tasks = 2;
    let mut node = Node::with_config(&network, 1, "host", &config);

    let reports = Recorder::default();
    node.client
        .stats_read(vec!["wins".into()], Vec::new(), reports.callback())
        .unwrap();
    node.client
        .leaderboard_read("board", EntryRange::Friends, reports.callback())
        .unwrap();
    assert_eq!(node.client.active_task_count(), 2);

    let third = node.client.session_search(
        0,
        SessionSearchParams::default(),
        reports.callback(),
    );
    assert_eq!(third, Err(LobbyError::TooManyTasks));
    assert_eq!(node.client.active_task_count(), 2);

    // A failed create must not leak the session slot it reserved.
    let create = node
        .client
        .session_create(1, CreateFlags::SEARCHABLE, lobby(4), reports.callback());
    assert_eq!(create, Err(LobbyError::TooManyTasks));
    assert_eq!(node.client.active_session_count(), 0);
}

#[test]
fn newer_request_of_a_kind_cancels_the_older_one() {
    let network = LoopbackNetwork::new();
    let mut node = Node::new(&network, 1, "host");
    node.backend.hold_results(true);

    let first = Recorder::default();
    let second = Recorder::default();
    let a = node
        .client
        .session_search(0, SessionSearchParams::default(), first.callback())
        .unwrap();
    let b = node
        .client
        .session_search(0, SessionSearchParams::default(), second.callback())
        .unwrap();
    node.step();

    assert_eq!(first.completions(), vec![Err(LobbyError::Cancelled)]);
    assert!(second.completions().is_empty());
    assert_eq!(node.client.pending_owner(AsyncOp::SearchSessions), Some(b));
    assert_ne!(node.client.pending_owner(AsyncOp::SearchSessions), Some(a));

    // Later ticks never report the superseded task again.
    node.step();
    node.step();
    assert_eq!(first.completions().len(), 1);
}

#[test]
fn deleted_session_handle_is_invalid_everywhere() {
    let network = LoopbackNetwork::new();
    let mut node = Node::new(&network, 1, "host");
    let h = host_session(&mut node);
    assert_eq!(network.sessions().len(), 1);

    let deleted = Recorder::default();
    node.client.session_delete(h, deleted.callback()).unwrap();
    node.step();
    assert!(matches!(deleted.completed(), Some(Ok(_))));
    assert!(network.sessions().is_empty());

    let ignored = Recorder::default();
    assert_eq!(
        node.client.session_query(h, ignored.callback()),
        Err(LobbyError::InvalidSession)
    );
    assert_eq!(
        node.client.session_update(h, Vec::new(), ignored.callback()),
        Err(LobbyError::InvalidSession)
    );
    assert_eq!(
        node.client.session_start(h, ignored.callback()),
        Err(LobbyError::InvalidSession)
    );
    assert_eq!(
        node.client.session_delete(h, ignored.callback()),
        Err(LobbyError::InvalidSession)
    );
    assert_eq!(node.client.session_backend_id(h), Err(LobbyError::InvalidSession));

    // The slot is reused, the old handle stays dead.
    let reused = host_session(&mut node);
    assert_ne!(reused, h);
    assert_eq!(
        node.client.session_get_users(h, ignored.callback()),
        Err(LobbyError::InvalidSession)
    );
    assert!(node.client.session_backend_id(reused).unwrap().is_some());
}

#[test]
fn search_times_out_exactly_once() {
    let network = LoopbackNetwork::new();
    let mut node = Node::new(&network, 1, "guest");
    node.backend.hold_results(true);

    let search = Recorder::default();
    node.client
        .session_search(0, SessionSearchParams::default(), search.callback())
        .unwrap();
    let start = Instant::now();
    node.step_at(start);
    node.step_at(start + Duration::from_secs(9));
    assert!(search.completions().is_empty());

    node.step_at(start + Duration::from_millis(10_001));
    assert_eq!(search.completions(), vec![Err(LobbyError::TimedOut)]);
    assert_eq!(node.client.pending_owner(AsyncOp::SearchSessions), None);

    // The held answer arriving late changes nothing.
    node.backend.release_held();
    node.step_at(start + Duration::from_secs(11));
    node.step_at(start + Duration::from_secs(30));
    assert_eq!(search.completions().len(), 1);
    assert_eq!(node.client.active_task_count(), 0);
}

#[test]
fn join_times_out_and_leaves_the_backend_session() {
    let network = LoopbackNetwork::new();
    let mut host = Node::new(&network, 1, "host");
    let hosted = host_session(&mut host);
    let id = host.client.session_backend_id(hosted).unwrap().unwrap();

    let mut guest = Node::new(&network, 2, "guest");
    guest.backend.hold_results(true);
    let join = Recorder::default();
    guest
        .client
        .session_join(1, CreateFlags::NONE, id, join.callback())
        .unwrap();
    let start = Instant::now();
    guest.step_at(start);
    assert!(network.members(id).contains(&guest.identity()));
    assert_eq!(
        guest.client.session_join(1, CreateFlags::NONE, id, join.callback()),
        Err(LobbyError::InvalidRequest)
    );

    guest.step_at(start + Duration::from_millis(10_001));
    assert_eq!(join.completions(), vec![Err(LobbyError::TimedOut)]);
    assert_eq!(network.members(id), vec![host.identity()]);
    assert_eq!(guest.client.active_session_count(), 0);
    assert_eq!(guest.client.pending_owner(AsyncOp::JoinSession), None);

    guest.backend.release_held();
    guest.step_at(start + Duration::from_secs(11));
    assert_eq!(join.completions().len(), 1);
    assert_eq!(guest.client.active_task_count(), 0);
    assert_eq!(network.members(id), vec![host.identity()]);
}

#[test]
fn cancel_stops_the_task_on_the_next_tick() {
    let network = LoopbackNetwork::new();
    let mut node = Node::new(&network, 1, "host");
    node.backend.hold_results(true);

    let read = Recorder::default();
    let id = node
        .client
        .leaderboard_read("board", EntryRange::Global { start: 1, end: 5 }, read.callback())
        .unwrap();
    node.step();
    assert_eq!(node.client.pending_owner(AsyncOp::FindLeaderboard), Some(id));

    node.client.cancel_task(id).unwrap();
    node.step();
    assert_eq!(read.completions(), vec![Err(LobbyError::Cancelled)]);
    assert_eq!(node.client.pending_owner(AsyncOp::FindLeaderboard), None);
    assert_eq!(node.client.cancel_task(id), Err(LobbyError::InvalidArgument));
}

#[test]
fn synchronous_backend_failure_is_internal() {
    let network = LoopbackNetwork::new();
    let mut node = Node::new(&network, 1, "host");
    node.backend.fail_next_call(BackendResult::ACCESS_DENIED);

    let created = Recorder::default();
    node.client
        .session_create(1, CreateFlags::SEARCHABLE, lobby(4), created.callback())
        .unwrap();
    node.step();
    // The request never reached the service, so the code loses its meaning.
    assert_eq!(created.completed(), Some(Err(LobbyError::InternalError)));
    assert_eq!(node.client.active_session_count(), 0);
    assert!(network.sessions().is_empty());
}

#[test]
fn offline_backend_reports_service_unavailable() {
    let network = LoopbackNetwork::new();
    let mut node = Node::new(&network, 1, "host");
    network.set_online(node.identity(), false);

    let read = Recorder::default();
    node.client
        .stats_read(vec!["wins".into()], Vec::new(), read.callback())
        .unwrap();
    node.step();
    assert_eq!(read.completed(), Some(Err(LobbyError::ServiceUnavailable)));
}

#[test]
fn entry_points_validate_before_allocating() {
    let network = LoopbackNetwork::new();
    let mut node = Node::new(&network, 1, "host");
    let r = Recorder::default();

    let too_many_users = node
        .client
        .session_create(5, CreateFlags::SEARCHABLE, lobby(8), r.callback());
    assert_eq!(too_many_users, Err(LobbyError::InvalidArgument));

    let no_slots = node
        .client
        .session_create(1, CreateFlags::SEARCHABLE, lobby(0), r.callback());
    assert_eq!(no_slots, Err(LobbyError::InvalidArgument));

    let long_name = SessionData {
        name: "x".repeat(33),
        ..lobby(4)
    };
    assert_eq!(
        node.client
            .session_create(1, CreateFlags::SEARCHABLE, long_name, r.callback()),
        Err(LobbyError::InvalidArgument)
    );

    let crowded = SessionData {
        user_data: (0..65)
            .map(|id| UserDataEntry::new(id, UserDataValue::Int8(1)))
            .collect(),
        ..lobby(4)
    };
    assert_eq!(
        node.client
            .session_create(1, CreateFlags::SEARCHABLE, crowded, r.callback()),
        Err(LobbyError::OutOfUserData)
    );

    let h = host_session(&mut node);
    assert_eq!(
        node.client
            .session_set_local_user_data(h, &[0; 17], r.callback()),
        Err(LobbyError::OutOfUserData)
    );
    assert_eq!(
        node.client.session_end(h, r.callback()),
        Err(LobbyError::InvalidRequest)
    );
    assert_eq!(
        node.client.session_search(4, SessionSearchParams::default(), r.callback()),
        Err(LobbyError::InvalidArgument)
    );
    assert_eq!(node.client.active_task_count(), 0);
}

#[test]
fn start_and_end_toggle_the_started_flag() {
    let network = LoopbackNetwork::new();
    let mut node = Node::new(&network, 1, "host");
    let h = host_session(&mut node);

    let started = Recorder::default();
    node.client.session_start(h, started.callback()).unwrap();
    node.step();
    assert!(matches!(started.completed(), Some(Ok(_))));

    let again = Recorder::default();
    assert_eq!(
        node.client.session_start(h, again.callback()),
        Err(LobbyError::InvalidRequest)
    );
    node.client.session_end(h, again.callback()).unwrap();
    node.step();
    assert!(matches!(again.completed(), Some(Ok(_))));
}

#[test]
fn shutdown_drives_every_task_to_a_terminal_error() {
    let network = LoopbackNetwork::new();
    let mut node = Node::new(&network, 1, "host");
    let h = host_session(&mut node);
    node.backend.hold_results(true);

    let reports = Recorder::default();
    node.client
        .session_search(0, SessionSearchParams::default(), reports.callback())
        .unwrap();
    node.client
        .leaderboard_read("board", EntryRange::Friends, reports.callback())
        .unwrap();
    node.client
        .stats_read(vec!["wins".into()], Vec::new(), reports.callback())
        .unwrap();
    node.service.tick();
    // Queued but never started.
    node.client.session_query(h, reports.callback()).unwrap();
    assert_eq!(node.client.active_task_count(), 4);

    node.service.shutdown();
    node.client.pump();

    let completions = reports.completions();
    assert_eq!(completions.len(), 4);
    assert!(completions.iter().all(|c| *c == Err(LobbyError::Cancelled)));
    assert_eq!(node.client.active_task_count(), 0);
    assert_eq!(node.client.active_session_count(), 0);
    assert!(network.sessions().is_empty());
    assert!(node.service.is_shut_down());

    assert_eq!(
        node.client.stats_read(vec!["wins".into()], Vec::new(), reports.callback()),
        Err(LobbyError::ServiceUnavailable)
    );
}
