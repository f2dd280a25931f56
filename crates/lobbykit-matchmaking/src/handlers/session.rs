//! Handlers for tasks that act on a session the local user already holds.

use tracing::{info, warn};

use super::mismatched_params;
use crate::adapter::BackendCall;
use crate::backend::{BackendResult, BackendSessionId, SessionVisibility};
use crate::coordinator::engine::{Engine, Step};
use crate::error::LobbyError;
use crate::events::SessionEvent;
use crate::packet::LobbyPacket;
use crate::session::user_data::{
    KEY_PRIVATE_SLOTS, KEY_PUBLIC_SLOTS, encode_u32, metadata_pairs, user_data_pairs,
};
use crate::session::{CreateFlags, SessionHandle, SessionSearchResult};
use crate::task::{PartialResult, TaskId, TaskOutput, TaskParams};
use crate::translate::translate_result;

fn session_of(engine: &Engine<'_>, id: TaskId) -> Result<SessionHandle, LobbyError> {
    engine
        .session_of(id)
        .filter(|h| engine.state.sessions.contains(*h))
        .ok_or(LobbyError::InvalidSession)
}

/// Write metadata pairs; `false` if the backend refused any of them.
fn publish(
    engine: &mut Engine<'_>,
    backend_id: BackendSessionId,
    pairs: &[(String, String)],
) -> bool {
    let mut all_set = true;
    for (key, value) in pairs {
        if !engine.backend.set_session_metadata(backend_id, key, value) {
            warn!(%backend_id, key = %key, "Backend refused session metadata");
            all_set = false;
        }
    }
    all_set
}

pub(super) fn register_user_data(engine: &mut Engine<'_>, id: TaskId) -> Step {
    let Some(TaskParams::UserData(entries)) = engine.params(id).cloned() else {
        return mismatched_params(id);
    };
    info!(entries = entries.len(), "Session user data registered");
    engine.state.sessions.register_user_data(entries);
    Step::done()
}

pub(super) fn create(engine: &mut Engine<'_>, id: TaskId) -> Step {
    let session = session_of(engine, id).and_then(|h| engine.state.sessions.get(h));
    let Ok(session) = session else {
        return Step::fail(LobbyError::InvalidSession);
    };
    let flags = session.create_flags;
    let visibility = if flags.contains(CreateFlags::SEARCHABLE) {
        SessionVisibility::Public
    } else if flags.contains(CreateFlags::INVITABLE) {
        SessionVisibility::FriendsOnly
    } else {
        SessionVisibility::Private
    };
    Step::call(BackendCall::CreateSession {
        visibility,
        max_members: session.data.total_slots(),
    })
}

pub(super) fn created(
    engine: &mut Engine<'_>,
    id: TaskId,
    result: BackendResult,
    backend_id: BackendSessionId,
) -> Step {
    if let Some(error) = translate_result(result) {
        return Step::fail(error);
    }
    let social = engine.backend.social();
    let identity = social.local_identity();
    let persona = social.local_display_name();

    let Ok(h) = session_of(engine, id) else {
        engine.backend.leave_session(backend_id);
        return Step::fail(LobbyError::InvalidSession);
    };
    let uid = engine.state.sessions.create_connection_uid();
    let Ok(session) = engine.state.sessions.get_mut(h) else {
        return Step::fail(LobbyError::InvalidSession);
    };
    session.backend_id = Some(backend_id);
    session.backend_joined = true;
    session.owner = identity;
    if session.data.name.is_empty() {
        session.data.name.clone_from(&persona);
    }
    let pairs = metadata_pairs(&session.data);
    if engine
        .state
        .sessions
        .init_local_connection(h, uid, identity, persona)
        .is_err()
    {
        return Step::fail(LobbyError::InvalidSession);
    }

    info!(session = %h, %backend_id, uid = uid.0, "Session created");
    if publish(engine, backend_id, &pairs) {
        Step::done()
    } else {
        Step::fail(LobbyError::InternalError)
    }
}

pub(super) fn update(engine: &mut Engine<'_>, id: TaskId) -> Step {
    let Some(TaskParams::UserData(entries)) = engine.params(id).cloned() else {
        return mismatched_params(id);
    };
    let session = session_of(engine, id).and_then(|h| engine.state.sessions.get_mut(h));
    let Ok(session) = session else {
        return Step::fail(LobbyError::InvalidSession);
    };
    session.data.merge_user_data(&entries);
    let pairs = user_data_pairs(&session.data.user_data);
    let backend_id = session.backend_id;
    match backend_id {
        Some(backend_id) if !publish(engine, backend_id, &pairs) => {
            Step::fail(LobbyError::InternalError)
        }
        _ => Step::done(),
    }
}

pub(super) fn update_slots(engine: &mut Engine<'_>, id: TaskId) -> Step {
    let Some(TaskParams::Slots { public, private }) = engine.params(id).cloned() else {
        return mismatched_params(id);
    };
    let session = session_of(engine, id).and_then(|h| engine.state.sessions.get_mut(h));
    let Ok(session) = session else {
        return Step::fail(LobbyError::InvalidSession);
    };
    session.data.num_public_slots = public;
    session.data.num_private_slots = private;
    let pairs = [
        (KEY_PUBLIC_SLOTS.to_string(), encode_u32(public)),
        (KEY_PRIVATE_SLOTS.to_string(), encode_u32(private)),
    ];
    let backend_id = session.backend_id;
    match backend_id {
        Some(backend_id) if !publish(engine, backend_id, &pairs) => {
            Step::fail(LobbyError::InternalError)
        }
        _ => Step::done(),
    }
}

pub(super) fn query(engine: &mut Engine<'_>, id: TaskId) -> Step {
    let Ok(h) = session_of(engine, id) else {
        return Step::fail(LobbyError::InvalidSession);
    };
    let sessions = &engine.state.sessions;
    let (Ok(session), Ok(filled)) = (sessions.get(h), sessions.filled_slots(h)) else {
        return Step::fail(LobbyError::InvalidSession);
    };
    let Some(backend_id) = session.backend_id else {
        return Step::fail(LobbyError::InvalidRequest);
    };
    let members = engine.backend.session_members(backend_id);
    let result = SessionSearchResult {
        id: backend_id,
        data: session.data.clone(),
        num_filled_slots: filled,
        num_friends: engine.backend.social().count_friends(&members),
        ping: 0,
        flags: session.create_flags,
    };
    engine.set_output(id, TaskOutput::Query(result));
    Step::done()
}

pub(super) fn get_users(engine: &mut Engine<'_>, id: TaskId) -> Step {
    let users = session_of(engine, id).and_then(|h| engine.state.sessions.users(h));
    let Ok(users) = users else {
        return Step::fail(LobbyError::InvalidSession);
    };
    for user in users {
        engine.post_partial(id, PartialResult::User(user));
    }
    Step::done()
}

pub(super) fn set_started(engine: &mut Engine<'_>, id: TaskId, started: bool) -> Step {
    let Ok(h) = session_of(engine, id) else {
        return Step::fail(LobbyError::InvalidSession);
    };
    let Ok(session) = engine.state.sessions.get_mut(h) else {
        return Step::fail(LobbyError::InvalidSession);
    };
    session.started = started;
    info!(session = %h, started, "Session state changed");
    Step::done()
}

pub(super) fn delete(engine: &mut Engine<'_>, id: TaskId) -> Step {
    let Ok(h) = session_of(engine, id) else {
        return Step::fail(LobbyError::InvalidSession);
    };
    if let Ok(user) = engine.state.sessions.user_info(h, None) {
        engine.raise_event(SessionEvent::UserLeft { session: h, user });
    }
    engine.detach_session(id);
    engine.teardown_session(h);
    Step::done()
}

pub(super) fn set_local_user_data(engine: &mut Engine<'_>, id: TaskId) -> Step {
    let Some(TaskParams::LocalUserData(data)) = engine.params(id).cloned() else {
        return mismatched_params(id);
    };
    let Ok(h) = session_of(engine, id) else {
        return Step::fail(LobbyError::InvalidSession);
    };
    let Ok(session) = engine.state.sessions.get_mut(h) else {
        return Step::fail(LobbyError::InvalidSession);
    };
    session.local.user_data = data;
    let (uid, backend_id) = (session.local.uid, session.backend_id);

    if let Some(backend_id) = backend_id {
        let packet = LobbyPacket::UserData {
            session: backend_id,
            uid: uid.0,
            data,
        };
        let bytes = match packet.encode() {
            Ok(bytes) => bytes,
            Err(error) => {
                warn!(%error, "Failed to encode user data packet");
                return Step::fail(LobbyError::InternalError);
            }
        };
        for transport in engine.state.sessions.remote_transports(h) {
            if !engine.backend.send_packet(transport.0, &bytes) {
                warn!(session = %h, peer = %transport.0, "User data packet not sent");
            }
        }
    }

    if let Ok(user) = engine.state.sessions.user_info(h, None) {
        engine.raise_event(SessionEvent::UserUpdated { session: h, user });
    }
    Step::done()
}
