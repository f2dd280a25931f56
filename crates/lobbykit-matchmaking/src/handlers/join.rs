//! Session join: enter the backend session, then wait for the host's
//! join result.

use tracing::info;

use super::{membership, mismatched_params};
use crate::adapter::{AsyncOp, BackendCall};
use crate::backend::{BackendSessionId, EnterResponse};
use crate::coordinator::engine::{Engine, Step};
use crate::error::LobbyError;
use crate::session::ConnectionUid;
use crate::session::user_data::decode_session_data;
use crate::task::{TaskId, TaskParams};
use crate::translate::translate_enter_response;

pub(super) fn start(engine: &mut Engine<'_>, id: TaskId) -> Step {
    let Some(TaskParams::Join(target)) = engine.params(id) else {
        return mismatched_params(id);
    };
    Step::call(BackendCall::JoinSession(*target))
}

pub(super) fn entered(
    engine: &mut Engine<'_>,
    id: TaskId,
    backend_id: BackendSessionId,
    response: EnterResponse,
) -> Step {
    if let Some(error) = translate_enter_response(response) {
        return Step::fail(error);
    }
    let Some(h) = engine
        .session_of(id)
        .filter(|h| engine.state.sessions.contains(*h))
    else {
        return Step::fail(LobbyError::InvalidSession);
    };

    let backend = &*engine.backend;
    let social = backend.social();
    let identity = social.local_identity();
    let persona = social.local_display_name();
    let owner = backend.session_owner(backend_id);
    let members = backend.session_members(backend_id);
    let data = decode_session_data(
        |key| backend.session_metadata(backend_id, key),
        engine.limits.max_session_user_data,
    );

    let Ok(session) = engine.state.sessions.get_mut(h) else {
        return Step::fail(LobbyError::InvalidSession);
    };
    session.backend_id = Some(backend_id);
    session.backend_joined = true;
    session.owner = owner;
    session.data = data;
    if engine
        .state
        .sessions
        .init_local_connection(h, ConnectionUid::NONE, identity, persona)
        .is_err()
    {
        return Step::fail(LobbyError::InvalidSession);
    }

    // The host arrives with its join result; everyone else is known now.
    for member in members {
        if Some(member) != identity && Some(member) != owner {
            membership::add_member(engine, h, member, ConnectionUid::NONE);
        }
    }
    // Hold the join slot until the host answers so a newer join evicts us.
    engine.await_op(id, AsyncOp::JoinSession);
    info!(session = %h, %backend_id, ?owner, "Entered session, waiting for the host");
    Step::wait()
}

pub(super) fn tick(engine: &mut Engine<'_>, id: TaskId) -> Step {
    let connected = engine
        .session_of(id)
        .and_then(|h| engine.state.sessions.get(h).ok())
        .is_some_and(|s| s.backend_joined && s.host_connection.is_some());
    if connected {
        info!(task_id = %id, "Joined session");
        Step::done()
    } else {
        Step::wait()
    }
}
