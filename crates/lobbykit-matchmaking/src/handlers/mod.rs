//! Per-kind task handlers, keyed by [`TaskKind`].
//!
//! Each handler returns a [`Step`]; the engine applies it. Handlers never
//! keep references to task or session records past their own call.

mod join;
mod leaderboard;
pub(crate) mod membership;
pub(crate) mod packets;
pub(crate) mod search;
mod session;
mod stats;

use tracing::warn;

use crate::backend::CallResult;
use crate::coordinator::engine::{Engine, Step};
use crate::error::LobbyError;
use crate::task::{TaskId, TaskKind};

pub(crate) fn start(engine: &mut Engine<'_>, id: TaskId, kind: TaskKind) -> Step {
    match kind {
        TaskKind::RegisterUserData => session::register_user_data(engine, id),
        TaskKind::SessionCreate => session::create(engine, id),
        TaskKind::SessionUpdate => session::update(engine, id),
        TaskKind::SessionUpdateSlots => session::update_slots(engine, id),
        TaskKind::SessionQuery => session::query(engine, id),
        TaskKind::SessionGetUsers => session::get_users(engine, id),
        TaskKind::SessionStart => session::set_started(engine, id, true),
        TaskKind::SessionEnd => session::set_started(engine, id, false),
        TaskKind::SessionDelete => session::delete(engine, id),
        TaskKind::SessionSetLocalUserData => session::set_local_user_data(engine, id),
        TaskKind::SessionSearch => search::start(engine, id),
        TaskKind::SessionJoin => join::start(engine, id),
        TaskKind::LeaderboardRead | TaskKind::LeaderboardWrite => leaderboard::start(engine, id),
        TaskKind::StatsRead | TaskKind::StatsWrite => stats::start(),
    }
}

/// Re-entered every tick while the task runs.
pub(crate) fn tick(engine: &mut Engine<'_>, id: TaskId, kind: TaskKind) -> Step {
    match kind {
        TaskKind::SessionSearch => search::tick(engine, id),
        TaskKind::SessionJoin => join::tick(engine, id),
        _ => Step::wait(),
    }
}

/// Route the one-shot answer to a call issued for `id`.
pub(crate) fn on_call(
    engine: &mut Engine<'_>,
    id: TaskId,
    kind: TaskKind,
    result: CallResult,
) -> Step {
    match result {
        CallResult::SessionCreated { result, session } if kind == TaskKind::SessionCreate => {
            session::created(engine, id, result, session)
        }
        CallResult::SessionList { sessions } if kind == TaskKind::SessionSearch => {
            search::listed(engine, id, sessions)
        }
        CallResult::SessionEntered { session, response } if kind == TaskKind::SessionJoin => {
            join::entered(engine, id, session, response)
        }
        CallResult::LeaderboardFound { leaderboard } => leaderboard::found(engine, id, leaderboard),
        CallResult::LeaderboardEntries { entries, .. } => {
            leaderboard::downloaded(engine, id, entries)
        }
        CallResult::ScoreUploaded { success, result } => {
            leaderboard::uploaded(engine, id, success, result)
        }
        CallResult::StatsReceived { result } => stats::received(engine, id, result),
        CallResult::StatsStored { result } => stats::stored(result),
        other => {
            warn!(task_id = %id, ?kind, result = ?other, "Call result does not match the task");
            Step::fail(LobbyError::InternalError)
        }
    }
}

/// The task's parameters do not match its kind.
fn mismatched_params(id: TaskId) -> Step {
    warn!(task_id = %id, "Task parameters do not match its kind");
    Step::fail(LobbyError::InternalError)
}
