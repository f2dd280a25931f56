//! Session search: list, then one metadata request per listed session.
//!
//! Each session is reported as a partial result as soon as its metadata
//! arrives. The task completes on the first tick after every requested
//! session has answered, successfully or not.

use tracing::debug;

use super::mismatched_params;
use crate::adapter::{AsyncOp, BackendCall};
use crate::backend::BackendSessionId;
use crate::coordinator::engine::{Engine, Step};
use crate::session::user_data::decode_session_data;
use crate::session::{CreateFlags, SessionSearchResult};
use crate::task::{PartialResult, TaskId, TaskParams};

pub(super) fn start(engine: &mut Engine<'_>, id: TaskId) -> Step {
    let Some(TaskParams::Search(progress)) = engine.params(id) else {
        return mismatched_params(id);
    };
    Step::call(BackendCall::SearchSessions {
        filters: progress.params.filters.clone(),
        max_results: progress.params.max_results,
    })
}

pub(super) fn listed(
    engine: &mut Engine<'_>,
    id: TaskId,
    sessions: Vec<BackendSessionId>,
) -> Step {
    let Some(TaskParams::Search(mut progress)) = engine.params(id).cloned() else {
        return mismatched_params(id);
    };
    let limit = usize::try_from(progress.params.max_results).unwrap_or(usize::MAX);
    let backend = &mut *engine.backend;
    progress.awaiting = sessions
        .into_iter()
        .take(limit)
        .filter(|session| {
            let requested = backend.request_session_data(*session);
            if !requested {
                debug!(%session, "Session data request refused");
            }
            requested
        })
        .collect();
    progress.listed = true;
    debug!(task_id = %id, found = progress.awaiting.len(), "Session list received");

    if let Some(params) = engine.params_mut(id) {
        *params = TaskParams::Search(progress);
    }
    engine.await_op(id, AsyncOp::SessionData);
    Step::wait()
}

pub(super) fn tick(engine: &mut Engine<'_>, id: TaskId) -> Step {
    match engine.params(id) {
        Some(TaskParams::Search(progress)) if progress.listed && progress.awaiting.is_empty() => {
            Step::done()
        }
        _ => Step::wait(),
    }
}

/// Metadata for `session` arrived (or failed to) for the running search.
pub(crate) fn data_updated(engine: &mut Engine<'_>, session: BackendSessionId, success: bool) {
    let Some(id) = engine.state.adapter.owner(AsyncOp::SessionData) else {
        debug!(%session, "Session data update with no search waiting");
        return;
    };
    let Some(TaskParams::Search(progress)) = engine.params_mut(id) else {
        return;
    };
    let Some(index) = progress.awaiting.iter().position(|s| *s == session) else {
        return;
    };
    progress.awaiting.remove(index);

    if !success {
        debug!(task_id = %id, %session, "Session data unavailable, skipping");
        return;
    }
    let result = describe(engine, session);
    engine.post_partial(id, PartialResult::SearchResult(result));
}

fn describe(engine: &Engine<'_>, session: BackendSessionId) -> SessionSearchResult {
    let backend = &*engine.backend;
    let data = decode_session_data(
        |key| backend.session_metadata(session, key),
        engine.limits.max_session_user_data,
    );
    let members = backend.session_members(session);
    SessionSearchResult {
        id: session,
        data,
        num_filled_slots: u32::try_from(members.len()).unwrap_or(u32::MAX),
        num_friends: backend.social().count_friends(&members),
        ping: 0,
        flags: CreateFlags::SEARCHABLE,
    }
}
