//! Leaderboard read and write, each a find followed by a chained request.

use tracing::warn;

use super::mismatched_params;
use crate::adapter::BackendCall;
use crate::backend::{LeaderboardEntry, LeaderboardId, UploadResult};
use crate::coordinator::engine::{Engine, Step};
use crate::error::LobbyError;
use crate::task::{TaskId, TaskOutput, TaskParams};

pub(super) fn start(engine: &mut Engine<'_>, id: TaskId) -> Step {
    let (name, create_if_missing) = match engine.params(id) {
        Some(TaskParams::LeaderboardRead { board, .. }) => (board.clone(), false),
        Some(TaskParams::LeaderboardWrite(write)) => (write.board.clone(), true),
        _ => return mismatched_params(id),
    };
    Step::call(BackendCall::FindLeaderboard {
        name,
        create_if_missing,
    })
}

pub(super) fn found(
    engine: &mut Engine<'_>,
    id: TaskId,
    leaderboard: Option<LeaderboardId>,
) -> Step {
    match (engine.params(id), leaderboard) {
        (Some(TaskParams::LeaderboardRead { range, .. }), Some(leaderboard)) => {
            Step::call(BackendCall::DownloadEntries {
                leaderboard,
                range: *range,
            })
        }
        (Some(TaskParams::LeaderboardRead { board, .. }), None) => {
            warn!(task_id = %id, board = %board, "Leaderboard not found");
            Step::fail(LobbyError::InvalidArgument)
        }
        (Some(TaskParams::LeaderboardWrite(write)), Some(leaderboard)) => {
            Step::call(BackendCall::UploadScore {
                leaderboard,
                method: write.method,
                score: write.score,
                details: write.details.clone(),
            })
        }
        (Some(TaskParams::LeaderboardWrite(write)), None) => {
            warn!(task_id = %id, board = %write.board, "Leaderboard could not be created");
            Step::fail(LobbyError::InternalError)
        }
        _ => mismatched_params(id),
    }
}

pub(super) fn downloaded(
    engine: &mut Engine<'_>,
    id: TaskId,
    entries: Vec<LeaderboardEntry>,
) -> Step {
    engine.set_output(id, TaskOutput::Leaderboard(entries));
    Step::done()
}

pub(super) fn uploaded(
    engine: &mut Engine<'_>,
    id: TaskId,
    success: bool,
    result: UploadResult,
) -> Step {
    if !success {
        return Step::fail(LobbyError::InternalError);
    }
    engine.set_output(id, TaskOutput::Upload(result));
    Step::done()
}
