//! Stats read and write. Both load the current stats first.

use tracing::warn;

use super::mismatched_params;
use crate::adapter::BackendCall;
use crate::backend::BackendResult;
use crate::coordinator::engine::{Engine, Step};
use crate::task::{StatsSnapshot, TaskId, TaskOutput, TaskParams};
use crate::translate::{translate_result, translate_sync_failure};

pub(super) fn start() -> Step {
    Step::call(BackendCall::RequestStats)
}

pub(super) fn received(engine: &mut Engine<'_>, id: TaskId, result: BackendResult) -> Step {
    if let Some(error) = translate_result(result) {
        return Step::fail(error);
    }
    match engine.params(id).cloned() {
        Some(TaskParams::StatsRead {
            stats,
            achievements,
        }) => {
            let mut snapshot = StatsSnapshot::default();
            for name in stats {
                match engine.backend.stat(&name) {
                    Ok(value) => snapshot.stats.push((name, value)),
                    Err(code) => {
                        warn!(task_id = %id, stat = %name, code = code.0, "Stat read failed");
                        return Step::fail(translate_sync_failure(code));
                    }
                }
            }
            for name in achievements {
                match engine.backend.achievement_state(&name) {
                    Ok(unlocked) => snapshot.achievements.push((name, unlocked)),
                    Err(code) => {
                        warn!(
                            task_id = %id,
                            achievement = %name,
                            code = code.0,
                            "Achievement read failed"
                        );
                        return Step::fail(translate_sync_failure(code));
                    }
                }
            }
            engine.set_output(id, TaskOutput::Stats(snapshot));
            Step::done()
        }
        Some(TaskParams::StatsWrite(values)) => {
            for (name, value) in &values {
                if let Err(code) = engine.backend.set_stat(name, *value) {
                    warn!(task_id = %id, stat = %name, code = code.0, "Stat write failed");
                    return Step::fail(translate_sync_failure(code));
                }
            }
            Step::call(BackendCall::StoreStats)
        }
        _ => mismatched_params(id),
    }
}

pub(super) fn stored(result: BackendResult) -> Step {
    translate_result(result).map_or_else(Step::done, Step::fail)
}
