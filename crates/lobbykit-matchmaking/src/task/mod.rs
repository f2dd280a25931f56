//! Task records, their pool and the caller-facing completion types.

pub mod pool;
pub mod types;

pub use pool::TaskSlotPool;
pub use types::{
    CompletionPayload, LeaderboardWrite, PartialResult, StatsSnapshot, TaskCallback, TaskId,
    TaskKind, TaskPhase, TaskReport,
};
pub(crate) use types::{SearchProgress, TaskOutput, TaskParams, TaskRecord};
