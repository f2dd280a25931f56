//! Task records and the values reported back to callers.

use std::fmt;
use std::time::Instant;

use crate::adapter::AsyncOp;
use crate::backend::{
    BackendSessionId, EntryRange, LeaderboardEntry, StatValue, UploadMethod, UploadResult,
};
use crate::error::LobbyError;
use crate::pool::SlotKey;
use crate::session::{
    SessionHandle, SessionSearchParams, SessionSearchResult, USER_DATA_BLOB_SIZE, UserDataEntry,
    UserInfo,
};

/// Handle of one task, unique from allocation until its slot is freed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub(crate) SlotKey);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    RegisterUserData,
    SessionCreate,
    SessionUpdate,
    SessionUpdateSlots,
    SessionQuery,
    SessionGetUsers,
    SessionStart,
    SessionEnd,
    SessionDelete,
    SessionSearch,
    SessionJoin,
    SessionSetLocalUserData,
    LeaderboardRead,
    LeaderboardWrite,
    StatsRead,
    StatsWrite,
}

impl TaskKind {
    /// Kinds that leave a session slot behind on success.
    pub const fn owns_session(self) -> bool {
        matches!(self, Self::SessionCreate | Self::SessionJoin)
    }
}

/// `Free` is the absence of a record, not a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskPhase {
    Allocated,
    Running,
    Stopped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LeaderboardWrite {
    pub board: String,
    pub score: i32,
    pub details: Vec<i32>,
    pub method: UploadMethod,
}

/// Progress of a search across its chained requests.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct SearchProgress {
    pub params: SessionSearchParams,
    /// The session list has arrived.
    pub listed: bool,
    /// Sessions whose metadata has been requested but not yet received.
    pub awaiting: Vec<BackendSessionId>,
}

/// Per-kind parameters copied out of the caller's arguments.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TaskParams {
    None,
    UserData(Vec<UserDataEntry>),
    Slots { public: u32, private: u32 },
    LocalUserData([u8; USER_DATA_BLOB_SIZE]),
    Search(SearchProgress),
    Join(BackendSessionId),
    LeaderboardRead { board: String, range: EntryRange },
    LeaderboardWrite(LeaderboardWrite),
    StatsRead { stats: Vec<String>, achievements: Vec<String> },
    StatsWrite(Vec<(String, StatValue)>),
}

/// Values read back from the stats service.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StatsSnapshot {
    pub stats: Vec<(String, StatValue)>,
    pub achievements: Vec<(String, bool)>,
}

/// Result state built up by handlers while the task runs.
#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) enum TaskOutput {
    #[default]
    None,
    Query(SessionSearchResult),
    Leaderboard(Vec<LeaderboardEntry>),
    Upload(UploadResult),
    Stats(StatsSnapshot),
}

#[derive(Debug)]
pub(crate) struct TaskRecord {
    pub kind: TaskKind,
    /// Backend operation most recently issued for this task.
    pub sub_kind: Option<AsyncOp>,
    pub phase: TaskPhase,
    pub session: Option<SessionHandle>,
    pub params: TaskParams,
    pub error: Option<LobbyError>,
    pub started_at: Option<Instant>,
    pub cancel_requested: bool,
    pub output: TaskOutput,
}

/// Streamed result delivered before completion.
#[derive(Debug, Clone, PartialEq)]
pub enum PartialResult {
    SearchResult(SessionSearchResult),
    User(UserInfo),
}

/// Final value of a successful task.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionPayload {
    None,
    Session(SessionHandle),
    Query(SessionSearchResult),
    Leaderboard(Vec<LeaderboardEntry>),
    ScoreUploaded(UploadResult),
    Stats(StatsSnapshot),
}

/// What a task callback receives. Exactly one `Completed` per task.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskReport {
    Partial(PartialResult),
    Completed(Result<CompletionPayload, LobbyError>),
}

impl TaskReport {
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

/// Owner callback, always invoked on the submitter thread.
pub type TaskCallback = Box<dyn FnMut(TaskId, TaskReport) + Send>;
