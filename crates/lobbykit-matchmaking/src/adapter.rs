//! In-flight backend requests, one per operation kind.
//!
//! The backend accepts a single outstanding request per kind. The adapter
//! keeps that association explicit: `op -> (task, handle)`. Issuing a new
//! request of a kind already in flight cancels the older one first, and
//! chained requests move the association from one kind to the next without
//! releasing the task.

use tracing::debug;

use crate::backend::{
    Backend, BackendResult, BackendSessionId, EntryRange, LeaderboardId, MetadataFilter,
    RequestHandle, SessionVisibility, UploadMethod,
};
use crate::task::TaskId;

/// Backend operations that hold an in-flight slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AsyncOp {
    CreateSession,
    SearchSessions,
    /// Metadata requests issued by a search; answered by notifications.
    SessionData,
    JoinSession,
    FindLeaderboard,
    UploadScore,
    DownloadEntries,
    RequestStats,
    StoreStats,
}

impl AsyncOp {
    pub const COUNT: usize = 9;

    pub const ALL: [Self; Self::COUNT] = [
        Self::CreateSession,
        Self::SearchSessions,
        Self::SessionData,
        Self::JoinSession,
        Self::FindLeaderboard,
        Self::UploadScore,
        Self::DownloadEntries,
        Self::RequestStats,
        Self::StoreStats,
    ];

    const fn index(self) -> usize {
        self as usize
    }
}

/// A backend call a handler wants issued on behalf of its task.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum BackendCall {
    CreateSession {
        visibility: SessionVisibility,
        max_members: u32,
    },
    SearchSessions {
        filters: Vec<MetadataFilter>,
        max_results: u32,
    },
    JoinSession(BackendSessionId),
    FindLeaderboard {
        name: String,
        create_if_missing: bool,
    },
    UploadScore {
        leaderboard: LeaderboardId,
        method: UploadMethod,
        score: i32,
        details: Vec<i32>,
    },
    DownloadEntries {
        leaderboard: LeaderboardId,
        range: EntryRange,
    },
    RequestStats,
    StoreStats,
}

impl BackendCall {
    pub const fn op(&self) -> AsyncOp {
        match self {
            Self::CreateSession { .. } => AsyncOp::CreateSession,
            Self::SearchSessions { .. } => AsyncOp::SearchSessions,
            Self::JoinSession(_) => AsyncOp::JoinSession,
            Self::FindLeaderboard { .. } => AsyncOp::FindLeaderboard,
            Self::UploadScore { .. } => AsyncOp::UploadScore,
            Self::DownloadEntries { .. } => AsyncOp::DownloadEntries,
            Self::RequestStats => AsyncOp::RequestStats,
            Self::StoreStats => AsyncOp::StoreStats,
        }
    }

    pub fn invoke(&self, backend: &mut dyn Backend) -> Result<RequestHandle, BackendResult> {
        match self {
            Self::CreateSession {
                visibility,
                max_members,
            } => backend.create_session(*visibility, *max_members),
            Self::SearchSessions {
                filters,
                max_results,
            } => backend.search_sessions(filters, *max_results),
            Self::JoinSession(session) => backend.join_session(*session),
            Self::FindLeaderboard {
                name,
                create_if_missing,
            } => backend.find_leaderboard(name, *create_if_missing),
            Self::UploadScore {
                leaderboard,
                method,
                score,
                details,
            } => backend.upload_leaderboard_score(*leaderboard, *method, *score, details),
            Self::DownloadEntries { leaderboard, range } => {
                backend.download_leaderboard_entries(*leaderboard, *range)
            }
            Self::RequestStats => backend.request_stats(),
            Self::StoreStats => backend.store_stats(),
        }
    }
}

/// The current owner of one operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRequest {
    pub task: TaskId,
    /// `None` while the task waits on notifications rather than a call.
    pub handle: Option<RequestHandle>,
}

#[derive(Debug, Default)]
pub struct AsyncOperationAdapter {
    slots: [Option<PendingRequest>; AsyncOp::COUNT],
}

impl AsyncOperationAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn owner(&self, op: AsyncOp) -> Option<TaskId> {
        self.slots[op.index()].map(|p| p.task)
    }

    /// Evict whatever holds `op` on behalf of another task, cancelling its
    /// backend request. Returns the evicted task.
    pub fn supersede(
        &mut self,
        op: AsyncOp,
        task: TaskId,
        backend: &mut dyn Backend,
    ) -> Option<TaskId> {
        let previous = self.slots[op.index()].take()?;
        if let Some(handle) = previous.handle {
            backend.cancel(handle);
        }
        if previous.task == task {
            return None;
        }
        debug!(?op, old_task = %previous.task, new_task = %task, "Superseding in-flight request");
        Some(previous.task)
    }

    pub fn record(&mut self, op: AsyncOp, task: TaskId, handle: Option<RequestHandle>) {
        debug_assert!(
            self.slots[op.index()].is_none_or(|p| p.task == task),
            "in-flight slot taken without supersede"
        );
        self.slots[op.index()] = Some(PendingRequest { task, handle });
    }

    /// Which kind and task a completed call belongs to.
    pub fn resolve(&self, handle: RequestHandle) -> Option<(AsyncOp, TaskId)> {
        AsyncOp::ALL.into_iter().find_map(|op| {
            self.slots[op.index()]
                .filter(|p| p.handle == Some(handle))
                .map(|p| (op, p.task))
        })
    }

    /// Clear `op`; the request has been answered.
    pub fn complete(&mut self, op: AsyncOp) -> Option<PendingRequest> {
        self.slots[op.index()].take()
    }

    /// Drop every association of `task`, cancelling outstanding calls.
    pub fn release_task(&mut self, task: TaskId, backend: &mut dyn Backend) {
        for slot in &mut self.slots {
            if let Some(pending) = slot.filter(|p| p.task == task) {
                if let Some(handle) = pending.handle {
                    backend.cancel(handle);
                }
                *slot = None;
            }
        }
    }

    /// Cancel everything; returns the tasks that held a slot.
    pub fn cancel_all(&mut self, backend: &mut dyn Backend) -> Vec<TaskId> {
        let mut tasks = Vec::new();
        for slot in &mut self.slots {
            if let Some(pending) = slot.take() {
                if let Some(handle) = pending.handle {
                    backend.cancel(handle);
                }
                tasks.push(pending.task);
            }
        }
        tasks
    }

    pub fn in_flight(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}
