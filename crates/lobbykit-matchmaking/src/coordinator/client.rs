//! Submitter-side half of the coordinator.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::{Arc, MutexGuard};

use tokio::sync::broadcast;
use tracing::{debug, trace};

use super::{CoordinatorState, Shared};
use crate::adapter::AsyncOp;
use crate::backend::{BackendSessionId, EntryRange, StatValue};
use crate::dispatch::{ExecutorMessage, Inbound, Outbound, SubmitterMessage};
use crate::error::{LobbyError, Result};
use crate::events::SessionEvent;
use crate::session::{
    CreateFlags, MAX_LOCAL_USERS, MAX_SESSION_MEMBERS, MAX_SESSION_NAME_LEN, SessionData,
    SessionHandle, SessionSearchParams, USER_DATA_BLOB_SIZE, UserDataEntry, UserInfo,
};
use crate::task::{
    CompletionPayload, LeaderboardWrite, SearchProgress, TaskCallback, TaskId, TaskKind,
    TaskOutput, TaskParams, TaskPhase, TaskReport,
};

/// Upper bound on the detail values attached to one leaderboard score.
const MAX_SCORE_DETAILS: usize = 64;

/// Entry points for the game thread.
///
/// Every `session_*`, `leaderboard_*` and `stats_*` call validates its
/// arguments and reserves a task slot before returning. The work itself runs
/// on the executor; its callback runs from a later [`Self::pump`] on this
/// thread, exactly once with [`TaskReport::Completed`].
pub struct MatchmakingClient {
    shared: Arc<Shared>,
    to_executor: Outbound<ExecutorMessage>,
    from_executor: Inbound<SubmitterMessage>,
    callbacks: HashMap<TaskId, TaskCallback>,
    events: broadcast::Sender<SessionEvent>,
}

fn validate_num_users(num_users: u32) -> Result<()> {
    if num_users == 0 || num_users > MAX_LOCAL_USERS {
        return Err(LobbyError::InvalidArgument);
    }
    Ok(())
}

fn require_host(state: &CoordinatorState, h: SessionHandle) -> Result<()> {
    if state.sessions.get(h)?.host {
        Ok(())
    } else {
        Err(LobbyError::InvalidRequest)
    }
}

impl MatchmakingClient {
    pub(super) fn new(
        shared: Arc<Shared>,
        to_executor: Outbound<ExecutorMessage>,
        from_executor: Inbound<SubmitterMessage>,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            shared,
            to_executor,
            from_executor,
            callbacks: HashMap::new(),
            events,
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Take the coordinator lock, refusing once the service has shut down.
    fn lock_live(&self) -> Result<MutexGuard<'_, CoordinatorState>> {
        let state = self.shared.lock();
        if self.shared.shut_down.load(Ordering::Acquire) {
            return Err(LobbyError::ServiceUnavailable);
        }
        Ok(state)
    }

    fn submit(
        &mut self,
        id: TaskId,
        callback: impl FnMut(TaskId, TaskReport) + Send + 'static,
    ) -> TaskId {
        self.callbacks.insert(id, Box::new(callback));
        self.to_executor.post(ExecutorMessage::StartTaskRunning(id));
        id
    }

    /// Start a task that references `session` (if any) and nothing else.
    fn start_simple(
        &mut self,
        kind: TaskKind,
        session: Option<SessionHandle>,
        params: TaskParams,
        callback: impl FnMut(TaskId, TaskReport) + Send + 'static,
    ) -> Result<TaskId> {
        let id = {
            let mut state = self.lock_live()?;
            if let Some(h) = session {
                state.sessions.get(h)?;
            }
            state.tasks.start_task(kind, session, params)?
        };
        Ok(self.submit(id, callback))
    }

    /// Install the user-data schema copied into every new session.
    pub fn register_user_data(
        &mut self,
        entries: Vec<UserDataEntry>,
        callback: impl FnMut(TaskId, TaskReport) + Send + 'static,
    ) -> Result<TaskId> {
        if entries.len() > self.shared.limits.max_session_user_data {
            return Err(LobbyError::OutOfUserData);
        }
        self.start_simple(
            TaskKind::RegisterUserData,
            None,
            TaskParams::UserData(entries),
            callback,
        )
    }

    /// Host a new session. Completes with [`CompletionPayload::Session`].
    pub fn session_create(
        &mut self,
        num_users: u32,
        flags: CreateFlags,
        data: SessionData,
        callback: impl FnMut(TaskId, TaskReport) + Send + 'static,
    ) -> Result<TaskId> {
        validate_num_users(num_users)?;
        let total = data.total_slots();
        if data.name.len() > MAX_SESSION_NAME_LEN
            || total == 0
            || total > MAX_SESSION_MEMBERS
            || total < num_users
        {
            return Err(LobbyError::InvalidArgument);
        }

        let id = {
            let mut state = self.lock_live()?;
            let mut merged = data;
            let requested = std::mem::take(&mut merged.user_data);
            merged.user_data = state.sessions.default_user_data().to_vec();
            merged.merge_user_data(&requested);
            if merged.user_data.len() > self.shared.limits.max_session_user_data {
                return Err(LobbyError::OutOfUserData);
            }

            let h = state.sessions.create_session_handle(true, flags, num_users)?;
            state.sessions.get_mut(h)?.data = merged;
            match state
                .tasks
                .start_task(TaskKind::SessionCreate, Some(h), TaskParams::None)
            {
                Ok(id) => id,
                Err(error) => {
                    state.sessions.free_session_handle(h)?;
                    return Err(error);
                }
            }
        };
        Ok(self.submit(id, callback))
    }

    /// Merge `entries` into the session's user data and republish it.
    pub fn session_update(
        &mut self,
        h: SessionHandle,
        entries: Vec<UserDataEntry>,
        callback: impl FnMut(TaskId, TaskReport) + Send + 'static,
    ) -> Result<TaskId> {
        let id = {
            let mut state = self.lock_live()?;
            require_host(&state, h)?;
            let mut merged = state.sessions.get(h)?.data.clone();
            merged.merge_user_data(&entries);
            if merged.user_data.len() > self.shared.limits.max_session_user_data {
                return Err(LobbyError::OutOfUserData);
            }
            state
                .tasks
                .start_task(TaskKind::SessionUpdate, Some(h), TaskParams::UserData(entries))?
        };
        Ok(self.submit(id, callback))
    }

    pub fn session_update_slots(
        &mut self,
        h: SessionHandle,
        public: u32,
        private: u32,
        callback: impl FnMut(TaskId, TaskReport) + Send + 'static,
    ) -> Result<TaskId> {
        let total = public.saturating_add(private);
        if total == 0 || total > MAX_SESSION_MEMBERS {
            return Err(LobbyError::InvalidArgument);
        }
        let id = {
            let mut state = self.lock_live()?;
            require_host(&state, h)?;
            state.tasks.start_task(
                TaskKind::SessionUpdateSlots,
                Some(h),
                TaskParams::Slots { public, private },
            )?
        };
        Ok(self.submit(id, callback))
    }

    /// Completes with a [`CompletionPayload::Query`] describing the session.
    pub fn session_query(
        &mut self,
        h: SessionHandle,
        callback: impl FnMut(TaskId, TaskReport) + Send + 'static,
    ) -> Result<TaskId> {
        self.start_simple(TaskKind::SessionQuery, Some(h), TaskParams::None, callback)
    }

    /// Streams one partial result per participant, local user first.
    pub fn session_get_users(
        &mut self,
        h: SessionHandle,
        callback: impl FnMut(TaskId, TaskReport) + Send + 'static,
    ) -> Result<TaskId> {
        self.start_simple(TaskKind::SessionGetUsers, Some(h), TaskParams::None, callback)
    }

    pub fn session_start(
        &mut self,
        h: SessionHandle,
        callback: impl FnMut(TaskId, TaskReport) + Send + 'static,
    ) -> Result<TaskId> {
        self.set_started(h, true, callback)
    }

    pub fn session_end(
        &mut self,
        h: SessionHandle,
        callback: impl FnMut(TaskId, TaskReport) + Send + 'static,
    ) -> Result<TaskId> {
        self.set_started(h, false, callback)
    }

    fn set_started(
        &mut self,
        h: SessionHandle,
        started: bool,
        callback: impl FnMut(TaskId, TaskReport) + Send + 'static,
    ) -> Result<TaskId> {
        let kind = if started {
            TaskKind::SessionStart
        } else {
            TaskKind::SessionEnd
        };
        let id = {
            let mut state = self.lock_live()?;
            if state.sessions.get(h)?.started == started {
                return Err(LobbyError::InvalidRequest);
            }
            state.tasks.start_task(kind, Some(h), TaskParams::None)?
        };
        Ok(self.submit(id, callback))
    }

    /// Leave the session and release its slot and connections.
    pub fn session_delete(
        &mut self,
        h: SessionHandle,
        callback: impl FnMut(TaskId, TaskReport) + Send + 'static,
    ) -> Result<TaskId> {
        self.start_simple(TaskKind::SessionDelete, Some(h), TaskParams::None, callback)
    }

    /// Find joinable sessions, streamed as [`TaskReport::Partial`] results.
    pub fn session_search(
        &mut self,
        local_user: u32,
        params: SessionSearchParams,
        callback: impl FnMut(TaskId, TaskReport) + Send + 'static,
    ) -> Result<TaskId> {
        if local_user >= MAX_LOCAL_USERS || params.max_results == 0 {
            return Err(LobbyError::InvalidArgument);
        }
        let progress = SearchProgress {
            params,
            ..SearchProgress::default()
        };
        self.start_simple(
            TaskKind::SessionSearch,
            None,
            TaskParams::Search(progress),
            callback,
        )
    }

    /// Join `session_id`. Completes with [`CompletionPayload::Session`] once
    /// the host has been reached.
    pub fn session_join(
        &mut self,
        num_users: u32,
        flags: CreateFlags,
        session_id: BackendSessionId,
        callback: impl FnMut(TaskId, TaskReport) + Send + 'static,
    ) -> Result<TaskId> {
        validate_num_users(num_users)?;
        let id = {
            let mut state = self.lock_live()?;
            let joining = state.tasks.ids().into_iter().any(|t| {
                state.tasks.get(t).is_some_and(|task| {
                    task.phase != TaskPhase::Stopped && task.params == TaskParams::Join(session_id)
                })
            });
            if joining || state.sessions.find_by_backend_id(session_id).is_some() {
                return Err(LobbyError::InvalidRequest);
            }
            let h = state.sessions.create_session_handle(false, flags, num_users)?;
            match state
                .tasks
                .start_task(TaskKind::SessionJoin, Some(h), TaskParams::Join(session_id))
            {
                Ok(id) => id,
                Err(error) => {
                    state.sessions.free_session_handle(h)?;
                    return Err(error);
                }
            }
        };
        Ok(self.submit(id, callback))
    }

    /// Replace the local user's data blob and share it with every peer.
    pub fn session_set_local_user_data(
        &mut self,
        h: SessionHandle,
        data: &[u8],
        callback: impl FnMut(TaskId, TaskReport) + Send + 'static,
    ) -> Result<TaskId> {
        if data.len() > USER_DATA_BLOB_SIZE {
            return Err(LobbyError::OutOfUserData);
        }
        let mut blob = [0; USER_DATA_BLOB_SIZE];
        blob[..data.len()].copy_from_slice(data);
        self.start_simple(
            TaskKind::SessionSetLocalUserData,
            Some(h),
            TaskParams::LocalUserData(blob),
            callback,
        )
    }

    pub fn leaderboard_read(
        &mut self,
        board: &str,
        range: EntryRange,
        callback: impl FnMut(TaskId, TaskReport) + Send + 'static,
    ) -> Result<TaskId> {
        let bad_range =
            matches!(range, EntryRange::Global { start, end } if start == 0 || end < start);
        if board.is_empty() || bad_range {
            return Err(LobbyError::InvalidArgument);
        }
        self.start_simple(
            TaskKind::LeaderboardRead,
            None,
            TaskParams::LeaderboardRead {
                board: board.to_string(),
                range,
            },
            callback,
        )
    }

    pub fn leaderboard_write(
        &mut self,
        write: LeaderboardWrite,
        callback: impl FnMut(TaskId, TaskReport) + Send + 'static,
    ) -> Result<TaskId> {
        if write.board.is_empty() || write.details.len() > MAX_SCORE_DETAILS {
            return Err(LobbyError::InvalidArgument);
        }
        self.start_simple(
            TaskKind::LeaderboardWrite,
            None,
            TaskParams::LeaderboardWrite(write),
            callback,
        )
    }

    pub fn stats_read(
        &mut self,
        stats: Vec<String>,
        achievements: Vec<String>,
        callback: impl FnMut(TaskId, TaskReport) + Send + 'static,
    ) -> Result<TaskId> {
        if stats.is_empty() && achievements.is_empty() {
            return Err(LobbyError::InvalidArgument);
        }
        self.start_simple(
            TaskKind::StatsRead,
            None,
            TaskParams::StatsRead {
                stats,
                achievements,
            },
            callback,
        )
    }

    pub fn stats_write(
        &mut self,
        values: Vec<(String, StatValue)>,
        callback: impl FnMut(TaskId, TaskReport) + Send + 'static,
    ) -> Result<TaskId> {
        if values.is_empty() {
            return Err(LobbyError::InvalidArgument);
        }
        self.start_simple(
            TaskKind::StatsWrite,
            None,
            TaskParams::StatsWrite(values),
            callback,
        )
    }

    /// Ask the executor to stop `id` with [`LobbyError::Cancelled`] on its
    /// next tick. A task that already stopped is left alone.
    pub fn cancel_task(&self, id: TaskId) -> Result<()> {
        let mut state = self.lock_live()?;
        let task = state.tasks.get_mut(id).ok_or(LobbyError::InvalidArgument)?;
        if task.phase != TaskPhase::Stopped {
            task.cancel_requested = true;
            debug!(task_id = %id, "Cancellation requested");
        }
        Ok(())
    }

    pub fn session_backend_id(&self, h: SessionHandle) -> Result<Option<BackendSessionId>> {
        Ok(self.shared.lock().sessions.get(h)?.backend_id)
    }

    pub fn session_users(&self, h: SessionHandle) -> Result<Vec<UserInfo>> {
        self.shared.lock().sessions.users(h)
    }

    pub fn task_phase(&self, id: TaskId) -> Option<TaskPhase> {
        self.shared.lock().tasks.phase(id)
    }

    pub fn active_task_count(&self) -> usize {
        self.shared.lock().tasks.len()
    }

    pub fn active_session_count(&self) -> usize {
        self.shared.lock().sessions.len()
    }

    /// Task currently holding the in-flight slot for `op`.
    pub fn pending_owner(&self, op: AsyncOp) -> Option<TaskId> {
        self.shared.lock().adapter.owner(op)
    }

    /// Deliver everything the executor has posted: partial results,
    /// completions and session events, in posting order. Returns the
    /// number of messages handled.
    pub fn pump(&mut self) -> usize {
        self.to_executor.flush();
        let messages = self.from_executor.drain();
        let handled = messages.len();
        for message in messages {
            match message {
                SubmitterMessage::EndTask(id) => self.end_task(id),
                SubmitterMessage::Partial { task, result } => {
                    if let Some(callback) = self.callbacks.get_mut(&task) {
                        callback(task, TaskReport::Partial(result));
                    }
                }
                SubmitterMessage::Event(event) => self.publish(event),
            }
        }

        // Completions lost with a dropped service are rebuilt from the pool.
        if self.shared.shut_down.load(Ordering::Acquire) {
            let stopped: Vec<TaskId> = {
                let state = self.shared.lock();
                self.callbacks
                    .keys()
                    .copied()
                    .filter(|id| state.tasks.phase(*id) == Some(TaskPhase::Stopped))
                    .collect()
            };
            for id in stopped {
                self.end_task(id);
            }
        }
        handled
    }

    fn publish(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            trace!("Session event dropped, no subscribers");
        }
    }

    /// Invoke the owner callback once, then free the slot.
    fn end_task(&mut self, id: TaskId) {
        let Some((completion, joined)) = self.completion(id) else {
            return;
        };
        match self.callbacks.remove(&id) {
            Some(mut callback) => callback(id, TaskReport::Completed(completion)),
            None => debug!(task_id = %id, "Task ended without a callback"),
        }
        self.shared.lock().tasks.free(id);
        for event in joined {
            self.publish(event);
        }
    }

    /// The completion of a stopped task, plus the initial join events when
    /// it brought a session to life.
    fn completion(
        &self,
        id: TaskId,
    ) -> Option<(std::result::Result<CompletionPayload, LobbyError>, Vec<SessionEvent>)> {
        let mut state = self.shared.lock();
        let task = state.tasks.get(id)?;
        if task.phase != TaskPhase::Stopped {
            debug!(task_id = %id, phase = ?task.phase, "End requested for a task still running");
            return None;
        }
        let (kind, session) = (task.kind, task.session);
        if let Some(error) = task.error {
            return Some((Err(error), Vec::new()));
        }
        let payload = match (session, task.output.clone()) {
            (Some(h), _) if kind.owns_session() => CompletionPayload::Session(h),
            (_, TaskOutput::Query(result)) => CompletionPayload::Query(result),
            (_, TaskOutput::Leaderboard(entries)) => CompletionPayload::Leaderboard(entries),
            (_, TaskOutput::Upload(result)) => CompletionPayload::ScoreUploaded(result),
            (_, TaskOutput::Stats(snapshot)) => CompletionPayload::Stats(snapshot),
            (_, TaskOutput::None) => CompletionPayload::None,
        };

        let mut joined = Vec::new();
        if kind.owns_session()
            && let Some(h) = session
            && let Ok(live) = state.sessions.get_mut(h)
        {
            live.user_events_started = true;
            joined = state
                .sessions
                .users(h)
                .unwrap_or_default()
                .into_iter()
                .map(|user| SessionEvent::UserJoined { session: h, user })
                .collect();
        }
        Some((Ok(payload), joined))
    }
}
