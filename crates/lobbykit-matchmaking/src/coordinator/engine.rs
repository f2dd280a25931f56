//! Executor-side task machinery.
//!
//! An [`Engine`] is a short-lived view over the locked coordinator state, the
//! backend and the outbound queue. It exists for the duration of one tick
//! (or one teardown) and is the only code that moves tasks between phases.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::{CoordinatorState, Limits};
use crate::adapter::{AsyncOp, BackendCall};
use crate::backend::{Backend, BackendNotification, CallResult, RequestHandle};
use crate::dispatch::{Outbound, SubmitterMessage};
use crate::error::LobbyError;
use crate::events::SessionEvent;
use crate::handlers;
use crate::session::SessionHandle;
use crate::social::IdentityId;
use crate::task::{PartialResult, TaskId, TaskKind, TaskOutput, TaskParams, TaskPhase};
use crate::translate::translate_sync_failure;

/// What a handler wants done with its task.
#[derive(Debug)]
pub(crate) struct Step {
    pub next: TaskPhase,
    pub error: Option<LobbyError>,
    pub chained: Option<BackendCall>,
}

impl Step {
    /// Keep running; progress arrives later.
    pub const fn wait() -> Self {
        Self {
            next: TaskPhase::Running,
            error: None,
            chained: None,
        }
    }

    pub const fn done() -> Self {
        Self {
            next: TaskPhase::Stopped,
            error: None,
            chained: None,
        }
    }

    pub const fn fail(error: LobbyError) -> Self {
        Self {
            next: TaskPhase::Stopped,
            error: Some(error),
            chained: None,
        }
    }

    /// Issue `call` for the same task and keep running.
    pub fn call(call: BackendCall) -> Self {
        Self {
            next: TaskPhase::Running,
            error: None,
            chained: Some(call),
        }
    }
}

pub(crate) struct Engine<'a> {
    pub state: &'a mut CoordinatorState,
    pub backend: &'a mut dyn Backend,
    pub out: &'a mut Outbound<SubmitterMessage>,
    pub limits: Limits,
}

impl Engine<'_> {
    /// `Allocated -> Running`, then the kind's start handler.
    pub fn start_task_running(&mut self, id: TaskId, now: Instant) {
        let Some(task) = self.state.tasks.get_mut(id) else {
            debug!(task_id = %id, "Start message for a freed task");
            return;
        };
        if task.phase != TaskPhase::Allocated {
            debug!(task_id = %id, phase = ?task.phase, "Task already started");
            return;
        }
        task.phase = TaskPhase::Running;
        task.started_at = Some(now);
        let (kind, session, cancelled) = (task.kind, task.session, task.cancel_requested);
        debug!(task_id = %id, ?kind, "Task running");

        if cancelled {
            self.fail(id, LobbyError::Cancelled);
            return;
        }
        if !self.backend.is_ready() {
            self.fail(id, LobbyError::ServiceUnavailable);
            return;
        }
        if session.is_some_and(|h| !self.state.sessions.contains(h)) {
            self.fail(id, LobbyError::InvalidSession);
            return;
        }
        let step = handlers::start(self, id, kind);
        self.apply(id, step);
    }

    pub fn apply(&mut self, id: TaskId, step: Step) {
        if let Some(error) = step.error {
            self.fail(id, error);
            return;
        }
        if let Some(call) = step.chained {
            self.issue(id, call);
        }
        if step.next == TaskPhase::Stopped {
            self.stop_task_running(id);
        }
    }

    /// Record `error` (first one wins) and stop the task.
    pub fn fail(&mut self, id: TaskId, error: LobbyError) {
        self.state.tasks.update_task_error(id, error);
        self.stop_task_running(id);
    }

    /// Issue a backend call on behalf of `id`, evicting whichever task held
    /// the same operation kind.
    pub fn issue(&mut self, id: TaskId, call: BackendCall) {
        let op = call.op();
        if let Some(evicted) = self.state.adapter.supersede(op, id, self.backend) {
            self.fail(evicted, LobbyError::Cancelled);
        }
        match call.invoke(self.backend) {
            Ok(handle) => {
                self.state.adapter.record(op, id, Some(handle));
                self.set_sub_kind(id, op);
                debug!(task_id = %id, ?op, %handle, "Backend request issued");
            }
            Err(code) => {
                warn!(task_id = %id, ?op, code = code.0, "Backend call failed synchronously");
                self.fail(id, translate_sync_failure(code));
            }
        }
    }

    /// Claim `op` for `id` without a request handle; answers arrive as
    /// unsolicited notifications.
    pub fn await_op(&mut self, id: TaskId, op: AsyncOp) {
        if let Some(evicted) = self.state.adapter.supersede(op, id, self.backend) {
            self.fail(evicted, LobbyError::Cancelled);
        }
        self.state.adapter.record(op, id, None);
        self.set_sub_kind(id, op);
    }

    fn set_sub_kind(&mut self, id: TaskId, op: AsyncOp) {
        if let Some(task) = self.state.tasks.get_mut(id) {
            task.sub_kind = Some(op);
        }
    }

    /// Move a live task to `Stopped` and hand it to the submitter. Calling
    /// it again for the same task does nothing.
    pub fn stop_task_running(&mut self, id: TaskId) {
        let Some(task) = self.state.tasks.get_mut(id) else {
            return;
        };
        if task.phase == TaskPhase::Stopped {
            return;
        }
        task.phase = TaskPhase::Stopped;
        let (kind, sub_kind, error, session) = (task.kind, task.sub_kind, task.error, task.session);
        self.state.adapter.release_task(id, self.backend);

        match error {
            Some(error) => {
                warn!(
                    task_id = %id,
                    ?kind,
                    ?sub_kind,
                    code = error.code(),
                    %error,
                    "Task failed"
                );
                if kind == TaskKind::SessionJoin {
                    self.leave_unentered_join(id, session);
                }
                if kind.owns_session()
                    && let Some(h) = session
                {
                    self.teardown_session(h);
                }
            }
            None => debug!(task_id = %id, ?kind, "Task stopped"),
        }
        self.out.post(SubmitterMessage::EndTask(id));
    }

    /// A join can hold backend membership before its enter response has
    /// been seen; leave the target in that case.
    fn leave_unentered_join(&mut self, id: TaskId, session: Option<SessionHandle>) {
        let Some(&TaskParams::Join(target)) = self.params(id) else {
            return;
        };
        let entered = session
            .and_then(|h| self.state.sessions.get(h).ok())
            .is_some_and(|s| s.backend_joined);
        if !entered {
            self.backend.leave_session(target);
            info!(task_id = %id, backend_id = %target, "Left backend session after failed join");
        }
    }

    /// Per-tick supervision of every running task.
    pub fn supervise(&mut self, now: Instant) {
        for id in self.state.tasks.ids() {
            let Some(task) = self.state.tasks.get(id) else {
                continue;
            };
            if task.phase != TaskPhase::Running {
                continue;
            }
            let (kind, session, started_at) = (task.kind, task.session, task.started_at);
            let (cancelled, errored) = (task.cancel_requested, task.error.is_some());

            if cancelled {
                self.fail(id, LobbyError::Cancelled);
                continue;
            }
            if errored {
                self.stop_task_running(id);
                continue;
            }
            if session.is_some_and(|h| !self.state.sessions.contains(h)) {
                self.fail(id, LobbyError::InvalidSession);
                continue;
            }
            if let (Some(limit), Some(started)) = (self.timeout_for(kind), started_at)
                && now.saturating_duration_since(started) > limit
            {
                warn!(task_id = %id, ?kind, timeout = ?limit, "Task timed out");
                self.fail(id, LobbyError::TimedOut);
                continue;
            }

            let step = handlers::tick(self, id, kind);
            self.apply(id, step);
        }
    }

    const fn timeout_for(&self, kind: TaskKind) -> Option<Duration> {
        match kind {
            TaskKind::SessionSearch => Some(self.limits.search_timeout),
            TaskKind::SessionJoin => Some(self.limits.join_timeout),
            _ => None,
        }
    }

    pub fn dispatch(&mut self, notification: BackendNotification) {
        match notification {
            BackendNotification::CallCompleted {
                handle,
                io_failure,
                result,
            } => self.on_call_completed(handle, io_failure, result),
            BackendNotification::MembershipChanged {
                session,
                member,
                change,
            } => handlers::membership::changed(self, session, member, change),
            BackendNotification::SessionDataUpdated { session, success } => {
                handlers::search::data_updated(self, session, success);
            }
            BackendNotification::PacketReceived { from, payload } => {
                handlers::packets::received(self, from, &payload);
            }
            BackendNotification::TransportRequested { from } => self.on_transport_requested(from),
            BackendNotification::InviteAccepted { session, inviter } => {
                info!(%session, %inviter, "Invite accepted");
                self.raise_event(SessionEvent::InviteAccepted {
                    session_id: session,
                    inviter,
                });
            }
            BackendNotification::ServiceShutdown => {
                warn!("Backend announced shutdown");
                self.raise_event(SessionEvent::ServiceShutdown);
            }
        }
    }

    fn on_call_completed(&mut self, handle: RequestHandle, io_failure: bool, result: CallResult) {
        let Some((op, id)) = self.state.adapter.resolve(handle) else {
            debug!(%handle, "Completion for a released request");
            return;
        };
        self.state.adapter.complete(op);

        let kind = self
            .state
            .tasks
            .get(id)
            .filter(|t| t.phase == TaskPhase::Running)
            .map(|t| t.kind);
        let Some(kind) = kind else {
            return;
        };

        let step = if io_failure {
            warn!(task_id = %id, ?op, "Backend call failed in transit");
            Step::fail(LobbyError::InternalError)
        } else {
            handlers::on_call(self, id, kind, result)
        };
        self.apply(id, step);
    }

    fn on_transport_requested(&mut self, from: IdentityId) {
        let sessions = &self.state.sessions;
        let known = sessions.handles().into_iter().any(|h| {
            sessions.get(h).is_ok_and(|s| s.owner == Some(from))
                || sessions.find_remote_by_identity(h, from).is_some()
        });
        if known {
            self.backend.accept_transport(from);
            debug!(peer = %from, "Transport accepted");
        } else {
            debug!(peer = %from, "Ignoring transport request from unknown peer");
        }
    }

    /// Queue a session event, unless its session has not delivered its
    /// initial joins yet.
    pub fn raise_event(&mut self, event: SessionEvent) {
        if let Some(h) = event.session() {
            let started = self
                .state
                .sessions
                .get(h)
                .is_ok_and(|s| s.user_events_started);
            if !started {
                debug!(session = %h, "Session event suppressed until the session is live");
                return;
            }
        }
        self.out.post(SubmitterMessage::Event(event));
    }

    pub fn post_partial(&mut self, id: TaskId, result: PartialResult) {
        self.out.post(SubmitterMessage::Partial { task: id, result });
    }

    pub fn session_of(&self, id: TaskId) -> Option<SessionHandle> {
        self.state.tasks.get(id).and_then(|t| t.session)
    }

    /// Forget the task's session so it is no longer revalidated.
    pub fn detach_session(&mut self, id: TaskId) {
        if let Some(task) = self.state.tasks.get_mut(id) {
            task.session = None;
        }
    }

    pub fn params(&self, id: TaskId) -> Option<&TaskParams> {
        self.state.tasks.get(id).map(|t| &t.params)
    }

    pub fn params_mut(&mut self, id: TaskId) -> Option<&mut TaskParams> {
        self.state.tasks.get_mut(id).map(|t| &mut t.params)
    }

    pub fn set_output(&mut self, id: TaskId, output: TaskOutput) {
        if let Some(task) = self.state.tasks.get_mut(id) {
            task.output = output;
        }
    }

    /// Stop every running join on `h` that has not reached its host yet.
    pub fn fail_pending_joins(&mut self, h: SessionHandle, error: LobbyError) {
        let joins: Vec<TaskId> = self
            .state
            .tasks
            .ids()
            .into_iter()
            .filter(|id| {
                self.state.tasks.get(*id).is_some_and(|t| {
                    t.kind == TaskKind::SessionJoin
                        && t.phase == TaskPhase::Running
                        && t.session == Some(h)
                })
            })
            .collect();
        for id in joins {
            self.fail(id, error);
        }
    }

    /// Leave the backend session if joined, release every remote connection
    /// and free the slot.
    pub fn teardown_session(&mut self, h: SessionHandle) {
        let Ok(session) = self.state.sessions.get_mut(h) else {
            return;
        };
        let joined = session.backend_id.filter(|_| session.backend_joined);
        session.backend_joined = false;
        if let Some(backend_id) = joined {
            self.backend.leave_session(backend_id);
            info!(session = %h, %backend_id, "Left backend session");
        }

        let backend = &mut *self.backend;
        let freed = self
            .state
            .sessions
            .free_all_remote_connections(h, |peer| backend.close_transport(peer));
        if self.state.sessions.free_session_handle(h).is_ok() {
            info!(session = %h, remotes = freed, "Session torn down");
        }
    }

    /// Cancel everything in flight, stop every live task and free every
    /// session.
    pub fn teardown(&mut self) {
        let released = self.state.adapter.cancel_all(self.backend);
        debug!(requests = released.len(), "Cancelled in-flight requests");

        let live: Vec<TaskId> = self
            .state
            .tasks
            .ids()
            .into_iter()
            .filter(|id| self.state.tasks.phase(*id) != Some(TaskPhase::Stopped))
            .collect();
        let stopped = live.len();
        for id in live {
            self.fail(id, LobbyError::Cancelled);
        }

        for h in self.state.sessions.handles() {
            self.teardown_session(h);
        }
        info!(stopped, "Coordinator torn down");
    }
}
