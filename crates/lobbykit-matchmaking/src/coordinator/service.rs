//! Executor-side half of the coordinator.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Instant;

use tracing::{debug, info};

use super::Shared;
use super::engine::Engine;
use crate::backend::Backend;
use crate::dispatch::{ExecutorMessage, Inbound, Outbound, SubmitterMessage};

/// Runs tasks against the backend. Drive it with [`Self::tick`] from the
/// network thread, or hand it to [`crate::runner::spawn_service_loop`].
pub struct MatchmakingService {
    shared: Arc<Shared>,
    backend: Box<dyn Backend>,
    from_submitter: Inbound<ExecutorMessage>,
    to_submitter: Outbound<SubmitterMessage>,
    stopped: bool,
}

impl MatchmakingService {
    pub(super) fn new(
        shared: Arc<Shared>,
        backend: Box<dyn Backend>,
        from_submitter: Inbound<ExecutorMessage>,
        to_submitter: Outbound<SubmitterMessage>,
    ) -> Self {
        Self {
            shared,
            backend,
            from_submitter,
            to_submitter,
            stopped: false,
        }
    }

    fn with_engine<R>(&mut self, f: impl FnOnce(&mut Engine<'_>) -> R) -> R {
        let mut state = self.shared.lock();
        let mut engine = Engine {
            state: &mut *state,
            backend: self.backend.as_mut(),
            out: &mut self.to_submitter,
            limits: self.shared.limits,
        };
        f(&mut engine)
    }

    pub fn tick(&mut self) {
        self.tick_at(Instant::now());
    }

    /// One executor pass at `now`: start queued tasks, deliver backend
    /// notifications, then supervise everything still running.
    pub fn tick_at(&mut self, now: Instant) {
        if self.stopped {
            return;
        }
        self.to_submitter.flush();
        let starts = self.from_submitter.drain();

        let notified = self.with_engine(|engine| {
            for ExecutorMessage::StartTaskRunning(id) in starts {
                engine.start_task_running(id, now);
            }
            let notifications = engine.backend.run_callbacks();
            let notified = notifications.len();
            for notification in notifications {
                engine.dispatch(notification);
            }
            engine.supervise(now);
            notified
        });

        self.to_submitter.flush();
        let backlog = self.to_submitter.backlog();
        if notified > 0 || backlog > 0 {
            debug!(notified, backlog, "Executor tick");
        }
    }

    /// Stop every task, leave every session and refuse further work.
    /// Safe to call more than once.
    pub fn shutdown(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        let pending = self.from_submitter.drain().len();
        let shared = Arc::clone(&self.shared);
        self.with_engine(|engine| {
            // Under the lock, so no entry point allocates past teardown.
            shared.shut_down.store(true, Ordering::Release);
            engine.teardown();
        });
        self.to_submitter.flush();
        info!(pending, "Matchmaking service shut down");
    }

    pub const fn is_shut_down(&self) -> bool {
        self.stopped
    }
}

impl Drop for MatchmakingService {
    fn drop(&mut self) {
        self.shutdown();
    }
}
