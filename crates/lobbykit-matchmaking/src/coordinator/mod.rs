//! The task coordinator, split across the two execution contexts.
//!
//! [`MatchmakingClient`] lives on the submitter (game) thread: it validates
//! arguments, reserves task and session slots, and delivers completions and
//! events. [`MatchmakingService`] lives on the executor (network) thread: it
//! owns the backend, runs tasks and supervises them once per tick. Both
//! share one lock around the pools and the in-flight table.

mod client;
pub(crate) mod engine;
mod service;

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use lobbykit_core::Config;
use tokio::sync::broadcast;

pub use client::MatchmakingClient;
pub use service::MatchmakingService;

use crate::adapter::AsyncOperationAdapter;
use crate::backend::Backend;
use crate::dispatch;
use crate::session::SessionRegistry;
use crate::task::TaskSlotPool;

/// Everything behind the coordinator-wide lock.
#[derive(Debug)]
pub(crate) struct CoordinatorState {
    pub tasks: TaskSlotPool,
    pub sessions: SessionRegistry,
    pub adapter: AsyncOperationAdapter,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Limits {
    pub max_session_user_data: usize,
    pub search_timeout: Duration,
    pub join_timeout: Duration,
}

#[derive(Debug)]
pub(crate) struct Shared {
    state: Mutex<CoordinatorState>,
    /// Set under the lock by teardown; entry points check it under the lock.
    pub shut_down: AtomicBool,
    pub limits: Limits,
}

impl Shared {
    pub fn lock(&self) -> MutexGuard<'_, CoordinatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Build a coordinator around `backend`.
///
/// The client stays on the submitter thread. The service is `Send` and is
/// ticked on the executor thread, directly or through
/// [`crate::runner::spawn_service_loop`].
pub fn coordinator(
    config: &Config,
    backend: impl Backend + 'static,
) -> (MatchmakingClient, MatchmakingService) {
    let mm = &config.matchmaking;
    let shared = Arc::new(Shared {
        state: Mutex::new(CoordinatorState {
            tasks: TaskSlotPool::new(mm.max_tasks),
            sessions: SessionRegistry::new(mm.max_sessions, mm.max_remote_connections),
            adapter: AsyncOperationAdapter::new(),
        }),
        shut_down: AtomicBool::new(false),
        limits: Limits {
            max_session_user_data: mm.max_session_user_data,
            search_timeout: config.timeouts.session_search(),
            join_timeout: config.timeouts.session_join(),
        },
    });

    let (to_executor, from_submitter) = dispatch::channel(mm.queue_capacity);
    let (to_submitter, from_executor) = dispatch::channel(mm.queue_capacity);
    let (events, _) = broadcast::channel(mm.event_capacity.max(1));

    let client = MatchmakingClient::new(Arc::clone(&shared), to_executor, from_executor, events);
    let service = MatchmakingService::new(shared, Box::new(backend), from_submitter, to_submitter);
    (client, service)
}
