//! Shared harness: coordinators on one loopback network, ticked by hand.

#![allow(dead_code, clippy::unwrap_used, clippy::panic)]

use std::sync::{Arc, Mutex};
use std::time::Instant;

use lobbykit_core::Config;
use lobbykit_matchmaking::{
    CompletionPayload, IdentityId, LobbyError, LoopbackBackend, LoopbackNetwork,
    MatchmakingClient, MatchmakingService, PartialResult, SessionEvent, SessionHandle, TaskId,
    TaskReport, coordinator,
};
use tokio::sync::broadcast;

/// One signed-in user with its own coordinator.
pub struct Node {
    pub backend: LoopbackBackend,
    pub client: MatchmakingClient,
    pub service: MatchmakingService,
    events: broadcast::Receiver<SessionEvent>,
}

impl Node {
    pub fn new(network: &LoopbackNetwork, id: u64, name: &str) -> Self {
        Self::with_config(network, id, name, &Config::default())
    }

    pub fn with_config(network: &LoopbackNetwork, id: u64, name: &str, config: &Config) -> Self {
        let backend = network.connect(IdentityId(id), name);
        let (client, service) = coordinator(config, backend.clone());
        let events = client.subscribe_events();
        Self {
            backend,
            client,
            service,
            events,
        }
    }

    pub fn identity(&self) -> IdentityId {
        self.backend.identity()
    }

    /// One executor tick followed by one submitter pump.
    pub fn step(&mut self) {
        self.service.tick();
        self.client.pump();
    }

    pub fn step_at(&mut self, now: Instant) {
        self.service.tick_at(now);
        self.client.pump();
    }

    pub fn events(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

/// Step every node in turn, `rounds` times.
pub fn settle(nodes: &mut [&mut Node], rounds: usize) {
    for _ in 0..rounds {
        for node in nodes.iter_mut() {
            node.step();
        }
    }
}

/// Records every report a task delivers.
#[derive(Clone, Default)]
pub struct Recorder(Arc<Mutex<Vec<(TaskId, TaskReport)>>>);

impl Recorder {
    pub fn callback(&self) -> impl FnMut(TaskId, TaskReport) + Send + 'static {
        let reports = Arc::clone(&self.0);
        move |id, report| reports.lock().unwrap().push((id, report))
    }

    pub fn completions(&self) -> Vec<Result<CompletionPayload, LobbyError>> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(_, report)| match report {
                TaskReport::Completed(result) => Some(result.clone()),
                TaskReport::Partial(_) => None,
            })
            .collect()
    }

    pub fn partials(&self) -> Vec<PartialResult> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(_, report)| match report {
                TaskReport::Partial(result) => Some(result.clone()),
                TaskReport::Completed(_) => None,
            })
            .collect()
    }

    /// The single completion delivered so far.
    pub fn completed(&self) -> Option<Result<CompletionPayload, LobbyError>> {
        let completions = self.completions();
        assert!(completions.len() <= 1, "more than one completion: {completions:?}");
        completions.into_iter().next()
    }

    pub fn session(&self) -> SessionHandle {
        match self.completed() {
            Some(Ok(CompletionPayload::Session(h))) => h,
            other => panic!("expected a session completion, got {other:?}"),
        }
    }
}
