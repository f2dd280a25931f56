//! The host/search/join walkthrough.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail};
use lobbykit_core::Config;
use lobbykit_matchmaking::backend::{EntryRange, UploadMethod};
use lobbykit_matchmaking::session::{UserDataEntry, UserDataValue};
use lobbykit_matchmaking::task::LeaderboardWrite;
use lobbykit_matchmaking::{
    CompletionPayload, CreateFlags, IdentityId, LobbyError, LoopbackNetwork, MatchmakingClient,
    PartialResult, SessionData, SessionEvent, SessionHandle, SessionSearchParams, TaskId,
    TaskReport, coordinator, spawn_service_loop,
};
use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// User-data id carrying the game type.
const GAME_TYPE_ENTRY: u32 = 1;
const BOARD: &str = "sim-high-scores";

pub struct ScenarioSettings {
    pub session_name: String,
    pub public_slots: u32,
    pub game_type: i32,
    pub step_timeout: Duration,
}

#[derive(Default)]
struct Outcome {
    partials: Vec<PartialResult>,
    completed: Option<Result<CompletionPayload, LobbyError>>,
}

type Tracker = Arc<Mutex<Outcome>>;

/// A fresh outcome slot and the callback that fills it.
fn track() -> (Tracker, impl FnMut(TaskId, TaskReport) + Send + 'static) {
    let tracker = Tracker::default();
    let sink = Arc::clone(&tracker);
    let callback = move |id: TaskId, report: TaskReport| {
        let mut outcome = sink.lock().unwrap_or_else(PoisonError::into_inner);
        match report {
            TaskReport::Partial(result) => {
                debug!(task_id = %id, ?result, "Partial result");
                outcome.partials.push(result);
            }
            TaskReport::Completed(result) => {
                info!(task_id = %id, ?result, "Task completed");
                outcome.completed = Some(result);
            }
        }
    };
    (tracker, callback)
}

struct Peer {
    label: &'static str,
    client: MatchmakingClient,
    events: broadcast::Receiver<SessionEvent>,
}

impl Peer {
    fn new(label: &'static str, client: MatchmakingClient) -> Self {
        let events = client.subscribe_events();
        Self {
            label,
            client,
            events,
        }
    }

    fn pump(&mut self) {
        self.client.pump();
        loop {
            match self.events.try_recv() {
                Ok(event) => info!(peer = self.label, ?event, "Session event"),
                Err(TryRecvError::Lagged(missed)) => {
                    warn!(peer = self.label, missed, "Session events lagged");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
    }
}

struct Stage {
    host: Peer,
    guest: Peer,
    tick: Duration,
    step_timeout: Duration,
}

impl Stage {
    /// Pump both peers until `tracker` completes.
    async fn wait(
        &mut self,
        step: &str,
        tracker: &Tracker,
    ) -> anyhow::Result<(Vec<PartialResult>, CompletionPayload)> {
        let deadline = Instant::now() + self.step_timeout;
        loop {
            self.host.pump();
            self.guest.pump();
            let finished = {
                let mut outcome = tracker.lock().unwrap_or_else(PoisonError::into_inner);
                outcome
                    .completed
                    .take()
                    .map(|result| (std::mem::take(&mut outcome.partials), result))
            };
            if let Some((partials, result)) = finished {
                let payload =
                    result.map_err(|e| anyhow!("{step} failed: {e} (code {})", e.code()))?;
                return Ok((partials, payload));
            }
            if Instant::now() >= deadline {
                bail!("{step} did not complete within {:?}", self.step_timeout);
            }
            tokio::time::sleep(self.tick).await;
        }
    }
}

fn session_of(step: &str, payload: CompletionPayload) -> anyhow::Result<SessionHandle> {
    match payload {
        CompletionPayload::Session(h) => Ok(h),
        other => Err(anyhow!("{step} completed without a session: {other:?}")),
    }
}

pub async fn run(config: &Config, settings: &ScenarioSettings) -> anyhow::Result<()> {
    let network = LoopbackNetwork::new();
    let (host_id, guest_id) = (IdentityId(1), IdentityId(2));
    let host_backend = network.connect(host_id, "host");
    let guest_backend = network.connect(guest_id, "guest");
    network.befriend(host_id, guest_id);

    let (host_client, host_service) = coordinator(config, host_backend);
    let (guest_client, guest_service) = coordinator(config, guest_backend);
    let tick = config.timeouts.tick_interval();
    let (stop_tx, stop_rx) = watch::channel(false);
    let loops = [
        spawn_service_loop(host_service, tick, stop_rx.clone()),
        spawn_service_loop(guest_service, tick, stop_rx),
    ];

    let mut stage = Stage {
        host: Peer::new("host", host_client),
        guest: Peer::new("guest", guest_client),
        tick,
        step_timeout: settings.step_timeout,
    };

    let data = SessionData {
        name: settings.session_name.clone(),
        num_public_slots: settings.public_slots,
        user_data: vec![UserDataEntry::new(
            GAME_TYPE_ENTRY,
            UserDataValue::Int32(settings.game_type),
        )],
        ..SessionData::default()
    };
    let (tracker, callback) = track();
    stage
        .host
        .client
        .session_create(1, CreateFlags::SEARCHABLE, data, callback)?;
    let (_, created) = stage.wait("create", &tracker).await?;
    let hosted = session_of("create", created)?;
    info!(
        session = %hosted,
        backend_id = ?stage.host.client.session_backend_id(hosted)?,
        "Hosting session"
    );

    let (tracker, callback) = track();
    stage
        .guest
        .client
        .session_search(0, SessionSearchParams::default(), callback)?;
    let (found, _) = stage.wait("search", &tracker).await?;
    let target = found
        .into_iter()
        .find_map(|partial| match partial {
            PartialResult::SearchResult(result) => Some(result),
            PartialResult::User(_) => None,
        })
        .ok_or_else(|| anyhow!("search found no sessions"))?;
    info!(
        session_id = %target.id,
        name = %target.data.name,
        filled = target.num_filled_slots,
        friends = target.num_friends,
        "Found session"
    );

    let (tracker, callback) = track();
    stage
        .guest
        .client
        .session_join(1, CreateFlags::NONE, target.id, callback)?;
    let (_, joined) = stage.wait("join", &tracker).await?;
    let joined = session_of("join", joined)?;

    let (tracker, callback) = track();
    stage
        .guest
        .client
        .session_set_local_user_data(joined, b"ready", callback)?;
    stage.wait("set local user data", &tracker).await?;

    let (tracker, callback) = track();
    stage.host.client.session_get_users(hosted, callback)?;
    let (users, _) = stage.wait("get users", &tracker).await?;
    for user in users {
        if let PartialResult::User(user) = user {
            info!(uid = user.uid.0, name = %user.name, local = user.is_local, "Participant");
        }
    }

    let (tracker, callback) = track();
    stage.host.client.leaderboard_write(
        LeaderboardWrite {
            board: BOARD.to_string(),
            score: 1_200,
            details: vec![settings.game_type],
            method: UploadMethod::KeepBest,
        },
        callback,
    )?;
    stage.wait("leaderboard write", &tracker).await?;

    let (tracker, callback) = track();
    stage
        .guest
        .client
        .leaderboard_read(BOARD, EntryRange::Global { start: 1, end: 10 }, callback)?;
    if let (_, CompletionPayload::Leaderboard(entries)) =
        stage.wait("leaderboard read", &tracker).await?
    {
        for entry in entries {
            info!(rank = entry.rank, user = %entry.user, score = entry.score, "Leaderboard entry");
        }
    }

    let (tracker, callback) = track();
    stage.guest.client.session_delete(joined, callback)?;
    stage.wait("guest leave", &tracker).await?;

    let (tracker, callback) = track();
    stage.host.client.session_delete(hosted, callback)?;
    stage.wait("host delete", &tracker).await?;

    stop_tx.send(true)?;
    for handle in loops {
        handle.await?;
    }
    stage.host.pump();
    stage.guest.pump();

    info!(
        host_tasks = stage.host.client.active_task_count(),
        guest_tasks = stage.guest.client.active_task_count(),
        backend_sessions = network.sessions().len(),
        "Scenario finished"
    );
    Ok(())
}
