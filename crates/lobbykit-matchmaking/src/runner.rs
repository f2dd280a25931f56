//! Tokio-driven executor loop.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::coordinator::MatchmakingService;

/// Tick `service` every `interval` until `shutdown` changes or its sender is
/// dropped, then shut the service down.
pub fn spawn_service_loop(
    mut service: MatchmakingService,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let period = interval.max(Duration::from_millis(1));
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(period);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = timer.tick() => service.tick(),
                _ = shutdown.changed() => {
                    info!("Matchmaking service loop stopping");
                    break;
                }
            }
        }
        service.shutdown();
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use std::sync::{Arc, Mutex};

    use lobbykit_core::Config;

    use super::*;
    use crate::backend::loopback::LoopbackNetwork;
    use crate::coordinator;
    use crate::error::LobbyError;
    use crate::session::{CreateFlags, SessionData};
    use crate::social::IdentityId;
    use crate::task::{CompletionPayload, TaskReport};

    #[tokio::test]
    async fn loop_runs_tasks_until_stopped() {
        let network = LoopbackNetwork::new();
        let backend = network.connect(IdentityId(1), "host");
        let (mut client, service) = coordinator::coordinator(&Config::default(), backend);
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = spawn_service_loop(service, Duration::from_millis(1), stop_rx);

        let completions = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&completions);
        let data = SessionData {
            name: "loop".to_string(),
            num_public_slots: 4,
            ..SessionData::default()
        };
        client
            .session_create(1, CreateFlags::SEARCHABLE, data, move |_, report| {
                if let TaskReport::Completed(result) = report {
                    sink.lock().unwrap().push(result);
                }
            })
            .unwrap();

        for _ in 0..200 {
            client.pump();
            if !completions.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        let created = completions.lock().unwrap().pop().expect("create completed");
        assert!(matches!(created, Ok(CompletionPayload::Session(_))));
        assert_eq!(network.sessions().len(), 1);

        stop_tx.send(true).unwrap();
        handle.await.unwrap();

        client.pump();
        assert_eq!(client.active_session_count(), 0);
        assert!(network.sessions().is_empty());
        let refused = client.register_user_data(Vec::new(), |_, _| {});
        assert_eq!(refused, Err(LobbyError::ServiceUnavailable));
    }
}
