//! In-process backend shared by several coordinator instances.
//!
//! [`LoopbackNetwork`] plays the online service: it holds sessions,
//! leaderboards, stats and per-user notification queues. Each
//! [`LoopbackBackend`] is one signed-in user's view of it. Call results are
//! queued immediately and delivered by the next `run_callbacks`, so a
//! coordinator sees the same one-shot ordering a real service gives.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use super::{
    Backend, BackendNotification, BackendResult, BackendSessionId, CallResult, EnterResponse,
    EntryRange, LeaderboardEntry, LeaderboardId, MemberChange, MetadataFilter, RequestHandle,
    SessionVisibility, StatValue, UploadMethod, UploadResult,
};
use crate::social::{IdentityId, Relationship, SocialDirectory};

#[derive(Debug, Default)]
struct Peer {
    name: String,
    online: bool,
    inbox: VecDeque<BackendNotification>,
    /// Call results withheld while `hold_results` is set.
    held: Vec<BackendNotification>,
    hold_results: bool,
    fail_next: Option<BackendResult>,
    cancelled: HashSet<RequestHandle>,
    accepted_transports: HashSet<IdentityId>,
    closed_transports: Vec<IdentityId>,
    relationships: HashMap<IdentityId, Relationship>,
    presence: HashMap<String, String>,
    stats_loaded: bool,
    stats: HashMap<String, StatValue>,
    achievements: HashMap<String, bool>,
}

#[derive(Debug)]
struct Lobby {
    owner: IdentityId,
    visibility: SessionVisibility,
    max_members: u32,
    members: Vec<IdentityId>,
    banned: HashSet<IdentityId>,
    metadata: BTreeMap<String, String>,
}

#[derive(Debug)]
struct Board {
    id: LeaderboardId,
    name: String,
    /// `(user, score, details)`, unsorted.
    scores: Vec<(IdentityId, i32, Vec<i32>)>,
}

impl Board {
    /// Entries sorted best first with 1-based ranks.
    fn ranked(&self) -> Vec<LeaderboardEntry> {
        let mut scores = self.scores.clone();
        scores.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        scores
            .into_iter()
            .zip(1..)
            .map(|((user, score, details), rank)| LeaderboardEntry {
                user,
                rank,
                score,
                details,
            })
            .collect()
    }

    fn rank_of(&self, user: IdentityId) -> u32 {
        self.ranked()
            .iter()
            .find(|e| e.user == user)
            .map_or(0, |e| e.rank)
    }
}

#[derive(Debug, Default)]
struct World {
    next_handle: u64,
    next_session: u64,
    next_board: u64,
    peers: HashMap<IdentityId, Peer>,
    lobbies: BTreeMap<BackendSessionId, Lobby>,
    boards: Vec<Board>,
}

impl World {
    fn notify(&mut self, to: IdentityId, notification: BackendNotification) {
        if let Some(peer) = self.peers.get_mut(&to) {
            peer.inbox.push_back(notification);
        }
    }

    fn notify_members(
        &mut self,
        session: BackendSessionId,
        member: IdentityId,
        change: MemberChange,
        include_member: bool,
    ) {
        let Some(lobby) = self.lobbies.get(&session) else {
            return;
        };
        let mut targets = lobby.members.clone();
        if include_member && !targets.contains(&member) {
            targets.push(member);
        }
        for to in targets {
            if to != member || include_member {
                self.notify(
                    to,
                    BackendNotification::MembershipChanged {
                        session,
                        member,
                        change,
                    },
                );
            }
        }
    }

    /// Validate a call from `me` and hand out its request handle.
    fn begin_call(&mut self, me: IdentityId) -> Result<RequestHandle, BackendResult> {
        let peer = self
            .peers
            .get_mut(&me)
            .ok_or(BackendResult::NOT_LOGGED_ON)?;
        if !peer.online {
            return Err(BackendResult::NOT_LOGGED_ON);
        }
        if let Some(code) = peer.fail_next.take() {
            return Err(code);
        }
        self.next_handle += 1;
        Ok(RequestHandle(self.next_handle))
    }

    fn complete(&mut self, me: IdentityId, handle: RequestHandle, result: CallResult) {
        let Some(peer) = self.peers.get_mut(&me) else {
            return;
        };
        let notification = BackendNotification::CallCompleted {
            handle,
            io_failure: false,
            result,
        };
        if peer.hold_results {
            peer.held.push(notification);
        } else {
            peer.inbox.push_back(notification);
        }
    }

    fn remove_member(&mut self, session: BackendSessionId, member: IdentityId) {
        let Some(lobby) = self.lobbies.get_mut(&session) else {
            return;
        };
        lobby.members.retain(|m| *m != member);
        if lobby.members.is_empty() {
            self.lobbies.remove(&session);
            debug!(%session, "Loopback session closed");
        } else if lobby.owner == member {
            lobby.owner = lobby.members[0];
        }
    }

    fn relationship(&self, me: IdentityId, other: IdentityId) -> Relationship {
        self.peers
            .get(&me)
            .and_then(|p| p.relationships.get(&other).copied())
            .unwrap_or_default()
    }
}

/// The shared in-process service.
#[derive(Debug, Clone, Default)]
pub struct LoopbackNetwork {
    world: Arc<Mutex<World>>,
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    fn world(&self) -> MutexGuard<'_, World> {
        self.world.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sign `identity` in and return its view of the service.
    pub fn connect(&self, identity: IdentityId, name: &str) -> LoopbackBackend {
        let mut world = self.world();
        let peer = world.peers.entry(identity).or_default();
        peer.name = name.to_string();
        peer.online = true;
        drop(world);
        LoopbackBackend {
            network: self.clone(),
            identity,
        }
    }

    pub fn set_online(&self, identity: IdentityId, online: bool) {
        if let Some(peer) = self.world().peers.get_mut(&identity) {
            peer.online = online;
        }
    }

    /// Make `a` and `b` friends of each other.
    pub fn befriend(&self, a: IdentityId, b: IdentityId) {
        let mut world = self.world();
        for (me, other) in [(a, b), (b, a)] {
            if let Some(peer) = world.peers.get_mut(&me) {
                peer.relationships.insert(other, Relationship::Friend);
            }
        }
    }

    pub fn set_presence(&self, identity: IdentityId, key: &str, value: &str) {
        if let Some(peer) = self.world().peers.get_mut(&identity) {
            peer.presence.insert(key.to_string(), value.to_string());
        }
    }

    pub fn define_stat(&self, identity: IdentityId, name: &str, value: StatValue) {
        if let Some(peer) = self.world().peers.get_mut(&identity) {
            peer.stats.insert(name.to_string(), value);
        }
    }

    pub fn define_achievement(&self, identity: IdentityId, name: &str, unlocked: bool) {
        if let Some(peer) = self.world().peers.get_mut(&identity) {
            peer.achievements.insert(name.to_string(), unlocked);
        }
    }

    /// Remove `member` from `session` as a moderator would.
    pub fn kick(&self, session: BackendSessionId, member: IdentityId, banned: bool) {
        let mut world = self.world();
        let change = if banned {
            if let Some(lobby) = world.lobbies.get_mut(&session) {
                lobby.banned.insert(member);
            }
            MemberChange::Banned
        } else {
            MemberChange::Kicked
        };
        world.notify_members(session, member, change, true);
        world.remove_member(session, member);
    }

    /// Deliver an accepted invite for `session` to `to`.
    pub fn invite(&self, session: BackendSessionId, inviter: IdentityId, to: IdentityId) {
        self.world()
            .notify(to, BackendNotification::InviteAccepted { session, inviter });
    }

    pub fn announce_shutdown(&self, identity: IdentityId) {
        self.world()
            .notify(identity, BackendNotification::ServiceShutdown);
    }

    pub fn sessions(&self) -> Vec<BackendSessionId> {
        self.world().lobbies.keys().copied().collect()
    }

    pub fn members(&self, session: BackendSessionId) -> Vec<IdentityId> {
        self.world()
            .lobbies
            .get(&session)
            .map(|l| l.members.clone())
            .unwrap_or_default()
    }

    pub fn stat_of(&self, identity: IdentityId, name: &str) -> Option<StatValue> {
        self.world()
            .peers
            .get(&identity)
            .and_then(|p| p.stats.get(name).copied())
    }
}

/// One user's connection to a [`LoopbackNetwork`].
#[derive(Debug, Clone)]
pub struct LoopbackBackend {
    network: LoopbackNetwork,
    identity: IdentityId,
}

impl LoopbackBackend {
    pub const fn identity(&self) -> IdentityId {
        self.identity
    }

    pub fn network(&self) -> &LoopbackNetwork {
        &self.network
    }

    fn with_peer<R>(&self, f: impl FnOnce(&mut Peer) -> R) -> Option<R> {
        self.network.world().peers.get_mut(&self.identity).map(f)
    }

    /// Withhold call results until [`Self::release_held`].
    pub fn hold_results(&self, hold: bool) {
        self.with_peer(|p| p.hold_results = hold);
    }

    pub fn release_held(&self) {
        self.with_peer(|p| {
            let held = std::mem::take(&mut p.held);
            p.inbox.extend(held);
        });
    }

    /// Make the next asynchronous call fail synchronously with `code`.
    pub fn fail_next_call(&self, code: BackendResult) {
        self.with_peer(|p| p.fail_next = Some(code));
    }

    pub fn was_cancelled(&self, handle: RequestHandle) -> bool {
        self.with_peer(|p| p.cancelled.contains(&handle))
            .unwrap_or(false)
    }

    pub fn closed_transports(&self) -> Vec<IdentityId> {
        self.with_peer(|p| p.closed_transports.clone())
            .unwrap_or_default()
    }
}

impl SocialDirectory for LoopbackBackend {
    fn local_identity(&self) -> Option<IdentityId> {
        Some(self.identity)
    }

    fn display_name(&self, id: IdentityId) -> Option<String> {
        self.network.world().peers.get(&id).map(|p| p.name.clone())
    }

    fn contacts(&self) -> Vec<IdentityId> {
        self.with_peer(|p| p.relationships.keys().copied().collect())
            .unwrap_or_default()
    }

    fn relationship(&self, id: IdentityId) -> Relationship {
        self.network.world().relationship(self.identity, id)
    }

    fn presence(&self, id: IdentityId, key: &str) -> Option<String> {
        self.network
            .world()
            .peers
            .get(&id)
            .and_then(|p| p.presence.get(key).cloned())
    }
}

impl Backend for LoopbackBackend {
    fn social(&self) -> &dyn SocialDirectory {
        self
    }

    fn is_ready(&self) -> bool {
        self.with_peer(|p| p.online).unwrap_or(false)
    }

    fn create_session(
        &mut self,
        visibility: SessionVisibility,
        max_members: u32,
    ) -> Result<RequestHandle, BackendResult> {
        let me = self.identity;
        let mut world = self.network.world();
        let handle = world.begin_call(me)?;
        world.next_session += 1;
        let session = BackendSessionId(world.next_session);
        world.lobbies.insert(
            session,
            Lobby {
                owner: me,
                visibility,
                max_members,
                members: vec![me],
                banned: HashSet::new(),
                metadata: BTreeMap::new(),
            },
        );
        world.complete(
            me,
            handle,
            CallResult::SessionCreated {
                result: BackendResult::OK,
                session,
            },
        );
        Ok(handle)
    }

    fn search_sessions(
        &mut self,
        filters: &[MetadataFilter],
        max_results: u32,
    ) -> Result<RequestHandle, BackendResult> {
        let me = self.identity;
        let mut world = self.network.world();
        let handle = world.begin_call(me)?;
        let limit = usize::try_from(max_results).unwrap_or(usize::MAX);
        let sessions = world
            .lobbies
            .iter()
            .filter(|(_, l)| l.visibility == SessionVisibility::Public)
            .filter(|(_, l)| u32::try_from(l.members.len()).is_ok_and(|n| n < l.max_members))
            .filter(|(_, l)| {
                filters
                    .iter()
                    .all(|f| f.matches(l.metadata.get(&f.key).map(String::as_str)))
            })
            .map(|(id, _)| *id)
            .take(limit)
            .collect();
        world.complete(me, handle, CallResult::SessionList { sessions });
        Ok(handle)
    }

    fn request_session_data(&mut self, session: BackendSessionId) -> bool {
        let me = self.identity;
        let mut world = self.network.world();
        let success = world.lobbies.contains_key(&session);
        world.notify(
            me,
            BackendNotification::SessionDataUpdated { session, success },
        );
        true
    }

    fn join_session(&mut self, session: BackendSessionId) -> Result<RequestHandle, BackendResult> {
        let me = self.identity;
        let mut world = self.network.world();
        let handle = world.begin_call(me)?;

        let response = match world.lobbies.get(&session) {
            None => EnterResponse::DOESNT_EXIST,
            Some(l) if l.banned.contains(&me) => EnterResponse::BANNED,
            Some(l) if u32::try_from(l.members.len()).is_ok_and(|n| n >= l.max_members) => {
                EnterResponse::FULL
            }
            Some(l) if l.visibility == SessionVisibility::Private => EnterResponse::NOT_ALLOWED,
            Some(l)
                if l.visibility == SessionVisibility::FriendsOnly
                    && world.relationship(me, l.owner) != Relationship::Friend =>
            {
                EnterResponse::NOT_ALLOWED
            }
            Some(_) => EnterResponse::SUCCESS,
        };

        if response == EnterResponse::SUCCESS {
            world.notify_members(session, me, MemberChange::Entered, false);
            if let Some(lobby) = world.lobbies.get_mut(&session)
                && !lobby.members.contains(&me)
            {
                lobby.members.push(me);
            }
        }
        world.complete(
            me,
            handle,
            CallResult::SessionEntered { session, response },
        );
        Ok(handle)
    }

    fn leave_session(&mut self, session: BackendSessionId) {
        let me = self.identity;
        let mut world = self.network.world();
        let is_member = world
            .lobbies
            .get(&session)
            .is_some_and(|l| l.members.contains(&me));
        if !is_member {
            return;
        }
        world.remove_member(session, me);
        world.notify_members(session, me, MemberChange::Left, false);
    }

    fn set_session_metadata(&mut self, session: BackendSessionId, key: &str, value: &str) -> bool {
        let me = self.identity;
        let mut world = self.network.world();
        match world.lobbies.get_mut(&session) {
            Some(lobby) if lobby.owner == me => {
                lobby.metadata.insert(key.to_string(), value.to_string());
                true
            }
            _ => false,
        }
    }

    fn session_metadata(&self, session: BackendSessionId, key: &str) -> Option<String> {
        self.network
            .world()
            .lobbies
            .get(&session)
            .and_then(|l| l.metadata.get(key).cloned())
    }

    fn session_members(&self, session: BackendSessionId) -> Vec<IdentityId> {
        self.network.members(session)
    }

    fn session_owner(&self, session: BackendSessionId) -> Option<IdentityId> {
        self.network.world().lobbies.get(&session).map(|l| l.owner)
    }

    fn find_leaderboard(
        &mut self,
        name: &str,
        create_if_missing: bool,
    ) -> Result<RequestHandle, BackendResult> {
        let me = self.identity;
        let mut world = self.network.world();
        let handle = world.begin_call(me)?;
        let mut leaderboard = world.boards.iter().find(|b| b.name == name).map(|b| b.id);
        if leaderboard.is_none() && create_if_missing {
            world.next_board += 1;
            let id = LeaderboardId(world.next_board);
            world.boards.push(Board {
                id,
                name: name.to_string(),
                scores: Vec::new(),
            });
            leaderboard = Some(id);
        }
        world.complete(me, handle, CallResult::LeaderboardFound { leaderboard });
        Ok(handle)
    }

    fn upload_leaderboard_score(
        &mut self,
        leaderboard: LeaderboardId,
        method: UploadMethod,
        score: i32,
        details: &[i32],
    ) -> Result<RequestHandle, BackendResult> {
        let me = self.identity;
        let mut world = self.network.world();
        let handle = world.begin_call(me)?;

        let outcome = world
            .boards
            .iter_mut()
            .find(|b| b.id == leaderboard)
            .map(|board| {
                let previous = board.rank_of(me);
                let existing = board.scores.iter_mut().find(|(u, _, _)| *u == me);
                let changed = match existing {
                    Some(entry) if method == UploadMethod::KeepBest && entry.1 >= score => false,
                    Some(entry) => {
                        entry.1 = score;
                        entry.2 = details.to_vec();
                        true
                    }
                    None => {
                        board.scores.push((me, score, details.to_vec()));
                        true
                    }
                };
                UploadResult {
                    score_changed: changed,
                    global_rank_new: board.rank_of(me),
                    global_rank_previous: previous,
                }
            });

        let result = match outcome {
            Some(result) => CallResult::ScoreUploaded {
                success: true,
                result,
            },
            None => CallResult::ScoreUploaded {
                success: false,
                result: UploadResult {
                    score_changed: false,
                    global_rank_new: 0,
                    global_rank_previous: 0,
                },
            },
        };
        world.complete(me, handle, result);
        Ok(handle)
    }

    fn download_leaderboard_entries(
        &mut self,
        leaderboard: LeaderboardId,
        range: EntryRange,
    ) -> Result<RequestHandle, BackendResult> {
        let me = self.identity;
        let mut world = self.network.world();
        let handle = world.begin_call(me)?;

        let ranked = world
            .boards
            .iter()
            .find(|b| b.id == leaderboard)
            .map(Board::ranked)
            .unwrap_or_default();
        let entries = match range {
            EntryRange::Global { start, end } => ranked
                .into_iter()
                .filter(|e| e.rank >= start && e.rank <= end)
                .collect(),
            EntryRange::AroundUser { before, after } => {
                let centre = ranked.iter().find(|e| e.user == me).map(|e| e.rank);
                match centre {
                    Some(rank) => ranked
                        .into_iter()
                        .filter(|e| {
                            e.rank + before >= rank && e.rank <= rank.saturating_add(after)
                        })
                        .collect(),
                    None => Vec::new(),
                }
            }
            EntryRange::Friends => ranked
                .into_iter()
                .filter(|e| {
                    e.user == me || world.relationship(me, e.user) == Relationship::Friend
                })
                .collect(),
        };
        world.complete(
            me,
            handle,
            CallResult::LeaderboardEntries {
                leaderboard,
                entries,
            },
        );
        Ok(handle)
    }

    fn request_stats(&mut self) -> Result<RequestHandle, BackendResult> {
        let me = self.identity;
        let mut world = self.network.world();
        let handle = world.begin_call(me)?;
        if let Some(peer) = world.peers.get_mut(&me) {
            peer.stats_loaded = true;
        }
        world.complete(
            me,
            handle,
            CallResult::StatsReceived {
                result: BackendResult::OK,
            },
        );
        Ok(handle)
    }

    fn stat(&self, name: &str) -> Result<StatValue, BackendResult> {
        self.with_peer(|p| {
            if !p.stats_loaded {
                return Err(BackendResult::INVALID_STATE);
            }
            p.stats
                .get(name)
                .copied()
                .ok_or(BackendResult::INVALID_PARAM)
        })
        .unwrap_or(Err(BackendResult::NOT_LOGGED_ON))
    }

    fn set_stat(&mut self, name: &str, value: StatValue) -> Result<(), BackendResult> {
        self.with_peer(|p| {
            if !p.stats_loaded {
                return Err(BackendResult::INVALID_STATE);
            }
            p.stats.insert(name.to_string(), value);
            Ok(())
        })
        .unwrap_or(Err(BackendResult::NOT_LOGGED_ON))
    }

    fn store_stats(&mut self) -> Result<RequestHandle, BackendResult> {
        let me = self.identity;
        let mut world = self.network.world();
        let handle = world.begin_call(me)?;
        world.complete(
            me,
            handle,
            CallResult::StatsStored {
                result: BackendResult::OK,
            },
        );
        Ok(handle)
    }

    fn achievement_state(&self, name: &str) -> Result<bool, BackendResult> {
        self.with_peer(|p| {
            p.achievements
                .get(name)
                .copied()
                .ok_or(BackendResult::INVALID_PARAM)
        })
        .unwrap_or(Err(BackendResult::NOT_LOGGED_ON))
    }

    fn send_packet(&mut self, to: IdentityId, payload: &[u8]) -> bool {
        let me = self.identity;
        let mut world = self.network.world();
        let Some(peer) = world.peers.get_mut(&to) else {
            return false;
        };
        if !peer.online {
            return false;
        }
        if !peer.accepted_transports.contains(&me) {
            peer.inbox
                .push_back(BackendNotification::TransportRequested { from: me });
        }
        peer.inbox.push_back(BackendNotification::PacketReceived {
            from: me,
            payload: payload.to_vec(),
        });
        true
    }

    fn accept_transport(&mut self, peer: IdentityId) -> bool {
        self.with_peer(|p| p.accepted_transports.insert(peer))
            .is_some()
    }

    fn close_transport(&mut self, peer: IdentityId) {
        self.with_peer(|p| {
            p.accepted_transports.remove(&peer);
            p.closed_transports.push(peer);
        });
    }

    fn cancel(&mut self, handle: RequestHandle) {
        self.with_peer(|p| {
            p.cancelled.insert(handle);
            let answers = |n: &BackendNotification| {
                matches!(n, BackendNotification::CallCompleted { handle: h, .. } if *h == handle)
            };
            p.inbox.retain(|n| !answers(n));
            p.held.retain(|n| !answers(n));
        });
    }

    fn run_callbacks(&mut self) -> Vec<BackendNotification> {
        self.with_peer(|p| p.inbox.drain(..).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn call_results_arrive_on_next_poll() {
        let network = LoopbackNetwork::new();
        let mut host = network.connect(IdentityId(1), "host");

        let handle = host.create_session(SessionVisibility::Public, 4).unwrap();
        let notes = host.run_callbacks();
        assert_eq!(notes.len(), 1);
        let BackendNotification::CallCompleted { handle: h, .. } = &notes[0] else {
            panic!("expected call completion");
        };
        assert_eq!(*h, handle);
        assert!(host.run_callbacks().is_empty());
    }

    #[test]
    fn cancelled_call_is_never_delivered() {
        let network = LoopbackNetwork::new();
        let mut host = network.connect(IdentityId(1), "host");
        let handle = host.search_sessions(&[], 10).unwrap();
        host.cancel(handle);
        assert!(host.run_callbacks().is_empty());
        assert!(host.was_cancelled(handle));
    }

    #[test]
    fn offline_user_fails_synchronously() {
        let network = LoopbackNetwork::new();
        let mut host = network.connect(IdentityId(1), "host");
        network.set_online(IdentityId(1), false);
        assert_eq!(
            host.create_session(SessionVisibility::Public, 4),
            Err(BackendResult::NOT_LOGGED_ON)
        );
        assert!(!host.is_ready());
    }

    #[test]
    fn join_notifies_existing_members() {
        let network = LoopbackNetwork::new();
        let mut host = network.connect(IdentityId(1), "host");
        let mut guest = network.connect(IdentityId(2), "guest");
        host.create_session(SessionVisibility::Public, 2).unwrap();
        host.run_callbacks();
        let session = network.sessions()[0];

        guest.join_session(session).unwrap();
        let host_notes = host.run_callbacks();
        assert_eq!(
            host_notes,
            vec![BackendNotification::MembershipChanged {
                session,
                member: IdentityId(2),
                change: MemberChange::Entered,
            }]
        );
        assert_eq!(network.members(session).len(), 2);
    }

    #[test]
    fn full_session_rejects_entry() {
        let network = LoopbackNetwork::new();
        let mut host = network.connect(IdentityId(1), "host");
        let mut guest = network.connect(IdentityId(2), "guest");
        host.create_session(SessionVisibility::Public, 1).unwrap();
        let session = network.sessions()[0];

        guest.join_session(session).unwrap();
        let notes = guest.run_callbacks();
        let BackendNotification::CallCompleted {
            result: CallResult::SessionEntered { response, .. },
            ..
        } = &notes[0]
        else {
            panic!("expected enter response");
        };
        assert_eq!(*response, EnterResponse::FULL);
    }

    #[test]
    fn keep_best_ignores_worse_score() {
        let network = LoopbackNetwork::new();
        let mut player = network.connect(IdentityId(5), "p");
        player.find_leaderboard("laps", true).unwrap();
        let board = match player.run_callbacks().pop() {
            Some(BackendNotification::CallCompleted {
                result: CallResult::LeaderboardFound {
                    leaderboard: Some(id),
                },
                ..
            }) => id,
            other => panic!("unexpected {other:?}"),
        };

        player
            .upload_leaderboard_score(board, UploadMethod::KeepBest, 90, &[])
            .unwrap();
        player
            .upload_leaderboard_score(board, UploadMethod::KeepBest, 50, &[])
            .unwrap();
        let notes = player.run_callbacks();
        let BackendNotification::CallCompleted {
            result: CallResult::ScoreUploaded { result, .. },
            ..
        } = &notes[1]
        else {
            panic!("expected upload result");
        };
        assert!(!result.score_changed);
        assert_eq!(result.global_rank_new, 1);
    }
}
