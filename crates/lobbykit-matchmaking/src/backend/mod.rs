//! Online backend seam.
//!
//! The backend follows a one-shot notification model: an asynchronous call
//! either fails synchronously with a [`BackendResult`] or returns a
//! [`RequestHandle`] that is answered by exactly one
//! [`BackendNotification::CallCompleted`] from a later
//! [`Backend::run_callbacks`]. Unsolicited notifications (membership
//! changes, packets, invites) arrive through the same queue.

pub mod loopback;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::social::{IdentityId, SocialDirectory};

pub use loopback::{LoopbackBackend, LoopbackNetwork};

/// Backend-side session (lobby) identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BackendSessionId(pub u64);

impl fmt::Display for BackendSessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Handle of an outstanding asynchronous backend call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestHandle(pub u64);

impl fmt::Display for RequestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LeaderboardId(pub u64);

/// Raw backend result code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BackendResult(pub u32);

impl BackendResult {
    pub const OK: Self = Self(1);
    pub const FAIL: Self = Self(2);
    pub const NO_CONNECTION: Self = Self(3);
    pub const INVALID_PARAM: Self = Self(8);
    pub const BUSY: Self = Self(10);
    pub const INVALID_STATE: Self = Self(11);
    pub const ACCESS_DENIED: Self = Self(15);
    pub const TIMEOUT: Self = Self(16);
    pub const BANNED: Self = Self(17);
    pub const INVALID_IDENTITY: Self = Self(19);
    pub const SERVICE_UNAVAILABLE: Self = Self(20);
    pub const NOT_LOGGED_ON: Self = Self(21);
    pub const INSUFFICIENT_PRIVILEGE: Self = Self(24);
    pub const LIMIT_EXCEEDED: Self = Self(25);
    pub const BLOCKED: Self = Self(40);
    pub const IGNORED: Self = Self(41);
    pub const CANCELLED: Self = Self(52);
}

/// Response code delivered when entering a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnterResponse(pub u32);

impl EnterResponse {
    pub const SUCCESS: Self = Self(1);
    pub const DOESNT_EXIST: Self = Self(2);
    pub const NOT_ALLOWED: Self = Self(3);
    pub const FULL: Self = Self(4);
    pub const ERROR: Self = Self(5);
    pub const BANNED: Self = Self(6);
    pub const LIMITED: Self = Self(7);
    pub const CLAN_DISABLED: Self = Self(8);
    pub const COMMUNITY_BAN: Self = Self(9);
    pub const MEMBER_BLOCKED_YOU: Self = Self(10);
    pub const YOU_BLOCKED_MEMBER: Self = Self(11);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionVisibility {
    Public,
    FriendsOnly,
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterComparison {
    Equal,
    NotEqual,
}

/// String filter on a session metadata key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataFilter {
    pub key: String,
    pub value: String,
    pub comparison: FilterComparison,
}

impl MetadataFilter {
    pub fn equal(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            comparison: FilterComparison::Equal,
        }
    }

    pub fn matches(&self, actual: Option<&str>) -> bool {
        let hit = actual == Some(self.value.as_str());
        match self.comparison {
            FilterComparison::Equal => hit,
            FilterComparison::NotEqual => !hit,
        }
    }
}

/// Which slice of a leaderboard to download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryRange {
    /// Ranks `start..=end`, 1-based.
    Global { start: u32, end: u32 },
    /// Entries around the local user's rank.
    AroundUser { before: u32, after: u32 },
    Friends,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadMethod {
    KeepBest,
    ForceUpdate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardEntry {
    pub user: IdentityId,
    pub rank: u32,
    pub score: i32,
    pub details: Vec<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadResult {
    pub score_changed: bool,
    pub global_rank_new: u32,
    pub global_rank_previous: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StatValue {
    Int(i32),
    Float(f32),
}

/// Membership transition reported for a session member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberChange {
    Entered,
    Left,
    Disconnected,
    Kicked,
    Banned,
}

impl MemberChange {
    pub const fn is_departure(self) -> bool {
        !matches!(self, Self::Entered)
    }
}

/// Payload of a completed one-shot call.
#[derive(Debug, Clone, PartialEq)]
pub enum CallResult {
    SessionCreated {
        result: BackendResult,
        session: BackendSessionId,
    },
    SessionList {
        sessions: Vec<BackendSessionId>,
    },
    SessionEntered {
        session: BackendSessionId,
        response: EnterResponse,
    },
    LeaderboardFound {
        leaderboard: Option<LeaderboardId>,
    },
    LeaderboardEntries {
        leaderboard: LeaderboardId,
        entries: Vec<LeaderboardEntry>,
    },
    ScoreUploaded {
        success: bool,
        result: UploadResult,
    },
    StatsReceived {
        result: BackendResult,
    },
    StatsStored {
        result: BackendResult,
    },
}

/// Everything [`Backend::run_callbacks`] can report.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendNotification {
    /// The one-shot answer to `handle`. `io_failure` means the call never
    /// reached the service and `result` carries no information.
    CallCompleted {
        handle: RequestHandle,
        io_failure: bool,
        result: CallResult,
    },
    MembershipChanged {
        session: BackendSessionId,
        member: IdentityId,
        change: MemberChange,
    },
    SessionDataUpdated {
        session: BackendSessionId,
        success: bool,
    },
    PacketReceived {
        from: IdentityId,
        payload: Vec<u8>,
    },
    TransportRequested {
        from: IdentityId,
    },
    InviteAccepted {
        session: BackendSessionId,
        inviter: IdentityId,
    },
    ServiceShutdown,
}

/// The third-party online service, driven only from the executor thread.
pub trait Backend: Send {
    fn social(&self) -> &dyn SocialDirectory;

    /// Whether the service is signed in and accepting calls.
    fn is_ready(&self) -> bool;

    fn create_session(
        &mut self,
        visibility: SessionVisibility,
        max_members: u32,
    ) -> Result<RequestHandle, BackendResult>;

    fn search_sessions(
        &mut self,
        filters: &[MetadataFilter],
        max_results: u32,
    ) -> Result<RequestHandle, BackendResult>;

    /// Ask for a session's metadata; answered by `SessionDataUpdated`.
    fn request_session_data(&mut self, session: BackendSessionId) -> bool;

    fn join_session(&mut self, session: BackendSessionId) -> Result<RequestHandle, BackendResult>;

    fn leave_session(&mut self, session: BackendSessionId);

    fn set_session_metadata(&mut self, session: BackendSessionId, key: &str, value: &str) -> bool;

    fn session_metadata(&self, session: BackendSessionId, key: &str) -> Option<String>;

    fn session_members(&self, session: BackendSessionId) -> Vec<IdentityId>;

    fn session_owner(&self, session: BackendSessionId) -> Option<IdentityId>;

    fn find_leaderboard(
        &mut self,
        name: &str,
        create_if_missing: bool,
    ) -> Result<RequestHandle, BackendResult>;

    fn upload_leaderboard_score(
        &mut self,
        leaderboard: LeaderboardId,
        method: UploadMethod,
        score: i32,
        details: &[i32],
    ) -> Result<RequestHandle, BackendResult>;

    fn download_leaderboard_entries(
        &mut self,
        leaderboard: LeaderboardId,
        range: EntryRange,
    ) -> Result<RequestHandle, BackendResult>;

    fn request_stats(&mut self) -> Result<RequestHandle, BackendResult>;

    fn stat(&self, name: &str) -> Result<StatValue, BackendResult>;

    fn set_stat(&mut self, name: &str, value: StatValue) -> Result<(), BackendResult>;

    fn store_stats(&mut self) -> Result<RequestHandle, BackendResult>;

    fn achievement_state(&self, name: &str) -> Result<bool, BackendResult>;

    fn send_packet(&mut self, to: IdentityId, payload: &[u8]) -> bool;

    fn accept_transport(&mut self, peer: IdentityId) -> bool;

    fn close_transport(&mut self, peer: IdentityId);

    /// Best-effort cancel; the handle's notification will not be delivered.
    fn cancel(&mut self, handle: RequestHandle);

    /// Drain notifications queued since the previous call.
    fn run_callbacks(&mut self) -> Vec<BackendNotification>;
}
