//! Session, connection and user-data types.

use std::fmt;
use std::ops::BitOr;

use crate::backend::{BackendSessionId, MetadataFilter};
use crate::pool::{SlotKey, SlotPool};
use crate::social::IdentityId;

/// Size of the opaque per-connection user-data blob.
pub const USER_DATA_BLOB_SIZE: usize = 16;

/// Local users that can share one session.
pub const MAX_LOCAL_USERS: u32 = 4;

pub const MAX_SESSION_NAME_LEN: usize = 32;

/// Upper bound on public + private slots.
pub const MAX_SESSION_MEMBERS: u32 = 250;

/// Handle of a session slot. Stale as soon as the slot is freed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionHandle(pub(crate) SlotKey);

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Handle of a remote connection within one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub(crate) SlotKey);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Participant id agreed between host and clients. Never zero once assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ConnectionUid(pub u16);

impl ConnectionUid {
    pub const NONE: Self = Self(0);

    pub const fn is_assigned(self) -> bool {
        self.0 != 0
    }
}

/// Session creation flags. The low 16 bits are fixed at creation, the high
/// 16 bits belong to the game and may change later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CreateFlags(pub u32);

impl CreateFlags {
    pub const NONE: Self = Self(0);
    pub const SEARCHABLE: Self = Self(0x0000_0001);
    pub const INVITABLE: Self = Self(0x0000_0002);
    pub const JOIN_BY_INVITE: Self = Self(0x0004_0000);
    pub const SYSTEM_MASK: u32 = 0x0000_ffff;
    pub const GAME_MASK: u32 = 0xffff_0000;

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn game_flags(self) -> u32 {
        self.0 & Self::GAME_MASK
    }

    /// Keep the system bits and replace the game bits.
    #[must_use]
    pub const fn with_game_flags(self, game: u32) -> Self {
        Self((self.0 & Self::SYSTEM_MASK) | (game & Self::GAME_MASK))
    }
}

impl BitOr for CreateFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Typed value of one session user-data entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UserDataValue {
    Int64(i64),
    Int32(i32),
    Int16(i16),
    Int8(i8),
    Float64(f64),
    Float32(f32),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UserDataEntry {
    pub id: u32,
    pub value: UserDataValue,
}

impl UserDataEntry {
    pub const fn new(id: u32, value: UserDataValue) -> Self {
        Self { id, value }
    }
}

/// Advertised description of a session.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionData {
    pub name: String,
    pub num_public_slots: u32,
    pub num_private_slots: u32,
    pub ranked: bool,
    pub user_data: Vec<UserDataEntry>,
}

impl SessionData {
    pub const fn total_slots(&self) -> u32 {
        self.num_public_slots.saturating_add(self.num_private_slots)
    }

    /// Replace entries with matching ids and append the rest.
    pub fn merge_user_data(&mut self, entries: &[UserDataEntry]) {
        for entry in entries {
            match self.user_data.iter_mut().find(|e| e.id == entry.id) {
                Some(existing) => existing.value = entry.value,
                None => self.user_data.push(*entry),
            }
        }
    }
}

/// What a session search asks the backend for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSearchParams {
    pub max_results: u32,
    pub filters: Vec<MetadataFilter>,
}

impl Default for SessionSearchParams {
    fn default() -> Self {
        Self {
            max_results: 16,
            filters: Vec::new(),
        }
    }
}

/// One session found by a search or described by a query.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSearchResult {
    pub id: BackendSessionId,
    pub data: SessionData,
    pub num_filled_slots: u32,
    pub num_friends: u32,
    pub ping: u32,
    pub flags: CreateFlags,
}

/// Snapshot of one participant, handed to callbacks and events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    pub uid: ConnectionUid,
    pub identity: Option<IdentityId>,
    pub name: String,
    pub user_data: [u8; USER_DATA_BLOB_SIZE],
    pub is_dedicated: bool,
    pub is_local: bool,
}

/// Presence of one participant in a session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Connection {
    pub identity: Option<IdentityId>,
    pub name: String,
    pub user_data: [u8; USER_DATA_BLOB_SIZE],
    pub uid: ConnectionUid,
    pub is_dedicated: bool,
    pub num_users: u32,
}

impl Connection {
    pub(crate) fn info(&self, is_local: bool) -> UserInfo {
        UserInfo {
            uid: self.uid,
            identity: self.identity,
            name: self.name.clone(),
            user_data: self.user_data,
            is_dedicated: self.is_dedicated,
            is_local,
        }
    }
}

/// Where packets for a remote participant go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransportAddress(pub IdentityId);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConnection {
    pub connection: Connection,
    pub transport: TransportAddress,
}

/// One session slot.
#[derive(Debug)]
pub(crate) struct Session {
    pub host: bool,
    pub create_flags: CreateFlags,
    pub started: bool,
    pub user_events_started: bool,
    /// The backend holds us as a member of `backend_id`.
    pub backend_joined: bool,
    pub backend_id: Option<BackendSessionId>,
    /// Identity that owns the session on the backend.
    pub owner: Option<IdentityId>,
    pub local: Connection,
    pub remotes: SlotPool<RemoteConnection>,
    pub host_connection: Option<ConnectionId>,
    pub data: SessionData,
}
