//! Session packets exchanged between participants over backend transports.

use serde::{Deserialize, Serialize};

use crate::backend::BackendSessionId;
use crate::session::USER_DATA_BLOB_SIZE;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LobbyPacket {
    /// Host to joiner once the joiner's entry has been seen.
    JoinResult {
        session: BackendSessionId,
        /// Connection uid the host assigned to the joiner.
        joiner_uid: u16,
        host_uid: u16,
        host_name: String,
        host_user_data: [u8; USER_DATA_BLOB_SIZE],
        host_dedicated: bool,
        game_flags: u32,
        num_users: u32,
    },
    /// A participant changed its user-data blob.
    UserData {
        session: BackendSessionId,
        uid: u16,
        data: [u8; USER_DATA_BLOB_SIZE],
    },
}

impl LobbyPacket {
    pub const fn session(&self) -> BackendSessionId {
        match self {
            Self::JoinResult { session, .. } | Self::UserData { session, .. } => *session,
        }
    }

    pub fn encode(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn decode(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}
