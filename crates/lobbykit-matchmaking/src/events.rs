//! Session notifications raised on the submitter thread.

use crate::backend::BackendSessionId;
use crate::session::{SessionHandle, UserInfo};
use crate::social::IdentityId;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    UserJoined {
        session: SessionHandle,
        user: UserInfo,
    },
    UserLeft {
        session: SessionHandle,
        user: UserInfo,
    },
    UserUpdated {
        session: SessionHandle,
        user: UserInfo,
    },
    /// `user` was removed by the host or the backend.
    Kicked {
        session: SessionHandle,
        user: UserInfo,
        banned: bool,
    },
    /// The local user accepted an invite; joining is up to the game.
    InviteAccepted {
        session_id: BackendSessionId,
        inviter: IdentityId,
    },
    ServiceShutdown,
}

impl SessionEvent {
    pub const fn session(&self) -> Option<SessionHandle> {
        match self {
            Self::UserJoined { session, .. }
            | Self::UserLeft { session, .. }
            | Self::UserUpdated { session, .. }
            | Self::Kicked { session, .. } => Some(*session),
            Self::InviteAccepted { .. } | Self::ServiceShutdown => None,
        }
    }
}
