//! Local error taxonomy surfaced to callers.

use thiserror::Error;

/// Result type alias for matchmaking entry points.
pub type Result<T> = std::result::Result<T, LobbyError>;

/// Closed set of errors an operation can report.
///
/// Local validation failures are returned synchronously from an entry point;
/// everything else is recorded on the task and delivered once through its
/// completion callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum LobbyError {
    #[error("invalid argument")]
    InvalidArgument,

    #[error("task pool exhausted")]
    TooManyTasks,

    #[error("session pool exhausted")]
    OutOfSessions,

    #[error("session handle is stale or the session was removed")]
    InvalidSession,

    #[error("connection pool exhausted or connection unknown")]
    InvalidConnection,

    #[error("request not valid in the current session state")]
    InvalidRequest,

    #[error("backend service unavailable")]
    ServiceUnavailable,

    #[error("backend failed to initialise")]
    InitFailed,

    #[error("internal error")]
    InternalError,

    #[error("operation timed out")]
    TimedOut,

    #[error("operation cancelled")]
    Cancelled,

    #[error("out of memory")]
    OutOfMemory,

    #[error("user data does not fit")]
    OutOfUserData,

    #[error("permission denied")]
    PermissionDenied,

    #[error("banned")]
    Banned,

    #[error("blocked")]
    Blocked,

    #[error("session is full")]
    SessionFull,

    #[error("connection to the host failed")]
    ConnectionFailed,
}

impl LobbyError {
    /// Stable numeric code used in logs.
    pub const fn code(self) -> u32 {
        match self {
            Self::InvalidArgument => 1,
            Self::TooManyTasks => 2,
            Self::OutOfSessions => 3,
            Self::InvalidSession => 4,
            Self::InvalidConnection => 5,
            Self::InvalidRequest => 6,
            Self::ServiceUnavailable => 7,
            Self::InitFailed => 8,
            Self::InternalError => 9,
            Self::TimedOut => 10,
            Self::Cancelled => 11,
            Self::OutOfMemory => 12,
            Self::OutOfUserData => 13,
            Self::PermissionDenied => 14,
            Self::Banned => 15,
            Self::Blocked => 16,
            Self::SessionFull => 17,
            Self::ConnectionFailed => 18,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn codes_are_unique() {
        let all = [
            LobbyError::InvalidArgument,
            LobbyError::TooManyTasks,
            LobbyError::OutOfSessions,
            LobbyError::InvalidSession,
            LobbyError::InvalidConnection,
            LobbyError::InvalidRequest,
            LobbyError::ServiceUnavailable,
            LobbyError::InitFailed,
            LobbyError::InternalError,
            LobbyError::TimedOut,
            LobbyError::Cancelled,
            LobbyError::OutOfMemory,
            LobbyError::OutOfUserData,
            LobbyError::PermissionDenied,
            LobbyError::Banned,
            LobbyError::Blocked,
            LobbyError::SessionFull,
            LobbyError::ConnectionFailed,
        ];
        let codes: HashSet<u32> = all.iter().map(|e| e.code()).collect();
        assert_eq!(codes.len(), all.len());
    }
}
