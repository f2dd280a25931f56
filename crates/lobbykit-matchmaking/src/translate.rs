//! Backend result codes to [`LobbyError`].

use tracing::warn;

use crate::backend::{BackendResult, EnterResponse};
use crate::error::LobbyError;

/// Map a call result to the local taxonomy. `OK` maps to `None`.
///
/// Codes without an explicit mapping become [`LobbyError::InternalError`]
/// and are logged with their raw value.
pub fn translate_result(result: BackendResult) -> Option<LobbyError> {
    let mapped = match result {
        BackendResult::OK => return None,
        BackendResult::TIMEOUT => LobbyError::TimedOut,
        BackendResult::NO_CONNECTION
        | BackendResult::SERVICE_UNAVAILABLE
        | BackendResult::NOT_LOGGED_ON
        | BackendResult::BUSY => LobbyError::ServiceUnavailable,
        BackendResult::ACCESS_DENIED | BackendResult::INSUFFICIENT_PRIVILEGE => {
            LobbyError::PermissionDenied
        }
        BackendResult::BANNED => LobbyError::Banned,
        BackendResult::BLOCKED | BackendResult::IGNORED => LobbyError::Blocked,
        BackendResult::CANCELLED => LobbyError::Cancelled,
        BackendResult::INVALID_PARAM | BackendResult::INVALID_IDENTITY => {
            LobbyError::InvalidArgument
        }
        BackendResult::FAIL | BackendResult::INVALID_STATE | BackendResult::LIMIT_EXCEEDED => {
            LobbyError::InternalError
        }
        other => {
            warn!(code = other.0, "Unhandled backend result code");
            LobbyError::InternalError
        }
    };
    Some(mapped)
}

/// Error for a call that failed before a request handle was issued.
///
/// Only "not ready" style failures keep their meaning; anything else is an
/// internal error since the request never reached the service.
pub fn translate_sync_failure(result: BackendResult) -> LobbyError {
    match translate_result(result) {
        Some(LobbyError::ServiceUnavailable) => LobbyError::ServiceUnavailable,
        Some(LobbyError::InvalidArgument) => LobbyError::InvalidArgument,
        _ => LobbyError::InternalError,
    }
}

/// Map the response to a session enter request. Success maps to `None`.
pub fn translate_enter_response(response: EnterResponse) -> Option<LobbyError> {
    let mapped = match response {
        EnterResponse::SUCCESS => return None,
        EnterResponse::DOESNT_EXIST => LobbyError::InvalidSession,
        EnterResponse::NOT_ALLOWED | EnterResponse::LIMITED => LobbyError::PermissionDenied,
        EnterResponse::FULL => LobbyError::SessionFull,
        EnterResponse::ERROR => LobbyError::InternalError,
        EnterResponse::BANNED | EnterResponse::COMMUNITY_BAN => LobbyError::Banned,
        EnterResponse::CLAN_DISABLED
        | EnterResponse::MEMBER_BLOCKED_YOU
        | EnterResponse::YOU_BLOCKED_MEMBER => LobbyError::Blocked,
        other => {
            warn!(code = other.0, "Unhandled session enter response");
            LobbyError::InternalError
        }
    };
    Some(mapped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_is_success() {
        assert_eq!(translate_result(BackendResult::OK), None);
        assert_eq!(translate_enter_response(EnterResponse::SUCCESS), None);
    }

    #[test]
    fn access_restrictions_keep_their_kind() {
        assert_eq!(
            translate_result(BackendResult::ACCESS_DENIED),
            Some(LobbyError::PermissionDenied)
        );
        assert_eq!(
            translate_result(BackendResult::BANNED),
            Some(LobbyError::Banned)
        );
        assert_eq!(
            translate_result(BackendResult::BLOCKED),
            Some(LobbyError::Blocked)
        );
        assert_eq!(
            translate_result(BackendResult::TIMEOUT),
            Some(LobbyError::TimedOut)
        );
    }

    #[test]
    fn unknown_code_is_internal_error() {
        assert_eq!(
            translate_result(BackendResult(9_999)),
            Some(LobbyError::InternalError)
        );
        assert_eq!(
            translate_enter_response(EnterResponse(77)),
            Some(LobbyError::InternalError)
        );
    }

    #[test]
    fn sync_failures_collapse_to_unavailable_or_internal() {
        assert_eq!(
            translate_sync_failure(BackendResult::NOT_LOGGED_ON),
            LobbyError::ServiceUnavailable
        );
        assert_eq!(
            translate_sync_failure(BackendResult::BANNED),
            LobbyError::InternalError
        );
    }

    #[test]
    fn enter_responses() {
        let cases = [
            (EnterResponse::DOESNT_EXIST, LobbyError::InvalidSession),
            (EnterResponse::LIMITED, LobbyError::PermissionDenied),
            (EnterResponse::FULL, LobbyError::SessionFull),
            (EnterResponse::COMMUNITY_BAN, LobbyError::Banned),
            (EnterResponse::YOU_BLOCKED_MEMBER, LobbyError::Blocked),
        ];
        for (response, expected) in cases {
            assert_eq!(translate_enter_response(response), Some(expected));
        }
    }
}
