//! Unsolicited membership changes on tracked sessions.

use tracing::{debug, info, warn};

use crate::backend::{BackendSessionId, MemberChange};
use crate::coordinator::engine::Engine;
use crate::error::LobbyError;
use crate::events::SessionEvent;
use crate::packet::LobbyPacket;
use crate::session::{
    ConnectionId, ConnectionUid, RemotePeer, SessionHandle, USER_DATA_BLOB_SIZE, UserInfo,
};
use crate::social::IdentityId;

pub(crate) fn changed(
    engine: &mut Engine<'_>,
    backend_id: BackendSessionId,
    member: IdentityId,
    change: MemberChange,
) {
    let Some(h) = engine.state.sessions.find_by_backend_id(backend_id) else {
        debug!(%backend_id, %member, ?change, "Membership change for an untracked session");
        return;
    };
    if engine.backend.social().local_identity() == Some(member) {
        if change.is_departure() {
            local_removed(engine, h, change);
        }
        return;
    }
    if change == MemberChange::Entered {
        entered(engine, h, member);
    } else {
        departed(engine, h, member, change);
    }
}

/// Track `identity` as a remote connection of `h`.
pub(super) fn add_member(
    engine: &mut Engine<'_>,
    h: SessionHandle,
    identity: IdentityId,
    uid: ConnectionUid,
) -> Option<ConnectionId> {
    let name = engine
        .backend
        .social()
        .display_name(identity)
        .unwrap_or_default();
    let peer = RemotePeer {
        identity,
        uid,
        name,
        user_data: [0; USER_DATA_BLOB_SIZE],
        is_dedicated: false,
        num_users: 1,
    };
    match engine.state.sessions.add_remote_connection(h, peer) {
        Ok(id) => Some(id),
        Err(error) => {
            warn!(session = %h, peer = %identity, %error, "Could not add remote connection");
            None
        }
    }
}

fn departure_event(session: SessionHandle, user: UserInfo, change: MemberChange) -> SessionEvent {
    match change {
        MemberChange::Kicked => SessionEvent::Kicked {
            session,
            user,
            banned: false,
        },
        MemberChange::Banned => SessionEvent::Kicked {
            session,
            user,
            banned: true,
        },
        MemberChange::Entered | MemberChange::Left | MemberChange::Disconnected => {
            SessionEvent::UserLeft { session, user }
        }
    }
}

fn entered(engine: &mut Engine<'_>, h: SessionHandle, member: IdentityId) {
    if engine.state.sessions.find_remote_by_identity(h, member).is_some() {
        return;
    }
    let Ok(session) = engine.state.sessions.get(h) else {
        return;
    };
    let is_host = session.host;
    let uid = if is_host {
        engine.state.sessions.create_connection_uid()
    } else {
        ConnectionUid::NONE
    };
    let Some(conn) = add_member(engine, h, member, uid) else {
        return;
    };
    if is_host {
        send_join_result(engine, h, member, uid);
    }
    if let Ok(user) = engine.state.sessions.user_info(h, Some(conn)) {
        engine.raise_event(SessionEvent::UserJoined { session: h, user });
    }
}

fn send_join_result(
    engine: &mut Engine<'_>,
    h: SessionHandle,
    member: IdentityId,
    joiner_uid: ConnectionUid,
) {
    let Ok(session) = engine.state.sessions.get(h) else {
        return;
    };
    let Some(backend_id) = session.backend_id else {
        return;
    };
    let local = &session.local;
    let packet = LobbyPacket::JoinResult {
        session: backend_id,
        joiner_uid: joiner_uid.0,
        host_uid: local.uid.0,
        host_name: local.name.clone(),
        host_user_data: local.user_data,
        host_dedicated: local.is_dedicated,
        game_flags: session.create_flags.game_flags(),
        num_users: local.num_users,
    };
    match packet.encode() {
        Ok(bytes) if engine.backend.send_packet(member, &bytes) => {
            debug!(session = %h, peer = %member, uid = joiner_uid.0, "Join result sent");
        }
        Ok(_) => warn!(session = %h, peer = %member, "Join result not delivered"),
        Err(error) => warn!(%error, "Failed to encode join result"),
    }
}

fn departed(
    engine: &mut Engine<'_>,
    h: SessionHandle,
    member: IdentityId,
    change: MemberChange,
) {
    let owner_left = engine
        .state
        .sessions
        .get(h)
        .is_ok_and(|s| !s.host && s.owner == Some(member));

    if let Some(conn) = engine.state.sessions.find_remote_by_identity(h, member) {
        let user = engine.state.sessions.user_info(h, Some(conn)).ok();
        let backend = &mut *engine.backend;
        engine
            .state
            .sessions
            .free_remote_connection(h, conn, |peer| backend.close_transport(peer));
        if let Some(user) = user {
            engine.raise_event(departure_event(h, user, change));
        }
    }

    if owner_left {
        let backend_id = engine.state.sessions.get(h).ok().and_then(|s| s.backend_id);
        let new_owner = backend_id.and_then(|id| engine.backend.session_owner(id));
        if let Ok(session) = engine.state.sessions.get_mut(h) {
            session.owner = new_owner;
        }
        info!(session = %h, ?new_owner, "Session host left");
        engine.fail_pending_joins(h, LobbyError::ConnectionFailed);
    }
}

fn local_removed(engine: &mut Engine<'_>, h: SessionHandle, change: MemberChange) {
    warn!(session = %h, ?change, "Local user removed from session");
    if let Ok(user) = engine.state.sessions.user_info(h, None) {
        engine.raise_event(departure_event(h, user, change));
    }
    if let Ok(session) = engine.state.sessions.get_mut(h) {
        session.backend_joined = false;
    }
    engine.teardown_session(h);
}
