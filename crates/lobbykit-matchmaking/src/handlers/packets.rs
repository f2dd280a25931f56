//! Packets received from session participants.

use tracing::{debug, info, warn};

use crate::coordinator::engine::Engine;
use crate::error::LobbyError;
use crate::events::SessionEvent;
use crate::packet::LobbyPacket;
use crate::session::{ConnectionUid, RemotePeer, SessionHandle};
use crate::social::IdentityId;

pub(crate) fn received(engine: &mut Engine<'_>, from: IdentityId, payload: &[u8]) {
    let packet = match LobbyPacket::decode(payload) {
        Ok(packet) => packet,
        Err(error) => {
            warn!(peer = %from, %error, "Dropping malformed packet");
            return;
        }
    };
    let Some(h) = engine.state.sessions.find_by_backend_id(packet.session()) else {
        debug!(peer = %from, session = %packet.session(), "Packet for an untracked session");
        return;
    };

    match packet {
        LobbyPacket::JoinResult {
            joiner_uid,
            host_uid,
            host_name,
            host_user_data,
            host_dedicated,
            game_flags,
            num_users,
            ..
        } => {
            let peer = RemotePeer {
                identity: from,
                uid: ConnectionUid(host_uid),
                name: host_name,
                user_data: host_user_data,
                is_dedicated: host_dedicated,
                num_users,
            };
            join_result(engine, h, ConnectionUid(joiner_uid), game_flags, peer);
        }
        LobbyPacket::UserData { uid, data, .. } => {
            let Some(conn) = engine.state.sessions.find_remote_by_identity(h, from) else {
                debug!(session = %h, peer = %from, "User data from an unknown participant");
                return;
            };
            if let Some(remote) = engine.state.sessions.remote_mut(h, conn) {
                remote.connection.user_data = data;
                if !remote.connection.uid.is_assigned() {
                    remote.connection.uid = ConnectionUid(uid);
                }
            }
            if let Ok(user) = engine.state.sessions.user_info(h, Some(conn)) {
                engine.raise_event(SessionEvent::UserUpdated { session: h, user });
            }
        }
    }
}

fn join_result(
    engine: &mut Engine<'_>,
    h: SessionHandle,
    local_uid: ConnectionUid,
    game_flags: u32,
    host: RemotePeer,
) {
    let Ok(session) = engine.state.sessions.get_mut(h) else {
        return;
    };
    if session.host || session.owner != Some(host.identity) {
        warn!(
            session = %h,
            peer = %host.identity,
            "Join result from a peer that does not own the session"
        );
        return;
    }
    if session.host_connection.is_some() {
        debug!(session = %h, "Duplicate join result ignored");
        return;
    }
    session.local.uid = local_uid;
    session.create_flags = session.create_flags.with_game_flags(game_flags);

    let identity = host.identity;
    match engine.state.sessions.add_remote_connection(h, host) {
        Ok(conn) => {
            info!(session = %h, host = %identity, uid = local_uid.0, "Host connection established");
            if let Ok(user) = engine.state.sessions.user_info(h, Some(conn)) {
                engine.raise_event(SessionEvent::UserJoined { session: h, user });
            }
        }
        Err(error) => {
            warn!(session = %h, host = %identity, %error, "Could not track the host connection");
            engine.fail_pending_joins(h, LobbyError::ConnectionFailed);
        }
    }
}
