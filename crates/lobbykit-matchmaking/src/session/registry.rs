//! Fixed-capacity session pool with per-session remote connections.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use super::types::{
    Connection, ConnectionId, ConnectionUid, CreateFlags, RemoteConnection, Session, SessionData,
    SessionHandle, TransportAddress, USER_DATA_BLOB_SIZE, UserDataEntry, UserInfo,
};
use crate::backend::BackendSessionId;
use crate::error::{LobbyError, Result};
use crate::pool::SlotPool;
use crate::social::IdentityId;

/// Who joins a session as a remote connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePeer {
    pub identity: IdentityId,
    pub uid: ConnectionUid,
    pub name: String,
    pub user_data: [u8; USER_DATA_BLOB_SIZE],
    pub is_dedicated: bool,
    pub num_users: u32,
}

/// Owns every session slot, its connections and the transport mappings.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: SlotPool<Session>,
    max_remote_connections: usize,
    default_user_data: Vec<UserDataEntry>,
    next_uid: u16,
    /// Remote connections referencing each transport.
    transports: HashMap<TransportAddress, usize>,
}

impl SessionRegistry {
    pub fn new(max_sessions: usize, max_remote_connections: usize) -> Self {
        Self {
            sessions: SlotPool::with_capacity(max_sessions),
            max_remote_connections,
            default_user_data: Vec::new(),
            next_uid: 0,
            transports: HashMap::new(),
        }
    }

    /// Replace the user-data schema copied into newly created sessions.
    pub fn register_user_data(&mut self, entries: Vec<UserDataEntry>) {
        self.default_user_data = entries;
    }

    pub fn default_user_data(&self) -> &[UserDataEntry] {
        &self.default_user_data
    }

    /// Allocate a session slot with a default local connection.
    pub fn create_session_handle(
        &mut self,
        host: bool,
        flags: CreateFlags,
        num_users: u32,
    ) -> Result<SessionHandle> {
        let session = Session {
            host,
            create_flags: flags,
            started: false,
            user_events_started: false,
            backend_joined: false,
            backend_id: None,
            owner: None,
            local: Connection {
                num_users,
                ..Connection::default()
            },
            remotes: SlotPool::with_capacity(self.max_remote_connections),
            host_connection: None,
            data: SessionData {
                user_data: self.default_user_data.clone(),
                ..SessionData::default()
            },
        };

        let handle = self
            .sessions
            .insert(session)
            .map(SessionHandle)
            .map_err(|_| LobbyError::OutOfSessions)?;
        debug!(session = %handle, host, "Session slot allocated");
        Ok(handle)
    }

    /// Release a session slot. Every remote connection must already be freed.
    pub fn free_session_handle(&mut self, handle: SessionHandle) -> Result<()> {
        let session = self.get(handle)?;
        if !session.remotes.is_empty() {
            warn!(
                session = %handle,
                remotes = session.remotes.len(),
                "Refusing to free session with live remote connections"
            );
            return Err(LobbyError::InvalidRequest);
        }
        self.sessions.remove(handle.0);
        debug!(session = %handle, "Session slot freed");
        Ok(())
    }

    pub fn contains(&self, handle: SessionHandle) -> bool {
        self.sessions.contains(handle.0)
    }

    pub(crate) fn get(&self, handle: SessionHandle) -> Result<&Session> {
        self.sessions.get(handle.0).ok_or(LobbyError::InvalidSession)
    }

    pub(crate) fn get_mut(&mut self, handle: SessionHandle) -> Result<&mut Session> {
        self.sessions
            .get_mut(handle.0)
            .ok_or(LobbyError::InvalidSession)
    }

    pub fn handles(&self) -> Vec<SessionHandle> {
        self.sessions.keys().into_iter().map(SessionHandle).collect()
    }

    pub const fn len(&self) -> usize {
        self.sessions.len()
    }

    pub const fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn find_by_backend_id(&self, id: BackendSessionId) -> Option<SessionHandle> {
        self.sessions
            .iter()
            .find(|(_, s)| s.backend_id == Some(id))
            .map(|(key, _)| SessionHandle(key))
    }

    /// Next connection uid. Wraps around and never yields zero.
    pub const fn create_connection_uid(&mut self) -> ConnectionUid {
        self.next_uid = self.next_uid.wrapping_add(1);
        if self.next_uid == 0 {
            self.next_uid = 1;
        }
        ConnectionUid(self.next_uid)
    }

    /// Fill in the local connection once the local identity is known.
    pub fn init_local_connection(
        &mut self,
        handle: SessionHandle,
        uid: ConnectionUid,
        identity: Option<IdentityId>,
        name: String,
    ) -> Result<()> {
        let session = self.get_mut(handle)?;
        session.local.uid = uid;
        session.local.identity = identity;
        session.local.name = name;
        Ok(())
    }

    /// Track a remote participant in `handle`.
    pub fn add_remote_connection(
        &mut self,
        handle: SessionHandle,
        peer: RemotePeer,
    ) -> Result<ConnectionId> {
        let session = self
            .sessions
            .get_mut(handle.0)
            .ok_or(LobbyError::InvalidSession)?;

        let transport = TransportAddress(peer.identity);
        let remote = RemoteConnection {
            connection: Connection {
                identity: Some(peer.identity),
                name: peer.name,
                user_data: peer.user_data,
                uid: peer.uid,
                is_dedicated: peer.is_dedicated,
                num_users: peer.num_users,
            },
            transport,
        };
        let id = session
            .remotes
            .insert(remote)
            .map(ConnectionId)
            .map_err(|_| LobbyError::InvalidConnection)?;

        if !session.host && session.owner == Some(peer.identity) {
            session.host_connection = Some(id);
        }
        *self.transports.entry(transport).or_default() += 1;

        info!(
            session = %handle,
            connection = %id,
            identity = %peer.identity,
            uid = peer.uid.0,
            "Remote connection added"
        );
        Ok(id)
    }

    /// Free one remote connection, closing its transport through `close`
    /// when no other connection still uses it.
    ///
    /// Returns `false` without touching anything if the connection is
    /// already gone.
    pub fn free_remote_connection(
        &mut self,
        handle: SessionHandle,
        id: ConnectionId,
        close: impl FnOnce(IdentityId),
    ) -> bool {
        let Some(session) = self.sessions.get_mut(handle.0) else {
            return false;
        };
        let Some(transport) = session.remotes.get(id.0).map(|r| r.transport) else {
            return false;
        };

        let last_user = match self.transports.get_mut(&transport) {
            Some(refs) if *refs > 1 => {
                *refs -= 1;
                false
            }
            _ => {
                self.transports.remove(&transport);
                true
            }
        };
        if last_user {
            close(transport.0);
        }

        session.remotes.remove(id.0);
        if session.host_connection == Some(id) {
            session.host_connection = None;
        }
        debug!(session = %handle, connection = %id, "Remote connection freed");
        true
    }

    /// Free every remote connection of `handle`; returns how many were freed.
    pub fn free_all_remote_connections(
        &mut self,
        handle: SessionHandle,
        mut close: impl FnMut(IdentityId),
    ) -> usize {
        let ids = self.remote_connections(handle);
        ids.into_iter()
            .filter(|id| self.free_remote_connection(handle, *id, &mut close))
            .count()
    }

    pub fn remote_connections(&self, handle: SessionHandle) -> Vec<ConnectionId> {
        self.sessions
            .get(handle.0)
            .map(|s| s.remotes.keys().into_iter().map(ConnectionId).collect())
            .unwrap_or_default()
    }

    pub fn remote_connection_count(&self, handle: SessionHandle) -> usize {
        self.sessions.get(handle.0).map_or(0, |s| s.remotes.len())
    }

    pub fn find_remote_by_identity(
        &self,
        handle: SessionHandle,
        identity: IdentityId,
    ) -> Option<ConnectionId> {
        self.find_remote(handle, |c| c.identity == Some(identity))
    }

    fn find_remote(
        &self,
        handle: SessionHandle,
        pred: impl Fn(&Connection) -> bool,
    ) -> Option<ConnectionId> {
        let session = self.sessions.get(handle.0)?;
        session
            .remotes
            .iter()
            .find(|(_, r)| pred(&r.connection))
            .map(|(key, _)| ConnectionId(key))
    }

    pub(crate) fn remote_mut(
        &mut self,
        handle: SessionHandle,
        id: ConnectionId,
    ) -> Option<&mut RemoteConnection> {
        self.sessions.get_mut(handle.0)?.remotes.get_mut(id.0)
    }

    /// Transports of every remote connection in `handle`.
    pub fn remote_transports(&self, handle: SessionHandle) -> Vec<TransportAddress> {
        self.sessions
            .get(handle.0)
            .map(|s| s.remotes.iter().map(|(_, r)| r.transport).collect())
            .unwrap_or_default()
    }

    /// Snapshot of the local user (`None`) or a remote connection.
    pub fn user_info(&self, handle: SessionHandle, id: Option<ConnectionId>) -> Result<UserInfo> {
        let session = self.get(handle)?;
        match id {
            None => Ok(session.local.info(true)),
            Some(id) => session
                .remotes
                .get(id.0)
                .map(|r| r.connection.info(false))
                .ok_or(LobbyError::InvalidConnection),
        }
    }

    /// Local user first (when present), then every remote connection.
    pub fn users(&self, handle: SessionHandle) -> Result<Vec<UserInfo>> {
        let session = self.get(handle)?;
        let mut users = Vec::with_capacity(session.remotes.len() + 1);
        if session.local.num_users > 0 {
            users.push(session.local.info(true));
        }
        users.extend(session.remotes.iter().map(|(_, r)| r.connection.info(false)));
        Ok(users)
    }

    /// Local users plus the users behind every remote connection.
    pub fn filled_slots(&self, handle: SessionHandle) -> Result<u32> {
        let session = self.get(handle)?;
        Ok(session
            .remotes
            .iter()
            .fold(session.local.num_users, |acc, (_, r)| {
                acc.saturating_add(r.connection.num_users)
            }))
    }

    pub fn transport_refs(&self, identity: IdentityId) -> usize {
        self.transports
            .get(&TransportAddress(identity))
            .copied()
            .unwrap_or(0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::session::types::UserDataValue;

    fn peer(id: u64, uid: u16) -> RemotePeer {
        RemotePeer {
            identity: IdentityId(id),
            uid: ConnectionUid(uid),
            name: format!("peer-{id}"),
            user_data: [0; USER_DATA_BLOB_SIZE],
            is_dedicated: false,
            num_users: 1,
        }
    }

    #[test]
    fn pool_exhaustion_is_out_of_sessions() {
        let mut reg = SessionRegistry::new(1, 4);
        reg.create_session_handle(true, CreateFlags::NONE, 1).unwrap();
        assert_eq!(
            reg.create_session_handle(true, CreateFlags::NONE, 1),
            Err(LobbyError::OutOfSessions)
        );
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn new_session_copies_registered_schema() {
        let mut reg = SessionRegistry::new(2, 4);
        reg.register_user_data(vec![UserDataEntry::new(5, UserDataValue::Int8(1))]);
        let h = reg.create_session_handle(false, CreateFlags::NONE, 1).unwrap();
        assert_eq!(reg.get(h).unwrap().data.user_data.len(), 1);
    }

    #[test]
    fn free_requires_remotes_released() {
        let mut reg = SessionRegistry::new(2, 4);
        let h = reg.create_session_handle(true, CreateFlags::NONE, 1).unwrap();
        let c = reg.add_remote_connection(h, peer(7, 2)).unwrap();

        assert_eq!(reg.free_session_handle(h), Err(LobbyError::InvalidRequest));
        assert!(reg.free_remote_connection(h, c, |_| {}));
        assert_eq!(reg.free_session_handle(h), Ok(()));
        assert_eq!(reg.free_session_handle(h), Err(LobbyError::InvalidSession));
        assert!(reg.get(h).is_err());
    }

    #[test]
    fn free_remote_connection_twice_is_noop() {
        let mut reg = SessionRegistry::new(1, 4);
        let h = reg.create_session_handle(true, CreateFlags::NONE, 1).unwrap();
        let c = reg.add_remote_connection(h, peer(7, 2)).unwrap();
        let other = reg.add_remote_connection(h, peer(8, 3)).unwrap();

        let mut closed = Vec::new();
        assert!(reg.free_remote_connection(h, c, |id| closed.push(id)));
        assert!(!reg.free_remote_connection(h, c, |id| closed.push(id)));

        assert_eq!(closed, vec![IdentityId(7)]);
        assert_eq!(reg.remote_connection_count(h), 1);
        assert!(reg.user_info(h, Some(other)).is_ok());
        assert_eq!(reg.transport_refs(IdentityId(8)), 1);
    }

    #[test]
    fn shared_transport_closed_by_last_connection() {
        let mut reg = SessionRegistry::new(2, 4);
        let a = reg.create_session_handle(true, CreateFlags::NONE, 1).unwrap();
        let b = reg.create_session_handle(true, CreateFlags::NONE, 1).unwrap();
        let ca = reg.add_remote_connection(a, peer(9, 2)).unwrap();
        let cb = reg.add_remote_connection(b, peer(9, 3)).unwrap();
        assert_eq!(reg.transport_refs(IdentityId(9)), 2);

        let mut closed = 0;
        reg.free_remote_connection(a, ca, |_| closed += 1);
        assert_eq!(closed, 0);
        reg.free_remote_connection(b, cb, |_| closed += 1);
        assert_eq!(closed, 1);
        assert_eq!(reg.transport_refs(IdentityId(9)), 0);
    }

    #[test]
    fn remote_pool_is_bounded() {
        let mut reg = SessionRegistry::new(1, 2);
        let h = reg.create_session_handle(true, CreateFlags::NONE, 1).unwrap();
        reg.add_remote_connection(h, peer(1, 1)).unwrap();
        reg.add_remote_connection(h, peer(2, 2)).unwrap();
        assert_eq!(
            reg.add_remote_connection(h, peer(3, 3)),
            Err(LobbyError::InvalidConnection)
        );
        assert_eq!(reg.transport_refs(IdentityId(3)), 0);
    }

    #[test]
    fn owner_becomes_host_connection_on_clients() {
        let mut reg = SessionRegistry::new(1, 4);
        let h = reg.create_session_handle(false, CreateFlags::NONE, 1).unwrap();
        reg.get_mut(h).unwrap().owner = Some(IdentityId(42));

        reg.add_remote_connection(h, peer(41, 5)).unwrap();
        assert!(reg.get(h).unwrap().host_connection.is_none());
        let host = reg.add_remote_connection(h, peer(42, 6)).unwrap();
        assert_eq!(reg.get(h).unwrap().host_connection, Some(host));
        assert_eq!(reg.filled_slots(h).unwrap(), 3);
    }

    #[test]
    fn connection_uid_skips_zero() {
        let mut reg = SessionRegistry::new(1, 1);
        reg.next_uid = u16::MAX;
        assert_eq!(reg.create_connection_uid(), ConnectionUid(1));
        assert_eq!(reg.create_connection_uid(), ConnectionUid(2));
    }
}
