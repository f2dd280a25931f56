//! Session slots, connections and the metadata encoding that advertises them.

pub mod registry;
pub mod types;
pub mod user_data;

pub use registry::{RemotePeer, SessionRegistry};
pub use types::{
    Connection, ConnectionId, ConnectionUid, CreateFlags, MAX_LOCAL_USERS, MAX_SESSION_MEMBERS,
    MAX_SESSION_NAME_LEN, RemoteConnection, SessionData, SessionHandle, SessionSearchParams,
    SessionSearchResult, TransportAddress, USER_DATA_BLOB_SIZE, UserDataEntry, UserDataValue,
    UserInfo,
};
