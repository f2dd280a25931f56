//! lobbykit matchmaking coordinator
//!
//! Tracks asynchronous session work (create, search, join, update, delete,
//! leaderboards, stats) between two execution contexts:
//! - the submitter (game) thread calls entry points on [`MatchmakingClient`]
//!   and receives every callback and event from [`MatchmakingClient::pump`]
//! - the executor (network) thread owns the [`Backend`] and advances tasks
//!   from [`MatchmakingService::tick`]
//!
//! Tasks, sessions and remote connections live in fixed-capacity pools with
//! generation-checked handles. Every started task reports exactly one
//! completion.

pub mod adapter;
pub mod backend;
pub mod coordinator;
mod dispatch;
pub mod error;
pub mod events;
mod handlers;
pub mod packet;
pub mod pool;
pub mod runner;
pub mod session;
pub mod social;
pub mod task;
pub mod translate;

pub use adapter::AsyncOp;
pub use backend::{Backend, LoopbackBackend, LoopbackNetwork};
pub use coordinator::{MatchmakingClient, MatchmakingService, coordinator};
pub use error::{LobbyError, Result};
pub use events::SessionEvent;
pub use runner::spawn_service_loop;
pub use session::{CreateFlags, SessionData, SessionHandle, SessionSearchParams};
pub use social::{IdentityId, SocialDirectory};
pub use task::{CompletionPayload, PartialResult, TaskId, TaskKind, TaskReport};
