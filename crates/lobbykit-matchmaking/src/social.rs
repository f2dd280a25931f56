//! Read-only identity and social queries.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque participant identity issued by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IdentityId(pub u64);

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Relationship between the local user and another identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Relationship {
    #[default]
    None,
    Friend,
    RequestSent,
    RequestReceived,
    Blocked,
}

/// Social surface exposed by a backend.
///
/// Consulted when populating connections (local identity, display names)
/// and when summarising search results (friend counts).
pub trait SocialDirectory {
    /// Identity of the signed-in user, if any.
    fn local_identity(&self) -> Option<IdentityId>;

    fn display_name(&self, id: IdentityId) -> Option<String>;

    /// Every identity with a relationship to the local user.
    fn contacts(&self) -> Vec<IdentityId>;

    fn relationship(&self, id: IdentityId) -> Relationship;

    /// Rich-presence value published by `id` under `key`.
    fn presence(&self, id: IdentityId, key: &str) -> Option<String>;

    /// Display name of the local user, empty when unknown.
    fn local_display_name(&self) -> String {
        self.local_identity()
            .and_then(|id| self.display_name(id))
            .unwrap_or_default()
    }

    /// How many of `members` are friends of the local user.
    fn count_friends(&self, members: &[IdentityId]) -> u32 {
        let friends = members
            .iter()
            .filter(|id| self.relationship(**id) == Relationship::Friend)
            .count();
        u32::try_from(friends).unwrap_or(u32::MAX)
    }
}
