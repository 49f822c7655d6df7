//! # Participants
//!
//! Session-local integer ids for connected peers, mapped both ways to their
//! protocol-level user ids. The local peer is always participant 0. Ids are
//! handed out sequentially and never reused within a session.

use std::collections::HashMap;
use std::sync::Arc;

/// Session-local id of a connected peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParticipantId(pub u32);

impl ParticipantId {
    /// The local peer.
    pub const LOCAL: Self = Self(0);

    /// Returns true for the local peer.
    #[inline]
    #[must_use]
    pub const fn is_local(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// Bidirectional participant ↔ user id map.
#[derive(Debug)]
pub struct ParticipantRegistry {
    local_user_id: Arc<str>,
    next_id: u32,
    users: HashMap<ParticipantId, Arc<str>>,
    ids: HashMap<Arc<str>, ParticipantId>,
}

impl ParticipantRegistry {
    /// Creates a registry holding only the local peer.
    pub fn new(local_user_id: impl Into<Arc<str>>) -> Self {
        let local: Arc<str> = local_user_id.into();
        let mut registry = Self {
            local_user_id: Arc::clone(&local),
            next_id: 1,
            users: HashMap::new(),
            ids: HashMap::new(),
        };
        registry.users.insert(ParticipantId::LOCAL, Arc::clone(&local));
        registry.ids.insert(local, ParticipantId::LOCAL);
        registry
    }

    /// Registers a newly connected peer.
    ///
    /// A user that reconnects gets a fresh id; its previous id is forgotten.
    pub fn add(&mut self, user_id: impl Into<Arc<str>>) -> ParticipantId {
        let user_id: Arc<str> = user_id.into();
        let id = ParticipantId(self.next_id);
        self.next_id += 1;

        if let Some(previous) = self.ids.insert(Arc::clone(&user_id), id) {
            self.users.remove(&previous);
        }
        self.users.insert(id, user_id);
        id
    }

    /// Forgets a peer. The local peer cannot be removed.
    pub fn remove(&mut self, id: ParticipantId) -> Option<Arc<str>> {
        if id.is_local() {
            return None;
        }
        let user_id = self.users.remove(&id)?;
        if self.ids.get(&user_id) == Some(&id) {
            self.ids.remove(&user_id);
        }
        Some(user_id)
    }

    /// User id of a participant still in the session.
    #[must_use]
    pub fn user_id(&self, id: ParticipantId) -> Option<&Arc<str>> {
        self.users.get(&id)
    }

    /// Participant id of a user still in the session.
    #[must_use]
    pub fn participant_id(&self, user_id: &str) -> Option<ParticipantId> {
        self.ids.get(user_id).copied()
    }

    /// The local peer's user id.
    #[must_use]
    pub fn local_user_id(&self) -> &Arc<str> {
        &self.local_user_id
    }

    /// Participants in the session, local included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Always false: the local peer is always present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
