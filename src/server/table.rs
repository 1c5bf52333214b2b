//! Session table keyed by connection identity.

use std::collections::HashMap;

use super::session::RelaySession;
use crate::core::{ConnectionId, TableError};

/// Returned by [`SessionTable::add`] when the identity is already present.
///
/// Holds the rejected session; the existing entry is untouched.
#[derive(Debug)]
pub struct DuplicateSession<C, L> {
    session: Box<RelaySession<C, L>>,
}

impl<C, L> DuplicateSession<C, L> {
    /// The table error for this rejection.
    pub fn error(&self) -> TableError {
        TableError::DuplicateIdentity(self.session.id())
    }

    /// Take back the rejected session.
    pub fn into_session(self) -> RelaySession<C, L> {
        *self.session
    }
}

/// Live sessions, one per connection identity.
///
/// Accessed from the single polling context only.
#[derive(Debug)]
pub struct SessionTable<C, L> {
    sessions: HashMap<ConnectionId, RelaySession<C, L>>,
}

impl<C, L> Default for SessionTable<C, L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C, L> SessionTable<C, L> {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
        }
    }

    /// Insert a session under its identity.
    pub fn add(
        &mut self,
        session: RelaySession<C, L>,
    ) -> Result<&mut RelaySession<C, L>, DuplicateSession<C, L>> {
        use std::collections::hash_map::Entry;

        match self.sessions.entry(session.id()) {
            Entry::Occupied(_) => Err(DuplicateSession {
                session: Box::new(session),
            }),
            Entry::Vacant(slot) => Ok(slot.insert(session)),
        }
    }

    /// Remove and return a session.
    pub fn remove(&mut self, id: ConnectionId) -> Result<RelaySession<C, L>, TableError> {
        self.sessions.remove(&id).ok_or(TableError::NotFound(id))
    }

    /// Look up a session.
    pub fn get(&self, id: ConnectionId) -> Result<&RelaySession<C, L>, TableError> {
        self.sessions.get(&id).ok_or(TableError::NotFound(id))
    }

    /// Look up a session mutably.
    pub fn get_mut(&mut self, id: ConnectionId) -> Result<&mut RelaySession<C, L>, TableError> {
        self.sessions.get_mut(&id).ok_or(TableError::NotFound(id))
    }

    /// Check if a session exists.
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.sessions.contains_key(&id)
    }

    /// Number of sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Identities of all sessions, in no particular order.
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.sessions.keys().copied().collect()
    }

    /// Visit every session.
    pub fn for_each_mut(&mut self, mut f: impl FnMut(&mut RelaySession<C, L>)) {
        for session in self.sessions.values_mut() {
            f(session);
        }
    }

    /// Remove every session, returning them.
    pub fn drain_all(&mut self) -> Vec<RelaySession<C, L>> {
        self.sessions.drain().map(|(_, session)| session).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PeerId;
    use crate::server::mock::{MockConnection, MockLink};
    use crate::server::session::SessionPolicy;
    use crate::transport::PacketFramer;

    fn session(id: u32, peer: u64) -> RelaySession<MockConnection, MockLink> {
        RelaySession::new(
            MockConnection::new(id),
            PeerId::new(peer),
            PacketFramer::default(),
            SessionPolicy::default(),
        )
    }

    #[test]
    fn test_add_and_lookup() {
        let mut table = SessionTable::new();
        table.add(session(1, 10)).unwrap();
        table.add(session(2, 20)).unwrap();

        assert_eq!(table.len(), 2);
        assert!(table.contains(ConnectionId::new(1)));
        assert_eq!(table.get(ConnectionId::new(2)).unwrap().peer_label(), "#20");

        let mut ids = table.ids();
        ids.sort_by_key(|id| id.get());
        assert_eq!(ids, vec![ConnectionId::new(1), ConnectionId::new(2)]);
    }

    #[test]
    fn test_duplicate_add_keeps_existing() {
        let mut table = SessionTable::new();
        table.add(session(5, 1)).unwrap();

        let rejected = table.add(session(5, 2)).unwrap_err();
        assert_eq!(rejected.error(), TableError::DuplicateIdentity(ConnectionId::new(5)));
        assert_eq!(rejected.into_session().peer_label(), "#2");

        assert_eq!(table.len(), 1);
        assert_eq!(table.get(ConnectionId::new(5)).unwrap().peer_label(), "#1");
    }

    #[test]
    fn test_missing_identity() {
        let mut table: SessionTable<MockConnection, MockLink> = SessionTable::new();
        let id = ConnectionId::new(99);
        assert_eq!(table.get(id).unwrap_err(), TableError::NotFound(id));
        assert_eq!(table.get_mut(id).unwrap_err(), TableError::NotFound(id));
        assert_eq!(table.remove(id).unwrap_err(), TableError::NotFound(id));
    }

    #[test]
    fn test_remove_and_drain() {
        let mut table = SessionTable::new();
        table.add(session(1, 1)).unwrap();
        table.add(session(2, 2)).unwrap();
        table.add(session(3, 3)).unwrap();

        let removed = table.remove(ConnectionId::new(2)).unwrap();
        assert_eq!(removed.id(), ConnectionId::new(2));
        assert!(!table.contains(ConnectionId::new(2)));

        let mut visited = 0;
        table.for_each_mut(|_| visited += 1);
        assert_eq!(visited, 2);

        assert_eq!(table.drain_all().len(), 2);
        assert!(table.is_empty());
    }
}
