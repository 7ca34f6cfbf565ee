//! Registry of live consumer sessions.

use std::net::SocketAddr;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use crate::session::SessionId;

struct Entry {
    peer_addr: SocketAddr,
    close: CancellationToken,
}

/// Concurrent map of consumer sessions keyed by [`SessionId`].
#[derive(Default)]
pub(super) struct SessionRegistry(DashMap<SessionId, Entry>);

impl SessionRegistry {
    /// Track a new session; the returned guard removes it on drop.
    pub(super) fn insert(
        &self,
        id: SessionId,
        peer_addr: SocketAddr,
        close: CancellationToken,
    ) -> RegistryGuard<'_> {
        self.0.insert(id, Entry { peer_addr, close });
        RegistryGuard { registry: self, id }
    }

    /// Ask the session to close after its current frame.
    pub(super) fn close(&self, id: SessionId) -> bool {
        match self.0.get(&id) {
            Some(entry) => {
                entry.close.cancel();
                true
            }
            None => false,
        }
    }

    pub(super) fn peer_addr(&self, id: SessionId) -> Option<SocketAddr> {
        self.0.get(&id).map(|entry| entry.peer_addr)
    }

    /// IDs of live sessions in ascending order.
    pub(super) fn ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<_> = self.0.iter().map(|entry| *entry.key()).collect();
        ids.sort_unstable();
        ids
    }
}

/// Removes a session from the registry when its task ends.
pub(super) struct RegistryGuard<'a> {
    registry: &'a SessionRegistry,
    id: SessionId,
}

impl Drop for RegistryGuard<'_> {
    fn drop(&mut self) { self.registry.0.remove(&self.id); }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_removes_entry() {
        let registry = SessionRegistry::default();
        let token = CancellationToken::new();
        let addr: SocketAddr = "127.0.0.1:5000".parse().expect("addr");
        {
            let _guard = registry.insert(SessionId::from(3), addr, token.clone());
            assert_eq!(registry.ids(), vec![SessionId::from(3)]);
            assert_eq!(registry.peer_addr(SessionId::from(3)), Some(addr));
            assert!(registry.close(SessionId::from(3)));
            assert!(token.is_cancelled());
        }
        assert!(registry.ids().is_empty());
        assert!(!registry.close(SessionId::from(3)));
    }
}
