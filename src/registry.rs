//! Descriptor-keyed connection table with generational ids (spec §3
//! "Connection Registry", REDESIGN FLAG "Generational ids").
//!
//! Ported from the original `zener::HttpConn` bookkeeping inside
//! `include/core/server.h` (`users_` map of fd → `HttpConn`). The reactor
//! there keyed everything off the raw fd alone; this crate tags every
//! connection with a monotonically increasing `conn_id` so a callback or
//! queued worker task that still names an already-closed-and-reused fd can
//! be detected as stale instead of silently operating on the wrong peer.

use std::collections::HashMap;
use std::os::fd::RawFd;

use crate::error::{CoreError, Result};

/// Opaque `(fd, generation)` pair carried by every reactor event and worker
/// task. A registry lookup with a stale generation returns `None` rather
/// than the connection that has since reused that fd.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId {
    pub fd: RawFd,
    pub generation: u64,
}

struct Slot<C> {
    conn: C,
    generation: u64,
}

pub struct Registry<C> {
    slots: HashMap<RawFd, Slot<C>>,
    next_generation: u64,
    capacity: usize,
}

impl<C> Registry<C> {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: HashMap::new(),
            next_generation: 1,
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Register a freshly accepted connection, rejecting it with
    /// [`CoreError::Exhaustion`] if the registry is already at capacity
    /// (spec §4.6 admission control).
    pub fn insert(&mut self, fd: RawFd, conn: C) -> Result<ConnId> {
        if self.slots.len() >= self.capacity {
            return Err(CoreError::Exhaustion(self.slots.len()));
        }
        let generation = self.next_generation;
        self.next_generation += 1;
        self.slots.insert(fd, Slot { conn, generation });
        Ok(ConnId { fd, generation })
    }

    pub fn get(&self, id: ConnId) -> Option<&C> {
        self.slots.get(&id.fd).filter(|s| s.generation == id.generation).map(|s| &s.conn)
    }

    pub fn get_mut(&mut self, id: ConnId) -> Option<&mut C> {
        self.slots.get_mut(&id.fd).filter(|s| s.generation == id.generation).map(|s| &mut s.conn)
    }

    /// Look a connection up by raw fd alone, for the mio event-readiness
    /// path which only carries a `Token`/fd, not the full generational id.
    pub fn get_by_fd(&self, fd: RawFd) -> Option<(ConnId, &C)> {
        self.slots.get(&fd).map(|s| (ConnId { fd, generation: s.generation }, &s.conn))
    }

    pub fn get_by_fd_mut(&mut self, fd: RawFd) -> Option<(ConnId, &mut C)> {
        self.slots.get_mut(&fd).map(|s| (ConnId { fd, generation: s.generation }, &mut s.conn))
    }

    /// Remove and return the connection, but only if `id`'s generation
    /// still matches — a stale id silently no-ops instead of evicting
    /// whatever new connection has since taken over the fd.
    pub fn remove(&mut self, id: ConnId) -> Option<C> {
        if self.slots.get(&id.fd).map(|s| s.generation) != Some(id.generation) {
            return None;
        }
        self.slots.remove(&id.fd).map(|s| s.conn)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ConnId, &C)> {
        self.slots.iter().map(|(&fd, slot)| (ConnId { fd, generation: slot.generation }, &slot.conn))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ConnId, &mut C)> {
        self.slots.iter_mut().map(|(&fd, slot)| (ConnId { fd, generation: slot.generation }, &mut slot.conn))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_assigns_distinct_generations_across_fd_reuse() {
        let mut reg: Registry<u32> = Registry::new(8);
        let a = reg.insert(5, 100).unwrap();
        reg.remove(a);
        let b = reg.insert(5, 200).unwrap();

        assert_ne!(a.generation, b.generation);
        assert!(reg.get(a).is_none());
        assert_eq!(reg.get(b), Some(&200));
    }

    #[test]
    fn stale_id_lookup_after_reuse_returns_none_not_new_connection() {
        let mut reg: Registry<&str> = Registry::new(8);
        let old = reg.insert(3, "first").unwrap();
        reg.remove(old);
        let _new = reg.insert(3, "second").unwrap();

        assert!(reg.get(old).is_none());
        assert!(reg.remove(old).is_none());
    }

    #[test]
    fn insert_rejects_once_capacity_is_reached() {
        let mut reg: Registry<u32> = Registry::new(2);
        reg.insert(1, 1).unwrap();
        reg.insert(2, 2).unwrap();
        let err = reg.insert(3, 3).unwrap_err();
        assert!(matches!(err, CoreError::Exhaustion(2)));
    }

    #[test]
    fn get_by_fd_returns_current_generation() {
        let mut reg: Registry<u32> = Registry::new(8);
        let id = reg.insert(9, 42).unwrap();
        let (found_id, val) = reg.get_by_fd(9).unwrap();
        assert_eq!(found_id, id);
        assert_eq!(*val, 42);
    }
}
