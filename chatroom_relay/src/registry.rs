// Connection registry: the set of live server-side connections.
//
// `ConnectionRegistry` is created once per server and shared by reference
// (`Arc`) with every connection worker. It is the only mutable state workers
// share, and all access goes through its methods so the locking stays in one
// place.
//
// Membership is by `Weak` reference keyed by `ConnectionId`: the registry
// knows who is connected but does not keep anyone's socket alive. A worker
// adds its connection when it becomes active and removes it before running
// its leave logic.
//
// Broadcast is snapshot-then-send. The packet is encoded once, the member
// list is copied out under the lock, the lock is released, and the same bytes
// are written to each member in turn. A write that fails (peer gone, write
// timeout) closes that member and is skipped; it never stops delivery to the
// rest. Closing wakes the member's own worker, which removes it from the set.
// Members already closed (shutdown drain, a previous failed write) are left
// out of the snapshot.

use std::collections::BTreeMap;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chatroom_protocol::{Packet, PacketError};
use tracing::{debug, warn};

use crate::connection::{Connection, ConnectionId};

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    members: Mutex<BTreeMap<ConnectionId, Weak<Connection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn members(&self) -> MutexGuard<'_, BTreeMap<ConnectionId, Weak<Connection>>> {
        self.members.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a connection. Returns false if it was already a member.
    pub fn add(&self, connection: &Arc<Connection>) -> bool {
        let mut members = self.members();
        if members.contains_key(&connection.id()) {
            return false;
        }
        members.insert(connection.id(), Arc::downgrade(connection));
        true
    }

    /// Remove a connection. Returns false if it was not a member.
    pub fn remove(&self, id: ConnectionId) -> bool {
        self.members().remove(&id).is_some()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.members().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.members().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members().is_empty()
    }

    /// Send `packet` to every member. Returns how many writes succeeded.
    pub fn broadcast(&self, packet: &Packet) -> Result<usize, PacketError> {
        let frame = packet.encode()?;
        Ok(self.fan_out(&frame, None))
    }

    /// Send `packet` to every member except `exclude`.
    pub fn broadcast_except(
        &self,
        packet: &Packet,
        exclude: ConnectionId,
    ) -> Result<usize, PacketError> {
        let frame = packet.encode()?;
        Ok(self.fan_out(&frame, Some(exclude)))
    }

    /// Shutdown drain: tell every member why, close it, and empty the set.
    pub fn close_all(&self, reason: &str) {
        let frame = match Packet::disconnect(reason).encode() {
            Ok(frame) => Some(frame),
            Err(e) => {
                warn!(error = %e, "shutdown notice could not be encoded");
                None
            }
        };
        let drained: Vec<Arc<Connection>> = {
            let mut members = self.members();
            let live = members.values().filter_map(Weak::upgrade).collect();
            members.clear();
            live
        };
        for connection in drained {
            if let Some(Err(e)) = frame.as_deref().map(|f| connection.send_frame(f)) {
                debug!(connection = %connection.id(), error = %e, "shutdown notice not delivered");
            }
            connection.close();
        }
    }

    /// Copy out the live members, pruning entries whose connection is gone.
    fn snapshot(&self, exclude: Option<ConnectionId>) -> Vec<Arc<Connection>> {
        let mut members = self.members();
        members.retain(|_, weak| weak.strong_count() > 0);
        members
            .iter()
            .filter(|(id, _)| Some(**id) != exclude)
            .filter_map(|(_, weak)| weak.upgrade())
            .filter(|connection| !connection.is_closed())
            .collect()
    }

    fn fan_out(&self, frame: &[u8], exclude: Option<ConnectionId>) -> usize {
        let mut delivered = 0;
        for connection in self.snapshot(exclude) {
            match connection.send_frame(frame) {
                Ok(()) => delivered += 1,
                // Closed by someone else since the snapshot was taken.
                Err(e) if e.kind() == io::ErrorKind::NotConnected => {
                    debug!(connection = %connection.id(), "skipping closed member");
                }
                Err(e) => {
                    warn!(connection = %connection.id(), peer = %connection.peer(), error = %e, "broadcast write failed");
                }
            }
        }
        delivered
    }
}
