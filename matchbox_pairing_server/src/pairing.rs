//! Symmetric table of active two-party sessions

use crate::protocol::{ConnId, Mode, SessionId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One side's view of an active pairing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pairing {
    pub peer: ConnId,
    pub session_id: SessionId,
    pub mode: Mode,
}

/// Both directions of every pairing are stored, so `partner_of` is a single
/// lookup for either side.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PairingTable {
    by_conn: HashMap<ConnId, Pairing>,
}

impl PairingTable {
    /// Pair `a` with `b`. Refuses (returns `None`) when `a == b` or either
    /// side is already paired.
    pub fn pair(
        &mut self,
        a: ConnId,
        b: ConnId,
        mode: Mode,
        session_id: SessionId,
    ) -> Option<SessionId> {
        if a == b || self.by_conn.contains_key(&a) || self.by_conn.contains_key(&b) {
            return None;
        }
        self.by_conn.insert(
            a,
            Pairing {
                peer: b,
                session_id,
                mode,
            },
        );
        self.by_conn.insert(
            b,
            Pairing {
                peer: a,
                session_id,
                mode,
            },
        );
        Some(session_id)
    }

    pub fn partner_of(&self, id: ConnId) -> Option<ConnId> {
        self.by_conn.get(&id).map(|pairing| pairing.peer)
    }

    pub fn get(&self, id: ConnId) -> Option<&Pairing> {
        self.by_conn.get(&id)
    }

    /// Dissolve the pairing of `id`, both directions at once. Returns `id`'s
    /// side of the dissolved pairing, or `None` if it was not paired.
    pub fn unpair(&mut self, id: ConnId) -> Option<Pairing> {
        let pairing = self.by_conn.remove(&id)?;
        if self
            .by_conn
            .get(&pairing.peer)
            .is_some_and(|reverse| reverse.peer == id)
        {
            self.by_conn.remove(&pairing.peer);
        }
        Some(pairing)
    }

    /// Number of active pairs
    pub fn len(&self) -> usize {
        self.by_conn.len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.by_conn.is_empty()
    }
}
