//! Live connections, their leases and their pending outbound events
//!
//! Long-polling clients have no socket to close, so a connection stays
//! reachable only while it keeps polling: every request renews a lease, and a
//! connection whose lease ran out is treated as gone even before the sweep
//! removes it.

use crate::protocol::{ConnId, ServerEvent};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConnEntry {
    expires_at: DateTime<Utc>,
    /// Events waiting for the next poll
    outbox: VecDeque<ServerEvent>,
}

fn lease_end(now: DateTime<Utc>, lease: TimeDelta) -> DateTime<Utc> {
    now.checked_add_signed(lease).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Connection registry, the transport's live-connection set
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Registry {
    conns: HashMap<ConnId, ConnEntry>,
}

impl Registry {
    pub fn connect(&mut self, id: ConnId, now: DateTime<Utc>, lease: TimeDelta) {
        self.conns.insert(
            id,
            ConnEntry {
                expires_at: lease_end(now, lease),
                outbox: VecDeque::new(),
            },
        );
    }

    /// Renew the lease of a reachable connection. Returns false if the
    /// connection is unknown or already expired.
    pub fn touch(&mut self, id: ConnId, now: DateTime<Utc>, lease: TimeDelta) -> bool {
        match self.conns.get_mut(&id) {
            Some(entry) if now < entry.expires_at => {
                entry.expires_at = lease_end(now, lease);
                true
            }
            _ => false,
        }
    }

    pub fn is_reachable(&self, id: ConnId, now: DateTime<Utc>) -> bool {
        self.conns
            .get(&id)
            .is_some_and(|entry| now < entry.expires_at)
    }

    /// Queue an event for a connection. Events for unknown connections are
    /// dropped.
    pub fn emit(&mut self, to: ConnId, event: ServerEvent) -> bool {
        match self.conns.get_mut(&to) {
            Some(entry) => {
                entry.outbox.push_back(event);
                true
            }
            None => {
                tracing::debug!(peer = %to, "dropping event for unknown connection");
                false
            }
        }
    }

    /// Take all pending events for a connection, oldest first
    pub fn drain(&mut self, id: ConnId) -> Vec<ServerEvent> {
        self.conns
            .get_mut(&id)
            .map(|entry| entry.outbox.drain(..).collect())
            .unwrap_or_default()
    }

    pub fn disconnect(&mut self, id: ConnId) -> bool {
        self.conns.remove(&id).is_some()
    }

    /// Connections whose lease ran out
    pub fn expired(&self, now: DateTime<Utc>) -> Vec<ConnId> {
        self.conns
            .iter()
            .filter(|(_, entry)| now >= entry.expires_at)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.conns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conns.is_empty()
    }
}
