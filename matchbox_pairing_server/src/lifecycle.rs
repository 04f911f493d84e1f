//! Teardown of queue entries and pairings

use crate::pairing::Pairing;
use crate::protocol::{ConnId, ServerEvent};
use crate::state::ServerState;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

impl ServerState {
    /// Dissolve the pairing of `id`, if any, and tell the surviving side.
    pub(crate) fn unpair_and_notify(&mut self, id: ConnId) -> Option<Pairing> {
        let pairing = self.pairings.unpair(id)?;
        self.registry.emit(
            pairing.peer,
            ServerEvent::PeerLeft {
                peer_id: id,
                session_id: pairing.session_id,
            },
        );
        info!(
            peer = %id,
            partner = %pairing.peer,
            session = %pairing.session_id,
            "pairing dissolved"
        );
        Some(pairing)
    }

    /// Return `id` to idle: out of every queue and out of its pairing.
    /// A second call finds nothing left to undo.
    fn release(&mut self, id: ConnId) -> Option<Pairing> {
        if self.queues.remove_all(id) {
            debug!(peer = %id, "left queue");
        }
        self.unpair_and_notify(id)
    }

    pub fn cancel_find(&mut self, id: ConnId) {
        self.release(id);
    }

    pub fn hangup(&mut self, id: ConnId) {
        self.release(id);
    }

    /// Forget a connection entirely. Returns whether it was still registered.
    pub fn disconnect(&mut self, id: ConnId) -> bool {
        self.release(id);
        let known = self.registry.disconnect(id);
        if known {
            info!(peer = %id, "disconnected");
        }
        known
    }

    /// Disconnect every connection whose lease ran out. Returns how many
    /// were removed.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        let expired = self.registry.expired(now);
        for id in &expired {
            debug!(peer = %id, "lease expired");
            self.disconnect(*id);
        }
        expired.len()
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::protocol::{Mode, ServerEvent};
    use crate::state::{ConnStatus, ServerState};
    use chrono::{TimeDelta, Utc};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn peer_left_count(events: &[ServerEvent]) -> usize {
        events
            .iter()
            .filter(|event| matches!(event, ServerEvent::PeerLeft { .. }))
            .count()
    }

    #[test]
    fn hangup_then_disconnect_notifies_once() {
        let now = Utc::now();
        let mut state = ServerState::with_rng(&Config::default(), StdRng::seed_from_u64(3));
        let a = state.connect(now);
        let b = state.connect(now);
        state.find(a, Mode::Voice, now);
        state.find(b, Mode::Voice, now);
        state.poll(b, now);

        state.hangup(a);
        state.hangup(a);
        assert!(state.disconnect(a));
        assert!(!state.disconnect(a));

        let events = state.poll(b, now).unwrap();
        assert_eq!(peer_left_count(&events), 1);
        assert_eq!(state.status(b), ConnStatus::Idle);
    }

    #[test]
    fn cancel_leaves_queue() {
        let now = Utc::now();
        let mut state = ServerState::with_rng(&Config::default(), StdRng::seed_from_u64(3));
        let a = state.connect(now);
        state.find(a, Mode::Face, now);
        state.cancel_find(a);
        state.cancel_find(a);
        assert_eq!(state.status(a), ConnStatus::Idle);
        assert_eq!(state.stats().waiting.face, 0);
    }

    #[test]
    fn sweep_unpairs_expired_connections() {
        let now = Utc::now();
        let mut state = ServerState::with_rng(&Config::default(), StdRng::seed_from_u64(3));
        let a = state.connect(now);
        let b = state.connect(now);
        state.find(a, Mode::Chat, now);
        state.find(b, Mode::Chat, now);

        let later = now + TimeDelta::seconds(20);
        state.poll(b, later);
        let swept = state.sweep(now + TimeDelta::seconds(35));
        assert_eq!(swept, 1);
        assert_eq!(state.status(b), ConnStatus::Idle);
        assert!(!state.is_reachable(a, now + TimeDelta::seconds(35)));
    }
}
