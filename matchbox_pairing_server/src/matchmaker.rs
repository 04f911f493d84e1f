//! The `find` state machine: Idle → Queued(mode) → Paired(peer, session)

use crate::protocol::{ConnId, Mode, ServerEvent};
use crate::state::{ConnStatus, ServerState};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

impl ServerState {
    /// Look for a partner for `id` in `mode`.
    ///
    /// Any previous pairing or queue entry of `id` is dropped first, so a
    /// repeated `find` re-enters the market instead of duplicating it. The
    /// requester is then paired with the oldest reachable connection waiting
    /// in `mode`, or queued when there is none.
    pub fn find(&mut self, id: ConnId, mode: Mode, now: DateTime<Utc>) -> ConnStatus {
        // unpair, then unqueue, then pair-or-queue; pairing before the
        // queues are clean could leave `id` both queued and paired
        self.unpair_and_notify(id);
        self.queues.remove_all(id);

        let registry = &self.registry;
        let pairings = &self.pairings;
        let peer = self.queues.dequeue_next_valid(mode, id, |candidate| {
            registry.is_reachable(candidate, now) && pairings.partner_of(candidate).is_none()
        });
        let Some(peer) = peer else {
            return self.wait(id, mode);
        };

        let session_id = self.new_session_id();
        if self.pairings.pair(id, peer, mode, session_id).is_none() {
            warn!(peer = %id, candidate = %peer, "pairing refused, queueing instead");
            return self.wait(id, mode);
        }

        let requester_initiates = self.coin_flip();
        self.registry.emit(
            id,
            ServerEvent::Matched {
                session_id,
                mode,
                peer_id: peer,
                initiator: requester_initiates,
            },
        );
        self.registry.emit(
            peer,
            ServerEvent::Matched {
                session_id,
                mode,
                peer_id: id,
                initiator: !requester_initiates,
            },
        );
        info!(peer = %id, partner = %peer, session = %session_id, %mode, "matched");

        ConnStatus::Paired { peer, session_id }
    }

    fn wait(&mut self, id: ConnId, mode: Mode) -> ConnStatus {
        let queue_size = self.queues.enqueue(mode, id);
        self.registry
            .emit(id, ServerEvent::Waiting { mode, queue_size });
        info!(peer = %id, %mode, queue_size, "waiting for partner");
        ConnStatus::Queued(mode)
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

    fn state(seed: u64) -> ServerState {
        ServerState::with_rng(&Config::default(), StdRng::seed_from_u64(seed))
    }

    #[test]
    fn exactly_one_initiator() {
        for seed in 0..16 {
            let now = Utc::now();
            let mut state = state(seed);
            let a = state.connect(now);
            let b = state.connect(now);
            state.find(a, Mode::Chat, now);
            state.find(b, Mode::Chat, now);

            let initiators: Vec<bool> = [a, b]
                .into_iter()
                .flat_map(|id| state.poll(id, now).unwrap())
                .filter_map(|event| match event {
                    ServerEvent::Matched { initiator, .. } => Some(initiator),
                    _ => None,
                })
                .collect();
            assert_eq!(initiators.len(), 2);
            assert_ne!(initiators[0], initiators[1]);
        }
    }

    #[test]
    fn modes_do_not_mix() {
        let now = Utc::now();
        let mut state = state(1);
        let a = state.connect(now);
        let b = state.connect(now);
        assert_eq!(state.find(a, Mode::Chat, now), ConnStatus::Queued(Mode::Chat));
        assert_eq!(state.find(b, Mode::Face, now), ConnStatus::Queued(Mode::Face));
        assert_eq!(state.partner_of(a), None);
    }

    #[test]
    fn find_while_queued_switches_mode() {
        let now = Utc::now();
        let mut state = state(1);
        let a = state.connect(now);
        state.find(a, Mode::Chat, now);
        state.find(a, Mode::Voice, now);
        assert_eq!(state.status(a), ConnStatus::Queued(Mode::Voice));
        assert_eq!(state.queue_occurrences(a), 1);
    }

    #[test]
    fn find_while_paired_notifies_old_partner() {
        let now = Utc::now();
        let mut state = state(2);
        let a = state.connect(now);
        let b = state.connect(now);
        state.find(a, Mode::Chat, now);
        state.find(b, Mode::Chat, now);
        state.poll(a, now);

        assert_eq!(state.find(b, Mode::Chat, now), ConnStatus::Queued(Mode::Chat));
        assert_eq!(state.status(a), ConnStatus::Idle);
        let events = state.poll(a, now).unwrap();
        assert!(matches!(events.as_slice(), [ServerEvent::PeerLeft { peer_id, .. }] if *peer_id == b));
    }

    #[test]
    fn expired_waiter_is_skipped() {
        let now = Utc::now();
        let mut state = state(4);
        let x = state.connect(now);
        state.find(x, Mode::Face, now);

        let later = now + TimeDelta::seconds(31);
        let y = state.connect(later);
        assert_eq!(state.find(y, Mode::Face, later), ConnStatus::Queued(Mode::Face));
        assert_eq!(state.queue_occurrences(x), 0);
        assert_eq!(state.stats().waiting.face, 1);
    }
}
