//! Per-mode FIFO queues of connections waiting for a partner

use crate::protocol::{ConnId, Mode};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ModeQueues {
    /// Indexed by [`Mode::index`]
    queues: [VecDeque<ConnId>; 3],
}

impl ModeQueues {
    /// Append `id` to the tail of the queue for `mode` and return the new
    /// queue length. The caller must have removed `id` from every queue first.
    pub fn enqueue(&mut self, mode: Mode, id: ConnId) -> usize {
        debug_assert!(self.queued_mode(id).is_none(), "{id} is already queued");
        let queue = &mut self.queues[mode.index()];
        queue.push_back(id);
        queue.len()
    }

    /// Pop entries from the head of the queue for `mode` until one is
    /// reachable and is not `requester`. Entries skipped on the way are
    /// discarded.
    pub fn dequeue_next_valid(
        &mut self,
        mode: Mode,
        requester: ConnId,
        is_reachable: impl Fn(ConnId) -> bool,
    ) -> Option<ConnId> {
        let queue = &mut self.queues[mode.index()];
        while let Some(candidate) = queue.pop_front() {
            if candidate == requester {
                continue;
            }
            if is_reachable(candidate) {
                return Some(candidate);
            }
            tracing::debug!(peer = %candidate, %mode, "discarding stale queue entry");
        }
        None
    }

    /// Remove `id` from every queue. Returns whether anything was removed.
    pub fn remove_all(&mut self, id: ConnId) -> bool {
        let mut removed = false;
        for queue in &mut self.queues {
            let before = queue.len();
            queue.retain(|queued| *queued != id);
            removed |= queue.len() != before;
        }
        removed
    }

    pub fn queued_mode(&self, id: ConnId) -> Option<Mode> {
        Mode::ALL
            .into_iter()
            .find(|mode| self.queues[mode.index()].contains(&id))
    }

    /// Number of times `id` appears across all queues
    pub fn occurrences(&self, id: ConnId) -> usize {
        self.queues
            .iter()
            .map(|queue| queue.iter().filter(|queued| **queued == id).count())
            .sum()
    }

    pub fn len(&self, mode: Mode) -> usize {
        self.queues[mode.index()].len()
    }
}
