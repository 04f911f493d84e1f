//! Server state management for the pairing server
//!
//! [`ServerState`] is the single owner of the connection registry, the mode
//! queues and the pairing table. Each event runs to completion against it
//! before the next one is handled, and queues and pairings change only through
//! the matchmaker ([`ServerState::find`]) and the lifecycle entry points
//! ([`ServerState::cancel_find`], [`ServerState::hangup`],
//! [`ServerState::disconnect`]).
//!
//! Persistence between WASI instances lives in [`crate::snapshot`].

use crate::config::Config;
use crate::error::SignalingError;
use crate::pairing::PairingTable;
use crate::protocol::{ClientRequest, ConnId, Mode, ServerEvent, SessionId};
use crate::queues::ModeQueues;
use crate::registry::Registry;
use chrono::{DateTime, TimeDelta, Utc};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

/// Runtime settings, taken from [`Config`] rather than from the snapshot
#[derive(Debug, Clone)]
struct Settings {
    default_mode: Mode,
    lease: TimeDelta,
}

impl Default for Settings {
    fn default() -> Self {
        Settings::from(&Config::default())
    }
}

impl From<&Config> for Settings {
    fn from(config: &Config) -> Self {
        Settings {
            default_mode: config.default_mode,
            lease: config.lease(),
        }
    }
}

fn entropy_rng() -> StdRng {
    StdRng::from_entropy()
}

/// Where a connection stands in the matchmaking state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnStatus {
    Idle,
    Queued(Mode),
    Paired { peer: ConnId, session_id: SessionId },
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WaitingStats {
    pub chat: usize,
    pub voice: usize,
    pub face: usize,
}

/// Operator-facing counters, served on `GET /stats`
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub connections: usize,
    /// Number of active pairs
    pub paired: usize,
    pub waiting: WaitingStats,
}

/// The single owner of all matchmaking state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerState {
    pub(crate) registry: Registry,
    pub(crate) queues: ModeQueues,
    pub(crate) pairings: PairingTable,
    #[serde(skip, default = "entropy_rng")]
    rng: StdRng,
    #[serde(skip)]
    settings: Settings,
}

impl ServerState {
    pub fn new(config: &Config) -> Self {
        Self::with_rng(config, entropy_rng())
    }

    /// Create a state whose connection ids, session ids and initiator picks
    /// all come from `rng`.
    pub fn with_rng(config: &Config, rng: StdRng) -> Self {
        Self {
            registry: Registry::default(),
            queues: ModeQueues::default(),
            pairings: PairingTable::default(),
            rng,
            settings: Settings::from(config),
        }
    }

    /// Replace the runtime settings, which are not part of the snapshot
    pub(crate) fn apply_config(&mut self, config: &Config) {
        self.settings = Settings::from(config);
    }

    /// Register a new connection. Its first pending event is `id-assigned`.
    pub fn connect(&mut self, now: DateTime<Utc>) -> ConnId {
        let id = ConnId(self.random_uuid());
        self.registry.connect(id, now, self.settings.lease);
        self.registry
            .emit(id, ServerEvent::IdAssigned { peer_id: id });
        info!(peer = %id, "connected");
        id
    }

    /// Renew the lease of `id` and take its pending events. `None` if the
    /// connection is unknown or its lease ran out.
    pub fn poll(&mut self, id: ConnId, now: DateTime<Utc>) -> Option<Vec<ServerEvent>> {
        if !self.registry.touch(id, now, self.settings.lease) {
            return None;
        }
        Some(self.registry.drain(id))
    }

    /// Poll as `peer_id`, or join as a new connection when `peer_id` is absent
    /// or no longer reachable.
    pub fn join_or_poll(
        &mut self,
        peer_id: Option<ConnId>,
        now: DateTime<Utc>,
    ) -> (ConnId, Vec<ServerEvent>) {
        if let Some(id) = peer_id {
            if let Some(events) = self.poll(id, now) {
                return (id, events);
            }
            debug!(peer = %id, "unknown peer polled, assigning a new id");
        }
        let id = self.connect(now);
        let events = self.registry.drain(id);
        (id, events)
    }

    /// Dispatch one client request. Fails only when the sender is not a live
    /// connection; everything else (orphan relays, redundant cancels) is
    /// absorbed.
    pub fn handle(
        &mut self,
        sender: ConnId,
        request: ClientRequest,
        now: DateTime<Utc>,
    ) -> Result<(), SignalingError> {
        if !self.registry.touch(sender, now, self.settings.lease) {
            return Err(SignalingError::UnknownPeer);
        }
        match request {
            ClientRequest::Find { mode } => {
                let mode = Mode::parse_or(mode.as_deref(), self.settings.default_mode);
                self.find(sender, mode, now);
            }
            ClientRequest::CancelFind => self.cancel_find(sender),
            ClientRequest::Signal {
                payload,
                session_id,
            } => {
                self.relay_signal(sender, payload, session_id);
            }
            ClientRequest::Chat { text, session_id } => {
                self.relay_chat(sender, text, session_id, now);
            }
            ClientRequest::Hangup => self.hangup(sender),
            ClientRequest::KeepAlive => {}
        }
        Ok(())
    }

    pub fn status(&self, id: ConnId) -> ConnStatus {
        if let Some(pairing) = self.pairings.get(id) {
            return ConnStatus::Paired {
                peer: pairing.peer,
                session_id: pairing.session_id,
            };
        }
        match self.queues.queued_mode(id) {
            Some(mode) => ConnStatus::Queued(mode),
            None => ConnStatus::Idle,
        }
    }

    pub fn partner_of(&self, id: ConnId) -> Option<ConnId> {
        self.pairings.partner_of(id)
    }

    /// How many times `id` sits in any mode queue
    pub fn queue_occurrences(&self, id: ConnId) -> usize {
        self.queues.occurrences(id)
    }

    pub fn is_reachable(&self, id: ConnId, now: DateTime<Utc>) -> bool {
        self.registry.is_reachable(id, now)
    }

    pub fn stats(&self) -> Stats {
        Stats {
            connections: self.registry.len(),
            paired: self.pairings.len(),
            waiting: WaitingStats {
                chat: self.queues.len(Mode::Chat),
                voice: self.queues.len(Mode::Voice),
                face: self.queues.len(Mode::Face),
            },
        }
    }

    pub(crate) fn new_session_id(&mut self) -> SessionId {
        SessionId(self.random_uuid())
    }

    /// Unbiased coin flip
    pub(crate) fn coin_flip(&mut self) -> bool {
        self.rng.gen_bool(0.5)
    }

    fn random_uuid(&mut self) -> Uuid {
        let mut bytes = [0u8; 16];
        self.rng.fill_bytes(&mut bytes);
        uuid::Builder::from_random_bytes(bytes).into_uuid()
    }
}
