//! WASI-compatible matchmaking and signaling relay using wstd
//!
//! Anonymous clients ask to be paired for a `chat`, `voice` or `face`
//! session. The server queues them per mode, pairs two waiting clients into a
//! session and relays opaque signaling payloads (SDP offers/answers, ICE
//! candidates) and chat lines between the two partners. Media never passes
//! through the server.
//!
//! # Protocol
//!
//! The transport is HTTP long-polling:
//!
//! - **GET /poll?peer_id={id}** - Join (without `peer_id`) or poll for events
//! - **POST /send** - Send a request (X-Peer-Id header required)
//! - **POST /leave** - Disconnect (X-Peer-Id header required)
//! - **GET /health** - Health check
//! - **GET /stats** - Connection and queue counters
//!
//! A connection that stops polling for longer than the configured timeout is
//! treated as disconnected.
//!
//! ## Requests (client → server)
//!
//! - `{"type":"find","mode":"chat"}` - Queue for a partner (unknown modes use the default)
//! - `{"type":"cancel-find"}` - Leave the queue, or the current session
//! - `{"type":"signal","payload":{...}}` - Relay a payload to the partner
//! - `{"type":"chat","text":"..."}` - Relay a chat line to the partner
//! - `{"type":"hangup"}` - End the current session
//! - `{"type":"keep-alive"}`
//!
//! `signal` and `chat` accept an optional `session_id`; messages for a
//! session that is no longer current are dropped.
//!
//! ## Events (server → client)
//!
//! - `{"type":"id-assigned","peer_id":..}`
//! - `{"type":"waiting","mode":..,"queue_size":..}`
//! - `{"type":"matched","session_id":..,"mode":..,"peer_id":..,"initiator":..}`
//! - `{"type":"signal","payload":{..,"from":..}}`
//! - `{"type":"chat","from":..,"text":..,"at":..}`
//! - `{"type":"peer-left","peer_id":..,"session_id":..}`
//!
//! # Example
//!
//! ```bash
//! wasmtime serve -S common --addr 127.0.0.1:3536 matchbox-pairing-wasm.wasm
//!
//! # Join (returns peer_id and initial events)
//! curl http://127.0.0.1:3536/poll
//!
//! # Look for a partner
//! curl -X POST -H "X-Peer-Id: <your-id>" -d '{"type":"find","mode":"face"}' \
//!   http://127.0.0.1:3536/send
//!
//! # Poll for events
//! curl "http://127.0.0.1:3536/poll?peer_id=<your-id>"
//! ```

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod handler;
mod lifecycle;
mod matchmaker;
pub mod pairing;
pub mod protocol;
pub mod queues;
pub mod registry;
mod relay;
pub mod snapshot;
pub mod state;

pub use config::Config;
pub use error::{ClientRequestError, SignalingError};
pub use handler::{handle_request, health_response, service_unavailable};
pub use protocol::{ClientRequest, ConnId, Mode, ServerEvent, SessionId};
pub use relay::tag_sender;
pub use snapshot::{SnapshotLock, StateSession};
pub use state::{ConnStatus, ServerState, Stats};
