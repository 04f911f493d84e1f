//! Forwarding of signaling and chat messages to the current partner

use crate::pairing::Pairing;
use crate::protocol::{ConnId, ServerEvent, SessionId};
use crate::state::ServerState;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::debug;

/// Tag a signaling payload with its sender. Objects get a `from` field
/// (replacing any the client supplied); anything else is wrapped as
/// `{"from": .., "data": ..}`.
pub fn tag_sender(payload: Value, from: ConnId) -> Value {
    let from = Value::String(from.to_string());
    match payload {
        Value::Object(mut fields) => {
            fields.insert("from".to_string(), from);
            Value::Object(fields)
        }
        data => {
            let mut fields = Map::new();
            fields.insert("from".to_string(), from);
            fields.insert("data".to_string(), data);
            Value::Object(fields)
        }
    }
}

impl ServerState {
    /// The pairing a message from `sender` belongs to. A message scoped to a
    /// session other than the current one is stale.
    fn relay_target(&self, sender: ConnId, scope: Option<SessionId>) -> Option<Pairing> {
        let pairing = *self.pairings.get(sender)?;
        match scope {
            Some(session_id) if session_id != pairing.session_id => None,
            _ => Some(pairing),
        }
    }

    /// Forward a signaling payload to the partner of `sender`. Returns false
    /// when the message was dropped.
    pub fn relay_signal(
        &mut self,
        sender: ConnId,
        payload: Value,
        scope: Option<SessionId>,
    ) -> bool {
        let Some(pairing) = self.relay_target(sender, scope) else {
            debug!(peer = %sender, "dropping signal from unpaired connection");
            return false;
        };
        self.registry.emit(
            pairing.peer,
            ServerEvent::Signal {
                payload: tag_sender(payload, sender),
            },
        )
    }

    /// Forward a chat line to the partner of `sender`. Returns false when the
    /// message was dropped.
    pub fn relay_chat(
        &mut self,
        sender: ConnId,
        text: String,
        scope: Option<SessionId>,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(pairing) = self.relay_target(sender, scope) else {
            debug!(peer = %sender, "dropping chat from unpaired connection");
            return false;
        };
        self.registry.emit(
            pairing.peer,
            ServerEvent::Chat {
                from: sender,
                text,
                at: now,
            },
        )
    }
}
