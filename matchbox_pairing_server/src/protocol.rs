//! Wire types exchanged between clients and the pairing server

use crate::error::UnknownMode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, de};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Opaque identifier of a connected client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnId(pub Uuid);

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ConnId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(ConnId)
    }
}

/// Identifier of one pairing instance, shared by both sides
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Session category; every mode has its own waiting queue
///
/// Deserializes through [`FromStr`], so config files and snapshots accept the
/// same case-insensitive names and aliases as client requests.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Chat,
    Voice,
    Face,
}

impl Mode {
    pub const ALL: [Mode; 3] = [Mode::Chat, Mode::Voice, Mode::Face];

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Chat => "chat",
            Mode::Voice => "voice",
            Mode::Face => "face",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Mode::Chat => 0,
            Mode::Voice => 1,
            Mode::Face => 2,
        }
    }

    /// Parse a client-supplied mode, falling back to `default` when it is
    /// missing or not recognized.
    pub fn parse_or(requested: Option<&str>, default: Mode) -> Mode {
        match requested.map(str::parse::<Mode>) {
            Some(Ok(mode)) => mode,
            Some(Err(err)) => {
                tracing::debug!(%err, fallback = default.as_str(), "normalizing mode");
                default
            }
            None => default,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chat" | "text" => Ok(Mode::Chat),
            "voice" | "call" | "audio" => Ok(Mode::Voice),
            "face" | "video" => Ok(Mode::Face),
            _ => Err(UnknownMode(s.to_string())),
        }
    }
}

impl<'de> Deserialize<'de> for Mode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(de::Error::custom)
    }
}

/// Requests sent by a client (POST /send)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientRequest {
    /// Look for a partner; the mode is normalized server-side
    Find {
        #[serde(default)]
        mode: Option<String>,
    },
    CancelFind,
    /// Opaque signaling payload (SDP offer/answer, ICE candidate, ...)
    Signal {
        payload: Value,
        #[serde(default)]
        session_id: Option<SessionId>,
    },
    Chat {
        text: String,
        #[serde(default)]
        session_id: Option<SessionId>,
    },
    Hangup,
    KeepAlive,
}

impl FromStr for ClientRequest {
    type Err = serde_json::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_str(s)
    }
}

/// Events delivered to a client on its next poll
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerEvent {
    IdAssigned {
        peer_id: ConnId,
    },
    Waiting {
        mode: Mode,
        queue_size: usize,
    },
    Matched {
        session_id: SessionId,
        mode: Mode,
        peer_id: ConnId,
        initiator: bool,
    },
    /// Relayed signaling payload, tagged with its sender under `from`
    Signal {
        payload: Value,
    },
    Chat {
        from: ConnId,
        text: String,
        at: DateTime<Utc>,
    },
    PeerLeft {
        peer_id: ConnId,
        session_id: SessionId,
    },
}
