//! Error types for the pairing server

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while serving a connection
#[derive(Error, Debug)]
pub enum SignalingError {
    /// The connection is not registered, or its lease has expired
    #[error("Unknown peer")]
    UnknownPeer,

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Failed to read or write the state snapshot
    #[error("Snapshot error: {0}")]
    Snapshot(#[from] std::io::Error),

    /// The snapshot exists but does not parse; it is left untouched
    #[error("Corrupt snapshot: {0}")]
    CorruptSnapshot(#[source] serde_json::Error),

    /// Another instance held the snapshot lock for too long
    #[error("Timed out waiting for snapshot lock {}", .0.display())]
    LockTimeout(PathBuf),
}

/// Errors from client requests
#[derive(Error, Debug)]
pub enum ClientRequestError {
    /// The X-Peer-Id header is absent
    #[error("Missing X-Peer-Id header")]
    MissingPeerId,

    /// The X-Peer-Id header is not a valid id
    #[error("Invalid X-Peer-Id header: {0}")]
    InvalidPeerId(#[from] uuid::Error),

    /// The request body could not be read
    #[error("Failed to read body: {0}")]
    Body(String),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A mode string that names no known mode
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown mode: {0:?}")]
pub struct UnknownMode(pub String);
