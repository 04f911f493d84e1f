//! Snapshot persistence of the state container between WASI instances
//!
//! `wasmtime serve` creates a fresh instance for every request, so the state
//! is read from a JSON snapshot before each request and written back after
//! it. Overlapping requests run in separate instances; a lock file next to the
//! snapshot serializes their load → handle → save cycles, and a snapshot is
//! replaced by renaming a fully written temporary file over it, so a reader
//! never sees a partial write.

use crate::config::Config;
use crate::error::SignalingError;
use crate::state::ServerState;
use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// A lock older than this belongs to an instance that died mid-request
const LOCK_STALE_AFTER: Duration = Duration::from_secs(10);
const LOCK_BACKOFF_START: Duration = Duration::from_millis(2);
const LOCK_BACKOFF_MAX: Duration = Duration::from_millis(50);

/// `<snapshot file name>.<suffix>` in the snapshot's directory
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("snapshot"));
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

fn lock_is_stale(path: &Path) -> bool {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|modified| modified.elapsed().ok())
        .is_some_and(|age| age > LOCK_STALE_AFTER)
}

/// Exclusive lock file guarding one snapshot; released on drop
#[derive(Debug)]
pub struct SnapshotLock {
    path: PathBuf,
}

impl SnapshotLock {
    /// Create the lock file for `snapshot_path`, retrying with backoff while
    /// another instance holds it.
    pub fn acquire(snapshot_path: &Path, timeout: Duration) -> Result<Self, SignalingError> {
        let path = sibling(snapshot_path, "lock");
        let started = Instant::now();
        let mut backoff = LOCK_BACKOFF_START;
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => return Ok(SnapshotLock { path }),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if lock_is_stale(&path) {
                        warn!(path = %path.display(), "Breaking stale snapshot lock");
                        let _ = fs::remove_file(&path);
                        continue;
                    }
                    if started.elapsed() >= timeout {
                        return Err(SignalingError::LockTimeout(path));
                    }
                    std::thread::sleep(backoff);
                    backoff = (backoff * 2).min(LOCK_BACKOFF_MAX);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Drop for SnapshotLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to release snapshot lock");
        }
    }
}

impl ServerState {
    /// Restore the snapshot named in `config`, or start empty when there is
    /// none. A snapshot that exists but does not parse is an error, so the
    /// caller never overwrites it with empty state.
    pub fn load(config: &Config) -> Result<Self, SignalingError> {
        let contents = match fs::read_to_string(&config.snapshot_path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::new(config)),
            Err(e) => return Err(e.into()),
        };
        let mut state: ServerState =
            serde_json::from_str(&contents).map_err(SignalingError::CorruptSnapshot)?;
        state.apply_config(config);
        Ok(state)
    }

    /// Atomically replace the snapshot named in `config`
    pub fn save(&self, config: &Config) -> Result<(), SignalingError> {
        let json = serde_json::to_string(self)?;
        let tmp = sibling(&config.snapshot_path, "tmp");
        fs::write(&tmp, json)?;
        if let Err(e) = fs::rename(&tmp, &config.snapshot_path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }
}

/// One locked load → handle → save cycle.
///
/// Dropping a session without [`StateSession::commit`] releases the lock and
/// leaves the snapshot as it was.
#[derive(Debug)]
pub struct StateSession {
    state: ServerState,
    config: Config,
    // declared last so it is released after everything else
    _lock: SnapshotLock,
}

impl StateSession {
    pub fn open(config: &Config) -> Result<Self, SignalingError> {
        let lock = SnapshotLock::acquire(&config.snapshot_path, config.lock_timeout())?;
        let state = ServerState::load(config)?;
        debug!(path = %config.snapshot_path.display(), "snapshot loaded");
        Ok(StateSession {
            state,
            config: config.clone(),
            _lock: lock,
        })
    }

    pub fn state(&self) -> &ServerState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ServerState {
        &mut self.state
    }

    /// Save the state, then release the lock
    pub fn commit(self) -> Result<(), SignalingError> {
        self.state.save(&self.config)
    }
}
