//! WASI HTTP server entry point for the long-polling pairing server
//!
//! `wasmtime serve` instantiates the component for every request, so each
//! request runs inside a locked [`StateSession`]: the snapshot is loaded,
//! the request handled, and the snapshot saved before the lock is released.

use chrono::Utc;
use matchbox_pairing_server::{
    Config, StateSession, handle_request, health_response, service_unavailable,
};
use tracing::error;
use tracing_subscriber::EnvFilter;
use wstd::http::{Body, Request, Response};

fn init_tracing() {
    // A reused instance has already installed the subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init();
}

/// The main HTTP handler for WASI
///
/// This function is called by the WASI runtime for each incoming HTTP request.
#[wstd::http_server]
async fn main(request: Request<Body>) -> Result<Response<Body>, wstd::http::Error> {
    // Health checks never take the lock or touch the snapshot
    if request.uri().path() == "/health" {
        return Ok(health_response());
    }

    init_tracing();
    let config = Config::from_env();
    let mut session = match StateSession::open(&config) {
        Ok(session) => session,
        Err(e) => {
            error!(
                path = %config.snapshot_path.display(),
                error = %e,
                "State snapshot unavailable"
            );
            return Ok(service_unavailable());
        }
    };

    let response = handle_request(request, session.state_mut(), Utc::now()).await;

    if let Err(e) = session.commit() {
        error!(
            path = %config.snapshot_path.display(),
            error = %e,
            "Failed to save state snapshot"
        );
    }
    response
}
