//! HTTP long-polling handlers for the pairing server
//!
//! Each request first sweeps connections whose lease ran out, then is routed
//! to the state container. Responses never carry matchmaking errors: orphan
//! relays and redundant cancels are answered with `200 OK` like any other
//! accepted request.

use crate::error::{ClientRequestError, SignalingError};
use crate::protocol::{ClientRequest, ConnId, ServerEvent};
use crate::state::ServerState;
use chrono::{DateTime, Utc};
use tracing::debug;
use wstd::http::{Body, Request, Response};

const INFO_PAGE: &str = "Matchbox Pairing Server (Long-Polling)\n\
     \n\
     Endpoints:\n\
     - GET /health - Health check\n\
     - GET /stats - Connection and queue counters\n\
     - GET /poll?peer_id={id} - Join (without peer_id) or poll for events\n\
     - POST /send - Send a request (X-Peer-Id header required)\n\
     - POST /leave - Disconnect (X-Peer-Id header required)\n\
     \n\
     Requests (JSON body of POST /send):\n\
     {\"type\":\"find\",\"mode\":\"chat|voice|face\"}\n\
     {\"type\":\"cancel-find\"}\n\
     {\"type\":\"signal\",\"payload\":{...},\"session_id\":\"uuid\"}\n\
     {\"type\":\"chat\",\"text\":\"...\",\"session_id\":\"uuid\"}\n\
     {\"type\":\"hangup\"}\n\
     {\"type\":\"keep-alive\"}\n\
     \n\
     Response format of /poll: {\"peer_id\": \"uuid\", \"events\": [...]}\n";

/// Build a response with the CORS header every endpoint carries
fn respond(status: u16, content_type: Option<&str>, body: Body) -> Response<Body> {
    let mut builder = Response::builder()
        .status(status)
        .header("access-control-allow-origin", "*");
    if let Some(content_type) = content_type {
        builder = builder.header("content-type", content_type);
    }
    builder
        .body(body)
        .expect("status codes and header values are static")
}

fn text(status: u16, body: impl Into<String>) -> Response<Body> {
    respond(status, Some("text/plain"), Body::from(body.into()))
}

fn json(status: u16, value: &serde_json::Value) -> Response<Body> {
    respond(status, Some("application/json"), Body::from(value.to_string()))
}

/// Liveness answer; never touches matchmaking state
pub fn health_response() -> Response<Body> {
    text(200, "OK")
}

/// Answer given when the state snapshot cannot be loaded
pub fn service_unavailable() -> Response<Body> {
    text(503, "State unavailable, try again")
}

/// Get query parameter from URI
fn get_query_param<'a>(query: Option<&'a str>, key: &str) -> Option<&'a str> {
    query?.split('&').find_map(|pair| {
        let mut parts = pair.splitn(2, '=');
        let k = parts.next()?;
        let v = parts.next()?;
        if k == key { Some(v) } else { None }
    })
}

/// Parse the sender id from the X-Peer-Id header value
fn parse_peer_id(header: Option<&str>) -> Result<ConnId, ClientRequestError> {
    let header = header.ok_or(ClientRequestError::MissingPeerId)?;
    Ok(header.trim().parse()?)
}

fn parse_request(body: &str) -> Result<ClientRequest, ClientRequestError> {
    Ok(body.parse()?)
}

fn poll_body(peer_id: ConnId, events: &[ServerEvent]) -> serde_json::Value {
    serde_json::json!({
        "peer_id": peer_id.to_string(),
        "events": events,
    })
}

/// Join, or poll for pending events
fn handle_poll(
    peer_id: Option<ConnId>,
    state: &mut ServerState,
    now: DateTime<Utc>,
) -> Response<Body> {
    let (peer_id, events) = state.join_or_poll(peer_id, now);
    json(200, &poll_body(peer_id, &events))
}

/// Handle a POST /send request
async fn handle_send(
    request: Request<Body>,
    state: &mut ServerState,
    now: DateTime<Utc>,
) -> Response<Body> {
    let sender = request
        .headers()
        .get("x-peer-id")
        .and_then(|v| v.to_str().ok());
    let sender = match parse_peer_id(sender) {
        Ok(id) => id,
        Err(e) => return text(400, e.to_string()),
    };

    let mut body = request.into_body();
    let client_request = match body.str_contents().await {
        Ok(s) => parse_request(s),
        Err(e) => Err(ClientRequestError::Body(format!("{:?}", e))),
    };
    let client_request = match client_request {
        Ok(req) => req,
        Err(e) => {
            debug!(peer = %sender, error = %e, "rejecting request");
            return text(400, format!("Invalid request: {}", e));
        }
    };

    match state.handle(sender, client_request, now) {
        Ok(()) => text(200, "OK"),
        Err(SignalingError::UnknownPeer) => text(404, "Peer not found"),
        Err(e) => text(500, e.to_string()),
    }
}

/// Handle a POST /leave request
fn handle_leave(request: &Request<Body>, state: &mut ServerState) -> Response<Body> {
    let sender = request
        .headers()
        .get("x-peer-id")
        .and_then(|v| v.to_str().ok());
    match parse_peer_id(sender) {
        Ok(id) => {
            state.disconnect(id);
            text(200, "OK")
        }
        Err(e) => text(400, e.to_string()),
    }
}

/// Handle CORS preflight
fn handle_cors_preflight() -> Response<Body> {
    Response::builder()
        .status(204)
        .header("access-control-allow-origin", "*")
        .header("access-control-allow-methods", "GET, POST, OPTIONS")
        .header("access-control-allow-headers", "content-type, x-peer-id")
        .header("access-control-max-age", "86400")
        .body(Body::empty())
        .expect("status codes and header values are static")
}

/// Handle an HTTP request - main router
pub async fn handle_request(
    request: Request<Body>,
    state: &mut ServerState,
    now: DateTime<Utc>,
) -> Result<Response<Body>, wstd::http::Error> {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let path = uri.path();

    // CORS preflight
    if method == wstd::http::Method::OPTIONS {
        return Ok(handle_cors_preflight());
    }

    // Health check, answered without touching matchmaking state
    if path == "/health" {
        return Ok(health_response());
    }

    let swept = state.sweep(now);
    if swept > 0 {
        debug!(swept, "removed expired connections");
    }

    if method == wstd::http::Method::POST {
        return Ok(match path {
            "/send" => handle_send(request, state, now).await,
            "/leave" => handle_leave(&request, state),
            _ => text(404, "Not Found"),
        });
    }

    if method == wstd::http::Method::GET {
        return Ok(match path {
            "/poll" => {
                let peer_id = get_query_param(uri.query(), "peer_id")
                    .and_then(|s| s.parse::<ConnId>().ok());
                handle_poll(peer_id, state, now)
            }
            "/stats" => match serde_json::to_value(state.stats()) {
                Ok(stats) => json(200, &stats),
                Err(e) => text(500, e.to_string()),
            },
            "/" => text(200, INFO_PAGE),
            _ => text(404, "Not Found"),
        });
    }

    // Unknown endpoint
    Ok(text(404, "Not Found"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::protocol::Mode;
    use crate::state::ConnStatus;
    use chrono::TimeDelta;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use serde_json::Value;
    use uuid::Uuid;
    use wstd::runtime::block_on;

    fn state() -> ServerState {
        ServerState::with_rng(&Config::default(), StdRng::seed_from_u64(3))
    }

    fn request(method: &str, uri: &str, peer: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(peer) = peer {
            builder = builder.header("x-peer-id", peer);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    /// Route one request and return its status and body
    fn route(
        state: &mut ServerState,
        request: Request<Body>,
        now: DateTime<Utc>,
    ) -> (u16, String) {
        block_on(async {
            let response = handle_request(request, state, now).await.unwrap();
            let status = response.status().as_u16();
            let mut body = response.into_body();
            let body = body.str_contents().await.unwrap().to_string();
            (status, body)
        })
    }

    fn send(state: &mut ServerState, peer: ConnId, body: &str, now: DateTime<Utc>) -> u16 {
        let peer = peer.to_string();
        route(state, request("POST", "/send", Some(&peer), body), now).0
    }

    #[test]
    fn query_param_lookup() {
        let query = Some("a=1&peer_id=abc&b");
        assert_eq!(get_query_param(query, "peer_id"), Some("abc"));
        assert_eq!(get_query_param(query, "b"), None);
        assert_eq!(get_query_param(None, "peer_id"), None);
    }

    #[test]
    fn peer_header_must_be_a_uuid() {
        assert!(matches!(
            parse_peer_id(None),
            Err(ClientRequestError::MissingPeerId)
        ));
        assert!(matches!(
            parse_peer_id(Some("not-a-uuid")),
            Err(ClientRequestError::InvalidPeerId(_))
        ));
        let id = Uuid::from_u128(5);
        assert_eq!(parse_peer_id(Some(&id.to_string())).unwrap(), ConnId(id));
    }

    #[test]
    fn malformed_body_is_a_json_error() {
        assert!(matches!(
            parse_request("{\"type\":"),
            Err(ClientRequestError::Json(_))
        ));
    }

    #[test]
    fn poll_body_shape() {
        let id = ConnId(Uuid::from_u128(1));
        let body = poll_body(
            id,
            &[ServerEvent::Waiting {
                mode: Mode::Voice,
                queue_size: 1,
            }],
        );
        assert_eq!(
            body,
            serde_json::json!({
                "peer_id": id.to_string(),
                "events": [{"type": "waiting", "mode": "voice", "queue_size": 1}],
            })
        );
    }

    #[test]
    fn send_rejects_bad_headers_and_bodies() {
        let now = Utc::now();
        let mut state = state();
        let id = state.connect(now).to_string();
        let find = r#"{"type":"find","mode":"chat"}"#;

        let (status, _) = route(&mut state, request("POST", "/send", None, find), now);
        assert_eq!(status, 400);
        let (status, _) = route(
            &mut state,
            request("POST", "/send", Some("not-a-uuid"), find),
            now,
        );
        assert_eq!(status, 400);
        let (status, body) = route(
            &mut state,
            request("POST", "/send", Some(&id), r#"{"type":"teleport"}"#),
            now,
        );
        assert_eq!(status, 400);
        assert!(body.starts_with("Invalid request"));
        assert_eq!(state.stats().waiting.chat, 0);
    }

    #[test]
    fn send_from_unknown_peer_is_not_found() {
        let mut state = state();
        let stranger = ConnId(Uuid::from_u128(99));
        let status = send(&mut state, stranger, r#"{"type":"keep-alive"}"#, Utc::now());
        assert_eq!(status, 404);
    }

    #[test]
    fn send_find_queues_the_sender() {
        let now = Utc::now();
        let mut state = state();
        let id = state.connect(now);
        assert_eq!(send(&mut state, id, r#"{"type":"find","mode":"Voice"}"#, now), 200);
        assert_eq!(state.status(id), ConnStatus::Queued(Mode::Voice));
    }

    #[test]
    fn poll_without_id_joins() {
        let now = Utc::now();
        let mut state = state();
        let (status, body) = route(&mut state, request("GET", "/poll", None, ""), now);
        assert_eq!(status, 200);

        let body: Value = serde_json::from_str(&body).unwrap();
        let peer_id = body["peer_id"].as_str().unwrap();
        assert_eq!(
            body["events"],
            serde_json::json!([{"type": "id-assigned", "peer_id": peer_id}])
        );
        assert!(state.is_reachable(peer_id.parse().unwrap(), now));
    }

    #[test]
    fn leave_notifies_partner() {
        let now = Utc::now();
        let mut state = state();
        let a = state.connect(now);
        let b = state.connect(now);
        state.find(a, Mode::Chat, now);
        state.find(b, Mode::Chat, now);
        let session_id = match state.status(a) {
            ConnStatus::Paired { session_id, .. } => session_id,
            other => panic!("expected a pairing, got {other:?}"),
        };
        state.poll(b, now);

        let (status, _) = route(
            &mut state,
            request("POST", "/leave", Some(&a.to_string()), ""),
            now,
        );
        assert_eq!(status, 200);
        assert!(!state.is_reachable(a, now));
        assert_eq!(state.status(b), ConnStatus::Idle);
        assert_eq!(
            state.poll(b, now).unwrap(),
            vec![ServerEvent::PeerLeft {
                peer_id: a,
                session_id
            }]
        );

        let (status, _) = route(&mut state, request("POST", "/leave", None, ""), now);
        assert_eq!(status, 400);
    }

    #[test]
    fn stats_shape_and_sweep_before_routing() {
        let now = Utc::now();
        let mut state = state();
        let a = state.connect(now);
        state.find(a, Mode::Face, now);

        let (status, body) = route(&mut state, request("GET", "/stats", None, ""), now);
        assert_eq!(status, 200);
        assert_eq!(
            serde_json::from_str::<Value>(&body).unwrap(),
            serde_json::json!({"connections": 1, "paired": 0, "waiting": {"chat": 0, "voice": 0, "face": 1}})
        );

        let later = now + TimeDelta::seconds(60);
        let (_, body) = route(&mut state, request("GET", "/stats", None, ""), later);
        assert_eq!(
            serde_json::from_str::<Value>(&body).unwrap(),
            serde_json::json!({"connections": 0, "paired": 0, "waiting": {"chat": 0, "voice": 0, "face": 0}})
        );
    }

    #[test]
    fn health_does_not_sweep() {
        let now = Utc::now();
        let mut state = state();
        state.connect(now);

        let later = now + TimeDelta::seconds(60);
        let (status, body) = route(&mut state, request("GET", "/health", None, ""), later);
        assert_eq!((status, body.as_str()), (200, "OK"));
        assert_eq!(state.stats().connections, 1);
    }

    #[test]
    fn unknown_route_is_not_found() {
        let mut state = state();
        let (status, _) = route(&mut state, request("GET", "/nowhere", None, ""), Utc::now());
        assert_eq!(status, 404);
    }
}
