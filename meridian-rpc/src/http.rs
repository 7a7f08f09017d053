//! The HTTP frame around the method dispatcher: Basic authentication,
//! per-IP rate limiting, and the JSON-RPC 2.0 envelope.

use std::collections::{HashMap, VecDeque};
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use hyper::server::conn::AddrStream;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use serde_json::{json, Value};
use subtle::ConstantTimeEq;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::methods::dispatch;
use crate::{codes, RpcError, SharedState};

/// The rate-limit window.
const RATE_WINDOW: Duration = Duration::from_secs(60);

/// How long an IP that exceeds the limit is locked out.
const RATE_BAN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct RpcConfig {
    pub username: String,
    pub password: String,
    /// Requests allowed per IP per minute.
    pub rate_limit: u32,
}

impl Default for RpcConfig {
    fn default() -> Self {
        RpcConfig {
            username: "meridianrpc".to_owned(),
            password: String::new(),
            rate_limit: 60,
        }
    }
}

#[derive(Default)]
struct RateLimiter {
    requests: HashMap<IpAddr, VecDeque<Instant>>,
    banned: HashMap<IpAddr, Instant>,
}

impl RateLimiter {
    /// Record one request; `false` means the caller is over the limit and
    /// now banned for the lockout period.
    fn allow(&mut self, ip: IpAddr, limit: u32) -> bool {
        let now = Instant::now();

        if let Some(&until) = self.banned.get(&ip) {
            if now < until {
                return false;
            }
            self.banned.remove(&ip);
        }

        let window = self.requests.entry(ip).or_default();
        while window
            .front()
            .map_or(false, |&at| now.duration_since(at) > RATE_WINDOW)
        {
            window.pop_front();
        }
        window.push_back(now);

        if window.len() > limit as usize {
            warn!(%ip, "rpc rate limit exceeded, banning");
            self.banned.insert(ip, now + RATE_BAN);
            window.clear();
            false
        } else {
            true
        }
    }
}

struct HttpState {
    shared: Arc<SharedState>,
    /// The full expected `Authorization` header value.
    expected_auth: Vec<u8>,
    limiter: Mutex<RateLimiter>,
    rate_limit: u32,
}

/// Serve the RPC interface on `addr` until the shutdown flag flips.
pub async fn serve(
    addr: SocketAddr,
    config: RpcConfig,
    shared: Arc<SharedState>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), hyper::Error> {
    let expected_auth = format!(
        "Basic {}",
        base64::encode(format!("{}:{}", config.username, config.password))
    )
    .into_bytes();

    let state = Arc::new(HttpState {
        shared,
        expected_auth,
        limiter: Mutex::new(RateLimiter::default()),
        rate_limit: config.rate_limit,
    });

    let make_svc = make_service_fn(move |conn: &AddrStream| {
        let state = state.clone();
        let remote = conn.remote_addr();
        async move {
            Ok::<_, Infallible>(service_fn(move |request| {
                handle(state.clone(), remote, request)
            }))
        }
    });

    info!(%addr, "rpc server listening");
    Server::bind(&addr)
        .serve(make_svc)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await
}

async fn handle(
    state: Arc<HttpState>,
    remote: SocketAddr,
    request: Request<Body>,
) -> Result<Response<Body>, Infallible> {
    // Rate limit before anything else, so abusive callers cost nothing.
    let allowed = state
        .limiter
        .lock()
        .expect("limiter lock poisoned")
        .allow(remote.ip(), state.rate_limit);
    if !allowed {
        return Ok(plain_response(StatusCode::TOO_MANY_REQUESTS, "rate limited"));
    }

    if !authorized(&state, &request) {
        return Ok(plain_response(StatusCode::UNAUTHORIZED, "unauthorized"));
    }

    if request.method() != Method::POST {
        return Ok(plain_response(
            StatusCode::METHOD_NOT_ALLOWED,
            "JSONRPC server handles only POST requests",
        ));
    }

    let body = match hyper::body::to_bytes(request.into_body()).await {
        Ok(body) => body,
        Err(_) => return Ok(plain_response(StatusCode::BAD_REQUEST, "unreadable body")),
    };

    let response_body = rpc_response(&state.shared, &body);
    Ok(Response::builder()
        .header("content-type", "application/json")
        .body(Body::from(response_body.to_string()))
        .expect("static response builds"))
}

/// Compare the `Authorization` header against the expected credentials in
/// constant time. Length is not secret; contents are.
fn authorized(state: &HttpState, request: &Request<Body>) -> bool {
    let header = match request.headers().get(hyper::header::AUTHORIZATION) {
        Some(header) => header.as_bytes(),
        None => return false,
    };
    if header.len() != state.expected_auth.len() {
        return false;
    }
    header.ct_eq(&state.expected_auth).into()
}

fn rpc_response(shared: &SharedState, body: &[u8]) -> Value {
    let request: Value = match serde_json::from_slice(body) {
        Ok(request) => request,
        Err(_) => {
            return error_envelope(
                Value::Null,
                &RpcError::new(codes::PARSE_ERROR, "parse error"),
            )
        }
    };

    let id = request.get("id").cloned().unwrap_or(Value::Null);
    let method = match request.get("method").and_then(Value::as_str) {
        Some(method) => method,
        None => {
            return error_envelope(
                id,
                &RpcError::new(codes::INVALID_REQUEST, "missing method"),
            )
        }
    };
    let empty_params = Vec::new();
    let params = request
        .get("params")
        .and_then(Value::as_array)
        .unwrap_or(&empty_params);

    debug!(method, "rpc call");
    match dispatch(shared, method, params) {
        Ok(result) => json!({ "result": result, "error": Value::Null, "id": id }),
        Err(error) => error_envelope(id, &error),
    }
}

fn error_envelope(id: Value, error: &RpcError) -> Value {
    json!({ "result": Value::Null, "error": error.to_value(), "id": id })
}

fn plain_response(status: StatusCode, message: &'static str) -> Response<Body> {
    Response::builder()
        .status(status)
        .body(Body::from(message))
        .expect("static response builds")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limiter_bans_over_the_threshold() {
        meridian_test::init();

        let mut limiter = RateLimiter::default();
        let ip: IpAddr = "203.0.113.6".parse().unwrap();

        for _ in 0..10 {
            assert!(limiter.allow(ip, 10));
        }
        // The eleventh request in the window trips the ban.
        assert!(!limiter.allow(ip, 10));
        assert!(!limiter.allow(ip, 10));

        // Another IP is unaffected.
        let other: IpAddr = "203.0.113.7".parse().unwrap();
        assert!(limiter.allow(other, 10));
    }
}
