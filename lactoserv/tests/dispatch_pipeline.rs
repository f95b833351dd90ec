//! End-to-end dispatch-pipeline tests: a real `NetworkEndpoint`, bound to
//! a real (ephemeral) TCP port, driven over the wire with hand-framed
//! HTTP/1.1 requests. `hyper::body::Incoming` — what `RequestSink::handle`
//! receives — can only be produced by a live connection, so there's no
//! in-process `tower::Service`-style shortcut here; a real socket is the
//! harness.
//!
//! `StaticFixture` stands in for "the static file server" (an external
//! collaborator, out of scope on its own) just far enough to exercise the
//! conditional-GET and range logic that the dispatch pipeline actually
//! owns.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use http_body_util::Full;
use hyper::body::Bytes;
use lactoserv::application::{Application, ApplicationManager, DispatchInfo, Response};
use lactoserv::component::{Component, Context, RootControlContext};
use lactoserv::config::{
    EndpointConfig, EndpointServicesConfig, Listen, MountConfig, Protocol, RateLimitTimeUnit, RateLimiterConfig,
};
use lactoserv::endpoint::NetworkEndpoint;
use lactoserv::http::{is_content_fresh, is_range_applicable, Request};
use lactoserv::rate_limit::RateLimitService;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const BODY: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789\n";
const ETAG: &str = "\"fixture-etag-1\"";
const LAST_MODIFIED: &str = "Wed, 21 Oct 2015 07:28:00 GMT";

/// Serves `BODY` at `/`, a directory-style `308` redirect at `/subdir`,
/// and otherwise falls through (`None`) so the endpoint answers `404`.
struct StaticFixture;

impl Application for StaticFixture {
    fn name(&self) -> &str {
        "static"
    }

    fn handle_request<'a>(&'a self, request: &'a Request, _dispatch: &'a DispatchInfo) -> BoxFuture<'a, Option<Response>> {
        Box::pin(async move {
            let path = request.pseudo().path.as_str();
            if path == "/subdir" {
                return Some(
                    hyper::Response::builder()
                        .status(308)
                        .header(http::header::LOCATION, "subdir/")
                        .header(http::header::CONTENT_TYPE, "text/plain; charset=utf-8")
                        .body(Full::new(Bytes::from_static(b"subdir/\n")))
                        .unwrap(),
                );
            }
            if path != "/" {
                return None;
            }

            let mut resp_headers = http::HeaderMap::new();
            resp_headers.insert(http::header::ETAG, ETAG.parse().unwrap());
            resp_headers.insert(http::header::LAST_MODIFIED, LAST_MODIFIED.parse().unwrap());

            if is_content_fresh(request.method(), request.headers(), &resp_headers, None) {
                return Some(hyper::Response::builder().status(304).header(http::header::ETAG, ETAG).body(Full::new(Bytes::new())).unwrap());
            }

            if let Some(range) = request.headers().get(http::header::RANGE).and_then(|v| v.to_str().ok()) {
                return Some(serve_range(request, &resp_headers, range));
            }

            Some(
                hyper::Response::builder()
                    .status(200)
                    .header(http::header::CONTENT_TYPE, "text/html; charset=utf-8")
                    .header(http::header::CONTENT_LENGTH, BODY.len())
                    .header(http::header::ETAG, ETAG)
                    .header(http::header::LAST_MODIFIED, LAST_MODIFIED)
                    .body(Full::new(Bytes::from_static(BODY)))
                    .unwrap(),
            )
        })
    }
}

fn serve_range(request: &Request, resp_headers: &http::HeaderMap, range: &str) -> Response {
    if !is_range_applicable(request.method(), request.headers(), resp_headers, None) {
        return hyper::Response::builder()
            .status(200)
            .header(http::header::CONTENT_LENGTH, BODY.len())
            .body(Full::new(Bytes::from_static(BODY)))
            .unwrap();
    }

    let parsed = range.strip_prefix("bytes=").and_then(|spec| spec.split_once('-'));
    let bounds = parsed.and_then(|(s, e)| Some((s.parse::<usize>().ok()?, e.parse::<usize>().ok()?)));
    let Some((start, end)) = bounds else {
        return not_satisfiable();
    };
    if start > end || end >= BODY.len() {
        return not_satisfiable();
    }

    let slice = &BODY[start..=end];
    hyper::Response::builder()
        .status(206)
        .header(http::header::CONTENT_RANGE, format!("bytes {start}-{end}/{}", BODY.len()))
        .header(http::header::CONTENT_LENGTH, slice.len())
        .body(Full::new(Bytes::copy_from_slice(slice)))
        .unwrap()
}

fn not_satisfiable() -> Response {
    hyper::Response::builder()
        .status(416)
        .header(http::header::CONTENT_RANGE, format!("bytes */{}", BODY.len()))
        .body(Full::new(Bytes::new()))
        .unwrap()
}

fn mount(hostname: &str, path: &str) -> MountConfig {
    MountConfig { hostname: hostname.into(), path: path.into(), application: "static".into() }
}

async fn build_endpoint(mounts: Vec<MountConfig>, connection_rate_limiter: Option<Arc<RateLimitService>>) -> Arc<NetworkEndpoint> {
    let mut apps = ApplicationManager::new();
    apps.register(Arc::new(StaticFixture));
    let applications = Arc::new(apps);

    let config = EndpointConfig {
        name: "test".into(),
        listen: Listen::Address { interface: "127.0.0.1".into(), port: 0 },
        protocol: Protocol::Http,
        hostnames: vec![],
        mounts,
        services: EndpointServicesConfig::default(),
    };

    let endpoint =
        Arc::new(NetworkEndpoint::new(config, applications, None, None, connection_rate_limiter, None, Duration::from_millis(250)));
    let ctx = Context::root(RootControlContext::new());
    endpoint.init(ctx, false).await.unwrap();
    endpoint.start(false).await.unwrap();
    endpoint
}

/// Raw HTTP/1.1 response: status code, headers, body. `Connection: close`
/// on every request below means the server closes the socket once the
/// response is written, so reading to EOF captures the whole thing.
struct RawResponse {
    status: u16,
    headers: http::HeaderMap,
    body: Vec<u8>,
}

impl RawResponse {
    fn header(&self, name: http::HeaderName) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }
}

fn parse_response(buf: &[u8]) -> RawResponse {
    let split_at = buf.windows(4).position(|w| w == b"\r\n\r\n").expect("response is missing a header terminator");
    let head = std::str::from_utf8(&buf[..split_at]).unwrap();
    let body = buf[split_at + 4..].to_vec();

    let mut lines = head.split("\r\n");
    let status_line = lines.next().unwrap();
    let status: u16 = status_line.split_whitespace().nth(1).unwrap().parse().unwrap();

    let mut headers = http::HeaderMap::new();
    for line in lines {
        let Some((name, value)) = line.split_once(':') else { continue };
        let (Ok(name), Ok(value)) = (http::HeaderName::from_bytes(name.trim().as_bytes()), http::HeaderValue::from_str(value.trim()))
        else {
            continue;
        };
        headers.append(name, value);
    }

    RawResponse { status, headers, body }
}

async fn send(addr: std::net::SocketAddr, method: &str, path: &str, extra_headers: &[(&str, &str)]) -> RawResponse {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let mut raw = format!("{method} {path} HTTP/1.1\r\nHost: example.com\r\nConnection: close\r\n");
    for (name, value) in extra_headers {
        raw.push_str(&format!("{name}: {value}\r\n"));
    }
    raw.push_str("\r\n");
    stream.write_all(raw.as_bytes()).await.unwrap();

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await.unwrap();
    parse_response(&buf)
}

#[tokio::test]
async fn serves_a_fresh_response_with_conditional_metadata() {
    let endpoint = build_endpoint(vec![mount("*", "/")], None).await;
    let response = send(endpoint.local_addr().unwrap(), "GET", "/", &[]).await;

    assert_eq!(response.status, 200);
    assert_eq!(response.header(http::header::CONTENT_LENGTH), Some(BODY.len().to_string()).as_deref());
    assert_eq!(response.header(http::header::ETAG), Some(ETAG));
    assert_eq!(response.body, BODY);
}

#[tokio::test]
async fn matching_if_none_match_yields_304_with_no_body() {
    let endpoint = build_endpoint(vec![mount("*", "/")], None).await;
    let response = send(endpoint.local_addr().unwrap(), "GET", "/", &[("If-None-Match", ETAG)]).await;

    assert_eq!(response.status, 304);
    assert!(response.body.is_empty());
}

#[tokio::test]
async fn directory_mismatch_yields_308_redirect() {
    let endpoint = build_endpoint(vec![mount("*", "/")], None).await;
    let response = send(endpoint.local_addr().unwrap(), "GET", "/subdir", &[]).await;

    assert_eq!(response.status, 308);
    assert_eq!(response.header(http::header::LOCATION), Some("subdir/"));
    assert_eq!(response.body, b"subdir/\n");
}

#[tokio::test]
async fn satisfiable_range_yields_206_with_the_requested_slice() {
    let endpoint = build_endpoint(vec![mount("*", "/")], None).await;
    let response = send(endpoint.local_addr().unwrap(), "GET", "/", &[("Range", "bytes=5-27")]).await;

    assert_eq!(response.status, 206);
    assert_eq!(response.header(http::header::CONTENT_RANGE), Some(format!("bytes 5-27/{}", BODY.len())).as_deref());
    assert_eq!(response.body, &BODY[5..=27]);
}

#[tokio::test]
async fn range_with_mismatched_if_range_falls_back_to_a_full_200() {
    let endpoint = build_endpoint(vec![mount("*", "/")], None).await;
    let response = send(
        endpoint.local_addr().unwrap(),
        "GET",
        "/",
        &[("Range", "bytes=5-27"), ("If-Range", "\"stale-etag\"")],
    )
    .await;

    assert_eq!(response.status, 200);
    assert_eq!(response.body, BODY);
}

#[tokio::test]
async fn unsatisfiable_range_yields_416() {
    let endpoint = build_endpoint(vec![mount("*", "/")], None).await;
    let response = send(endpoint.local_addr().unwrap(), "GET", "/", &[("Range", "florp=10-100")]).await;

    assert_eq!(response.status, 416);
    assert_eq!(response.header(http::header::CONTENT_RANGE), Some(format!("bytes */{}", BODY.len())).as_deref());
    assert!(response.body.is_empty());
}

#[tokio::test]
async fn unmounted_path_falls_through_to_404() {
    let endpoint = build_endpoint(vec![mount("*", "/")], None).await;
    let response = send(endpoint.local_addr().unwrap(), "GET", "/nowhere", &[]).await;

    assert_eq!(response.status, 404);
}

#[tokio::test]
async fn connection_rate_limiter_closes_connections_past_the_burst() {
    let limiter_config =
        RateLimiterConfig { flow_rate: 1.0, max_burst: 1.0, max_queue: 0.0, max_queue_grant: None, time_unit: RateLimitTimeUnit::Second };
    let limiter = Arc::new(RateLimitService::new("connectionRateLimiter", limiter_config));
    limiter.init(Context::root(RootControlContext::new()), false).await.unwrap();
    limiter.start(false).await.unwrap();

    let endpoint = build_endpoint(vec![mount("*", "/")], Some(limiter)).await;
    let addr = endpoint.local_addr().unwrap();

    // First connection consumes the only burst token and is served normally.
    let response = send(addr, "GET", "/", &[]).await;
    assert_eq!(response.status, 200);

    // Second connection, opened immediately after, is accepted at the TCP
    // layer (the kernel already completed the handshake) but the wrangler
    // drops it without writing a byte once the limiter denies it.
    let mut denied = TcpStream::connect(addr).await.unwrap();
    let mut buf = Vec::new();
    denied.read_to_end(&mut buf).await.unwrap();
    assert!(buf.is_empty());
}
