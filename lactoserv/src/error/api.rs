use displaydoc::Display;
use http::{Response, StatusCode};
use http_body_util::Full;
use hyper::body::Bytes;
use thiserror::Error;

use super::{PeerError, ResourceError};

/// Errors that can occur while dispatching a single request, aggregated so
/// `NetworkEndpoint::handle_request` has one type to match on at the
/// response-writing boundary. Rate-limit denial is deliberately not an
/// `Error` variant elsewhere in this tree (spec.md §7: "denial... not
/// logged as error") but is represented here because it still needs a
/// wire response.
#[derive(Debug, Error, Display)]
pub enum ApiError {
    /// {0}
    Peer(#[from] PeerError),
    /// {0}
    Resource(#[from] ResourceError),
    /// rate limit exceeded
    RateLimited,
    /// no host matches the requested server name
    HostNotFound,
    /// no application mount matches the requested path
    NotFound,
}

impl ApiError {
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Peer(PeerError::Malformed(_)) => StatusCode::BAD_REQUEST,
            Self::Peer(PeerError::Timeout) => StatusCode::REQUEST_TIMEOUT,
            Self::Peer(PeerError::Reset) => StatusCode::BAD_REQUEST,
            Self::Peer(PeerError::RangeNotSatisfiable(_)) => StatusCode::RANGE_NOT_SATISFIABLE,
            Self::Resource(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::HostNotFound | Self::NotFound => StatusCode::NOT_FOUND,
        }
    }

    /// Logs at the level spec.md §7 assigns to this error's kind, then
    /// renders the minimal response body the error maps to.
    #[must_use]
    pub fn into_http_response(self) -> Response<Full<Bytes>> {
        match &self {
            Self::Peer(error) => tracing::debug!(error = %error, "peer error"),
            Self::Resource(error) => tracing::error!(error = %error, "resource error"),
            Self::RateLimited => tracing::trace!("request denied by rate limiter"),
            Self::HostNotFound | Self::NotFound => {}
        }
        let status = self.status_code();
        let body = if matches!(self, Self::HostNotFound | Self::NotFound) {
            Bytes::new()
        } else {
            Bytes::from(self.to_string())
        };
        Response::builder()
            .status(status)
            .body(Full::new(body))
            .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
    }
}
