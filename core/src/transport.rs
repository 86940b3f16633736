//! Executes `HttpRequest`s.
//!
//! `ApiClient` never does I/O on its own; a `Transport` is the piece that
//! turns a request into a response. `UreqTransport` is the blocking default.
//! Hosts that bring their own HTTP stack (the FFI, a browser shim) skip this
//! module and drive `ApiClient::begin` / `ApiClient::finish` directly.

use tracing::{debug, warn};
use ureq::http::Response;
use ureq::typestate::{WithBody, WithoutBody};
use ureq::{Body, RequestBuilder};

use crate::error::TransportError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// One HTTP round trip.
pub trait Transport {
    /// Every status code is a response; only a missing response is an error.
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Blocking transport built on `ureq`.
#[derive(Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new() -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .new_agent();
        Self { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

/// Largest response body `UreqTransport` reads. ureq on its own stops at 10 MB.
pub const MAX_BODY_BYTES: u64 = 1 << 30;

impl Transport for UreqTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let url = request.path.as_str();

        let result = match request.method {
            HttpMethod::Get => send_without_body(self.agent.get(url), request),
            HttpMethod::Head => send_without_body(self.agent.head(url), request),
            HttpMethod::Delete => send_without_body(self.agent.delete(url), request),
            HttpMethod::Post => send_with_body(self.agent.post(url), request),
            HttpMethod::Put => send_with_body(self.agent.put(url), request),
            HttpMethod::Patch => send_with_body(self.agent.patch(url), request),
        };

        let mut response = result.map_err(|e| TransportError(e.to_string()))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        // Headers are in hand at this point, so a failed body read is still a
        // response: the caller gets the status and the session header.
        let (body, body_error) = match response
            .body_mut()
            .with_config()
            .limit(MAX_BODY_BYTES)
            .read_to_vec()
        {
            Ok(bytes) => (String::from_utf8_lossy(&bytes).into_owned(), None),
            Err(e) => {
                warn!(status, url, error = %e, "response body unreadable");
                (String::new(), Some(e.to_string()))
            }
        };

        debug!(status, url, "response received");
        Ok(HttpResponse {
            status,
            headers,
            body,
            body_error,
        })
    }
}

fn with_headers<B>(mut builder: RequestBuilder<B>, request: &HttpRequest) -> RequestBuilder<B> {
    for (key, value) in &request.headers {
        builder = builder.header(key.as_str(), value.as_str());
    }
    builder
}

/// GET, HEAD and DELETE carry no body in ureq unless asked to; a method
/// override on a JSON call still sends its payload.
fn send_without_body(
    builder: RequestBuilder<WithoutBody>,
    request: &HttpRequest,
) -> Result<Response<Body>, ureq::Error> {
    let builder = with_headers(builder, request);
    match request.body.as_deref() {
        Some(body) => builder.force_send_body().send(body.as_bytes()),
        None => builder.call(),
    }
}

fn send_with_body(
    builder: RequestBuilder<WithBody>,
    request: &HttpRequest,
) -> Result<Response<Body>, ureq::Error> {
    let builder = with_headers(builder, request);
    match request.body.as_deref() {
        Some(body) => builder.send(body.as_bytes()),
        None => builder.send_empty(),
    }
}
