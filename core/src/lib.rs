//! Session-aware client core for the registrar web API.
//!
//! # Overview
//! Builds `HttpRequest` values and classifies `HttpResponse` values
//! (host-does-IO pattern), tracking the `X-Session-Code` session the backend
//! issues and revokes through response headers. A blocking `ureq` transport
//! is included for hosts that do not bring their own.
//!
//! # Design
//! - `ApiClient` owns the session state explicitly; nothing is global.
//! - Each call is split into `begin` (produces request) and `finish`
//!   (consumes response), so the I/O boundary is explicit.
//! - Outcomes are `Result<Reply, ApiError>`; `into_pair` recovers the
//!   `(ok, payload)` form for callback-style callers.
//! - Login, logout and busy changes are published to `Observer`s.

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod http;
pub mod session;
pub mod transport;
pub mod types;

pub use client::{ApiClient, PendingCall};
pub use config::{ClientConfig, ConfigError};
pub use error::{ApiError, TransportError, CONNECTION_ERROR};
pub use events::{ApiEvent, Observer};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use session::{
    FileStorage, MemoryStorage, SessionChange, SessionState, Storage, SESSION_HEADER,
    SESSION_STORAGE_KEY,
};
pub use transport::{Transport, UreqTransport, MAX_BODY_BYTES};
pub use types::{into_pair, ApiResult, CallOptions, Reply, DEFAULT_OK_STATUS};
