//! Error types for the registrar API client.
//!
//! # Design
//! Every failure a caller can see ends up as one `ApiError`. Each variant can
//! be flattened into the JSON payload the web UI expects on its failure
//! branch (`{"error": "..."}` or whatever JSON the server sent), so callers
//! that only want "show a banner" never need to match on the variant.

use serde_json::{json, Value};
use thiserror::Error;

/// Message delivered when no response could be obtained at all.
pub const CONNECTION_ERROR: &str = "Server connection error";

/// The round trip itself failed before a status line arrived (DNS, refused
/// connection, TLS).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("transport failure: {0}")]
pub struct TransportError(pub String);

/// Errors delivered on the failure branch of an API call.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No response was obtained.
    #[error("Server connection error")]
    Connection(#[from] TransportError),

    /// The server answered with an unexpected status and a JSON body.
    #[error("HTTP {status}: {reply}")]
    Rejected { status: u16, reply: Value },

    /// The server answered with an unexpected status and a body that is not JSON.
    #[error("HTTP {status}: {body}")]
    Malformed { status: u16, body: String },

    /// The status line and headers arrived but the body could not be read.
    #[error("HTTP {status}: body unreadable: {reason}")]
    Unreadable { status: u16, reason: String },

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl ApiError {
    /// HTTP status of the response, if one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Rejected { status, .. }
            | ApiError::Malformed { status, .. }
            | ApiError::Unreadable { status, .. } => Some(*status),
            ApiError::Connection(_) | ApiError::Serialization(_) => None,
        }
    }

    /// The payload for the failure branch of the `(ok, payload)` callback.
    pub fn reply(&self) -> Value {
        match self {
            ApiError::Connection(_) => json!({ "error": CONNECTION_ERROR }),
            ApiError::Rejected { reply, .. } => reply.clone(),
            ApiError::Malformed { body, .. } => json!({ "error": body }),
            ApiError::Unreadable { reason, .. } => json!({ "error": reason }),
            ApiError::Serialization(msg) => json!({ "error": msg }),
        }
    }

    /// The server's `error` string when there is one, else `default`.
    pub fn message_or<'a>(&'a self, default: &'a str) -> &'a str {
        match self {
            ApiError::Connection(_) => CONNECTION_ERROR,
            ApiError::Rejected { reply, .. } => reply
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or(default),
            ApiError::Malformed { body, .. } if !body.is_empty() => body,
            ApiError::Malformed { .. } => default,
            ApiError::Unreadable { reason, .. } => reason,
            ApiError::Serialization(msg) => msg,
        }
    }
}
