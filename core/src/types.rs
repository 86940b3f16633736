//! Call descriptors and call outcomes.
//!
//! # Design
//! `CallOptions` keeps the field names browser callers already send
//! (`json`, `method`, `okResp`, `noData`) so a descriptor can arrive as JSON
//! over the FFI unchanged. Outcomes are a tagged `Result`; `into_pair` turns
//! one back into the `(ok, payload)` shape for callers that want it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;
use crate::http::HttpMethod;

/// Status treated as success when the descriptor does not say otherwise.
pub const DEFAULT_OK_STATUS: u16 = 200;

/// Caller-supplied options for one API call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallOptions {
    /// Body to send as JSON. Its presence switches the default method to POST.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<Value>,

    /// Explicit method; wins over the JSON-implied POST.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<HttpMethod>,

    /// Status that counts as success.
    #[serde(default, rename = "okResp", skip_serializing_if = "Option::is_none")]
    pub ok_resp: Option<u16>,

    /// Success carries no content; the body is not read.
    #[serde(default, rename = "noData")]
    pub no_data: bool,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: attach a JSON body.
    pub fn json(mut self, body: impl Into<Value>) -> Self {
        self.json = Some(body.into());
        self
    }

    /// Builder: override the HTTP method.
    pub fn method(mut self, method: HttpMethod) -> Self {
        self.method = Some(method);
        self
    }

    /// Builder: set the status that counts as success.
    pub fn ok_resp(mut self, status: u16) -> Self {
        self.ok_resp = Some(status);
        self
    }

    /// Builder: expect no content on success.
    pub fn no_data(mut self) -> Self {
        self.no_data = true;
        self
    }

    pub fn expected_status(&self) -> u16 {
        self.ok_resp.unwrap_or(DEFAULT_OK_STATUS)
    }

    pub fn resolved_method(&self) -> HttpMethod {
        match (self.method, &self.json) {
            (Some(method), _) => method,
            (None, Some(_)) => HttpMethod::Post,
            (None, None) => HttpMethod::Get,
        }
    }
}

/// Payload of a successful call.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// The body parsed as JSON.
    Json(Value),
    /// The body was not JSON and is passed through untouched.
    Text(String),
    /// `noData` was requested; the body was never read.
    Done,
}

impl Reply {
    pub fn into_value(self) -> Value {
        match self {
            Reply::Json(value) => value,
            Reply::Text(text) => Value::String(text),
            Reply::Done => Value::Bool(true),
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Reply::Json(value) => Some(value),
            _ => None,
        }
    }
}

/// Outcome of one API call.
pub type ApiResult = Result<Reply, ApiError>;

/// Flatten an outcome into the `(ok, payload)` pair.
pub fn into_pair(result: ApiResult) -> (bool, Value) {
    match result {
        Ok(reply) => (true, reply.into_value()),
        Err(err) => (false, err.reply()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn method_defaults_to_get() {
        assert_eq!(CallOptions::new().resolved_method(), HttpMethod::Get);
    }

    #[test]
    fn json_body_implies_post() {
        let opts = CallOptions::new().json(json!({ "a": 1 }));
        assert_eq!(opts.resolved_method(), HttpMethod::Post);
    }

    #[test]
    fn explicit_method_wins_over_json() {
        let opts = CallOptions::new()
            .json(json!({ "a": 1 }))
            .method(HttpMethod::Put);
        assert_eq!(opts.resolved_method(), HttpMethod::Put);
    }

    #[test]
    fn expected_status_defaults_to_200() {
        assert_eq!(CallOptions::new().expected_status(), 200);
        assert_eq!(CallOptions::new().ok_resp(201).expected_status(), 201);
    }

    #[test]
    fn options_deserialize_from_browser_names() {
        let opts: CallOptions = serde_json::from_str(
            r#"{"json":{"email":"a@b.c"},"method":"PUT","okResp":204,"noData":true}"#,
        )
        .unwrap();
        assert_eq!(opts.json, Some(json!({ "email": "a@b.c" })));
        assert_eq!(opts.method, Some(HttpMethod::Put));
        assert_eq!(opts.ok_resp, Some(204));
        assert!(opts.no_data);
    }

    #[test]
    fn empty_options_object_is_all_defaults() {
        let opts: CallOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(opts, CallOptions::default());
    }

    #[test]
    fn done_flattens_to_true() {
        assert_eq!(into_pair(Ok(Reply::Done)), (true, json!(true)));
        assert_eq!(
            into_pair(Ok(Reply::Text("plain".to_string()))),
            (true, json!("plain"))
        );
    }
}
