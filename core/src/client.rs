//! Session-aware request builder and response classifier for the registrar API.
//!
//! # Design
//! Each call is split into `begin`, which produces an `HttpRequest` with the
//! session attached, and `finish`, which consumes the `HttpResponse` (or the
//! transport failure), updates the session and classifies the outcome. The
//! round trip in between belongs to the caller, either through a `Transport`
//! (`execute` / `call`) or by hand.
//!
//! Overlapping calls are independent `PendingCall` values. The client keeps
//! only a count of them to drive the busy indicator; there is no queueing,
//! ordering or de-duplication.

use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::{ApiError, TransportError};
use crate::events::{ApiEvent, Observer};
use crate::http::{HttpRequest, HttpResponse};
use crate::session::{FileStorage, MemoryStorage, SessionChange, SessionState, Storage, SESSION_HEADER};
use crate::transport::Transport;
use crate::types::{ApiResult, CallOptions, Reply};

const JSON_CONTENT_TYPE: &str = "application/json; charset=UTF-8";

/// A request that has been built but not yet answered.
#[derive(Debug, Clone)]
pub struct PendingCall {
    request: HttpRequest,
    expected_status: u16,
    no_data: bool,
}

impl PendingCall {
    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    pub fn expected_status(&self) -> u16 {
        self.expected_status
    }
}

/// Client for the registrar web API.
pub struct ApiClient {
    config: ClientConfig,
    session: SessionState,
    observers: Vec<Box<dyn Observer>>,
    in_flight: usize,
}

impl ApiClient {
    pub fn new(config: ClientConfig, storage: Box<dyn Storage>) -> Self {
        Self {
            config,
            session: SessionState::new(storage),
            observers: Vec::new(),
            in_flight: 0,
        }
    }

    /// Build a client whose storage follows `config.session_file`.
    pub fn from_config(config: ClientConfig) -> Self {
        let storage: Box<dyn Storage> = match &config.session_file {
            Some(path) => Box::new(FileStorage::new(path)),
            None => Box::new(MemoryStorage::new()),
        };
        Self::new(config, storage)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn subscribe(&mut self, observer: impl Observer + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// The session code currently in memory.
    pub fn session(&self) -> Option<&str> {
        self.session.token()
    }

    pub fn is_logged_in(&self) -> bool {
        self.session.is_logged_in()
    }

    /// Drop the session locally without telling the server.
    pub fn clear_session(&mut self) {
        self.session.clear();
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn url_for(&self, sfx: &str) -> String {
        self.config.url_for(sfx)
    }

    /// Build the request for `sfx` and mark it in flight.
    pub fn begin(&mut self, sfx: &str, options: &CallOptions) -> Result<PendingCall, ApiError> {
        let mut headers = Vec::new();
        let body = match &options.json {
            Some(json) => {
                let body =
                    serde_json::to_string(json).map_err(|e| ApiError::Serialization(e.to_string()))?;
                headers.push(("Content-type".to_string(), JSON_CONTENT_TYPE.to_string()));
                Some(body)
            }
            None => None,
        };

        if let Some(code) = self.session.outgoing() {
            headers.push((SESSION_HEADER.to_string(), code));
        }

        let request = HttpRequest {
            method: options.resolved_method(),
            path: self.url_for(sfx),
            headers,
            body,
        };
        debug!(method = %request.method, url = %request.path, "API call");

        self.in_flight += 1;
        if self.in_flight == 1 {
            self.emit(&ApiEvent::Busy);
        }

        Ok(PendingCall {
            request,
            expected_status: options.expected_status(),
            no_data: options.no_data,
        })
    }

    /// Consume the outcome of a round trip started by `begin`.
    pub fn finish(
        &mut self,
        call: PendingCall,
        outcome: Result<HttpResponse, TransportError>,
    ) -> ApiResult {
        let result = match outcome {
            Ok(response) => {
                self.track_session(&response);
                classify(&call, response)
            }
            Err(e) => {
                warn!(url = %call.request.path, error = %e, "no response from server");
                Err(ApiError::Connection(e))
            }
        };

        self.in_flight = self.in_flight.saturating_sub(1);
        if self.in_flight == 0 {
            self.emit(&ApiEvent::Idle);
        }
        result
    }

    /// One full round trip through `transport`.
    pub fn execute<T>(&mut self, transport: &T, sfx: &str, options: &CallOptions) -> ApiResult
    where
        T: Transport + ?Sized,
    {
        let call = self.begin(sfx, options)?;
        let outcome = transport.send(call.request());
        self.finish(call, outcome)
    }

    /// Like `execute`, delivering the outcome to `on_done` exactly once.
    pub fn call<T, F>(&mut self, transport: &T, sfx: &str, options: &CallOptions, on_done: F)
    where
        T: Transport + ?Sized,
        F: FnOnce(ApiResult),
    {
        on_done(self.execute(transport, sfx, options))
    }

    fn track_session(&mut self, response: &HttpResponse) {
        match self.session.observe(&response.headers) {
            Some(SessionChange::LoggedIn(session)) => {
                info!("session established");
                self.emit(&ApiEvent::LoggedIn { session });
            }
            Some(SessionChange::LoggedOut) => {
                info!("session ended by server");
                self.emit(&ApiEvent::LoggedOut);
            }
            None => {}
        }
    }

    fn emit(&self, event: &ApiEvent) {
        for observer in &self.observers {
            observer.notify(event);
        }
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("config", &self.config)
            .field("session", &self.session)
            .field("observers", &self.observers.len())
            .field("in_flight", &self.in_flight)
            .finish()
    }
}

/// Map a response to success or failure against the expected status.
fn classify(call: &PendingCall, response: HttpResponse) -> ApiResult {
    let status = response.status;
    if let Some(reason) = response.body_error {
        debug!(status, "API body unreadable");
        return Err(ApiError::Unreadable { status, reason });
    }
    if status == call.expected_status {
        debug!(status, "API ok");
        if call.no_data {
            return Ok(Reply::Done);
        }
        return Ok(match serde_json::from_str(&response.body) {
            Ok(value) => Reply::Json(value),
            Err(_) => Reply::Text(response.body),
        });
    }

    debug!(status, expected = call.expected_status, "API failed");
    match serde_json::from_str(&response.body) {
        Ok(reply) => Err(ApiError::Rejected { status, reply }),
        Err(_) => Err(ApiError::Malformed {
            status,
            body: response.body,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpMethod;
    use crate::session::SESSION_STORAGE_KEY;
    use crate::types::into_pair;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Storage whose contents stay visible to the test after the client owns it.
    #[derive(Clone, Default)]
    struct SharedStorage(Rc<RefCell<MemoryStorage>>);

    impl Storage for SharedStorage {
        fn get_item(&self, key: &str) -> Option<String> {
            self.0.borrow().get_item(key)
        }
        fn set_item(&mut self, key: &str, value: &str) {
            self.0.borrow_mut().set_item(key, value)
        }
        fn remove_item(&mut self, key: &str) {
            self.0.borrow_mut().remove_item(key)
        }
    }

    fn client_with(storage: SharedStorage) -> (ApiClient, Rc<RefCell<Vec<ApiEvent>>>) {
        let mut client = ApiClient::new(ClientConfig::new("http://localhost:3000"), Box::new(storage));
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        client.subscribe(move |event: &ApiEvent| sink.borrow_mut().push(event.clone()));
        (client, events)
    }

    fn client() -> (ApiClient, Rc<RefCell<Vec<ApiEvent>>>) {
        client_with(SharedStorage::default())
    }

    fn response(status: u16, headers: &[(&str, &str)], body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body: body.to_string(),
            body_error: None,
        }
    }

    fn login_events(events: &[ApiEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, ApiEvent::LoggedIn { .. }))
            .count()
    }

    #[test]
    fn begin_without_body_is_plain_get() {
        let (mut client, _) = client();
        let call = client.begin("hello", &CallOptions::new()).unwrap();
        let req = call.request();
        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(req.path, "http://localhost:3000/pyrar/v1.0/hello");
        assert!(req.headers.is_empty());
        assert!(req.body.is_none());
        assert_eq!(call.expected_status(), 200);
    }

    #[test]
    fn begin_with_json_posts_with_content_type() {
        let (mut client, _) = client();
        let opts = CallOptions::new().json(json!({ "email": "a@b.c", "password": "pw" }));
        let call = client.begin("users/login", &opts).unwrap();
        let req = call.request();
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.header("content-type"), Some("application/json; charset=UTF-8"));
        let body: serde_json::Value = serde_json::from_str(req.body.as_deref().unwrap()).unwrap();
        assert_eq!(body["email"], "a@b.c");
    }

    #[test]
    fn method_override_beats_json_post() {
        let (mut client, _) = client();
        let opts = CallOptions::new()
            .json(json!({ "id": 1 }))
            .method(HttpMethod::Delete);
        let call = client.begin("orders/cancel", &opts).unwrap();
        assert_eq!(call.request().method, HttpMethod::Delete);
        assert!(call.request().body.is_some());
    }

    #[test]
    fn persisted_session_is_attached_and_promoted() {
        let storage = SharedStorage::default();
        storage.0.borrow_mut().set_item(SESSION_STORAGE_KEY, "saved-code");
        let (mut client, events) = client_with(storage);

        let call = client.begin("users/details", &CallOptions::new()).unwrap();
        assert_eq!(call.request().header("X-Session-Code"), Some("saved-code"));
        assert_eq!(client.session(), Some("saved-code"));

        // Still valid on the server: no transition.
        let result = client.finish(call, Ok(response(200, &[("x-session-code", "saved-code")], "{}")));
        assert!(result.is_ok());
        assert_eq!(login_events(&events.borrow()), 0);
    }

    #[test]
    fn session_header_logs_in_exactly_once() {
        let storage = SharedStorage::default();
        let (mut client, events) = client_with(storage.clone());

        let call = client.begin("users/login", &CallOptions::new().json(json!({}))).unwrap();
        client
            .finish(call, Ok(response(200, &[("X-Session-Code", "abc")], r#"{"user_id":1}"#)))
            .unwrap();

        let call = client.begin("users/details", &CallOptions::new()).unwrap();
        assert_eq!(call.request().header("x-session-code"), Some("abc"));
        client
            .finish(call, Ok(response(200, &[("x-session-code", "abc")], "{}")))
            .unwrap();

        assert_eq!(login_events(&events.borrow()), 1);
        assert!(events.borrow().contains(&ApiEvent::LoggedIn {
            session: "abc".to_string()
        }));
        assert_eq!(storage.get_item(SESSION_STORAGE_KEY).as_deref(), Some("abc"));
    }

    #[test]
    fn missing_header_logs_out_and_clears_storage() {
        let storage = SharedStorage::default();
        let (mut client, events) = client_with(storage.clone());

        let call = client.begin("users/login", &CallOptions::new()).unwrap();
        client
            .finish(call, Ok(response(200, &[("x-session-code", "abc")], "{}")))
            .unwrap();

        let call = client.begin("users/logout", &CallOptions::new()).unwrap();
        let reply = client
            .finish(call, Ok(response(200, &[], r#""logged-out""#)))
            .unwrap();
        assert_eq!(reply, Reply::Json(json!("logged-out")));

        let logouts = events
            .borrow()
            .iter()
            .filter(|e| **e == ApiEvent::LoggedOut)
            .count();
        assert_eq!(logouts, 1);
        assert!(!client.is_logged_in());
        assert_eq!(storage.get_item(SESSION_STORAGE_KEY), None);

        let call = client.begin("hello", &CallOptions::new()).unwrap();
        assert_eq!(call.request().header("x-session-code"), None);
    }

    #[test]
    fn failure_response_still_tracks_session() {
        let (mut client, events) = client();
        let call = client.begin("users/details", &CallOptions::new()).unwrap();
        let err = client
            .finish(
                call,
                Ok(response(499, &[("x-session-code", "fresh")], r#"{"error":"nope"}"#)),
            )
            .unwrap_err();
        assert_eq!(err.reply(), json!({ "error": "nope" }));
        assert_eq!(client.session(), Some("fresh"));
        assert_eq!(login_events(&events.borrow()), 1);
    }

    #[test]
    fn no_data_skips_body_parsing() {
        let (mut client, _) = client();
        let call = client
            .begin("users/password", &CallOptions::new().no_data())
            .unwrap();
        let result = client.finish(call, Ok(response(200, &[], "{{ definitely not json")));
        assert_eq!(into_pair(result), (true, json!(true)));
    }

    #[test]
    fn non_json_success_body_is_passed_as_text() {
        let (mut client, _) = client();
        let call = client.begin("/robots.txt", &CallOptions::new()).unwrap();
        assert_eq!(call.request().path, "http://localhost:3000/robots.txt");
        let reply = client
            .finish(call, Ok(response(200, &[], "User-agent: *")))
            .unwrap();
        assert_eq!(reply, Reply::Text("User-agent: *".to_string()));
    }

    #[test]
    fn status_mismatch_with_json_body_is_rejected() {
        let (mut client, _) = client();
        let call = client.begin("domains/info", &CallOptions::new()).unwrap();
        let result = client.finish(call, Ok(response(404, &[], r#"{"error":"not found"}"#)));
        assert_eq!(into_pair(result), (false, json!({ "error": "not found" })));
    }

    #[test]
    fn status_mismatch_with_text_body_wraps_text() {
        let (mut client, _) = client();
        let call = client.begin("hello", &CallOptions::new()).unwrap();
        let err = client
            .finish(call, Ok(response(500, &[], "Internal Server Error")))
            .unwrap_err();
        assert!(matches!(err, ApiError::Malformed { status: 500, .. }));
        assert_eq!(err.reply(), json!({ "error": "Internal Server Error" }));
    }

    #[test]
    fn custom_ok_status_counts_as_success() {
        let (mut client, _) = client();
        let opts = CallOptions::new().json(json!({ "name": "x" })).ok_resp(201);
        let call = client.begin("users/register", &opts).unwrap();
        assert!(client.finish(call, Ok(response(201, &[], "{}"))).is_ok());

        let call = client.begin("users/register", &opts).unwrap();
        assert!(client.finish(call, Ok(response(200, &[], "{}"))).is_err());
    }

    #[test]
    fn transport_failure_is_connection_error() {
        let (mut client, events) = client();
        let call = client.begin("hello", &CallOptions::new()).unwrap();
        let result = client.finish(call, Err(TransportError("dns failure".to_string())));
        assert_eq!(
            into_pair(result),
            (false, json!({ "error": "Server connection error" }))
        );
        assert_eq!(*events.borrow(), vec![ApiEvent::Busy, ApiEvent::Idle]);
    }

    #[test]
    fn transport_failure_keeps_known_session() {
        let (mut client, events) = client();
        let call = client.begin("users/login", &CallOptions::new()).unwrap();
        client
            .finish(call, Ok(response(200, &[("x-session-code", "abc")], "{}")))
            .unwrap();

        let call = client.begin("hello", &CallOptions::new()).unwrap();
        let _ = client.finish(call, Err(TransportError("reset".to_string())));
        assert_eq!(client.session(), Some("abc"));
        assert!(!events.borrow().contains(&ApiEvent::LoggedOut));
    }

    #[test]
    fn unreadable_body_still_tracks_session() {
        let (mut client, events) = client();
        let call = client.begin("users/login", &CallOptions::new()).unwrap();
        let mut resp = response(200, &[("X-Session-Code", "tok")], "");
        resp.body_error = Some("connection reset".to_string());

        let err = client.finish(call, Ok(resp)).unwrap_err();
        assert!(matches!(err, ApiError::Unreadable { status: 200, .. }));
        assert_eq!(err.reply(), json!({ "error": "connection reset" }));
        assert_eq!(client.session(), Some("tok"));
        assert_eq!(
            *events.borrow(),
            vec![
                ApiEvent::Busy,
                ApiEvent::LoggedIn {
                    session: "tok".to_string()
                },
                ApiEvent::Idle
            ]
        );
    }

    #[test]
    fn busy_spans_overlapping_calls() {
        let (mut client, events) = client();
        let first = client.begin("hello", &CallOptions::new()).unwrap();
        let second = client.begin("config", &CallOptions::new()).unwrap();
        assert_eq!(client.in_flight(), 2);

        let _ = client.finish(second, Ok(response(200, &[], "{}")));
        assert_eq!(*events.borrow(), vec![ApiEvent::Busy]);

        let _ = client.finish(first, Ok(response(200, &[], "{}")));
        assert_eq!(*events.borrow(), vec![ApiEvent::Busy, ApiEvent::Idle]);
        assert_eq!(client.in_flight(), 0);
    }

    struct CannedTransport(Result<HttpResponse, TransportError>);

    impl Transport for CannedTransport {
        fn send(&self, _request: &HttpRequest) -> Result<HttpResponse, TransportError> {
            self.0.clone()
        }
    }

    #[test]
    fn call_invokes_callback_exactly_once() {
        let (mut client, _) = client();
        let transport = CannedTransport(Err(TransportError("refused".to_string())));
        let mut calls = Vec::new();
        client.call(&transport, "hello", &CallOptions::new(), |result| {
            calls.push(into_pair(result));
        });
        assert_eq!(
            calls,
            vec![(false, json!({ "error": "Server connection error" }))]
        );
    }

    #[test]
    fn execute_round_trips_through_transport() {
        let (mut client, _) = client();
        let transport = CannedTransport(Ok(response(200, &[], r#"{"hello":"world"}"#)));
        let reply = client
            .execute(&transport, "hello", &CallOptions::new())
            .unwrap();
        assert_eq!(reply.as_json(), Some(&json!({ "hello": "world" })));
    }
}
