//! C-ABI wrapper around `pyrar-core`.
//!
//! # Overview
//! Exposes the session-aware API client through `extern "C"` functions so a
//! host with its own HTTP stack can build requests, run them, and get the
//! classified outcome back through a completion callback, while the Rust
//! side keeps the session state.
//!
//! # Design
//! - Every `extern "C"` function wraps its body in `catch_unwind` so panics
//!   never cross the FFI boundary.
//! - A call is `pyrar_begin_call` (returns an opaque handle whose request is
//!   read with `pyrar_call_request`) followed by `pyrar_finish_call` (takes the response, or null for "no response",
//!   and invokes the completion callback exactly once).
//! - Payloads cross as JSON text; the host already has a JSON parser.
//! - The C caller owns returned strings and must release them with
//!   `pyrar_free_string`. Calls are released by `pyrar_finish_call`.

pub mod types;

use std::ffi::{c_void, CString};
use std::os::raw::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};

use pyrar_core::{into_pair, ApiClient, CallOptions, ClientConfig, TransportError};
use tracing::warn;

use types::*;

// ---------------------------------------------------------------------------
// Client lifecycle
// ---------------------------------------------------------------------------

/// Create a new `ApiClient` bound to `origin`.
///
/// `url_prefix` and `session_file` may be null. Returns null if `origin` is
/// null or not UTF-8, or if an internal panic occurs.
/// The caller must free the returned pointer with `pyrar_client_free`.
#[unsafe(no_mangle)]
pub extern "C" fn pyrar_client_new(
    origin: *const c_char,
    url_prefix: *const c_char,
    session_file: *const c_char,
) -> *mut FfiApiClient {
    catch_unwind(|| {
        let Some(origin) = read_str(origin) else {
            return std::ptr::null_mut();
        };
        let mut config = ClientConfig::new(origin);
        if let Some(prefix) = read_str(url_prefix) {
            config = config.with_url_prefix(prefix);
        }
        if let Some(file) = read_str(session_file) {
            config = config.with_session_file(file);
        }
        let client = ApiClient::from_config(config);
        Box::into_raw(Box::new(FfiApiClient { inner: client }))
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Free a client created by `pyrar_client_new`. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn pyrar_client_free(client: *mut FfiApiClient) {
    if !client.is_null() {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            drop(unsafe { Box::from_raw(client) });
        }));
    }
}

/// Register an observer for busy/idle and login/logout events.
///
/// `user_data` is passed back untouched on every event.
#[unsafe(no_mangle)]
pub extern "C" fn pyrar_client_subscribe(
    client: *mut FfiApiClient,
    callback: Option<FfiEventCallback>,
    user_data: *mut c_void,
) -> FfiStatus {
    catch_unwind(AssertUnwindSafe(|| {
        let Some(callback) = callback else {
            return FfiStatus::NullArg;
        };
        if client.is_null() {
            return FfiStatus::NullArg;
        }
        let client = unsafe { &mut *client };
        client.inner.subscribe(FfiObserver { callback, user_data });
        FfiStatus::Ok
    }))
    .unwrap_or(FfiStatus::Panic)
}

/// The current session code, or null when logged out.
///
/// The caller must free the returned string with `pyrar_free_string`.
#[unsafe(no_mangle)]
pub extern "C" fn pyrar_client_session(client: *const FfiApiClient) -> *mut c_char {
    catch_unwind(AssertUnwindSafe(|| {
        if client.is_null() {
            return std::ptr::null_mut();
        }
        let client = unsafe { &*client };
        match client.inner.session() {
            Some(code) => c_string(code.to_string()),
            None => std::ptr::null_mut(),
        }
    }))
    .unwrap_or(std::ptr::null_mut())
}

// ---------------------------------------------------------------------------
// Calls
// ---------------------------------------------------------------------------

/// Start a call to `sfx`.
///
/// `options_json` is a JSON object with any of `json`, `method`, `okResp`,
/// `noData`, or null for defaults. Returns null if `client` or `sfx` is null
/// or the options do not parse. The returned call must be passed to
/// `pyrar_finish_call` exactly once.
#[unsafe(no_mangle)]
pub extern "C" fn pyrar_begin_call(
    client: *mut FfiApiClient,
    sfx: *const c_char,
    options_json: *const c_char,
) -> *mut FfiCall {
    catch_unwind(AssertUnwindSafe(|| {
        if client.is_null() {
            return std::ptr::null_mut();
        }
        let Some(sfx) = read_str(sfx) else {
            return std::ptr::null_mut();
        };
        let options = if options_json.is_null() {
            CallOptions::default()
        } else {
            let parsed = read_str(options_json)
                .map(serde_json::from_str::<CallOptions>);
            match parsed {
                Some(Ok(options)) => options,
                Some(Err(e)) => {
                    warn!(error = %e, "call options rejected");
                    return std::ptr::null_mut();
                }
                None => return std::ptr::null_mut(),
            }
        };

        let client = unsafe { &mut *client };
        match client.inner.begin(sfx, &options) {
            Ok(pending) => {
                let call = FfiCall {
                    request: FfiHttpRequest::from_core(pending.request()),
                    pending,
                };
                Box::into_raw(Box::new(call))
            }
            Err(e) => {
                warn!(error = %e, "call could not be started");
                std::ptr::null_mut()
            }
        }
    }))
    .unwrap_or(std::ptr::null_mut())
}

/// The request the host must execute for `call`, or null if `call` is null.
///
/// The pointer stays valid until `call` is passed to `pyrar_finish_call`.
#[unsafe(no_mangle)]
pub extern "C" fn pyrar_call_request(call: *const FfiCall) -> *const FfiHttpRequest {
    catch_unwind(AssertUnwindSafe(|| {
        if call.is_null() {
            return std::ptr::null();
        }
        unsafe { &(*call).request as *const FfiHttpRequest }
    }))
    .unwrap_or(std::ptr::null())
}

/// Complete a call started by `pyrar_begin_call` and free it.
///
/// `response` is the executed request's response, or null when no response
/// could be obtained. `on_done` is invoked exactly once with the outcome and
/// its JSON payload before this function returns. When `client` or `call`
/// is null nothing is invoked and `NullArg` is returned.
#[unsafe(no_mangle)]
pub extern "C" fn pyrar_finish_call(
    client: *mut FfiApiClient,
    call: *mut FfiCall,
    response: *const FfiHttpResponse,
    on_done: Option<FfiDoneCallback>,
    user_data: *mut c_void,
) -> FfiStatus {
    catch_unwind(AssertUnwindSafe(|| {
        if client.is_null() || call.is_null() {
            return FfiStatus::NullArg;
        }
        let client = unsafe { &mut *client };
        let FfiCall {
            mut request,
            pending,
        } = *unsafe { Box::from_raw(call) };
        request.free_fields();

        let outcome = if response.is_null() {
            Err(TransportError("host reported no response".to_string()))
        } else {
            Ok(unsafe { &*response }.to_core())
        };

        let (ok, payload) = into_pair(client.inner.finish(pending, outcome));
        if let Some(on_done) = on_done {
            let text = CString::new(payload.to_string()).unwrap_or_default();
            on_done(ok, text.as_ptr(), user_data);
        }
        FfiStatus::Ok
    }))
    .unwrap_or(FfiStatus::Panic)
}

// ---------------------------------------------------------------------------
// Free functions
// ---------------------------------------------------------------------------

/// Free a C string allocated by this library. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn pyrar_free_string(s: *mut c_char) {
    if !s.is_null() {
        let _ = catch_unwind(|| {
            drop(unsafe { CString::from_raw(s) });
        });
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
