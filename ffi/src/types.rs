//! `#[repr(C)]` types for the FFI boundary.
//!
//! # Design
//! Each type mirrors a core type but uses C-compatible representations:
//! `*mut c_char` instead of `String`, raw pointers instead of `Vec`, and
//! enums with explicit discriminants. Conversion functions live here to keep
//! `lib.rs` focused on the `extern "C"` surface.

use std::ffi::{c_void, CStr, CString};
use std::os::raw::c_char;

use pyrar_core::{ApiEvent, HttpMethod, HttpResponse, Observer, PendingCall};

/// Opaque handle to an `ApiClient`. C callers receive a pointer to this
/// and pass it back into every FFI function.
pub struct FfiApiClient {
    pub(crate) inner: pyrar_core::ApiClient,
}

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

/// HTTP method as a C enum.
#[repr(C)]
#[derive(Debug, PartialEq, Eq)]
pub enum FfiHttpMethod {
    Get = 0,
    Post = 1,
    Put = 2,
    Delete = 3,
    Patch = 4,
    Head = 5,
}

impl From<HttpMethod> for FfiHttpMethod {
    fn from(m: HttpMethod) -> Self {
        match m {
            HttpMethod::Get => FfiHttpMethod::Get,
            HttpMethod::Post => FfiHttpMethod::Post,
            HttpMethod::Put => FfiHttpMethod::Put,
            HttpMethod::Delete => FfiHttpMethod::Delete,
            HttpMethod::Patch => FfiHttpMethod::Patch,
            HttpMethod::Head => FfiHttpMethod::Head,
        }
    }
}

/// A single HTTP header as a key-value pair of C strings.
#[repr(C)]
pub struct FfiHeader {
    pub key: *mut c_char,
    pub value: *mut c_char,
}

/// An HTTP request described as C-compatible plain data.
#[repr(C)]
pub struct FfiHttpRequest {
    pub method: FfiHttpMethod,
    pub path: *mut c_char,
    pub headers: *mut FfiHeader,
    pub headers_len: u32,
    pub body: *mut c_char,
}

/// Opaque in-flight call returned by `pyrar_begin_call`.
///
/// The C caller reads the request through `pyrar_call_request`, executes it
/// and hands the handle back to `pyrar_finish_call`, which frees it. The
/// pending state lives inside the handle, so every handle can be finished.
pub struct FfiCall {
    pub(crate) request: FfiHttpRequest,
    pub(crate) pending: PendingCall,
}

/// Build a C string, dropping interior NULs rather than failing.
pub(crate) fn c_string(s: String) -> *mut c_char {
    match CString::new(s) {
        Ok(c) => c.into_raw(),
        Err(e) => {
            let mut bytes = e.into_vec();
            bytes.retain(|b| *b != 0);
            CString::new(bytes).unwrap_or_default().into_raw()
        }
    }
}

/// Read a borrowed C string; null and invalid UTF-8 read as `None`.
pub(crate) fn read_str<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(ptr) }.to_str().ok()
}

impl FfiHttpRequest {
    pub(crate) fn from_core(req: &pyrar_core::HttpRequest) -> Self {
        let body = match &req.body {
            Some(b) => c_string(b.clone()),
            None => std::ptr::null_mut(),
        };

        let headers_len = req.headers.len() as u32;
        let headers = if req.headers.is_empty() {
            std::ptr::null_mut()
        } else {
            let ffi_headers: Box<[FfiHeader]> = req
                .headers
                .iter()
                .map(|(k, v)| FfiHeader {
                    key: c_string(k.clone()),
                    value: c_string(v.clone()),
                })
                .collect();
            Box::into_raw(ffi_headers) as *mut FfiHeader
        };

        FfiHttpRequest {
            method: req.method.into(),
            path: c_string(req.path.clone()),
            headers,
            headers_len,
            body,
        }
    }

    /// Release every string and the header array. The struct itself is not freed.
    pub(crate) fn free_fields(&mut self) {
        if !self.path.is_null() {
            drop(unsafe { CString::from_raw(self.path) });
            self.path = std::ptr::null_mut();
        }
        if !self.body.is_null() {
            drop(unsafe { CString::from_raw(self.body) });
            self.body = std::ptr::null_mut();
        }
        if !self.headers.is_null() && self.headers_len > 0 {
            let slice = std::ptr::slice_from_raw_parts_mut(self.headers, self.headers_len as usize);
            let headers = unsafe { Box::from_raw(slice) };
            for h in headers.iter() {
                if !h.key.is_null() {
                    drop(unsafe { CString::from_raw(h.key) });
                }
                if !h.value.is_null() {
                    drop(unsafe { CString::from_raw(h.value) });
                }
            }
        }
        self.headers = std::ptr::null_mut();
        self.headers_len = 0;
    }
}

// ---------------------------------------------------------------------------
// Response input (caller-provided, not heap-allocated by us)
// ---------------------------------------------------------------------------

/// A response header as borrowed C strings.
#[repr(C)]
pub struct FfiResponseHeader {
    pub key: *const c_char,
    pub value: *const c_char,
}

/// An HTTP response described as C-compatible plain data.
///
/// The C caller constructs this after executing a request and passes a
/// pointer to `pyrar_finish_call`. The FFI layer reads but does not free
/// these fields.
#[repr(C)]
pub struct FfiHttpResponse {
    pub status: u16,
    pub headers: *const FfiResponseHeader,
    pub headers_len: u32,
    pub body: *const c_char,
}

impl FfiHttpResponse {
    pub(crate) fn to_core(&self) -> HttpResponse {
        let headers = if self.headers.is_null() || self.headers_len == 0 {
            Vec::new()
        } else {
            unsafe { std::slice::from_raw_parts(self.headers, self.headers_len as usize) }
                .iter()
                .filter_map(|h| Some((read_str(h.key)?.to_string(), read_str(h.value)?.to_string())))
                .collect()
        };
        HttpResponse {
            status: self.status,
            headers,
            body: read_str(self.body).unwrap_or("").to_string(),
            body_error: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Callbacks and status codes
// ---------------------------------------------------------------------------

/// Status returned by functions that do not produce a pointer.
#[repr(C)]
#[derive(Debug, PartialEq, Eq)]
pub enum FfiStatus {
    Ok = 0,
    NullArg = 1,
    Panic = 2,
}

/// Event kinds delivered to a C observer.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiEventKind {
    Busy = 0,
    Idle = 1,
    LoggedIn = 2,
    LoggedOut = 3,
}

/// Observer callback. `session` is non-null only for `LoggedIn` and is only
/// valid for the duration of the call.
pub type FfiEventCallback =
    extern "C" fn(kind: FfiEventKind, session: *const c_char, user_data: *mut c_void);

/// Completion callback. `payload` is JSON text valid for the duration of the call.
pub type FfiDoneCallback = extern "C" fn(ok: bool, payload: *const c_char, user_data: *mut c_void);

/// Forwards `ApiEvent`s to a C function pointer.
pub(crate) struct FfiObserver {
    pub(crate) callback: FfiEventCallback,
    pub(crate) user_data: *mut c_void,
}

impl Observer for FfiObserver {
    fn notify(&self, event: &ApiEvent) {
        let (kind, session) = match event {
            ApiEvent::Busy => (FfiEventKind::Busy, None),
            ApiEvent::Idle => (FfiEventKind::Idle, None),
            ApiEvent::LoggedIn { session } => (FfiEventKind::LoggedIn, CString::new(session.as_str()).ok()),
            ApiEvent::LoggedOut => (FfiEventKind::LoggedOut, None),
        };
        let ptr = session.as_ref().map_or(std::ptr::null(), |s| s.as_ptr());
        (self.callback)(kind, ptr, self.user_data);
    }
}
