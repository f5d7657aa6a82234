// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! C ABI over a process-wide [`Bridge`].
//!
//! Every function returns an `i32` status: [`FLOW_OK`] on success, otherwise
//! the status code of the failing [`FlowError`] kind. Results are written
//! through out-pointers. The message of the last failure on the calling thread
//! is available from [`flow_last_error`].
//!
//! # Callbacks
//!
//! Callbacks may run on any thread, including the caller's own thread when
//! the subscription uses the immediate scheduler. Callbacks for one
//! subscription never overlap. Value pointers and failure messages are only
//! valid for the duration of the callback.
//!
//! ```c
//! void on_value(void* ctx, const uint8_t* data, size_t len) { /* ... */ }
//! void on_complete(void* ctx) { /* ... */ }
//! void on_failure(void* ctx, int32_t code, const char* msg) { /* ... */ }
//!
//! uint64_t scheduler, source, pipeline, sub;
//! flow_scheduler_create(FLOW_SCHEDULER_SERIAL, 0, &scheduler);
//! flow_publisher_create("sequence", "{\"values\": [\"a\", \"b\"]}", &source);
//! flow_pipeline_create(source, "[{\"op\": \"map\", \"transform\": {\"name\": \"uppercase\"}}]", &pipeline);
//! FlowCallbacks callbacks = { ctx, on_value, on_complete, on_failure };
//! flow_subscribe(pipeline, &callbacks, scheduler, &sub);
//! flow_request(sub, 10);
//! ```

use std::cell::RefCell;
use std::ffi::{c_char, c_void, CStr, CString};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr;
use std::sync::OnceLock;

use crate::bridge::{Bridge, Payload};
use crate::errors::{FlowError, FlowResult};
use crate::observability::messages::bridge::BoundaryCallFailed;
use crate::observability::messages::StructuredLog;
use crate::scheduler::SchedulerKind;
use crate::traits::Subscriber;

/// Success status.
pub const FLOW_OK: i32 = 0;

/// Scheduler strategies accepted by [`flow_scheduler_create`].
pub const FLOW_SCHEDULER_IMMEDIATE: i32 = 0;
pub const FLOW_SCHEDULER_SERIAL: i32 = 1;
pub const FLOW_SCHEDULER_CONCURRENT: i32 = 2;

/// Callback table passed to [`flow_subscribe`] and [`flow_signal_connect`].
/// Any callback may be null.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct FlowCallbacks {
    pub user_data: *mut c_void,
    pub on_value: Option<unsafe extern "C" fn(user_data: *mut c_void, data: *const u8, len: usize)>,
    pub on_complete: Option<unsafe extern "C" fn(user_data: *mut c_void)>,
    pub on_failure:
        Option<unsafe extern "C" fn(user_data: *mut c_void, code: i32, message: *const c_char)>,
}

struct ForeignSubscriber {
    callbacks: FlowCallbacks,
}

// SAFETY: callbacks for one subscription are serialized by the engine; the
// user_data pointer's thread safety is the caller's responsibility.
unsafe impl Send for ForeignSubscriber {}

impl Subscriber<Payload> for ForeignSubscriber {
    fn on_next(&mut self, value: Payload) {
        if let Some(callback) = self.callbacks.on_value {
            // SAFETY: callback provided by the caller; the slice outlives the call.
            unsafe { callback(self.callbacks.user_data, value.as_ptr(), value.len()) }
        }
    }

    fn on_complete(&mut self) {
        if let Some(callback) = self.callbacks.on_complete {
            // SAFETY: callback provided by the caller.
            unsafe { callback(self.callbacks.user_data) }
        }
    }

    fn on_error(&mut self, error: FlowError) {
        if let Some(callback) = self.callbacks.on_failure {
            let message = to_c_string(error.to_string());
            // SAFETY: callback provided by the caller; the message outlives the call.
            unsafe { callback(self.callbacks.user_data, error.status_code(), message.as_ptr()) }
        }
    }
}

fn bridge() -> &'static Bridge {
    static BRIDGE: OnceLock<Bridge> = OnceLock::new();
    BRIDGE.get_or_init(Bridge::new)
}

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn to_c_string(text: String) -> CString {
    CString::new(text.replace('\0', " ")).unwrap_or_default()
}

/// Runs one boundary call, converting errors and panics into status codes.
fn guard(call: &'static str, body: impl FnOnce() -> FlowResult<()>) -> i32 {
    let result = catch_unwind(AssertUnwindSafe(body)).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Err(FlowError::Internal(format!("panic in {}: {}", call, message)))
    });
    match result {
        Ok(()) => {
            LAST_ERROR.with(|last| *last.borrow_mut() = None);
            FLOW_OK
        }
        Err(error) => {
            BoundaryCallFailed {
                call,
                error: &error,
            }
            .log();
            LAST_ERROR.with(|last| *last.borrow_mut() = Some(to_c_string(error.to_string())));
            error.status_code()
        }
    }
}

/// # Safety
/// `ptr` must be null or point to a NUL-terminated string valid for `'a`.
unsafe fn required_str<'a>(ptr: *const c_char, what: &str) -> FlowResult<&'a str> {
    optional_str(ptr, what)?.ok_or_else(|| FlowError::InvalidArgument(format!("{} is null", what)))
}

/// # Safety
/// As [`required_str`].
unsafe fn optional_str<'a>(ptr: *const c_char, what: &str) -> FlowResult<Option<&'a str>> {
    if ptr.is_null() {
        return Ok(None);
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map(Some)
        .map_err(|_| FlowError::InvalidArgument(format!("{} is not valid UTF-8", what)))
}

/// # Safety
/// `data` must be null or valid for reads of `len` bytes.
unsafe fn payload(data: *const u8, len: usize) -> FlowResult<Payload> {
    if data.is_null() {
        if len == 0 {
            return Ok(Vec::new());
        }
        return Err(FlowError::InvalidArgument(
            "payload is null with non-zero length".into(),
        ));
    }
    Ok(std::slice::from_raw_parts(data, len).to_vec())
}

/// # Safety
/// `out` must be null or valid for writes.
unsafe fn out_ref<'a, T>(out: *mut T, what: &str) -> FlowResult<&'a mut T> {
    out.as_mut()
        .ok_or_else(|| FlowError::InvalidArgument(format!("{} is null", what)))
}

/// # Safety
/// `callbacks` must be null or point to a valid `FlowCallbacks`.
unsafe fn subscriber(callbacks: *const FlowCallbacks) -> FlowResult<ForeignSubscriber> {
    let callbacks = callbacks
        .as_ref()
        .copied()
        .ok_or_else(|| FlowError::InvalidArgument("callbacks is null".into()))?;
    Ok(ForeignSubscriber { callbacks })
}

fn scheduler_kind(strategy: i32, workers: u32) -> FlowResult<SchedulerKind> {
    match strategy {
        FLOW_SCHEDULER_IMMEDIATE => Ok(SchedulerKind::Immediate),
        FLOW_SCHEDULER_SERIAL => Ok(SchedulerKind::Serial),
        FLOW_SCHEDULER_CONCURRENT => Ok(SchedulerKind::Concurrent {
            workers: workers as usize,
        }),
        other => Err(FlowError::InvalidArgument(format!(
            "unknown scheduler strategy {}",
            other
        ))),
    }
}

/// Creates a scheduler. `workers` is only read for the concurrent strategy.
///
/// # Safety
/// `out_handle` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn flow_scheduler_create(strategy: i32, workers: u32, out_handle: *mut u64) -> i32 {
    guard("scheduler_create", || {
        let out = out_ref(out_handle, "out_handle")?;
        *out = bridge().create_scheduler(scheduler_kind(strategy, workers)?)?;
        Ok(())
    })
}

/// Shuts a scheduler down, waiting up to its deadline for queued work.
#[no_mangle]
pub extern "C" fn flow_scheduler_shutdown(scheduler: u64) -> i32 {
    guard("scheduler_shutdown", || bridge().shutdown_scheduler(scheduler).map(|_| ()))
}

/// Creates a publisher of `kind` (`just`, `sequence`, `empty`, `external`,
/// `signal`) from a JSON object of parameters. `params_json` may be null.
///
/// # Safety
/// String arguments must be null or NUL-terminated; `out_handle` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn flow_publisher_create(
    kind: *const c_char,
    params_json: *const c_char,
    out_handle: *mut u64,
) -> i32 {
    guard("publisher_create", || {
        let out = out_ref(out_handle, "out_handle")?;
        let kind = required_str(kind, "kind")?;
        let params = optional_str(params_json, "params_json")?.unwrap_or("");
        *out = bridge().create_publisher(kind, params)?;
        Ok(())
    })
}

/// Composes a JSON array of operator specs onto a publisher or pipeline.
///
/// # Safety
/// `operators_json` must be null or NUL-terminated; `out_handle` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn flow_pipeline_create(
    source: u64,
    operators_json: *const c_char,
    out_handle: *mut u64,
) -> i32 {
    guard("pipeline_create", || {
        let out = out_ref(out_handle, "out_handle")?;
        let operators = optional_str(operators_json, "operators_json")?.unwrap_or("");
        *out = bridge().create_pipeline_json(source, operators)?;
        Ok(())
    })
}

/// Subscribes to a pipeline or publisher. No values flow until [`flow_request`].
///
/// # Safety
/// `callbacks` must point to a valid table; it is copied. `out_handle` must be
/// valid for writes.
#[no_mangle]
pub unsafe extern "C" fn flow_subscribe(
    pipeline: u64,
    callbacks: *const FlowCallbacks,
    scheduler: u64,
    out_handle: *mut u64,
) -> i32 {
    guard("subscribe", || {
        let out = out_ref(out_handle, "out_handle")?;
        let subscriber = subscriber(callbacks)?;
        *out = bridge().subscribe(pipeline, subscriber, scheduler)?;
        Ok(())
    })
}

#[no_mangle]
pub extern "C" fn flow_request(subscription: u64, n: u64) -> i32 {
    guard("request", || bridge().request(subscription, n))
}

#[no_mangle]
pub extern "C" fn flow_cancel(subscription: u64) -> i32 {
    guard("cancel", || bridge().cancel(subscription))
}

/// Releases any handle. A second dispose returns the invalid-handle status.
#[no_mangle]
pub extern "C" fn flow_dispose(handle: u64) -> i32 {
    guard("dispose", || bridge().dispose(handle))
}

/// Pushes `len` bytes into an external or signal publisher. `data` may be
/// null when `len` is zero. `out_accepted` may be null.
///
/// # Safety
/// `data` must be valid for reads of `len` bytes; `out_accepted` null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn flow_emit(
    publisher: u64,
    data: *const u8,
    len: usize,
    out_accepted: *mut usize,
) -> i32 {
    guard("emit", || {
        let accepted = bridge().emit(publisher, payload(data, len)?)?;
        if let Some(out) = out_accepted.as_mut() {
            *out = accepted;
        }
        Ok(())
    })
}

#[no_mangle]
pub extern "C" fn flow_complete(publisher: u64) -> i32 {
    guard("complete", || bridge().complete(publisher))
}

/// Fails an external publisher; subscribers receive a source failure.
///
/// # Safety
/// `message` must be null or NUL-terminated.
#[no_mangle]
pub unsafe extern "C" fn flow_fail(publisher: u64, message: *const c_char) -> i32 {
    guard("fail", || {
        let message = optional_str(message, "message")?.unwrap_or("failed by host");
        bridge().fail(publisher, message)
    })
}

/// # Safety
/// `name` must be NUL-terminated.
#[no_mangle]
pub unsafe extern "C" fn flow_signal_register(name: *const c_char) -> i32 {
    guard("signal_register", || bridge().register_signal(required_str(name, "name")?))
}

/// # Safety
/// `name` must be NUL-terminated; `out_removed` null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn flow_signal_unregister(name: *const c_char, out_removed: *mut bool) -> i32 {
    guard("signal_unregister", || {
        let removed = bridge().unregister_signal(required_str(name, "name")?)?;
        if let Some(out) = out_removed.as_mut() {
            *out = removed;
        }
        Ok(())
    })
}

/// # Safety
/// As [`flow_emit`]; `name` must be NUL-terminated.
#[no_mangle]
pub unsafe extern "C" fn flow_signal_emit(
    name: *const c_char,
    data: *const u8,
    len: usize,
    out_accepted: *mut usize,
) -> i32 {
    guard("signal_emit", || {
        let name = required_str(name, "name")?;
        let accepted = bridge().emit_signal(name, payload(data, len)?)?;
        if let Some(out) = out_accepted.as_mut() {
            *out = accepted;
        }
        Ok(())
    })
}

/// Connects a callback table to a named signal with unbounded demand.
///
/// # Safety
/// As [`flow_subscribe`]; `name` must be NUL-terminated.
#[no_mangle]
pub unsafe extern "C" fn flow_signal_connect(
    name: *const c_char,
    callbacks: *const FlowCallbacks,
    scheduler: u64,
    out_handle: *mut u64,
) -> i32 {
    guard("signal_connect", || {
        let out = out_ref(out_handle, "out_handle")?;
        let name = required_str(name, "name")?;
        let subscriber = subscriber(callbacks)?;
        *out = bridge().connect_signal(name, subscriber, scheduler)?;
        Ok(())
    })
}

/// Completes every connection to the signal, keeping it registered.
///
/// # Safety
/// `name` must be NUL-terminated; `out_disconnected` null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn flow_signal_disconnect_all(
    name: *const c_char,
    out_disconnected: *mut usize,
) -> i32 {
    guard("signal_disconnect_all", || {
        let disconnected = bridge().disconnect_signal(required_str(name, "name")?)?;
        if let Some(out) = out_disconnected.as_mut() {
            *out = disconnected;
        }
        Ok(())
    })
}

/// # Safety
/// `out_count` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn flow_signal_count(out_count: *mut usize) -> i32 {
    guard("signal_count", || {
        *out_ref(out_count, "out_count")? = bridge().signal_count();
        Ok(())
    })
}

/// Writes the registered signal names as a JSON array string. Free it with
/// [`flow_string_free`].
///
/// # Safety
/// `out_json` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn flow_signal_names(out_json: *mut *mut c_char) -> i32 {
    guard("signal_names", || {
        let out = out_ref(out_json, "out_json")?;
        let json = serde_json::to_string(&bridge().signal_names())?;
        *out = to_c_string(json).into_raw();
        Ok(())
    })
}

/// Copies a string into memory owned by this library.
///
/// # Safety
/// `text` must be null or NUL-terminated. Free the result with [`flow_string_free`].
#[no_mangle]
pub unsafe extern "C" fn flow_string_create(text: *const c_char) -> *mut c_char {
    if text.is_null() {
        return ptr::null_mut();
    }
    CStr::from_ptr(text).to_owned().into_raw()
}

/// # Safety
/// `text` must be null or a pointer returned by this library, freed once.
#[no_mangle]
pub unsafe extern "C" fn flow_string_free(text: *mut c_char) {
    if !text.is_null() {
        drop(CString::from_raw(text));
    }
}

/// Message of the last failed call on this thread, or null.
/// Valid until the next `flow_*` call on the same thread.
#[no_mangle]
pub extern "C" fn flow_last_error() -> *const c_char {
    LAST_ERROR.with(|last| match &*last.borrow() {
        Some(message) => message.as_ptr(),
        None => ptr::null(),
    })
}

/// Cancels every subscription and shuts every scheduler down.
#[no_mangle]
pub extern "C" fn flow_shutdown() -> i32 {
    guard("shutdown", || {
        bridge().shutdown();
        Ok(())
    })
}
