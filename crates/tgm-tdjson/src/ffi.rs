//! Raw bindings to the `td_json_client` C interface.

use std::ffi::{c_char, c_double, c_int, CStr, CString};

use tgm_core::{errors::Error, Result};

#[link(name = "tdjson")]
extern "C" {
    fn td_create_client_id() -> c_int;
    fn td_send(client_id: c_int, request: *const c_char);
    fn td_receive(timeout: c_double) -> *const c_char;
    fn td_execute(request: *const c_char) -> *const c_char;
    fn td_set_log_message_callback(
        max_verbosity_level: c_int,
        callback: Option<extern "C" fn(c_int, *const c_char)>,
    );
}

pub(crate) fn create_client_id() -> i32 {
    // SAFETY: no arguments; TDLib allocates the id.
    unsafe { td_create_client_id() }
}

pub(crate) fn send(client_id: i32, payload: &str) -> Result<()> {
    let request = to_c_string(payload)?;
    // SAFETY: `request` is a valid NUL-terminated string that outlives the call.
    unsafe { td_send(client_id, request.as_ptr()) };
    Ok(())
}

/// The returned pointer is only valid until the next `td_receive`, so the
/// text is copied before returning.
pub(crate) fn receive(timeout_secs: f64) -> Result<Option<String>> {
    // SAFETY: timeout is a plain double.
    let raw = unsafe { td_receive(timeout_secs) };
    copy_reply(raw)
}

pub(crate) fn execute(payload: &str) -> Result<Option<String>> {
    let request = to_c_string(payload)?;
    // SAFETY: `request` is valid for the duration of the call.
    let raw = unsafe { td_execute(request.as_ptr()) };
    copy_reply(raw)
}

pub(crate) fn set_log_message_callback(max_verbosity: i32) {
    // SAFETY: `on_log_message` is a plain extern fn with a 'static lifetime.
    unsafe { td_set_log_message_callback(max_verbosity, Some(on_log_message)) };
}

extern "C" fn on_log_message(verbosity_level: c_int, message: *const c_char) {
    if message.is_null() {
        return;
    }
    // SAFETY: TDLib passes a NUL-terminated string valid for this call.
    let text = unsafe { CStr::from_ptr(message) }.to_string_lossy();
    crate::handle_log_message(verbosity_level, &text);
}

fn to_c_string(payload: &str) -> Result<CString> {
    CString::new(payload).map_err(|e| Error::Transport(format!("request contains NUL: {e}")))
}

fn copy_reply(raw: *const c_char) -> Result<Option<String>> {
    if raw.is_null() {
        return Ok(None);
    }
    // SAFETY: non-null pointers from TDLib are NUL-terminated strings.
    let text = unsafe { CStr::from_ptr(raw) }
        .to_str()
        .map_err(|e| Error::Transport(format!("reply is not UTF-8: {e}")))?;
    Ok(Some(text.to_owned()))
}
