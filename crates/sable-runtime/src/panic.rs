// crates/sable-runtime/src/panic.rs
//! Fatal runtime errors.

use std::ffi::{CStr, c_char};
use std::process;

/// Prints the panic message and aborts the process. Called by generated
/// code for unrecoverable conditions (failed assertions, unwrapping an
/// absent optional).
///
/// # Safety
/// `message` must be a valid null-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sbl_panic(message: *const c_char) -> ! {
    // SAFETY: Caller guarantees a valid C string.
    let message = unsafe { CStr::from_ptr(message) };
    eprintln!("Program panicked: {}", message.to_string_lossy());
    process::abort();
}
