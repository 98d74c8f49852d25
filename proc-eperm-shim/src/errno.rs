//! Access to the calling thread's `errno`.

use libc::c_int;

#[cfg(any(target_os = "linux", target_os = "emscripten", target_os = "redox"))]
#[inline]
fn location() -> *mut c_int {
    unsafe { libc::__errno_location() }
}

#[cfg(target_os = "android")]
#[inline]
fn location() -> *mut c_int {
    unsafe { libc::__errno() }
}

#[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
#[inline]
fn location() -> *mut c_int {
    unsafe { libc::__error() }
}

#[inline]
pub(crate) fn get() -> c_int {
    // SAFETY: the location is thread-local and valid for the thread's lifetime.
    unsafe { *location() }
}

#[inline]
pub(crate) fn set(value: c_int) {
    // SAFETY: see `get`.
    unsafe { *location() = value }
}
