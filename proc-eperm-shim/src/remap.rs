//! The `/proc` errno remap applied after a failed genuine call.
//!
//! proot answers some `/proc` lookups with `EPERM` where a kernel answers
//! `EACCES`. Only that pair, and only under `/proc/`, is rewritten; an `EPERM`
//! anywhere else is a real permission failure and is left alone.

use std::ffi::CStr;

use libc::{c_char, c_int, ssize_t};

use crate::errno;

pub(crate) const PROC_PREFIX: &[u8] = b"/proc/";

/// Return value of a C call that signals failure through errno.
pub(crate) trait FailureSentinel: Copy {
    fn is_failure(self) -> bool;
}

impl FailureSentinel for c_int {
    #[inline]
    fn is_failure(self) -> bool {
        self == -1
    }
}

impl FailureSentinel for ssize_t {
    #[inline]
    fn is_failure(self) -> bool {
        self == -1
    }
}

/// The errno a caller should see for a failure with `errno` on `path`, if it
/// differs from `errno`.
pub(crate) fn remapped_errno(errno: c_int, path: &[u8]) -> Option<c_int> {
    (errno == libc::EPERM && path.starts_with(PROC_PREFIX)).then_some(libc::EACCES)
}

/// Rewrites the thread's errno for `path` after a failed call.
///
/// # Safety
///
/// `path` must be null or point to a NUL-terminated string.
pub(crate) unsafe fn fix_errno(path: *const c_char) {
    if path.is_null() {
        return;
    }
    let path = CStr::from_ptr(path).to_bytes();
    if let Some(remapped) = remapped_errno(errno::get(), path) {
        errno::set(remapped);
    }
}

/// Passes `ret` through, fixing errno first when it is the failure sentinel.
///
/// # Safety
///
/// Same contract as [`fix_errno`].
#[inline]
pub(crate) unsafe fn filter<R: FailureSentinel>(ret: R, path: *const c_char) -> R {
    if ret.is_failure() {
        fix_errno(path);
    }
    ret
}
