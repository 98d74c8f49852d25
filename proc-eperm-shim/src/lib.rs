//! `LD_PRELOAD` shim that reports `EACCES` instead of `EPERM` for failed
//! `/proc/...` symlink and status lookups.
//!
//! Under proot, `readlink("/proc/<pid>/exe")` and friends can fail with
//! `EPERM`. `nix gc` walks `/proc` while looking for roots and tolerates
//! `EACCES` there, but treats `EPERM` as fatal. Preloading this library makes
//! the emulated environment answer the way a kernel would:
//!
//! ```text
//! cargo build --release -p proc-eperm-shim
//! LD_PRELOAD=$PWD/target/release/libproc_eperm_shim.so nix-collect-garbage
//! ```
//!
//! Intercepted: `readlink`, `readlinkat`, `lstat`, `fstatat`. Every call is
//! forwarded unchanged to the next definition in the loader's search order;
//! only errno is touched, and only after a failure.

use libc::{c_char, c_int, size_t, ssize_t, stat};
use proc_eperm_macro::interpose;

mod errno;
mod remap;

#[interpose(symbol = "readlink")]
fn proc_readlink(
    real: unsafe extern "C" fn(path: *const c_char, buf: *mut c_char, bufsiz: size_t) -> ssize_t,
    path: *const c_char,
    buf: *mut c_char,
    bufsiz: size_t,
) -> ssize_t {
    unsafe { remap::filter(real(path, buf, bufsiz), path) }
}

// dirfd is forwarded but never consulted: the remap only looks at absolute /proc paths.
#[interpose(symbol = "readlinkat")]
fn proc_readlinkat(
    real: unsafe extern "C" fn(
        dirfd: c_int,
        path: *const c_char,
        buf: *mut c_char,
        bufsiz: size_t,
    ) -> ssize_t,
    dirfd: c_int,
    path: *const c_char,
    buf: *mut c_char,
    bufsiz: size_t,
) -> ssize_t {
    unsafe { remap::filter(real(dirfd, path, buf, bufsiz), path) }
}

#[interpose(symbol = "lstat")]
fn proc_lstat(
    real: unsafe extern "C" fn(path: *const c_char, statbuf: *mut stat) -> c_int,
    path: *const c_char,
    statbuf: *mut stat,
) -> c_int {
    unsafe { remap::filter(real(path, statbuf), path) }
}

#[interpose(symbol = "fstatat")]
fn proc_fstatat(
    real: unsafe extern "C" fn(dirfd: c_int, path: *const c_char, statbuf: *mut stat, flags: c_int) -> c_int,
    dirfd: c_int,
    path: *const c_char,
    statbuf: *mut stat,
    flags: c_int,
) -> c_int {
    unsafe { remap::filter(real(dirfd, path, statbuf, flags), path) }
}
