//! OS error numbers the engines report and the facade dispatches on.
//!
//! Only the handful of values that change how a failure is classified are
//! listed here; they come straight from the platform's `libc`.

pub use libc::{EBADF, EFAULT, EINVAL, ENOENT, ENOSYS};

/// Errno of the most recent failed OS call on this thread, or 0.
pub fn last_os_errno() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}
