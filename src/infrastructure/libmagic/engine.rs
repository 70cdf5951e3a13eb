use std::ffi::{CStr, CString};
use std::ptr::{self, NonNull};

use libc::{c_char, c_int, c_void};
use tracing::debug;

use super::ffi;
use crate::application::ports::{MagicEngine, MagicLibrary, NativeFailure};
use crate::domain::errno::{last_os_errno, EINVAL};
use crate::domain::value_objects::Flags;

/// Copy a C string owned by libmagic before the next call invalidates it.
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated string that stays valid
/// for the duration of this call.
unsafe fn owned_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        None
    } else {
        Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
    }
}

/// Process-wide entry points of the system libmagic.
#[derive(Debug, Clone, Copy, Default)]
pub struct LibMagic;

impl LibMagic {
    pub fn new() -> Self {
        Self
    }
}

impl MagicLibrary for LibMagic {
    fn open(&self, flags: Flags) -> Option<Box<dyn MagicEngine>> {
        // SAFETY: magic_open has no preconditions; null means allocation failed.
        let cookie = NonNull::new(unsafe { ffi::magic_open(flags.bits()) })?;
        Some(Box::new(LibMagicEngine {
            cookie,
            local_error: None,
        }))
    }

    fn default_path(&self) -> String {
        // SAFETY: a null magicfile asks for the default; the result points
        // to static or environment storage owned by libmagic.
        unsafe { owned_string(ffi::magic_getpath(ptr::null(), ffi::FILE_LOAD)) }
            .unwrap_or_default()
    }

    /// Linked libmagic version, e.g. `545` for 5.45.
    ///
    /// `magic_version` is bound at link time, so a libmagic that does not
    /// export it fails to link rather than reporting `ENOSYS` here. The
    /// error branch only covers a library that returns a negative version.
    fn version(&self) -> Result<i32, NativeFailure> {
        // SAFETY: magic_version has no preconditions.
        let version = unsafe { ffi::magic_version() };
        if version < 0 {
            Err(NativeFailure::new(last_os_errno()))
        } else {
            Ok(version)
        }
    }

    fn name(&self) -> &'static str {
        "libmagic"
    }
}

/// One libmagic cookie.
pub struct LibMagicEngine {
    cookie: NonNull<ffi::magic_set>,
    /// Failures raised before reaching libmagic (e.g. NUL in a path)
    local_error: Option<(String, i32)>,
}

// SAFETY: a cookie may move between threads; the detector guarantees it is
// never used by two threads at once.
unsafe impl Send for LibMagicEngine {}

impl LibMagicEngine {
    fn raw(&self) -> ffi::magic_t {
        self.cookie.as_ptr()
    }

    fn c_string(&mut self, value: &str) -> Result<CString, NativeFailure> {
        CString::new(value).map_err(|_| {
            self.local_error = Some((format!("path contains a NUL byte: {:?}", value), EINVAL));
            NativeFailure::new(EINVAL)
        })
    }

    fn status(&mut self, rv: c_int) -> Result<(), NativeFailure> {
        if rv < 0 {
            Err(NativeFailure::new(last_os_errno()))
        } else {
            Ok(())
        }
    }

    /// Run a load-style call with an optional database path.
    fn with_path(
        &mut self,
        path: Option<&str>,
        call: unsafe extern "C" fn(ffi::magic_t, *const c_char) -> c_int,
    ) -> Result<(), NativeFailure> {
        self.local_error = None;
        let path = path.map(|p| self.c_string(p)).transpose()?;
        let path_ptr = path.as_ref().map_or(ptr::null(), |p| p.as_ptr());

        // SAFETY: the cookie is live for the lifetime of self and `path_ptr`
        // is null or borrows `path`, which outlives the call.
        let rv = unsafe { call(self.raw(), path_ptr) };
        self.status(rv)
    }

    fn classification(&mut self, result: *const c_char) -> Result<String, NativeFailure> {
        // SAFETY: libmagic returns null or a string owned by the cookie that
        // stays valid until the next call on it, which cannot happen before
        // we copy it.
        match unsafe { owned_string(result) } {
            Some(text) => Ok(text),
            None => Err(NativeFailure::new(last_os_errno())),
        }
    }
}

impl MagicEngine for LibMagicEngine {
    fn set_flags(&mut self, flags: Flags) -> Result<(), NativeFailure> {
        self.local_error = None;
        // SAFETY: live cookie.
        let rv = unsafe { ffi::magic_setflags(self.raw(), flags.bits()) };
        self.status(rv)
    }

    fn load(&mut self, path: Option<&str>) -> Result<(), NativeFailure> {
        self.with_path(path, ffi::magic_load)
    }

    fn check(&mut self, path: Option<&str>) -> Result<(), NativeFailure> {
        self.with_path(path, ffi::magic_check)
    }

    fn compile(&mut self, path: Option<&str>) -> Result<(), NativeFailure> {
        self.with_path(path, ffi::magic_compile)
    }

    fn file(&mut self, path: &str) -> Result<String, NativeFailure> {
        self.local_error = None;
        let path = self.c_string(path)?;
        // SAFETY: live cookie; `path` outlives the call.
        let result = unsafe { ffi::magic_file(self.raw(), path.as_ptr()) };
        self.classification(result)
    }

    fn descriptor(&mut self, fd: i32) -> Result<String, NativeFailure> {
        self.local_error = None;
        // SAFETY: live cookie; libmagic neither closes nor takes ownership
        // of the descriptor.
        let result = unsafe { ffi::magic_descriptor(self.raw(), fd) };
        self.classification(result)
    }

    fn buffer(&mut self, bytes: &[u8]) -> Result<String, NativeFailure> {
        self.local_error = None;
        // SAFETY: live cookie; the slice is valid for `bytes.len()` bytes.
        let result = unsafe {
            ffi::magic_buffer(self.raw(), bytes.as_ptr() as *const c_void, bytes.len())
        };
        self.classification(result)
    }

    fn last_error(&self) -> Option<String> {
        if let Some((message, _)) = &self.local_error {
            return Some(message.clone());
        }
        // SAFETY: live cookie; the message is copied immediately.
        unsafe { owned_string(ffi::magic_error(self.raw())) }
    }

    fn last_errno(&self) -> i32 {
        if let Some((_, errno)) = &self.local_error {
            return *errno;
        }
        // SAFETY: live cookie.
        unsafe { ffi::magic_errno(self.raw()) }
    }
}

impl Drop for LibMagicEngine {
    fn drop(&mut self) {
        debug!("Releasing libmagic cookie");
        // SAFETY: the cookie came from magic_open and is closed exactly once.
        unsafe { ffi::magic_close(self.raw()) };
    }
}
