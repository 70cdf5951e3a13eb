//! Raw declarations for the system libmagic.
#![allow(non_camel_case_types)]

use libc::{c_char, c_int, c_void, size_t};

/// Opaque libmagic session (`struct magic_set`).
#[repr(C)]
pub struct magic_set {
    _private: [u8; 0],
}

pub type magic_t = *mut magic_set;

/// `magic_getpath` action selecting the load path.
pub const FILE_LOAD: c_int = 0;

#[link(name = "magic")]
extern "C" {
    pub fn magic_open(flags: c_int) -> magic_t;
    pub fn magic_close(cookie: magic_t);

    pub fn magic_getpath(magicfile: *const c_char, action: c_int) -> *const c_char;
    /// Resolved at link time; libraries that predate it fail to link.
    pub fn magic_version() -> c_int;

    pub fn magic_setflags(cookie: magic_t, flags: c_int) -> c_int;
    pub fn magic_load(cookie: magic_t, filename: *const c_char) -> c_int;
    pub fn magic_check(cookie: magic_t, filename: *const c_char) -> c_int;
    pub fn magic_compile(cookie: magic_t, filename: *const c_char) -> c_int;

    pub fn magic_file(cookie: magic_t, filename: *const c_char) -> *const c_char;
    pub fn magic_descriptor(cookie: magic_t, fd: c_int) -> *const c_char;
    pub fn magic_buffer(cookie: magic_t, buffer: *const c_void, length: size_t) -> *const c_char;

    pub fn magic_error(cookie: magic_t) -> *const c_char;
    pub fn magic_errno(cookie: magic_t) -> c_int;
}
