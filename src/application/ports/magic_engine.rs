#[cfg(test)]
use mockall::automock;
use thiserror::Error;

use crate::domain::value_objects::Flags;

/// Raw failure returned by an engine primitive.
///
/// `errno` is the OS error number observed right after the failing call
/// (0 when the engine left none). It is what the facade dispatches on for
/// flag errors; the engine's own message and code are read separately via
/// [`MagicEngine::last_error`] and [`MagicEngine::last_errno`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("engine call failed (errno {errno})")]
pub struct NativeFailure {
    pub errno: i32,
}

impl NativeFailure {
    pub fn new(errno: i32) -> Self {
        Self { errno }
    }
}

/// One open engine session.
///
/// Implementations are not reentrant: the facade guarantees at most one
/// call is in flight per handle. Dropping the handle releases it.
pub trait MagicEngine: Send {
    fn set_flags(&mut self, flags: Flags) -> Result<(), NativeFailure>;

    /// Load a database; `None` means the engine's compiled-in default.
    fn load(&mut self, path: Option<&str>) -> Result<(), NativeFailure>;

    /// Validate a database without installing it.
    fn check(&mut self, path: Option<&str>) -> Result<(), NativeFailure>;

    /// Write compiled database artifacts next to the sources.
    fn compile(&mut self, path: Option<&str>) -> Result<(), NativeFailure>;

    fn file(&mut self, path: &str) -> Result<String, NativeFailure>;

    /// Classify an open descriptor owned by the caller.
    fn descriptor(&mut self, fd: i32) -> Result<String, NativeFailure>;

    fn buffer(&mut self, bytes: &[u8]) -> Result<String, NativeFailure>;

    /// Message describing the last failure, if the engine kept one.
    fn last_error(&self) -> Option<String>;

    /// Errno recorded alongside [`MagicEngine::last_error`].
    fn last_errno(&self) -> i32;
}

/// Process-wide entry points of an engine implementation.
#[cfg_attr(test, automock)]
pub trait MagicLibrary: Send + Sync {
    /// Allocate a new session; `None` on allocation failure.
    fn open(&self, flags: Flags) -> Option<Box<dyn MagicEngine>>;

    /// Colon-delimited default database path.
    fn default_path(&self) -> String;

    fn version(&self) -> Result<i32, NativeFailure>;

    /// Short identifier used in logs.
    fn name(&self) -> &'static str;
}
