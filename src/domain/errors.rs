use thiserror::Error;

/// Message used when the engine fails without saying why.
pub const UNKNOWN_ERROR: &str = "unknown error";
/// Message for capabilities the linked engine does not provide.
pub const NOT_IMPLEMENTED: &str = "function is not implemented";
/// Message for flag bitmasks the engine refuses.
pub const INVALID_FLAGS: &str = "unknown or invalid flag specified";

/// Errors raised by the detector facade.
///
/// Every variant that originates in the engine carries the engine's errno
/// as `code`; `None` means the engine supplied no code with the failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MagicError {
    #[error("{message}")]
    Library { code: Option<i32>, message: String },

    #[error("{message}")]
    BadAddress { code: Option<i32>, message: String },

    #[error("{message}")]
    Flags { code: Option<i32>, message: String },

    #[error("{message}")]
    NotImplemented { code: Option<i32>, message: String },

    #[error("Magic library is not open")]
    Closed,

    #[error("Blocking worker failed: {0}")]
    Worker(String),
}

impl MagicError {
    /// Library error for an engine failure that came with no message.
    pub fn unknown() -> Self {
        MagicError::Library {
            code: None,
            message: UNKNOWN_ERROR.to_string(),
        }
    }

    pub fn not_implemented(code: i32) -> Self {
        MagicError::NotImplemented {
            code: Some(code),
            message: NOT_IMPLEMENTED.to_string(),
        }
    }

    pub fn invalid_flags(code: i32) -> Self {
        MagicError::Flags {
            code: Some(code),
            message: INVALID_FLAGS.to_string(),
        }
    }

    /// Native error code attached to the failure, if any.
    pub fn code(&self) -> Option<i32> {
        match self {
            MagicError::Library { code, .. }
            | MagicError::BadAddress { code, .. }
            | MagicError::Flags { code, .. }
            | MagicError::NotImplemented { code, .. } => *code,
            MagicError::Closed | MagicError::Worker(_) => None,
        }
    }

    /// True when the failure was reported by the engine rather than the facade.
    pub fn is_native(&self) -> bool {
        self.code().is_some()
    }
}
