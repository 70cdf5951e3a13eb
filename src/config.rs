use thiserror::Error;

use crate::domain::value_objects::{Flags, FlagsParseError};

/// Environment variable the engines consult for a database path override.
pub const MAGIC_ENV: &str = "MAGIC";

/// Database path override from `MAGIC`. Any value counts, the empty
/// string included, because the engines only test for its presence.
pub fn magic_path_override(lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    lookup(MAGIC_ENV)
}

/// True when the process environment asks for the engine default path,
/// which the detector must then re-query instead of using its cache.
pub fn magic_path_overridden() -> bool {
    magic_path_override(|key| std::env::var_os(key).map(|v| v.to_string_lossy().into_owned()))
        .is_some()
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid backend: {0} (expected signatures or libmagic)")]
    InvalidBackend(String),

    #[error("Backend {0} is not compiled into this build")]
    BackendUnavailable(Backend),

    #[error("Invalid MAGIC_DETECT_FLAGS: {0}")]
    InvalidFlags(#[from] FlagsParseError),

    #[error("MAGIC_DETECT_CONCURRENCY must be between 1 and {max}, got {actual}")]
    InvalidConcurrency { actual: usize, max: usize },

    #[error("MAGIC_DETECT_LOG cannot be empty")]
    EmptyLogFilter,
}

/// Engine implementation to drive the detector with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Built-in signature table
    Signatures,
    /// System libmagic
    Libmagic,
}

impl Backend {
    pub fn is_available(self) -> bool {
        match self {
            Backend::Signatures => cfg!(feature = "signatures"),
            Backend::Libmagic => cfg!(feature = "libmagic"),
        }
    }
}

impl Default for Backend {
    fn default() -> Self {
        if cfg!(feature = "signatures") || !cfg!(feature = "libmagic") {
            Backend::Signatures
        } else {
            Backend::Libmagic
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Signatures => write!(f, "signatures"),
            Backend::Libmagic => write!(f, "libmagic"),
        }
    }
}

impl std::str::FromStr for Backend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "signatures" | "builtin" => Ok(Backend::Signatures),
            "libmagic" | "magic" => Ok(Backend::Libmagic),
            _ => Err(ConfigError::InvalidBackend(s.to_string())),
        }
    }
}

const MAX_CONCURRENCY: usize = 256;

#[derive(Debug, Clone)]
pub struct Config {
    /// Database path override (`MAGIC`)
    pub magic_path: Option<String>,
    /// Flag names applied to every new detector
    pub flags: String,
    pub backend: String,
    /// tracing-subscriber filter directive
    pub log_filter: String,
    /// Upper bound on classifications in flight at once
    pub concurrency: usize,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            magic_path: magic_path_override(&lookup),
            flags: lookup("MAGIC_DETECT_FLAGS").unwrap_or_default(),
            backend: lookup("MAGIC_DETECT_BACKEND")
                .unwrap_or_else(|| Backend::default().to_string()),
            log_filter: lookup("MAGIC_DETECT_LOG").unwrap_or_else(|| "warn".to_string()),
            concurrency: lookup("MAGIC_DETECT_CONCURRENCY")
                .and_then(|s| s.parse().ok())
                .unwrap_or(4),
        }
    }

    pub fn backend(&self) -> Result<Backend, ConfigError> {
        self.backend.parse()
    }

    pub fn default_flags(&self) -> Result<Flags, ConfigError> {
        Ok(self.flags.parse()?)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let backend = self.backend()?;
        if !backend.is_available() {
            return Err(ConfigError::BackendUnavailable(backend));
        }

        self.default_flags()?;

        if self.concurrency < 1 || self.concurrency > MAX_CONCURRENCY {
            return Err(ConfigError::InvalidConcurrency {
                actual: self.concurrency,
                max: MAX_CONCURRENCY,
            });
        }

        if self.log_filter.trim().is_empty() {
            return Err(ConfigError::EmptyLogFilter);
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}
