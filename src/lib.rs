//! # magic-detect - Thread-safe content type detection
//!
//! A safe facade over a libmagic-style detection engine whose native handle
//! must never be used by two threads at once.
//!
//! ## Architecture Layers
//!
//! - **Domain**: Flags, search paths, error kinds
//! - **Application**: The [`Detector`] facade and the engine ports it drives
//! - **Infrastructure**: Engine adapters (built-in signatures, system libmagic)
//!
//! ## Example Usage
//!
//! ```no_run
//! # #[cfg(feature = "signatures")]
//! # fn example() -> Result<(), magic_detect::MagicError> {
//! use std::sync::Arc;
//! use magic_detect::{infrastructure::signatures::SignatureLibrary, Detector, Flags};
//!
//! let detector = Detector::with_flags(Arc::new(SignatureLibrary::new()), Flags::MIME_TYPE)?;
//! detector.load::<&str>(&[])?;
//! println!("{}", detector.identify_file("/bin/sh")?);
//! # Ok(())
//! # }
//! ```

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use application::ports::{MagicEngine, MagicLibrary, NativeFailure};
pub use application::Detector;
pub use config::{Backend, Config, ConfigError};
pub use domain::errors::MagicError;
pub use domain::value_objects::{Flags, FlagsParseError, SearchPath};
