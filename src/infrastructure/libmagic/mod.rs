//! Adapter over the system libmagic, linked at build time.

mod engine;
mod ffi;

pub use engine::{LibMagic, LibMagicEngine};
