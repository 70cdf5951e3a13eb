mod magic_engine;

pub use magic_engine::{MagicEngine, MagicLibrary, NativeFailure};

#[cfg(test)]
pub use magic_engine::MockMagicLibrary;
