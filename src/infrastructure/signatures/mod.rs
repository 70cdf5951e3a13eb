mod classify;
mod engine;

pub use classify::{classify, text_encoding, Classification, SAMPLE_SIZE};
pub use engine::{SignatureEngine, SignatureLibrary};
