#[cfg(feature = "libmagic")]
pub mod libmagic;
#[cfg(feature = "signatures")]
pub mod signatures;
