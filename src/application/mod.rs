pub mod detector;
pub mod ports;

#[cfg(test)]
pub(crate) mod test_utils;

pub use detector::Detector;
