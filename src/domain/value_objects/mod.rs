mod flags;
mod search_path;

pub use flags::{Flags, FlagsParseError};
pub use search_path::{SearchPath, PATH_SEPARATOR};
