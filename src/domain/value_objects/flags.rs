use std::collections::HashMap;
use std::ops::{BitAnd, BitOr, BitOrAssign};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Engine flag bitmask.
///
/// The facade never interprets these bits; the values mirror libmagic's
/// `MAGIC_*` constants and are forwarded to the engine untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Flags(i32);

impl Flags {
    pub const NONE: Flags = Flags(0x000_0000);
    pub const DEBUG: Flags = Flags(0x000_0001);
    pub const SYMLINK: Flags = Flags(0x000_0002);
    pub const COMPRESS: Flags = Flags(0x000_0004);
    pub const DEVICES: Flags = Flags(0x000_0008);
    pub const MIME_TYPE: Flags = Flags(0x000_0010);
    pub const CONTINUE: Flags = Flags(0x000_0020);
    pub const CHECK: Flags = Flags(0x000_0040);
    pub const PRESERVE_ATIME: Flags = Flags(0x000_0080);
    pub const RAW: Flags = Flags(0x000_0100);
    pub const ERROR: Flags = Flags(0x000_0200);
    pub const MIME_ENCODING: Flags = Flags(0x000_0400);
    pub const MIME: Flags = Flags(Self::MIME_TYPE.0 | Self::MIME_ENCODING.0);
    pub const APPLE: Flags = Flags(0x000_0800);
    pub const EXTENSION: Flags = Flags(0x100_0000);
    pub const COMPRESS_TRANSP: Flags = Flags(0x200_0000);

    pub const NO_CHECK_COMPRESS: Flags = Flags(0x000_1000);
    pub const NO_CHECK_TAR: Flags = Flags(0x000_2000);
    pub const NO_CHECK_SOFT: Flags = Flags(0x000_4000);
    pub const NO_CHECK_APPTYPE: Flags = Flags(0x000_8000);
    pub const NO_CHECK_ELF: Flags = Flags(0x001_0000);
    pub const NO_CHECK_TEXT: Flags = Flags(0x002_0000);
    pub const NO_CHECK_CDF: Flags = Flags(0x004_0000);
    pub const NO_CHECK_CSV: Flags = Flags(0x008_0000);
    pub const NO_CHECK_TOKENS: Flags = Flags(0x010_0000);
    pub const NO_CHECK_ENCODING: Flags = Flags(0x020_0000);
    pub const NO_CHECK_JSON: Flags = Flags(0x040_0000);
    // NO_CHECK_SOFT is deliberately not part of the builtin set
    pub const NO_CHECK_BUILTIN: Flags = Flags(
        Self::NO_CHECK_COMPRESS.0
            | Self::NO_CHECK_TAR.0
            | Self::NO_CHECK_APPTYPE.0
            | Self::NO_CHECK_ELF.0
            | Self::NO_CHECK_TEXT.0
            | Self::NO_CHECK_CSV.0
            | Self::NO_CHECK_CDF.0
            | Self::NO_CHECK_TOKENS.0
            | Self::NO_CHECK_ENCODING.0
            | Self::NO_CHECK_JSON.0,
    );

    // Legacy aliases kept for source compatibility with older engines
    pub const NO_CHECK_ASCII: Flags = Self::NO_CHECK_TEXT;
    pub const NO_CHECK_FORTRAN: Flags = Flags(0);
    pub const NO_CHECK_TROFF: Flags = Flags(0);

    /// Every bit some named flag occupies.
    pub const KNOWN_BITS: Flags = Flags(
        0x000_0fff | Self::NO_CHECK_SOFT.0 | Self::NO_CHECK_BUILTIN.0 | 0x300_0000,
    );

    pub const fn from_bits(bits: i32) -> Self {
        Flags(bits)
    }

    pub const fn bits(self) -> i32 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True if every bit of `other` is set in `self`.
    pub const fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: Flags) -> bool {
        self.0 & other.0 != 0
    }

    /// Bits that no named flag covers.
    pub const fn unknown_bits(self) -> i32 {
        self.0 & !Self::KNOWN_BITS.0
    }

    /// All named constants, composite ones included, in declaration order.
    pub fn named() -> &'static [(&'static str, Flags)] {
        NAMED_FLAGS
    }
}

/// Name table exposed to callers (CLI listing, config parsing).
const NAMED_FLAGS: &[(&str, Flags)] = &[
    ("NONE", Flags::NONE),
    ("DEBUG", Flags::DEBUG),
    ("SYMLINK", Flags::SYMLINK),
    ("COMPRESS", Flags::COMPRESS),
    ("DEVICES", Flags::DEVICES),
    ("MIME_TYPE", Flags::MIME_TYPE),
    ("CONTINUE", Flags::CONTINUE),
    ("CHECK", Flags::CHECK),
    ("PRESERVE_ATIME", Flags::PRESERVE_ATIME),
    ("RAW", Flags::RAW),
    ("ERROR", Flags::ERROR),
    ("MIME_ENCODING", Flags::MIME_ENCODING),
    ("MIME", Flags::MIME),
    ("APPLE", Flags::APPLE),
    ("EXTENSION", Flags::EXTENSION),
    ("COMPRESS_TRANSP", Flags::COMPRESS_TRANSP),
    ("NO_CHECK_COMPRESS", Flags::NO_CHECK_COMPRESS),
    ("NO_CHECK_TAR", Flags::NO_CHECK_TAR),
    ("NO_CHECK_SOFT", Flags::NO_CHECK_SOFT),
    ("NO_CHECK_APPTYPE", Flags::NO_CHECK_APPTYPE),
    ("NO_CHECK_ELF", Flags::NO_CHECK_ELF),
    ("NO_CHECK_TEXT", Flags::NO_CHECK_TEXT),
    ("NO_CHECK_CDF", Flags::NO_CHECK_CDF),
    ("NO_CHECK_CSV", Flags::NO_CHECK_CSV),
    ("NO_CHECK_TOKENS", Flags::NO_CHECK_TOKENS),
    ("NO_CHECK_ENCODING", Flags::NO_CHECK_ENCODING),
    ("NO_CHECK_JSON", Flags::NO_CHECK_JSON),
    ("NO_CHECK_BUILTIN", Flags::NO_CHECK_BUILTIN),
    ("NO_CHECK_ASCII", Flags::NO_CHECK_ASCII),
    ("NO_CHECK_FORTRAN", Flags::NO_CHECK_FORTRAN),
    ("NO_CHECK_TROFF", Flags::NO_CHECK_TROFF),
];

static FLAGS_BY_NAME: Lazy<HashMap<&'static str, Flags>> =
    Lazy::new(|| NAMED_FLAGS.iter().copied().collect());

/// Single-bit flags used when rendering a mask back into names.
const DISPLAY_ORDER: &[(&str, Flags)] = &[
    ("DEBUG", Flags::DEBUG),
    ("SYMLINK", Flags::SYMLINK),
    ("COMPRESS", Flags::COMPRESS),
    ("DEVICES", Flags::DEVICES),
    ("MIME_TYPE", Flags::MIME_TYPE),
    ("CONTINUE", Flags::CONTINUE),
    ("CHECK", Flags::CHECK),
    ("PRESERVE_ATIME", Flags::PRESERVE_ATIME),
    ("RAW", Flags::RAW),
    ("ERROR", Flags::ERROR),
    ("MIME_ENCODING", Flags::MIME_ENCODING),
    ("APPLE", Flags::APPLE),
    ("EXTENSION", Flags::EXTENSION),
    ("COMPRESS_TRANSP", Flags::COMPRESS_TRANSP),
    ("NO_CHECK_COMPRESS", Flags::NO_CHECK_COMPRESS),
    ("NO_CHECK_TAR", Flags::NO_CHECK_TAR),
    ("NO_CHECK_SOFT", Flags::NO_CHECK_SOFT),
    ("NO_CHECK_APPTYPE", Flags::NO_CHECK_APPTYPE),
    ("NO_CHECK_ELF", Flags::NO_CHECK_ELF),
    ("NO_CHECK_TEXT", Flags::NO_CHECK_TEXT),
    ("NO_CHECK_CDF", Flags::NO_CHECK_CDF),
    ("NO_CHECK_CSV", Flags::NO_CHECK_CSV),
    ("NO_CHECK_TOKENS", Flags::NO_CHECK_TOKENS),
    ("NO_CHECK_ENCODING", Flags::NO_CHECK_ENCODING),
    ("NO_CHECK_JSON", Flags::NO_CHECK_JSON),
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlagsParseError {
    #[error("Unknown flag name: {0}")]
    UnknownName(String),

    #[error("Invalid flag value: {0}")]
    InvalidNumber(String),
}

impl From<i32> for Flags {
    fn from(bits: i32) -> Self {
        Flags(bits)
    }
}

impl From<Flags> for i32 {
    fn from(flags: Flags) -> Self {
        flags.0
    }
}

impl BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

impl BitOrAssign for Flags {
    fn bitor_assign(&mut self, rhs: Flags) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Flags {
    type Output = Flags;

    fn bitand(self, rhs: Flags) -> Flags {
        Flags(self.0 & rhs.0)
    }
}

impl std::fmt::Display for Flags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "NONE");
        }

        let mut parts: Vec<String> = DISPLAY_ORDER
            .iter()
            .filter(|(_, flag)| self.contains(*flag))
            .map(|(name, _)| name.to_string())
            .collect();

        let unknown = self.unknown_bits();
        if unknown != 0 {
            parts.push(format!("{:#x}", unknown));
        }

        write!(f, "{}", parts.join("|"))
    }
}

impl std::str::FromStr for Flags {
    type Err = FlagsParseError;

    /// Parses `|`- or `,`-separated flag names (case-insensitive) or
    /// decimal / `0x` hexadecimal numbers.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut flags = Flags::NONE;

        for token in s.split(['|', ',']).map(str::trim).filter(|t| !t.is_empty()) {
            flags |= parse_token(token)?;
        }

        Ok(flags)
    }
}

fn parse_token(token: &str) -> Result<Flags, FlagsParseError> {
    if token.starts_with(|c: char| c.is_ascii_digit()) {
        let parsed = match token
            .strip_prefix("0x")
            .or_else(|| token.strip_prefix("0X"))
        {
            // Display renders the sign bit as 0x80000000, so read hex as u32
            Some(hex) => u32::from_str_radix(hex, 16).map(|bits| bits as i32),
            None => token.parse::<i32>(),
        };
        return parsed
            .map(Flags)
            .map_err(|_| FlagsParseError::InvalidNumber(token.to_string()));
    }

    let name = token.to_ascii_uppercase().replace('-', "_");
    FLAGS_BY_NAME
        .get(name.as_str())
        .copied()
        .ok_or_else(|| FlagsParseError::UnknownName(token.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_match_engine_constants() {
        assert_eq!(Flags::MIME.bits(), 1040);
        assert_eq!(Flags::MIME_TYPE.bits(), 16);
        assert_eq!(Flags::MIME_ENCODING.bits(), 1024);
        assert_eq!(Flags::NO_CHECK_ASCII, Flags::NO_CHECK_TEXT);
        assert!(Flags::NO_CHECK_FORTRAN.is_empty());
        assert!(!Flags::NO_CHECK_BUILTIN.contains(Flags::NO_CHECK_SOFT));
        assert!(Flags::NO_CHECK_BUILTIN.contains(Flags::NO_CHECK_ELF));
    }

    #[test]
    fn test_sign_bit_survives_display_and_parse() {
        let flags = Flags::from_bits(i32::MIN) | Flags::MIME;
        let rendered = flags.to_string();

        assert_eq!(rendered, "MIME_TYPE|MIME_ENCODING|0x80000000");
        assert_eq!(rendered.parse::<Flags>(), Ok(flags));
        let all = Flags::from_bits(-1);
        assert_eq!(all.to_string().parse::<Flags>(), Ok(all));
    }

    #[test]
    fn test_every_named_flag_is_known() {
        for (name, flag) in Flags::named() {
            assert_eq!(flag.unknown_bits(), 0, "{} has unknown bits", name);
        }
    }

    #[test]
    fn test_parse_names_case_insensitive() {
        let flags: Flags = "mime_type | Symlink".parse().unwrap();
        assert_eq!(flags, Flags::MIME_TYPE | Flags::SYMLINK);

        let flags: Flags = "mime-encoding,compress".parse().unwrap();
        assert_eq!(flags, Flags::MIME_ENCODING | Flags::COMPRESS);
    }

    #[test]
    fn test_parse_numbers() {
        assert_eq!("1040".parse::<Flags>().unwrap(), Flags::MIME);
        assert_eq!("0x10".parse::<Flags>().unwrap(), Flags::MIME_TYPE);
        assert_eq!("".parse::<Flags>().unwrap(), Flags::NONE);
    }

    #[test]
    fn test_parse_rejects_unknown_names() {
        let err = "mime|bogus".parse::<Flags>().unwrap_err();
        assert_eq!(err, FlagsParseError::UnknownName("bogus".to_string()));

        let err = "0xzz".parse::<Flags>().unwrap_err();
        assert!(matches!(err, FlagsParseError::InvalidNumber(_)));
    }

    #[test]
    fn test_display_lists_single_bits() {
        assert_eq!(Flags::NONE.to_string(), "NONE");
        assert_eq!(Flags::MIME.to_string(), "MIME_TYPE|MIME_ENCODING");
        assert_eq!(Flags::from_bits(0x4000_0000).to_string(), "0x40000000");
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        let flags = Flags::SYMLINK | Flags::COMPRESS | Flags::NO_CHECK_TAR;
        let parsed: Flags = flags.to_string().parse().unwrap();
        assert_eq!(parsed, flags);
    }

    #[test]
    fn test_serializes_as_plain_integer() {
        let json = serde_json::to_string(&Flags::MIME).unwrap();
        assert_eq!(json, "1040");
        let back: Flags = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Flags::MIME);
    }
}
