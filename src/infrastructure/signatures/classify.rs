use infer::MatcherType;

use crate::domain::value_objects::Flags;

/// How much of a file the signature engine inspects.
pub const SAMPLE_SIZE: usize = 64 * 1024;

/// Result of matching a sample, before it is rendered for the active flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub description: String,
    pub mime_type: &'static str,
    pub encoding: &'static str,
    pub extension: Option<&'static str>,
}

impl Classification {
    pub fn new(description: impl Into<String>, mime_type: &'static str, encoding: &'static str) -> Self {
        Self {
            description: description.into(),
            mime_type,
            encoding,
            extension: None,
        }
    }

    /// Render the way the flags ask for.
    pub fn render(&self, flags: Flags) -> String {
        if flags.contains(Flags::EXTENSION) {
            return self.extension.unwrap_or("???").to_string();
        }

        match (
            flags.contains(Flags::MIME_TYPE),
            flags.contains(Flags::MIME_ENCODING),
        ) {
            (true, true) => format!("{}; charset={}", self.mime_type, self.encoding),
            (true, false) => self.mime_type.to_string(),
            (false, true) => self.encoding.to_string(),
            (false, false) => self.description.clone(),
        }
    }
}

/// Classify an in-memory sample.
pub fn classify(bytes: &[u8], flags: Flags) -> Classification {
    if bytes.is_empty() {
        return Classification::new("empty", "application/x-empty", "binary");
    }

    if let Some(kind) = infer::get(bytes) {
        let encoding = match kind.matcher_type() {
            MatcherType::Text => text_encoding(bytes).unwrap_or("binary"),
            _ => "binary",
        };
        return Classification {
            description: describe(&kind),
            mime_type: kind.mime_type(),
            encoding,
            extension: Some(kind.extension()),
        };
    }

    if !flags.contains(Flags::NO_CHECK_TEXT) {
        match text_encoding(bytes) {
            Some("us-ascii") => return Classification::new("ASCII text", "text/plain", "us-ascii"),
            Some(encoding) => {
                return Classification::new("UTF-8 Unicode text", "text/plain", encoding)
            }
            None => {}
        }
    }

    Classification::new("data", "application/octet-stream", "binary")
}

fn describe(kind: &infer::Type) -> String {
    let noun = match kind.matcher_type() {
        MatcherType::App => "executable",
        MatcherType::Archive => "archive data",
        MatcherType::Audio => "audio data",
        MatcherType::Book => "e-book data",
        MatcherType::Doc => "document",
        MatcherType::Font => "font data",
        MatcherType::Image => "image data",
        MatcherType::Text => "text",
        MatcherType::Video => "video data",
        _ => "data",
    };
    format!("{} {}", kind.extension().to_uppercase(), noun)
}

/// `us-ascii` or `utf-8` for text-looking samples, `None` for binary data.
pub fn text_encoding(bytes: &[u8]) -> Option<&'static str> {
    let text = match std::str::from_utf8(bytes) {
        Ok(text) => text,
        // A multi-byte character cut off by the sample boundary is fine
        Err(e) if e.error_len().is_none() => {
            std::str::from_utf8(&bytes[..e.valid_up_to()]).ok()?
        }
        Err(_) => return None,
    };

    if text.chars().any(|c| c.is_control() && !is_text_control(c)) {
        return None;
    }

    if text.is_ascii() {
        Some("us-ascii")
    } else {
        Some("utf-8")
    }
}

fn is_text_control(c: char) -> bool {
    matches!(c, '\t' | '\n' | '\r' | '\x0c' | '\x08' | '\x1b')
}
