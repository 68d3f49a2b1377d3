//! Upload-time MIME validation against glob patterns

use mediafiles_core::MediaVariant;
use regex::Regex;
use std::io::{Read, Seek};

use crate::error::ProcessingError;
use crate::mime::MimeSniffer;

/// Validation errors returned to the upload path
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Unsupported file type: {mime_type}")]
    UnsupportedMimeType { mime_type: String },

    #[error("Could not determine file type: {0}")]
    Undetectable(String),
}

impl ValidationError {
    /// The offending MIME type, when one was detected.
    pub fn mime_type(&self) -> Option<&str> {
        match self {
            ValidationError::UnsupportedMimeType { mime_type } => Some(mime_type),
            ValidationError::Undetectable(_) => None,
        }
    }
}

/// Translate a shell-style glob (`*`, `?`, `[...]`, `[!...]`) to an anchored,
/// case-insensitive regular expression.
fn glob_to_regex(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::from("(?i)^");
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '[' => {
                // Find the closing bracket; a ']' right after '[' or '[!' is literal
                let mut j = i + 1;
                if j < chars.len() && chars[j] == '!' {
                    j += 1;
                }
                if j < chars.len() && chars[j] == ']' {
                    j += 1;
                }
                while j < chars.len() && chars[j] != ']' {
                    j += 1;
                }

                if j >= chars.len() {
                    out.push_str(r"\[");
                } else {
                    let mut class: String = chars[i + 1..j].iter().collect();
                    if let Some(rest) = class.strip_prefix('!') {
                        class = format!("^{}", rest);
                    }
                    out.push('[');
                    out.push_str(&class.replace('\\', r"\\"));
                    out.push(']');
                    i = j;
                }
            }
            c => out.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }

    out.push('$');
    out
}

/// Accepts a file when its sniffed MIME type matches one of the patterns.
/// An empty pattern list accepts everything.
#[derive(Debug, Clone)]
pub struct MimeTypeValidator {
    patterns: Vec<String>,
    compiled: Vec<Regex>,
    sniffer: MimeSniffer,
}

impl MimeTypeValidator {
    pub fn new<I, S>(patterns: I) -> Result<Self, ProcessingError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns: Vec<String> = patterns.into_iter().map(Into::into).collect();
        let compiled = patterns
            .iter()
            .map(|p| {
                Regex::new(&glob_to_regex(p)).map_err(|e| {
                    ProcessingError::Configuration(format!("Invalid MIME pattern {}: {}", p, e))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            patterns,
            compiled,
            sniffer: MimeSniffer::default(),
        })
    }

    /// Validator for the variant's allowed patterns
    pub fn for_variant(variant: MediaVariant) -> Result<Self, ProcessingError> {
        Self::new(variant.allowed_mime_patterns().iter().copied())
    }

    pub fn with_sniffer(mut self, sniffer: MimeSniffer) -> Self {
        self.sniffer = sniffer;
        self
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn matches(&self, mime_type: &str) -> bool {
        self.compiled.is_empty() || self.compiled.iter().any(|re| re.is_match(mime_type))
    }

    /// Sniff `reader` and check the result, returning the detected type.
    pub fn validate<R: Read + Seek>(&self, reader: &mut R) -> Result<String, ValidationError> {
        if self.compiled.is_empty() {
            return Ok(self.sniffer.detect(reader).unwrap_or_default());
        }
        let mime_type = self
            .sniffer
            .detect(reader)
            .map_err(|e| ValidationError::Undetectable(e.to_string()))?;
        self.check(mime_type)
    }

    pub fn validate_bytes(&self, data: &[u8]) -> Result<String, ValidationError> {
        if self.compiled.is_empty() {
            return Ok(self.sniffer.detect_bytes(data).unwrap_or_default());
        }
        let mime_type = self
            .sniffer
            .detect_bytes(data)
            .map_err(|e| ValidationError::Undetectable(e.to_string()))?;
        self.check(mime_type)
    }

    fn check(&self, mime_type: String) -> Result<String, ValidationError> {
        if self.matches(&mime_type) {
            Ok(mime_type)
        } else {
            tracing::debug!(mime_type = %mime_type, patterns = ?self.patterns, "MIME type rejected");
            Err(ValidationError::UnsupportedMimeType { mime_type })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const PNG_HEADER: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D];

    #[test]
    fn png_rejected_by_document_patterns() {
        let validator = MimeTypeValidator::new(["application/pdf", "text/plain"]).unwrap();
        let err = validator.validate_bytes(PNG_HEADER).unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnsupportedMimeType {
                mime_type: "image/png".to_string()
            }
        );
        assert_eq!(err.mime_type(), Some("image/png"));
    }

    #[test]
    fn png_accepted_by_image_wildcard() {
        let validator = MimeTypeValidator::for_variant(MediaVariant::Image).unwrap();
        let mut reader = Cursor::new(PNG_HEADER.to_vec());
        assert_eq!(validator.validate(&mut reader).unwrap(), "image/png");
        assert_eq!(reader.position(), 0);
    }

    #[test]
    fn matching_is_case_insensitive() {
        let validator = MimeTypeValidator::new(["IMAGE/*"]).unwrap();
        assert!(validator.matches("image/png"));
        assert!(validator.matches("Image/JPEG"));
        assert!(!validator.matches("video/mp4"));
    }

    #[test]
    fn glob_features() {
        let validator = MimeTypeValidator::new(["video/mp?", "text/[!h]*"]).unwrap();
        assert!(validator.matches("video/mp4"));
        assert!(!validator.matches("video/mpeg"));
        assert!(validator.matches("text/plain"));
        assert!(!validator.matches("text/html"));
    }

    #[test]
    fn literal_characters_are_escaped() {
        let validator = MimeTypeValidator::new(["application/vnd.ms-excel"]).unwrap();
        assert!(validator.matches("application/vnd.ms-excel"));
        assert!(!validator.matches("application/vndXms-excel"));

        let validator = MimeTypeValidator::new(["image/svg+xml"]).unwrap();
        assert!(validator.matches("image/svg+xml"));
    }

    #[test]
    fn unclosed_bracket_is_literal() {
        let validator = MimeTypeValidator::new(["text/[plain"]).unwrap();
        assert!(validator.matches("text/[plain"));
        assert!(!validator.matches("text/p"));
    }

    #[test]
    fn empty_pattern_list_accepts_everything() {
        let validator = MimeTypeValidator::for_variant(MediaVariant::File).unwrap();
        assert!(validator.validate_bytes(&[0x00, 0x13, 0xFE]).is_ok());
        assert_eq!(validator.validate_bytes(PNG_HEADER).unwrap(), "image/png");
    }

    #[test]
    fn undetectable_content_rejected_when_restricted() {
        let validator = MimeTypeValidator::for_variant(MediaVariant::Document).unwrap();
        assert!(matches!(
            validator.validate_bytes(&[0x00, 0x13, 0xFE, 0x02]),
            Err(ValidationError::Undetectable(_))
        ));
    }
}
