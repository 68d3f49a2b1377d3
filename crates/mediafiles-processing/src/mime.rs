//! Content-based MIME detection

use mediafiles_core::constants::MIME_SAMPLE_BYTES;
use std::io::{Read, Seek, SeekFrom};

use crate::error::{ProcessingError, ProcessingResult};

/// Returned for zero-length input.
pub const EMPTY_MIME_TYPE: &str = "application/x-empty";

/// Returned for readable text without a more specific signature.
pub const TEXT_MIME_TYPE: &str = "text/plain";

/// Guesses a MIME type from the leading bytes of a file, ignoring its name.
#[derive(Debug, Clone, Copy)]
pub struct MimeSniffer {
    sample_bytes: usize,
}

impl Default for MimeSniffer {
    fn default() -> Self {
        Self::new(MIME_SAMPLE_BYTES)
    }
}

impl MimeSniffer {
    pub fn new(sample_bytes: usize) -> Self {
        Self {
            sample_bytes: sample_bytes.max(1),
        }
    }

    pub fn sample_bytes(&self) -> usize {
        self.sample_bytes
    }

    /// Sniff from the reader's current position.
    ///
    /// The position is restored before returning, also on failure.
    pub fn detect<R: Read + Seek>(&self, reader: &mut R) -> ProcessingResult<String> {
        let start = reader.stream_position()?;

        let mut sample = Vec::with_capacity(self.sample_bytes);
        let read = reader
            .by_ref()
            .take(self.sample_bytes as u64)
            .read_to_end(&mut sample);
        reader.seek(SeekFrom::Start(start))?;
        read?;

        classify(&sample)
    }

    /// Sniff an in-memory buffer.
    pub fn detect_bytes(&self, data: &[u8]) -> ProcessingResult<String> {
        let end = data.len().min(self.sample_bytes);
        classify(&data[..end])
    }
}

fn classify(sample: &[u8]) -> ProcessingResult<String> {
    if sample.is_empty() {
        return Ok(EMPTY_MIME_TYPE.to_string());
    }

    if let Some(kind) = infer::get(sample) {
        return Ok(kind.mime_type().to_string());
    }

    if looks_like_text(sample) {
        return Ok(TEXT_MIME_TYPE.to_string());
    }

    Err(ProcessingError::Detection(format!(
        "no known signature in the first {} bytes",
        sample.len()
    )))
}

/// UTF-8 without control characters other than common whitespace.
/// A code point cut off by the sample boundary is tolerated.
fn looks_like_text(sample: &[u8]) -> bool {
    let valid = match std::str::from_utf8(sample) {
        Ok(text) => text,
        Err(e) if e.error_len().is_none() => match std::str::from_utf8(&sample[..e.valid_up_to()])
        {
            Ok(text) => text,
            Err(_) => return false,
        },
        Err(_) => return false,
    };

    !valid
        .chars()
        .any(|c| c.is_control() && !matches!(c, '\n' | '\r' | '\t' | '\x0c'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const PNG_HEADER: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D];

    #[test]
    fn detects_by_signature_not_name() {
        let sniffer = MimeSniffer::default();
        assert_eq!(sniffer.detect_bytes(PNG_HEADER).unwrap(), "image/png");
        assert_eq!(
            sniffer.detect_bytes(b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n").unwrap(),
            "application/pdf"
        );
    }

    #[test]
    fn plain_text_and_empty() {
        let sniffer = MimeSniffer::default();
        assert_eq!(sniffer.detect_bytes(b"hello world\n").unwrap(), "text/plain");
        assert_eq!(sniffer.detect_bytes(b"").unwrap(), EMPTY_MIME_TYPE);
    }

    #[test]
    fn truncated_utf8_is_still_text() {
        let text = "naïve café".as_bytes();
        // cut in the middle of the two-byte 'é'
        let sniffer = MimeSniffer::new(text.len() - 1);
        assert_eq!(sniffer.detect_bytes(text).unwrap(), "text/plain");
    }

    #[test]
    fn binary_noise_is_a_detection_error() {
        let sniffer = MimeSniffer::default();
        let err = sniffer.detect_bytes(&[0x00, 0x13, 0xFE, 0x02, 0x7F, 0x00]).unwrap_err();
        assert!(matches!(err, ProcessingError::Detection(_)));
    }

    #[test]
    fn restores_reader_position() {
        let mut data = b"xxxx".to_vec();
        data.extend_from_slice(PNG_HEADER);
        let mut cursor = Cursor::new(data);
        cursor.set_position(4);

        let sniffer = MimeSniffer::default();
        assert_eq!(sniffer.detect(&mut cursor).unwrap(), "image/png");
        assert_eq!(cursor.position(), 4);

        // failure path keeps the position too
        let mut noise = Cursor::new(vec![0x00, 0x01, 0x02, 0x03]);
        noise.set_position(1);
        assert!(sniffer.detect(&mut noise).is_err());
        assert_eq!(noise.position(), 1);
    }

    #[test]
    fn only_samples_prefix() {
        let mut data = b"plain text header ".to_vec();
        data.extend_from_slice(&[0u8; 64]);
        let sniffer = MimeSniffer::new(10);
        assert_eq!(sniffer.detect_bytes(&data).unwrap(), "text/plain");
    }
}
