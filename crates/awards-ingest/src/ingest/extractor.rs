//! Text extraction from raw source bytes
//!
//! Detection order: byte-order mark, binary sniffing, strict UTF-8, then the
//! Windows-1252 superset of Latin-1 that older award files were written in.
//! A forced encoding label skips detection entirely.

use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use tracing::debug;

use super::error::ExtractError;

/// Bytes inspected when deciding whether content is binary
const SNIFF_LEN: usize = 8192;

/// Share of control bytes above which content is treated as binary
const BINARY_CONTROL_RATIO: f64 = 0.3;

/// Decoded text and the encoding it was read with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    pub text: String,
    pub encoding: &'static str,
}

/// Best-effort decoder for award files
#[derive(Debug, Clone, Default)]
pub struct TextExtractor {
    forced: Option<&'static Encoding>,
}

impl TextExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always decode with the encoding named by a WHATWG `label`
    pub fn with_encoding(label: &str) -> Result<Self, ExtractError> {
        let encoding =
            Encoding::for_label(label.trim().as_bytes()).ok_or(ExtractError::EncodingUndetermined)?;
        Ok(Self {
            forced: Some(encoding),
        })
    }

    pub fn extract(&self, raw: &[u8]) -> Result<ExtractedText, ExtractError> {
        let encoding = match self.forced {
            Some(encoding) => encoding,
            None => detect_encoding(raw)?,
        };
        debug!(encoding = encoding.name(), size = raw.len(), "Detected encoding");
        decode_strict(raw, encoding)
    }
}

/// Guess the encoding of `raw`, or fail when it does not look like text
pub fn detect_encoding(raw: &[u8]) -> Result<&'static Encoding, ExtractError> {
    if raw.is_empty() {
        return Err(ExtractError::EncodingUndetermined);
    }

    if let Some((encoding, _)) = Encoding::for_bom(raw) {
        return Ok(encoding);
    }

    if looks_binary(raw) {
        return Err(ExtractError::EncodingUndetermined);
    }

    if std::str::from_utf8(raw).is_ok() {
        Ok(UTF_8)
    } else {
        Ok(WINDOWS_1252)
    }
}

fn looks_binary(raw: &[u8]) -> bool {
    let sample = &raw[..raw.len().min(SNIFF_LEN)];
    let controls = sample
        .iter()
        .filter(|&&b| b < 0x20 && !matches!(b, b'\t' | b'\n' | b'\r' | 0x0c))
        .count();
    controls as f64 / sample.len() as f64 > BINARY_CONTROL_RATIO
}

fn decode_strict(raw: &[u8], encoding: &'static Encoding) -> Result<ExtractedText, ExtractError> {
    let (bom_encoding, bom_len) = Encoding::for_bom(raw).unwrap_or((encoding, 0));
    let body = if bom_encoding == encoding { &raw[bom_len..] } else { raw };

    let (text, had_errors) = encoding.decode_without_bom_handling(body);
    if had_errors {
        return Err(ExtractError::Decode {
            encoding: encoding.name().to_string(),
        });
    }

    Ok(ExtractedText {
        text: text.into_owned(),
        encoding: encoding.name(),
    })
}
