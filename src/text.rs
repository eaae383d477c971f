//! Reading and decoding plain-text book sources.
//!
//! Novels distributed as `.txt` come in a zoo of encodings: UTF-8 with or without a
//! BOM, GBK/GB18030 from older Chinese sites, Big5 from Taiwanese ones. Callers
//! either declare the encoding by label (anything `encoding_rs` knows, plus a few
//! common aliases) or ask for [`TextEncoding::Auto`].

use std::borrow::Cow;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use encoding_rs::{DecoderResult, Encoding, GB18030, GBK, UTF_8};

use crate::error::{Error, Result};

/// Declared encoding of a text source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextEncoding {
    /// Sniff the encoding from the bytes (BOM, UTF-8 validity, GBK heuristics).
    Auto,
    /// An explicit encoding label such as `utf-8`, `gbk` or `big5`.
    Label(String),
}

impl Default for TextEncoding {
    fn default() -> Self {
        Self::Label("utf-8".to_string())
    }
}

impl FromStr for TextEncoding {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("auto") {
            Ok(Self::Auto)
        } else {
            Ok(Self::Label(s.trim().to_string()))
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Label(label) => f.write_str(label),
        }
    }
}

/// How a text file is read into memory.
#[derive(Debug, Clone, Default)]
pub struct TextSource {
    pub encoding: TextEncoding,
    /// Replace malformed sequences with U+FFFD instead of failing.
    pub lossy: bool,
}

impl TextSource {
    pub fn new(encoding: TextEncoding) -> Self {
        Self {
            encoding,
            lossy: false,
        }
    }

    pub fn with_lossy(mut self, lossy: bool) -> Self {
        self.lossy = lossy;
        self
    }

    /// Decode `bytes` according to this source's settings.
    pub fn decode(&self, bytes: &[u8]) -> Result<String> {
        let encoding = match &self.encoding {
            TextEncoding::Auto => detect_encoding(bytes),
            TextEncoding::Label(label) => lookup(label)?,
        };
        tracing::debug!(encoding = encoding.name(), lossy = self.lossy, "decoding text");

        if self.lossy {
            Ok(decode_lossy_with(bytes, encoding).into_owned())
        } else {
            decode_strict(bytes, encoding)
        }
    }
}

/// Read the whole file at `path` and decode it.
pub fn read_text<P: AsRef<Path>>(path: P, source: &TextSource) -> Result<String> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    tracing::debug!(path = %path.display(), bytes = bytes.len(), "read text source");
    source.decode(&bytes)
}

/// Decode `bytes` as `label`, failing on the first malformed sequence.
///
/// A leading BOM matching the encoding is removed. The error names the encoding and
/// the byte offset of the malformed sequence.
pub fn decode(bytes: &[u8], label: &str) -> Result<String> {
    decode_strict(bytes, lookup(label)?)
}

/// Decode `bytes` as `label`, replacing malformed sequences with U+FFFD.
pub fn decode_lossy<'a>(bytes: &'a [u8], label: &str) -> Result<Cow<'a, str>> {
    Ok(decode_lossy_with(bytes, lookup(label)?))
}

/// Resolve an encoding label.
///
/// Accepts every WHATWG label plus a handful of names common in desktop tooling
/// (`utf-8-sig`, `cp936`, underscores in place of hyphens).
pub fn lookup(label: &str) -> Result<&'static Encoding> {
    let normalized = label.trim().to_ascii_lowercase().replace('_', "-");
    let alias = match normalized.as_str() {
        "utf-8-sig" | "utf8-sig" => Some(UTF_8),
        "cp936" | "ms936" => Some(GBK),
        "gb-18030" => Some(GB18030),
        _ => None,
    };

    alias
        .or_else(|| Encoding::for_label(normalized.as_bytes()))
        .ok_or_else(|| Error::UnknownEncoding(label.to_string()))
}

/// Guess the encoding of `bytes`.
///
/// 1. A byte order mark wins.
/// 2. Valid UTF-8 is UTF-8.
/// 3. Mostly GBK-shaped byte pairs is GB18030 (a superset of GBK and GB2312).
/// 4. Anything else falls back to UTF-8.
pub fn detect_encoding(bytes: &[u8]) -> &'static Encoding {
    if let Some((encoding, _bom_length)) = Encoding::for_bom(bytes) {
        return encoding;
    }

    if std::str::from_utf8(bytes).is_ok() {
        return UTF_8;
    }

    if looks_like_gbk(bytes) {
        return GB18030;
    }

    UTF_8
}

/// Whether more than half of the non-ASCII byte pairs fit the GBK lead/trail ranges.
fn looks_like_gbk(bytes: &[u8]) -> bool {
    let mut gbk_pairs = 0usize;
    let mut total_pairs = 0usize;

    let mut i = 0;
    while i < bytes.len().saturating_sub(1) {
        let b1 = bytes[i];
        let b2 = bytes[i + 1];

        if b1 < 0x80 {
            i += 1;
            continue;
        }

        total_pairs += 1;
        if (0x81..=0xFE).contains(&b1) && (0x40..=0xFE).contains(&b2) && b2 != 0x7F {
            gbk_pairs += 1;
            i += 2;
        } else {
            i += 1;
        }
    }

    total_pairs > 0 && gbk_pairs * 2 > total_pairs
}

fn decode_strict(bytes: &[u8], encoding: &'static Encoding) -> Result<String> {
    let mut decoder = encoding.new_decoder_with_bom_removal();
    let capacity = decoder
        .max_utf8_buffer_length_without_replacement(bytes.len())
        .unwrap_or(bytes.len().saturating_mul(3));
    let mut out = String::with_capacity(capacity);
    let mut consumed = 0;

    loop {
        let (result, read) =
            decoder.decode_to_string_without_replacement(&bytes[consumed..], &mut out, true);
        consumed += read;

        match result {
            DecoderResult::InputEmpty => return Ok(out),
            DecoderResult::OutputFull => {
                let remaining = bytes.len() - consumed;
                out.reserve(
                    decoder
                        .max_utf8_buffer_length_without_replacement(remaining)
                        .unwrap_or(remaining.saturating_mul(3))
                        .max(4),
                );
            }
            DecoderResult::Malformed(bad, after) => {
                let offset = consumed.saturating_sub(bad as usize + after as usize);
                return Err(Error::Decode {
                    encoding: encoding.name().to_string(),
                    offset: Some(offset),
                });
            }
        }
    }
}

fn decode_lossy_with<'a>(bytes: &'a [u8], encoding: &'static Encoding) -> Cow<'a, str> {
    let (text, malformed) = encoding.decode_with_bom_removal(bytes);
    if malformed {
        tracing::warn!(
            encoding = encoding.name(),
            "malformed input replaced with U+FFFD"
        );
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    const GBK_CHAPTER: &[u8] = &[
        0xB5, 0xDA, 0xD2, 0xBB, 0xD5, 0xC2, // 第一章
        0x0A, 0xD5, 0xFD, 0xCE, 0xC4, 0x0A, // \n正文\n
    ];

    #[test]
    fn test_decode_utf8_strips_bom() {
        let bytes = b"\xEF\xBB\xBFhello";
        assert_eq!(decode(bytes, "utf-8").unwrap(), "hello");
    }

    #[test]
    fn test_decode_gbk() {
        assert_eq!(decode(GBK_CHAPTER, "gbk").unwrap(), "第一章\n正文\n");
        assert_eq!(decode(GBK_CHAPTER, "GB18030").unwrap(), "第一章\n正文\n");
    }

    #[test]
    fn test_decode_error_reports_offset() {
        let mut bytes = "第一章 ".as_bytes().to_vec();
        let bad_at = bytes.len();
        bytes.extend_from_slice(&[0xFF, b'a']);

        match decode(&bytes, "utf-8").unwrap_err() {
            Error::Decode { encoding, offset } => {
                assert_eq!(encoding, "UTF-8");
                assert_eq!(offset, Some(bad_at));
            }
            other => panic!("expected decode error, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_lossy_replaces() {
        let text = decode_lossy(b"a\xFFb", "utf-8").unwrap();
        assert_eq!(text, "a\u{FFFD}b");
    }

    #[test]
    fn test_unknown_label() {
        assert!(matches!(
            decode(b"abc", "klingon"),
            Err(Error::UnknownEncoding(label)) if label == "klingon"
        ));
    }

    #[test]
    fn test_lookup_aliases() {
        assert_eq!(lookup("utf_8").unwrap(), UTF_8);
        assert_eq!(lookup("utf-8-sig").unwrap(), UTF_8);
        assert_eq!(lookup("cp936").unwrap(), GBK);
        assert_eq!(lookup(" Big5 ").unwrap().name(), "Big5");
    }

    #[test]
    fn test_detect_encoding() {
        assert_eq!(detect_encoding("第一章".as_bytes()), UTF_8);
        assert_eq!(detect_encoding(GBK_CHAPTER), GB18030);
        assert_eq!(detect_encoding(b"\xFF\xFEa\x00"), encoding_rs::UTF_16LE);
        assert_eq!(detect_encoding(b"plain ascii"), UTF_8);
    }

    #[test]
    fn test_text_source_auto() {
        let source = TextSource::new(TextEncoding::Auto);
        assert_eq!(source.decode(GBK_CHAPTER).unwrap(), "第一章\n正文\n");
    }

    #[test]
    fn test_text_encoding_from_str() {
        assert_eq!("AUTO".parse::<TextEncoding>().unwrap(), TextEncoding::Auto);
        assert_eq!(
            "gbk".parse::<TextEncoding>().unwrap(),
            TextEncoding::Label("gbk".into())
        );
        assert_eq!(TextEncoding::default().to_string(), "utf-8");
    }

    #[test]
    fn test_read_text_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.txt");
        std::fs::write(&path, GBK_CHAPTER).unwrap();

        let source = TextSource::new(TextEncoding::Label("gbk".into()));
        assert_eq!(read_text(&path, &source).unwrap(), "第一章\n正文\n");
        assert!(matches!(
            read_text(&path, &TextSource::default()),
            Err(Error::Decode { offset: Some(0), .. })
        ));
    }
}
