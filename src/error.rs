//! Error types for txtbook operations.

use thiserror::Error;

/// Errors that can occur while segmenting text or reading/writing books.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Invalid heading pattern `{pattern}`: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("{}", decode_message(.encoding, .offset))]
    Decode {
        encoding: String,
        offset: Option<usize>,
    },

    #[error("Unknown text encoding: {0}")]
    UnknownEncoding(String),

    #[error("Invalid EPUB: {0}")]
    InvalidEpub(String),

    #[error("UTF-8 decoding error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

fn decode_message(encoding: &str, offset: &Option<usize>) -> String {
    match offset {
        Some(offset) => format!("Text is not valid {encoding} (malformed byte at offset {offset})"),
        None => format!("Text is not valid {encoding}"),
    }
}

pub type Result<T> = std::result::Result<T, Error>;
