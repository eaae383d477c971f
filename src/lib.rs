//! # txtbook
//!
//! Turn plain-text novels into chaptered EPUB books, and EPUB books back into text.
//!
//! ## Features
//!
//! - Split a text into chapters with a line-anchored heading pattern
//!   (Chinese `第…章` style headings by default)
//! - Decode GBK, GB18030, Big5 and every other WHATWG encoding, or sniff it
//! - Write EPUB 2 books with metadata, cover, stylesheet and table of contents
//! - Read EPUB 2/3 books back, extract their text and cover, and edit their metadata
//!
//! ## Quick Start
//!
//! ```no_run
//! use txtbook::convert::{ConvertConfig, TxtConverter};
//! use txtbook::extract::{ExtractConfig, write_text};
//!
//! // Text to EPUB
//! let converter = TxtConverter::new(ConvertConfig::default().with_author("佚名"))?;
//! converter.convert("novel.txt", "novel.epub")?;
//!
//! // EPUB back to text
//! let book = txtbook::read_epub("novel.epub")?;
//! write_text(&book, "novel-copy.txt", &ExtractConfig::default())?;
//! # Ok::<(), txtbook::Error>(())
//! ```
//!
//! ## Segmenting Text
//!
//! The segmenter is usable on its own:
//!
//! ```
//! use txtbook::segment::{extract_titles, DEFAULT_PATTERN};
//!
//! let titles = extract_titles("序\n第一章 甲\n正文\n第二章 乙\n", DEFAULT_PATTERN)?;
//! assert_eq!(titles, vec!["第一章 甲", "第二章 乙"]);
//! # Ok::<(), txtbook::Error>(())
//! ```

pub mod book;
pub mod convert;
pub mod epub;
pub mod error;
pub mod extract;
pub mod segment;
pub mod text;
pub(crate) mod util;

pub use book::{Book, Metadata, Resource, SpineItem, TocEntry};
pub use convert::{ConvertConfig, TxtConverter};
pub use epub::{read_epub, write_epub};
pub use error::{Error, Result};
pub use extract::{BookInfo, ExtractConfig};
pub use segment::{Chapter, DEFAULT_PATTERN, Segmenter, extract_chapters, extract_titles};
pub use text::{TextEncoding, TextSource};
