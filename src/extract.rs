//! EPUB to text extraction and small library chores on existing EPUBs.
//!
//! The inverse of [`convert`](crate::convert): pull the text out of every spine
//! document, pull out the cover, rewrite the descriptive metadata, and rename files in
//! a library after their title and author.

use std::path::{Path, PathBuf};

use quick_xml::Reader;
use quick_xml::events::Event;
use walkdir::WalkDir;
use zhconv::{Variant, zhconv};

use crate::book::Book;
use crate::convert::NOTICE;
use crate::epub::{read_epub, write_epub};
use crate::error::{Error, Result};
use crate::text::lookup;
use crate::util::{image_extension, local_name, resolve_entity};

/// Appended after every document by default when extracting a whole book.
pub const END_MARKER: &str = "(-本章结束-)";

const UNKNOWN: &str = "未知";
const UNKNOWN_DATE: &str = "1000-10-10 10:10:10";

/// Characters that cannot appear in file names on common file systems.
const ILLEGAL_FILE_CHARS: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// Characters that start a title's subtitle or edition note.
const TITLE_SEPARATORS: &[char] = &['(', '（', '：', '【'];

/// The descriptive metadata shown and edited by the tools.
///
/// Missing fields get placeholder values instead of being optional, so a
/// [`BookInfo`] can always be displayed and written back.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(serde::Serialize))]
pub struct BookInfo {
    pub title: String,
    pub creator: String,
    pub contributor: String,
    pub date: String,
}

impl Default for BookInfo {
    fn default() -> Self {
        Self {
            title: UNKNOWN.to_string(),
            creator: UNKNOWN.to_string(),
            contributor: UNKNOWN.to_string(),
            date: UNKNOWN_DATE.to_string(),
        }
    }
}

/// Read the [`BookInfo`] of `book`, filling in placeholders for missing fields.
pub fn book_info(book: &Book) -> BookInfo {
    let meta = &book.metadata;
    let defaults = BookInfo::default();

    BookInfo {
        title: present(Some(&meta.title)).unwrap_or(defaults.title),
        creator: present(meta.authors.first()).unwrap_or(defaults.creator),
        contributor: present(meta.contributors.first()).unwrap_or(defaults.contributor),
        date: present(meta.date.as_ref()).unwrap_or(defaults.date),
    }
}

fn present(value: Option<&String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty()).cloned()
}

/// Replace the descriptive metadata of `book` with `info`.
///
/// The description is reset to the conversion notice.
pub fn retag(book: &mut Book, info: &BookInfo) {
    let meta = &mut book.metadata;
    meta.title = info.title.clone();
    meta.authors = vec![info.creator.clone()];
    meta.contributors = vec![info.contributor.clone()];
    meta.date = Some(info.date.clone());
    meta.description = Some(NOTICE.to_string());
}

/// Options for text extraction.
#[derive(Debug, Clone)]
pub struct ExtractConfig {
    /// Line written after each document in single-file output.
    pub end_marker: Option<String>,
    /// Output encoding label.
    pub encoding: String,
    /// Convert Traditional Chinese to Simplified Chinese.
    pub simplify: bool,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            end_marker: Some(END_MARKER.to_string()),
            encoding: "utf-8".to_string(),
            simplify: false,
        }
    }
}

impl ExtractConfig {
    pub fn with_end_marker(mut self, marker: Option<String>) -> Self {
        self.end_marker = marker;
        self
    }

    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = encoding.into();
        self
    }

    pub fn with_simplify(mut self, simplify: bool) -> Self {
        self.simplify = simplify;
        self
    }
}

/// Elements whose end starts a new line of text.
fn is_block(name: &[u8]) -> bool {
    matches!(
        name,
        b"p" | b"div"
            | b"h1"
            | b"h2"
            | b"h3"
            | b"h4"
            | b"h5"
            | b"h6"
            | b"li"
            | b"tr"
            | b"blockquote"
            | b"pre"
            | b"section"
            | b"article"
    )
}

/// Elements whose content is never text of the book.
fn is_hidden(name: &[u8]) -> bool {
    matches!(name, b"head" | b"script" | b"style")
}

fn push_newline(out: &mut String) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

/// Text content of an XHTML document.
///
/// `<br>` and the end of block elements become line breaks. Whitespace that only
/// formats the markup is dropped. The result is empty or ends with a newline.
pub fn html_to_text(xhtml: &str) -> Result<String> {
    let mut reader = Reader::from_str(xhtml);
    reader.config_mut().check_end_names = false;

    let mut out = String::new();
    let mut hidden = 0usize;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.name();
                let local = local_name(name.as_ref());
                if is_hidden(local) {
                    hidden += 1;
                } else if hidden == 0 && local == b"br" {
                    out.push('\n');
                }
            }
            Ok(Event::Empty(e)) => {
                let name = e.name();
                let local = local_name(name.as_ref());
                if hidden == 0 && (local == b"br" || is_block(local)) {
                    out.push('\n');
                }
            }
            Ok(Event::End(e)) => {
                let name = e.name();
                let local = local_name(name.as_ref());
                if is_hidden(local) {
                    hidden = hidden.saturating_sub(1);
                } else if hidden == 0 && is_block(local) {
                    push_newline(&mut out);
                }
            }
            Ok(Event::Text(e)) => {
                let raw = String::from_utf8_lossy(e.as_ref());
                if hidden == 0 && !(raw.contains('\n') && raw.trim().is_empty()) {
                    out.push_str(&raw);
                }
            }
            Ok(Event::CData(e)) => {
                if hidden == 0 {
                    out.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if hidden == 0
                    && let Some(c) = resolve_entity(&String::from_utf8_lossy(e.as_ref()))
                {
                    out.push(c);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::Xml(e)),
            _ => {}
        }
    }

    let leading = out.len() - out.trim_start_matches('\n').len();
    out.drain(..leading);
    push_newline(&mut out);
    Ok(out)
}

/// Text of every spine document, in reading order.
fn document_texts(book: &Book, config: &ExtractConfig) -> Result<Vec<String>> {
    book.documents()
        .map(|(item, resource)| {
            let xhtml = String::from_utf8_lossy(&resource.data);
            let text = html_to_text(&xhtml).map_err(|err| {
                tracing::debug!(href = %item.href, error = %err, "failed to parse document");
                err
            })?;
            Ok(if config.simplify {
                zhconv(&text, Variant::ZhHans)
            } else {
                text
            })
        })
        .collect()
}

/// The whole text of `book`.
///
/// Documents are concatenated in spine order, each followed by the end marker line
/// when one is configured. With [`ExtractConfig::simplify`] the text is converted to
/// Simplified Chinese.
pub fn extract_text(book: &Book, config: &ExtractConfig) -> Result<String> {
    let mut text = String::new();
    for document in document_texts(book, config)? {
        text.push_str(&document);
        if let Some(marker) = &config.end_marker {
            text.push_str(marker);
            text.push('\n');
        }
    }
    Ok(text)
}

fn encode_to_file(path: &Path, text: &str, label: &str) -> Result<()> {
    let encoding = lookup(label)?;
    let (bytes, used, unmappable) = encoding.encode(text);
    if unmappable {
        tracing::warn!(
            path = %path.display(),
            encoding = used.name(),
            "characters not representable in output encoding were written as character references"
        );
    }
    std::fs::write(path, bytes)?;
    Ok(())
}

/// Write the whole text of `book` to `path`, replacing any existing file.
pub fn write_text<P: AsRef<Path>>(book: &Book, path: P, config: &ExtractConfig) -> Result<()> {
    let path = path.as_ref();
    let text = extract_text(book, config)?;
    encode_to_file(path, &text, &config.encoding)?;
    tracing::info!(path = %path.display(), bytes = text.len(), "wrote text");
    Ok(())
}

/// Write one text file per spine document next to `path`.
///
/// Files are named `<stem><n><ext>` with `n` counting from 1, so `out/book.txt`
/// produces `out/book1.txt`, `out/book2.txt`, and so on. No end marker is written.
pub fn write_chapter_files<P: AsRef<Path>>(
    book: &Book,
    path: P,
    config: &ExtractConfig,
) -> Result<Vec<PathBuf>> {
    let path = path.as_ref();
    let dir = path.parent().unwrap_or_else(|| Path::new(""));
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut written = Vec::new();
    for (index, document) in document_texts(book, config)?.into_iter().enumerate() {
        let file = dir.join(format!("{stem}{}{ext}", index + 1));
        encode_to_file(&file, &document, &config.encoding)?;
        written.push(file);
    }
    tracing::info!(dir = %dir.display(), files = written.len(), "wrote chapter files");
    Ok(written)
}

/// A cover image found in a book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cover<'a> {
    pub href: &'a str,
    pub data: &'a [u8],
    /// File extension including the dot, e.g. `.jpeg`.
    pub extension: &'a str,
}

/// The cover image of `book`.
///
/// Uses the declared cover and falls back to the first image whose href mentions
/// `cover`.
pub fn extract_cover(book: &Book) -> Option<Cover<'_>> {
    let (href, resource) = book.cover().or_else(|| {
        let mut images: Vec<_> = book
            .resources
            .iter()
            .filter(|(href, r)| r.media_type.starts_with("image/") && href.contains("cover"))
            .collect();
        images.sort_by(|a, b| a.0.cmp(b.0));
        images.into_iter().next().map(|(href, r)| (href.as_str(), r))
    })?;

    let extension = match href.rfind('.') {
        Some(dot) if !href[dot..].contains('/') => &href[dot..],
        _ => image_extension(&resource.media_type),
    };

    Some(Cover {
        href,
        data: &resource.data,
        extension,
    })
}

/// Write the cover of `book` to `dir/cover<ext>`, if it has one.
pub fn write_cover<P: AsRef<Path>>(book: &Book, dir: P) -> Result<Option<PathBuf>> {
    let Some(cover) = extract_cover(book) else {
        return Ok(None);
    };
    let path = dir.as_ref().join(format!("cover{}", cover.extension));
    std::fs::write(&path, cover.data)?;
    tracing::debug!(path = %path.display(), "wrote cover");
    Ok(Some(path))
}

/// Library file name for a book: `<title prefix>_<creator>.epub`.
///
/// The title is cut at the first subtitle separator (`(`, `（`, `：` or `【`), and
/// characters illegal in file names are replaced with `_`.
pub fn library_file_name(info: &BookInfo) -> String {
    let prefix = info
        .title
        .split(TITLE_SEPARATORS)
        .next()
        .unwrap_or_default()
        .trim();
    let name = format!("{prefix}_{}", info.creator.trim());
    let name: String = name
        .chars()
        .map(|c| if ILLEGAL_FILE_CHARS.contains(&c) { '_' } else { c })
        .collect();
    format!("{name}.epub")
}

/// Outcome of [`rename_library`].
#[derive(Debug, Default)]
pub struct RenameReport {
    /// `(old, new)` paths of renamed files.
    pub renamed: Vec<(PathBuf, PathBuf)>,
    /// Files already carrying their library name.
    pub unchanged: Vec<PathBuf>,
    /// Files that could not be read or renamed.
    pub failed: Vec<PathBuf>,
}

/// Rename every `.epub` below `dir` to its [`library_file_name`].
///
/// Symbolic links are not followed. A file that cannot be read, or whose target
/// name is taken, is logged and skipped, as is an unreadable subdirectory. Only a
/// `dir` that cannot be listed is an error.
pub fn rename_library<P: AsRef<Path>>(dir: P) -> Result<RenameReport> {
    let dir = dir.as_ref();
    let mut files = Vec::new();

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.depth() == 0 => return Err(std::io::Error::from(err).into()),
            Err(err) => {
                tracing::warn!(path = ?err.path(), error = %err, "skipping unreadable entry");
                continue;
            }
        };
        if entry.depth() == 0 && !entry.file_type().is_dir() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotADirectory,
                format!("{} is not a directory", dir.display()),
            )));
        }
        if entry.file_type().is_file()
            && entry
                .path()
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("epub"))
        {
            files.push(entry.into_path());
        }
    }

    let mut report = RenameReport::default();
    for path in files {
        match rename_one(&path) {
            Ok(Some(target)) => report.renamed.push((path, target)),
            Ok(None) => report.unchanged.push(path),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "rename failed");
                report.failed.push(path);
            }
        }
    }

    tracing::info!(
        renamed = report.renamed.len(),
        unchanged = report.unchanged.len(),
        failed = report.failed.len(),
        "library rename finished"
    );
    Ok(report)
}

fn rename_one(path: &Path) -> Result<Option<PathBuf>> {
    let book = read_epub(path)?;
    let name = library_file_name(&book_info(&book));
    let target = path.with_file_name(name);

    if target == path {
        return Ok(None);
    }
    if target.exists() {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("{} already exists", target.display()),
        )));
    }

    std::fs::rename(path, &target)?;
    tracing::debug!(from = %path.display(), to = %target.display(), "renamed");
    Ok(Some(target))
}

/// Rewrite the metadata of the EPUB at `path` in place.
pub fn retag_file<P: AsRef<Path>>(path: P, info: &BookInfo) -> Result<Book> {
    let path = path.as_ref();
    let mut book = read_epub(path)?;
    retag(&mut book, info);
    write_epub(&book, path)?;
    tracing::info!(path = %path.display(), title = %info.title, "retagged");
    Ok(book)
}
