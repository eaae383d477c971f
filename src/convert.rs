//! Plain text to EPUB conversion.
//!
//! A [`TxtConverter`] reads a text file, splits it into chapters with a
//! [`Segmenter`], and lays the chapters out as XHTML documents in a [`Book`]:
//!
//! ```text
//! text/title.xhtml        title page (always present)
//! text/part_0001.xhtml    one document per `step` chapters
//! style/nav.css           shared stylesheet
//! images/cover.<ext>      optional cover image
//! ```
//!
//! ```no_run
//! use txtbook::convert::{ConvertConfig, TxtConverter};
//!
//! let config = ConvertConfig::default().with_author("佚名").with_step(10);
//! let converter = TxtConverter::new(config)?;
//! converter.convert("novel.txt", "novel.epub")?;
//! # Ok::<(), txtbook::Error>(())
//! ```

use std::path::{Path, PathBuf};

use crate::book::{Book, Metadata, TocEntry};
use crate::epub::write_epub;
use crate::error::Result;
use crate::segment::{Chapter, DEFAULT_PATTERN, SegmentOptions, Segmenter, body_to_markup, group_chapters};
use crate::text::{TextSource, read_text};
use crate::util::{escape_xml, guess_media_type, image_extension, uuid_v4};

/// Description stamped on every converted book.
pub const NOTICE: &str = "请注意，该EPUB文档由TXT文本文件转换生成，原始内容源于互联网。";

/// Title used when neither the config nor a file name supplies one.
pub const FALLBACK_TITLE: &str = "epub";

const XHTML_MEDIA_TYPE: &str = "application/xhtml+xml";
const STYLESHEET_HREF: &str = "style/nav.css";
const TITLE_PAGE_HREF: &str = "text/title.xhtml";

const STYLESHEET: &str = r#"@namespace epub "http://www.idpf.org/2007/ops";

body {
    font-family: Cambria, "Liberation Serif", "Bitstream Vera Serif", Georgia, Times, "Times New Roman", serif;
}

h1 {
    text-align: left;
    text-indent: 2em;
    font-weight: bold;
    color: #D2691E;
    line-height: 300%;
    margin: 30px 0 0 0;
}

h2 {
    text-align: left;
    text-indent: 2em;
    font-weight: bold;
    color: #D2691E;
    line-height: 240%;
    margin: 20px 0 0 0;
}

p {
    text-indent: 1.25em;
    margin: 0;
    widows: 2;
    orphans: 2;
}
"#;

/// Settings for one conversion.
///
/// Unset optional fields fall back at conversion time: the title to the source file
/// stem, the author to the title, the identifier to a fresh `urn:uuid`, and the date
/// to the current UTC time.
#[derive(Debug, Clone)]
pub struct ConvertConfig {
    pub title: Option<String>,
    pub author: Option<String>,
    pub identifier: Option<String>,
    pub language: String,
    pub contributor: Option<String>,
    pub description: String,
    pub date: Option<String>,
    /// Cover image to embed. A path that does not exist is skipped with a warning.
    pub cover: Option<PathBuf>,
    /// Heading regular expression.
    pub pattern: String,
    pub source: TextSource,
    /// Chapters per XHTML document.
    pub step: usize,
    pub segment: SegmentOptions,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            title: None,
            author: None,
            identifier: None,
            language: "zh".to_string(),
            contributor: None,
            description: NOTICE.to_string(),
            date: None,
            cover: None,
            pattern: DEFAULT_PATTERN.to_string(),
            source: TextSource::default(),
            step: 1,
            segment: SegmentOptions::default(),
        }
    }
}

impl ConvertConfig {
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_contributor(mut self, contributor: impl Into<String>) -> Self {
        self.contributor = Some(contributor.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    pub fn with_cover(mut self, cover: impl Into<PathBuf>) -> Self {
        self.cover = Some(cover.into());
        self
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = pattern.into();
        self
    }

    pub fn with_source(mut self, source: TextSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_step(mut self, step: usize) -> Self {
        self.step = step;
        self
    }

    pub fn with_segment_options(mut self, options: SegmentOptions) -> Self {
        self.segment = options;
        self
    }
}

/// Converts text books to EPUB.
///
/// The heading pattern is compiled once in [`TxtConverter::new`]; the converter is
/// immutable afterwards and can be shared between threads.
#[derive(Debug, Clone)]
pub struct TxtConverter {
    config: ConvertConfig,
    segmenter: Segmenter,
}

impl TxtConverter {
    pub fn new(config: ConvertConfig) -> Result<Self> {
        let segmenter =
            Segmenter::from_pattern(&config.pattern)?.with_options(config.segment.clone());
        Ok(Self { config, segmenter })
    }

    pub fn config(&self) -> &ConvertConfig {
        &self.config
    }

    pub fn segmenter(&self) -> &Segmenter {
        &self.segmenter
    }

    /// Chapter titles of the text file at `path`.
    ///
    /// Meant as a quick preview, so malformed bytes are replaced instead of failing.
    pub fn table_of_contents<P: AsRef<Path>>(&self, path: P) -> Result<Vec<String>> {
        let source = self.config.source.clone().with_lossy(true);
        let text = read_text(path, &source)?;
        Ok(self.segmenter.titles(text.trim()))
    }

    /// Build a book from already decoded text.
    pub fn build_book(&self, text: &str) -> Result<Book> {
        let title = self.config.title.as_deref().unwrap_or(FALLBACK_TITLE);
        self.assemble(text, title)
    }

    /// Read and decode the text file at `path` and build a book from it.
    ///
    /// Without a configured title the file stem is used.
    pub fn read_book<P: AsRef<Path>>(&self, path: P) -> Result<Book> {
        let path = path.as_ref();
        let text = read_text(path, &self.config.source)?;
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| FALLBACK_TITLE.to_string());
        let title = self.config.title.clone().unwrap_or(stem);
        self.assemble(&text, &title)
    }

    /// Convert the text file at `txt` into an EPUB written to `epub`.
    pub fn convert<P: AsRef<Path>, Q: AsRef<Path>>(&self, txt: P, epub: Q) -> Result<Book> {
        let book = self.read_book(txt.as_ref())?;
        write_epub(&book, epub.as_ref())?;
        tracing::info!(
            source = %txt.as_ref().display(),
            output = %epub.as_ref().display(),
            chapters = book.toc.len(),
            "converted"
        );
        Ok(book)
    }

    fn assemble(&self, text: &str, title: &str) -> Result<Book> {
        let config = &self.config;
        let chapters = self.segmenter.chapters(text);

        let mut book = Book::new();
        book.metadata = self.metadata(title);
        book.add_resource(STYLESHEET_HREF, STYLESHEET.as_bytes().to_vec(), "text/css");

        if let Some(cover) = &config.cover {
            add_cover(&mut book, cover)?;
        }

        let author = book.metadata.authors.join(", ");
        book.add_resource(
            TITLE_PAGE_HREF,
            title_page(title, &author, &config.language).into_bytes(),
            XHTML_MEDIA_TYPE,
        );
        book.add_spine_item("title", TITLE_PAGE_HREF, XHTML_MEDIA_TYPE);

        if chapters.is_empty() {
            tracing::warn!(title = %title, "no chapter headings found; book has only a title page");
            return Ok(book);
        }

        let anchored = config.step > 1;
        let mut number = 0usize;
        for (index, group) in group_chapters(&chapters, config.step).into_iter().enumerate() {
            let href = format!("text/part_{:04}.xhtml", index + 1);
            let mut body = String::new();

            for chapter in group {
                number += 1;
                let anchor = format!("c{number}");
                body.push_str(&chapter_markup(chapter, anchored.then_some(anchor.as_str())));

                let target = if anchored {
                    format!("{href}#{anchor}")
                } else {
                    href.clone()
                };
                let label = if chapter.title.is_empty() {
                    title
                } else {
                    &chapter.title
                };
                book.toc
                    .push(TocEntry::new(label, target).with_play_order(number));
            }

            let page_title = group.first().map_or(title, |c| c.title.as_str());
            book.add_resource(
                href.clone(),
                xhtml_document(page_title, &config.language, &body).into_bytes(),
                XHTML_MEDIA_TYPE,
            );
            book.add_spine_item(format!("part_{:04}", index + 1), href, XHTML_MEDIA_TYPE);
        }

        tracing::debug!(
            chapters = chapters.len(),
            documents = book.spine.len(),
            "assembled book"
        );
        Ok(book)
    }

    fn metadata(&self, title: &str) -> Metadata {
        let config = &self.config;
        let author = config.author.as_deref().unwrap_or(title);
        let identifier = config
            .identifier
            .clone()
            .unwrap_or_else(|| format!("urn:uuid:{}", uuid_v4()));
        let date = config.date.clone().unwrap_or_else(now_stamp);

        let mut metadata = Metadata::new(title)
            .with_author(author)
            .with_language(&config.language)
            .with_identifier(identifier)
            .with_description(&config.description)
            .with_date(date);
        if let Some(contributor) = &config.contributor {
            metadata = metadata.with_contributor(contributor);
        }
        metadata
    }
}

/// Current UTC time in the `dc:date` form.
pub fn now_stamp() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn add_cover(book: &mut Book, path: &Path) -> Result<()> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "cover image not found; skipping");
        return Ok(());
    }

    let data = std::fs::read(path)?;
    let media_type = guess_media_type(&path.to_string_lossy());
    let media_type = if media_type.starts_with("image/") {
        media_type
    } else {
        "image/jpeg"
    };
    let href = format!("images/cover{}", image_extension(media_type));
    tracing::debug!(path = %path.display(), href = %href, "embedding cover");
    book.set_cover(href, data, media_type);
    Ok(())
}

fn chapter_markup(chapter: &Chapter, anchor: Option<&str>) -> String {
    let heading = match anchor {
        Some(id) => format!("<h2 id=\"{id}\">{}</h2>", escape_xml(&chapter.title)),
        None => format!("<h2>{}</h2>", escape_xml(&chapter.title)),
    };
    format!("{heading}\n<p>{}</p>\n", body_to_markup(&chapter.body))
}

fn title_page(title: &str, author: &str, language: &str) -> String {
    let body = format!(
        "<h1>{}</h1>\n<p>{}</p>\n",
        escape_xml(title),
        escape_xml(author)
    );
    xhtml_document(title, language, &body)
}

fn xhtml_document(title: &str, language: &str, body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml" xml:lang="{lang}">
<head>
<title>{title}</title>
<link rel="stylesheet" type="text/css" href="../{css}"/>
</head>
<body>
{body}</body>
</html>
"#,
        lang = escape_xml(language),
        title = escape_xml(title),
        css = STYLESHEET_HREF,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::text::TextEncoding;

    const NOVEL: &str = "书名\n第一章 起源\n这是第一章内容。\n第二章 发展\n第二行 <b>\n第三章 结局\n完\n";

    fn converter(config: ConvertConfig) -> TxtConverter {
        TxtConverter::new(config.with_date("2024-01-01T00:00:00Z").with_identifier("urn:test")).unwrap()
    }

    fn document(book: &Book, href: &str) -> String {
        String::from_utf8(book.get_resource(href).unwrap().data.clone()).unwrap()
    }

    #[test]
    fn test_build_book_one_chapter_per_document() {
        let book = converter(ConvertConfig::default().with_title("测试"))
            .build_book(NOVEL)
            .unwrap();

        assert_eq!(book.metadata.title, "测试");
        assert_eq!(book.metadata.authors, vec!["测试"]);
        assert_eq!(book.metadata.language, "zh");
        assert_eq!(book.metadata.description.as_deref(), Some(NOTICE));
        assert_eq!(book.metadata.date.as_deref(), Some("2024-01-01T00:00:00Z"));

        let hrefs: Vec<_> = book.spine.iter().map(|s| s.href.as_str()).collect();
        assert_eq!(
            hrefs,
            vec![
                "text/title.xhtml",
                "text/part_0001.xhtml",
                "text/part_0002.xhtml",
                "text/part_0003.xhtml"
            ]
        );

        let titles: Vec<_> = book.toc.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["第一章 起源", "第二章 发展", "第三章 结局"]);
        assert_eq!(book.toc[1].href, "text/part_0002.xhtml");

        let second = document(&book, "text/part_0002.xhtml");
        assert!(second.contains("<h2>第二章 发展</h2>"));
        assert!(second.contains("<p>第二行 &lt;b&gt;<br/></p>"));
        assert!(!second.contains("书名"));
        assert!(book.get_resource(STYLESHEET_HREF).is_some());
    }

    #[test]
    fn test_step_groups_chapters_with_anchors() {
        let book = converter(ConvertConfig::default().with_step(2))
            .build_book(NOVEL)
            .unwrap();

        assert_eq!(book.metadata.title, FALLBACK_TITLE);
        assert_eq!(book.spine.len(), 3);
        let targets: Vec<_> = book.toc.iter().map(|t| t.href.as_str()).collect();
        assert_eq!(
            targets,
            vec![
                "text/part_0001.xhtml#c1",
                "text/part_0001.xhtml#c2",
                "text/part_0002.xhtml#c3"
            ]
        );
        assert!(document(&book, "text/part_0001.xhtml").contains("<h2 id=\"c2\">第二章 发展</h2>"));
    }

    #[test]
    fn test_zero_chapters_gives_title_page() {
        let book = converter(ConvertConfig::default().with_title("空"))
            .build_book("没有任何章节标题的文本。")
            .unwrap();

        assert_eq!(book.spine.len(), 1);
        assert!(book.toc.is_empty());
        assert!(document(&book, TITLE_PAGE_HREF).contains("<h1>空</h1>"));
    }

    #[test]
    fn test_keep_preface_uses_book_title_in_toc() {
        let options = SegmentOptions::default().with_keep_preface(true);
        let book = converter(
            ConvertConfig::default()
                .with_title("书")
                .with_segment_options(options),
        )
        .build_book(NOVEL)
        .unwrap();

        assert_eq!(book.toc.len(), 4);
        assert_eq!(book.toc[0].title, "书");
        assert!(document(&book, "text/part_0001.xhtml").contains("<p>书名<br/></p>"));
    }

    #[test]
    fn test_invalid_pattern_fails_on_construction() {
        let err = TxtConverter::new(ConvertConfig::default().with_pattern("第(")).unwrap_err();
        assert!(matches!(err, Error::Pattern { .. }));
    }

    #[test]
    fn test_read_book_defaults_title_to_stem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("三体.txt");
        std::fs::write(&path, NOVEL).unwrap();

        let book = converter(ConvertConfig::default()).read_book(&path).unwrap();
        assert_eq!(book.metadata.title, "三体");
        assert_eq!(book.metadata.authors, vec!["三体"]);
    }

    #[test]
    fn test_table_of_contents_is_lossy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.txt");
        let mut bytes = "第一章 甲\n".as_bytes().to_vec();
        bytes.push(0xFF);
        bytes.extend_from_slice("\n第二章 乙\n".as_bytes());
        std::fs::write(&path, &bytes).unwrap();

        let converter = converter(ConvertConfig::default());
        assert_eq!(
            converter.table_of_contents(&path).unwrap(),
            vec!["第一章 甲", "第二章 乙"]
        );
        assert!(matches!(converter.read_book(&path), Err(Error::Decode { .. })));
    }

    #[test]
    fn test_cover_embedding() {
        let dir = tempfile::tempdir().unwrap();
        let cover = dir.path().join("cover.png");
        std::fs::write(&cover, [0x89, b'P', b'N', b'G']).unwrap();

        let book = converter(ConvertConfig::default().with_cover(&cover))
            .build_book(NOVEL)
            .unwrap();
        let (href, resource) = book.cover().unwrap();
        assert_eq!(href, "images/cover.png");
        assert_eq!(resource.media_type, "image/png");

        let missing = converter(ConvertConfig::default().with_cover(dir.path().join("none.jpg")))
            .build_book(NOVEL)
            .unwrap();
        assert!(missing.cover().is_none());
    }

    #[test]
    fn test_convert_gbk_source() {
        let dir = tempfile::tempdir().unwrap();
        let txt = dir.path().join("gbk.txt");
        // 第一章\n正文\n
        std::fs::write(
            &txt,
            [0xB5, 0xDA, 0xD2, 0xBB, 0xD5, 0xC2, 0x0A, 0xD5, 0xFD, 0xCE, 0xC4, 0x0A],
        )
        .unwrap();
        let epub = dir.path().join("gbk.epub");

        let source = TextSource::new(TextEncoding::Auto);
        let book = converter(ConvertConfig::default().with_source(source))
            .convert(&txt, &epub)
            .unwrap();

        assert_eq!(book.toc[0].title, "第一章");
        let read = crate::read_epub(&epub).unwrap();
        assert_eq!(read.metadata.title, "gbk");
        assert_eq!(read.toc[0].title, "第一章");
    }
}
