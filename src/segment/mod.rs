//! Chapter segmentation.
//!
//! Splits a flat book text into an ordered sequence of titled chapters using a
//! line-anchored heading pattern.
//!
//! The split works like this: every heading match cuts the text. The piece before the
//! first heading (the preface) is dropped unless [`SegmentOptions::keep_preface`] is
//! set. Each heading then pairs with the text that runs up to the next heading, or to
//! the end of the document.
//!
//! ```
//! use txtbook::segment::{extract_chapters, DEFAULT_PATTERN};
//!
//! let text = "第一章 起源\n这是第一章内容。\n第二章 发展\n这是第二章内容。\n";
//! let chapters = extract_chapters(text, DEFAULT_PATTERN)?;
//!
//! assert_eq!(chapters.len(), 2);
//! assert_eq!(chapters[0].title, "第一章 起源");
//! assert_eq!(chapters[0].body, "这是第一章内容。\n");
//! # Ok::<(), txtbook::Error>(())
//! ```

mod markup;
mod pattern;

pub use markup::{body_to_markup, group_chapters, strip_nbsp};
pub use pattern::{DEFAULT_PATTERN, HeadingPattern};

use crate::error::Result;

/// A titled chapter: the trimmed heading line and the text that follows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    pub title: String,
    pub body: String,
}

impl Chapter {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
        }
    }
}

/// Options controlling how the text before the first heading is treated.
#[derive(Debug, Clone, Default)]
pub struct SegmentOptions {
    /// Emit non-blank text before the first heading as a leading chapter.
    ///
    /// Off by default: the preface is dropped, which is what existing converted
    /// libraries expect.
    pub keep_preface: bool,
    /// Title given to the preface chapter when `keep_preface` is set.
    pub preface_title: String,
}

impl SegmentOptions {
    pub fn with_keep_preface(mut self, keep: bool) -> Self {
        self.keep_preface = keep;
        self
    }

    pub fn with_preface_title(mut self, title: impl Into<String>) -> Self {
        self.preface_title = title.into();
        self
    }
}

/// A reusable chapter segmenter.
///
/// Holds a compiled [`HeadingPattern`] and never mutates after construction, so one
/// instance can serve any number of threads.
#[derive(Debug, Clone, Default)]
pub struct Segmenter {
    pattern: HeadingPattern,
    options: SegmentOptions,
}

impl Segmenter {
    /// Create a segmenter using `pattern` and default options.
    pub fn new(pattern: HeadingPattern) -> Self {
        Self {
            pattern,
            options: SegmentOptions::default(),
        }
    }

    /// Compile `pattern` and create a segmenter from it.
    pub fn from_pattern(pattern: &str) -> Result<Self> {
        Ok(Self::new(HeadingPattern::new(pattern)?))
    }

    pub fn with_options(mut self, options: SegmentOptions) -> Self {
        self.options = options;
        self
    }

    pub fn pattern(&self) -> &HeadingPattern {
        &self.pattern
    }

    pub fn options(&self) -> &SegmentOptions {
        &self.options
    }

    /// Heading titles in document order.
    ///
    /// The preface, when kept, is a chapter but not a heading, so it never shows up here.
    pub fn titles(&self, text: &str) -> Vec<String> {
        self.pattern
            .headings(text)
            .map(|heading| heading.title.to_string())
            .collect()
    }

    /// Split `text` into chapters.
    ///
    /// A text without any heading yields an empty vector. With `keep_preface` off,
    /// the result has exactly one chapter per title returned by [`Segmenter::titles`].
    pub fn chapters(&self, text: &str) -> Vec<Chapter> {
        let mut chapters = Vec::new();
        // (title, byte offset where its body starts)
        let mut open: Option<(&str, usize)> = None;
        let mut preface_end = None;

        for heading in self.pattern.headings(text) {
            match open.take() {
                Some((title, body_start)) => {
                    chapters.push(Chapter::new(title, &text[body_start..heading.start]));
                }
                None => preface_end = Some(heading.start),
            }
            open = Some((heading.title, heading.end));
        }

        if let Some((title, body_start)) = open {
            chapters.push(Chapter::new(title, &text[body_start..]));
        }

        if self.options.keep_preface
            && let Some(end) = preface_end
        {
            let preface = &text[..end];
            if !preface.trim().is_empty() {
                chapters.insert(0, Chapter::new(self.options.preface_title.clone(), preface));
            }
        }

        tracing::debug!(
            pattern = self.pattern.as_str(),
            chapters = chapters.len(),
            bytes = text.len(),
            "segmented text"
        );

        chapters
    }
}

/// Extract the heading titles of `text` using `pattern`.
///
/// Fails with [`Error::Pattern`](crate::Error::Pattern) when the pattern does not
/// compile. An empty text yields an empty vector.
pub fn extract_titles(text: &str, pattern: &str) -> Result<Vec<String>> {
    Ok(Segmenter::from_pattern(pattern)?.titles(text))
}

/// Split `text` into chapters using `pattern`, dropping any preface.
///
/// The pattern is compiled before any scanning happens, so a malformed pattern
/// fails with [`Error::Pattern`](crate::Error::Pattern) whatever the text.
pub fn extract_chapters(text: &str, pattern: &str) -> Result<Vec<Chapter>> {
    Ok(Segmenter::from_pattern(pattern)?.chapters(text))
}
