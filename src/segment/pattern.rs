//! Chapter heading patterns.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};

use crate::error::{Error, Result};

/// Heading pattern for East Asian novels.
///
/// Matches a whole line such as `第十二章 风起` or `第三卷 长安`: an optional run of
/// leading whitespace, a volume/chapter marker (`第` or `卷`), an optional run of
/// Arabic or CJK numerals, a unit character (`章回部节集卷`) and the rest of the line.
/// Group 1 captures the heading without the surrounding whitespace.
///
/// The pattern is always compiled in multi-line mode, so `^` matches after every
/// newline rather than only at the start of the text.
pub const DEFAULT_PATTERN: &str =
    r"^\s*([第卷][0123456789一二三四五六七八九十零〇百千两]*[章回部节集卷].*)\s*";

static DEFAULT_HEADING: LazyLock<HeadingPattern> = LazyLock::new(|| {
    HeadingPattern::new(DEFAULT_PATTERN).expect("built-in heading pattern compiles")
});

/// A compiled chapter heading pattern.
///
/// Cheap to clone (the compiled program is shared) and safe to use from many
/// threads at once.
#[derive(Clone)]
pub struct HeadingPattern {
    source: String,
    regex: Regex,
}

impl HeadingPattern {
    /// Compile `pattern` in multi-line mode.
    ///
    /// Returns [`Error::Pattern`] carrying the offending pattern text when it is not a
    /// valid regular expression.
    pub fn new(pattern: &str) -> Result<Self> {
        let regex = RegexBuilder::new(pattern)
            .multi_line(true)
            .build()
            .map_err(|source| Error::Pattern {
                pattern: pattern.to_string(),
                source,
            })?;

        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    /// The pattern text this heading pattern was compiled from.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether the pattern has a capture group used as the heading text.
    pub fn has_title_group(&self) -> bool {
        self.regex.captures_len() > 1
    }

    /// Find every heading in `text`, in document order.
    pub(crate) fn headings<'t>(&self, text: &'t str) -> impl Iterator<Item = Heading<'t>> {
        self.regex.captures_iter(text).filter_map(|caps| {
            let whole = caps.get(0)?;
            let title = caps.get(1).unwrap_or(whole);
            Some(Heading {
                title: title.as_str().trim(),
                start: whole.start(),
                end: whole.end(),
            })
        })
    }
}

impl Default for HeadingPattern {
    fn default() -> Self {
        DEFAULT_HEADING.clone()
    }
}

impl FromStr for HeadingPattern {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl fmt::Debug for HeadingPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HeadingPattern").field(&self.source).finish()
    }
}

impl fmt::Display for HeadingPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// One heading match: trimmed title text plus the byte span of the whole match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Heading<'t> {
    pub title: &'t str,
    pub start: usize,
    pub end: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn titles(pattern: &HeadingPattern, text: &str) -> Vec<String> {
        pattern.headings(text).map(|h| h.title.to_string()).collect()
    }

    #[test]
    fn test_default_matches_common_headings() {
        let p = HeadingPattern::default();
        for line in [
            "第一章 起源",
            "第12章",
            "第一百零八回 忠义堂",
            "第两千零一节",
            "第三卷 长安",
            "卷一章",
            "第〇集",
            "第二部",
        ] {
            assert_eq!(titles(&p, line), vec![line.to_string()], "{line}");
        }
    }

    #[test]
    fn test_default_rejects_mid_line_markers() {
        let p = HeadingPattern::default();
        assert!(titles(&p, "他说第一章写得很好").is_empty());
        assert!(titles(&p, "第X章").is_empty());
    }

    #[test]
    fn test_default_is_multiline() {
        let p = HeadingPattern::default();
        let text = "前言\n第一章 甲\n正文\n第二章 乙\n";
        assert_eq!(titles(&p, text), vec!["第一章 甲", "第二章 乙"]);
    }

    #[test]
    fn test_leading_ideographic_space_is_whitespace() {
        let p = HeadingPattern::default();
        assert_eq!(titles(&p, "\u{3000}\u{3000}第三章 夜\n"), vec!["第三章 夜"]);
    }

    #[test]
    fn test_title_trimmed_including_cr() {
        let p = HeadingPattern::default();
        assert_eq!(titles(&p, "第一章 甲  \r\n正文\r\n"), vec!["第一章 甲"]);
    }

    #[test]
    fn test_pattern_without_group_uses_whole_match() {
        let p = HeadingPattern::new(r"^Chapter \d+").unwrap();
        assert!(!p.has_title_group());
        assert_eq!(titles(&p, "Chapter 1\ntext\nChapter 2\n"), vec!["Chapter 1", "Chapter 2"]);
    }

    #[test]
    fn test_malformed_pattern() {
        let err = HeadingPattern::new(r"^\s*([第卷]").unwrap_err();
        match err {
            Error::Pattern { pattern, .. } => assert_eq!(pattern, r"^\s*([第卷]"),
            other => panic!("expected pattern error, got {other:?}"),
        }
    }

    #[test]
    fn test_from_str_and_display() {
        let p: HeadingPattern = r"^Part \w+".parse().unwrap();
        assert_eq!(p.to_string(), r"^Part \w+");
        assert_eq!(p.as_str(), r"^Part \w+");
    }
}
