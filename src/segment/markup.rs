//! Optional post-processing of chapter bodies for markup output.

use std::borrow::Cow;

use super::Chapter;
use crate::util::escape_xml;

const NBSP: char = '\u{a0}';

/// Remove non-breaking spaces from `body`.
pub fn strip_nbsp(body: &str) -> Cow<'_, str> {
    if body.contains(NBSP) {
        Cow::Owned(body.replace(NBSP, ""))
    } else {
        Cow::Borrowed(body)
    }
}

/// Render a chapter body as XHTML inline content.
///
/// Escapes markup characters, drops non-breaking spaces and carriage returns, and
/// turns every line feed into `<br/>`.
pub fn body_to_markup(body: &str) -> String {
    let body = strip_nbsp(body);
    let escaped = escape_xml(&body);
    let mut out = String::with_capacity(escaped.len() + escaped.len() / 8);
    for c in escaped.chars() {
        match c {
            '\n' => out.push_str("<br/>"),
            '\r' => {}
            _ => out.push(c),
        }
    }
    out
}

/// Group chapters into runs of `step`, one run per output document.
///
/// A `step` of zero is treated as one.
pub fn group_chapters(chapters: &[Chapter], step: usize) -> Vec<&[Chapter]> {
    chapters.chunks(step.max(1)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_nbsp() {
        assert_eq!(strip_nbsp("a\u{a0}b\u{a0}"), "ab");
        assert!(matches!(strip_nbsp("plain"), Cow::Borrowed("plain")));
    }

    #[test]
    fn test_body_to_markup() {
        assert_eq!(body_to_markup("甲\n乙\u{a0}\n"), "甲<br/>乙<br/>");
        assert_eq!(body_to_markup("a<b> & c\r\nd"), "a&lt;b&gt; &amp; c<br/>d");
        assert_eq!(body_to_markup(""), "");
    }

    #[test]
    fn test_group_chapters() {
        let chapters: Vec<_> = (0..5).map(|i| Chapter::new(format!("第{i}章"), "")).collect();
        let groups = group_chapters(&chapters, 2);
        assert_eq!(groups.iter().map(|g| g.len()).collect::<Vec<_>>(), vec![2, 2, 1]);
        assert_eq!(group_chapters(&chapters, 0).len(), 5);
        assert!(group_chapters(&[], 3).is_empty());
    }
}
