use std::collections::HashMap;

/// Intermediate representation of an ebook.
/// Format-agnostic structure that the TXT converter builds and the EPUB reader/writer
/// convert to/from.
#[derive(Debug, Clone, Default)]
pub struct Book {
    pub metadata: Metadata,
    pub spine: Vec<SpineItem>,
    pub toc: Vec<TocEntry>,
    pub resources: HashMap<String, Resource>,
}

/// Book metadata (Dublin Core + extensions)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pub title: String,
    pub authors: Vec<String>,
    pub contributors: Vec<String>,
    pub language: String,
    pub identifier: String,
    pub publisher: Option<String>,
    pub description: Option<String>,
    pub subjects: Vec<String>,
    pub date: Option<String>,
    pub rights: Option<String>,
    /// Href of the cover image resource.
    pub cover_image: Option<String>,
}

/// An item in the reading order (spine)
#[derive(Debug, Clone)]
pub struct SpineItem {
    pub id: String,
    pub href: String,
    pub media_type: String,
    pub linear: bool,
}

/// A table of contents entry (hierarchical)
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TocEntry {
    pub title: String,
    pub href: String,
    pub children: Vec<TocEntry>,
    /// NCX playOrder attribute
    pub play_order: Option<usize>,
}

/// A resource (content document, image, CSS, font, etc.)
#[derive(Debug, Clone)]
pub struct Resource {
    pub data: Vec<u8>,
    pub media_type: String,
}

impl Book {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resource to the book
    pub fn add_resource(&mut self, href: impl Into<String>, data: Vec<u8>, media_type: impl Into<String>) {
        self.resources.insert(href.into(), Resource {
            data,
            media_type: media_type.into(),
        });
    }

    /// Get a resource by href
    pub fn get_resource(&self, href: &str) -> Option<&Resource> {
        self.resources.get(href)
    }

    /// Add a spine item
    pub fn add_spine_item(&mut self, id: impl Into<String>, href: impl Into<String>, media_type: impl Into<String>) {
        self.spine.push(SpineItem {
            id: id.into(),
            href: href.into(),
            media_type: media_type.into(),
            linear: true,
        });
    }

    /// Add an image resource and mark it as the cover.
    pub fn set_cover(&mut self, href: impl Into<String>, data: Vec<u8>, media_type: impl Into<String>) {
        let href = href.into();
        self.add_resource(href.clone(), data, media_type);
        self.metadata.cover_image = Some(href);
    }

    /// The cover image resource, if the book declares one.
    pub fn cover(&self) -> Option<(&str, &Resource)> {
        let href = self.metadata.cover_image.as_deref()?;
        self.resources.get(href).map(|resource| (href, resource))
    }

    /// Spine items whose content is an XHTML/HTML document, in reading order.
    pub fn documents(&self) -> impl Iterator<Item = (&SpineItem, &Resource)> {
        self.spine.iter().filter_map(|item| {
            let resource = self.resources.get(&item.href)?;
            resource.media_type.contains("html").then_some((item, resource))
        })
    }
}

impl Metadata {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.authors.push(author.into());
        self
    }

    pub fn with_contributor(mut self, contributor: impl Into<String>) -> Self {
        self.contributors.push(contributor.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = identifier.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }
}

impl TocEntry {
    pub fn new(title: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            href: href.into(),
            children: Vec::new(),
            play_order: None,
        }
    }

    pub fn with_child(mut self, child: TocEntry) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_play_order(mut self, order: usize) -> Self {
        self.play_order = Some(order);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cover_lookup() {
        let mut book = Book::new();
        assert!(book.cover().is_none());
        book.set_cover("cover.jpeg", vec![0xFF, 0xD8], "image/jpeg");
        let (href, resource) = book.cover().unwrap();
        assert_eq!(href, "cover.jpeg");
        assert_eq!(resource.media_type, "image/jpeg");
    }

    #[test]
    fn test_documents_skip_non_html_and_missing() {
        let mut book = Book::new();
        book.add_resource("a.xhtml", b"<p/>".to_vec(), "application/xhtml+xml");
        book.add_resource("cover.jpeg", vec![1], "image/jpeg");
        book.add_spine_item("a", "a.xhtml", "application/xhtml+xml");
        book.add_spine_item("c", "cover.jpeg", "image/jpeg");
        book.add_spine_item("gone", "gone.xhtml", "application/xhtml+xml");

        let hrefs: Vec<_> = book.documents().map(|(item, _)| item.href.as_str()).collect();
        assert_eq!(hrefs, vec!["a.xhtml"]);
    }
}
