use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::collections::HashMap;
use std::io::{Read, Seek};
use std::path::Path;
use zip::ZipArchive;

use crate::book::{Book, Metadata, TocEntry};
use crate::error::{Error, Result};
use crate::util::{local_name, resolve_entity};

/// Package document contents needed to assemble a [`Book`].
struct Package {
    metadata: Metadata,
    /// Manifest id -> (href, media type)
    manifest: HashMap<String, (String, String)>,
    /// Spine idrefs with their `linear` flag.
    spine: Vec<(String, bool)>,
    ncx_href: Option<String>,
}

/// Read an EPUB file from disk into a [`Book`].
///
/// Understands EPUB 2 packages and the EPUB 3 `cover-image` manifest property.
/// Resources listed in the manifest but missing from the archive are skipped.
///
/// # Example
///
/// ```no_run
/// use txtbook::read_epub;
///
/// let book = read_epub("path/to/book.epub")?;
/// println!("Title: {}", book.metadata.title);
/// # Ok::<(), txtbook::Error>(())
/// ```
pub fn read_epub<P: AsRef<Path>>(path: P) -> Result<Book> {
    let file = std::fs::File::open(path)?;
    read_epub_from_reader(file)
}

/// Read an EPUB from any [`Read`] + [`Seek`] source.
pub fn read_epub_from_reader<R: Read + Seek>(reader: R) -> Result<Book> {
    let mut archive = ZipArchive::new(reader)?;

    let opf_path = find_opf_path(&mut archive)?;
    let opf_dir = Path::new(&opf_path)
        .parent()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_default();

    let opf_content = read_archive_file(&mut archive, &opf_path)?;
    let Package {
        metadata,
        manifest,
        spine,
        ncx_href,
    } = parse_opf(&opf_content)?;

    let mut book = Book::new();
    book.metadata = metadata;

    for (href, media_type) in manifest.values() {
        let full_path = resolve_path(&opf_dir, href);
        match read_archive_file_bytes(&mut archive, &full_path) {
            Ok(data) => book.add_resource(href.clone(), data, media_type.clone()),
            Err(err) => tracing::debug!(href = %href, error = %err, "manifest item missing"),
        }
    }

    for (id, linear) in spine {
        if let Some((href, media_type)) = manifest.get(&id) {
            book.add_spine_item(&id, href.clone(), media_type.clone());
            if let Some(item) = book.spine.last_mut() {
                item.linear = linear;
            }
        }
    }

    if let Some(ncx_href) = ncx_href {
        let ncx_path = resolve_path(&opf_dir, &ncx_href);
        if let Ok(ncx_content) = read_archive_file(&mut archive, &ncx_path) {
            book.toc = parse_ncx(&ncx_content)?;
        }
    }

    tracing::debug!(
        title = %book.metadata.title,
        documents = book.spine.len(),
        toc = book.toc.len(),
        "read epub"
    );
    Ok(book)
}

fn find_opf_path<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<String> {
    let container = read_archive_file(archive, "META-INF/container.xml")?;

    let mut reader = Reader::from_str(&container);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event() {
            Ok(Event::Empty(e)) | Ok(Event::Start(e)) if local_name(e.name().as_ref()) == b"rootfile" => {
                if let Some(path) = attribute(&e, b"full-path")? {
                    return Ok(path);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::Xml(e)),
            _ => {}
        }
    }

    Err(Error::InvalidEpub(
        "No rootfile found in container.xml".into(),
    ))
}

/// Dublin Core elements collected from `<metadata>`.
const DC_FIELDS: &[&[u8]] = &[
    b"title",
    b"creator",
    b"contributor",
    b"language",
    b"identifier",
    b"publisher",
    b"description",
    b"subject",
    b"date",
    b"rights",
];

/// Manifest and spine entries collected while scanning the package document.
#[derive(Default)]
struct Entries {
    /// id -> (href, media type, properties)
    items: HashMap<String, (String, String, Option<String>)>,
    spine: Vec<(String, bool)>,
    toc_id: Option<String>,
    cover_meta: Option<String>,
}

impl Entries {
    /// Record `e` if it is a package element that carries its data in attributes.
    ///
    /// Called for both `<item/>` and `<item></item>` forms.
    fn collect(&mut self, e: &BytesStart<'_>) -> Result<()> {
        let name = e.name();
        match local_name(name.as_ref()) {
            b"item" => {
                if let Some(id) = attribute(e, b"id")? {
                    let href = attribute(e, b"href")?.unwrap_or_default();
                    let media_type = attribute(e, b"media-type")?.unwrap_or_default();
                    let properties = attribute(e, b"properties")?;
                    self.items.insert(id, (href, media_type, properties));
                }
            }
            b"itemref" => {
                if let Some(idref) = attribute(e, b"idref")? {
                    let linear = attribute(e, b"linear")?.as_deref() != Some("no");
                    self.spine.push((idref, linear));
                }
            }
            b"meta" => {
                if attribute(e, b"name")?.as_deref() == Some("cover") {
                    self.cover_meta = attribute(e, b"content")?;
                }
            }
            b"spine" => self.toc_id = attribute(e, b"toc")?,
            _ => {}
        }
        Ok(())
    }
}

fn parse_opf(content: &str) -> Result<Package> {
    // Entities arrive as separate events, so values are trimmed once at their end tag.
    let mut reader = Reader::from_str(content);

    let mut metadata = Metadata::default();
    let mut entries = Entries::default();

    let mut in_metadata = false;
    let mut field: Option<Vec<u8>> = None;
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.name();
                let local = local_name(name.as_ref());
                if local == b"metadata" {
                    in_metadata = true;
                } else if in_metadata && DC_FIELDS.iter().any(|field| *field == local) {
                    field = Some(local.to_vec());
                    text.clear();
                } else {
                    entries.collect(&e)?;
                }
            }
            Ok(Event::Empty(e)) => entries.collect(&e)?,
            Ok(Event::Text(e)) => {
                if field.is_some() {
                    text.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Ok(Event::CData(e)) => {
                if field.is_some() {
                    text.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if field.is_some()
                    && let Some(c) = resolve_entity(&String::from_utf8_lossy(e.as_ref()))
                {
                    text.push(c);
                }
            }
            Ok(Event::End(e)) => {
                let name = e.name();
                if local_name(name.as_ref()) == b"metadata" {
                    in_metadata = false;
                }
                if let Some(element) = field.take() {
                    let value = std::mem::take(&mut text);
                    set_field(&mut metadata, &element, value.trim().to_string());
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::Xml(e)),
            _ => {}
        }
    }

    let Entries {
        items,
        spine,
        toc_id,
        cover_meta,
    } = entries;

    // EPUB 3 cover-image property wins over the EPUB 2 <meta name="cover">.
    let epub3_cover = items.values().find(|(_, _, properties)| {
        properties
            .as_deref()
            .is_some_and(|p| p.split_ascii_whitespace().any(|p| p == "cover-image"))
    });
    metadata.cover_image = match epub3_cover {
        Some((href, _, _)) => Some(href.clone()),
        None => cover_meta
            .and_then(|id| items.get(&id))
            .map(|(href, _, _)| href.clone()),
    };

    let manifest: HashMap<String, (String, String)> = items
        .into_iter()
        .map(|(id, (href, media_type, _))| (id, (href, media_type)))
        .collect();

    let ncx_href = toc_id
        .and_then(|id| manifest.get(&id))
        .map(|(href, _)| href.clone());

    Ok(Package {
        metadata,
        manifest,
        spine,
        ncx_href,
    })
}

fn set_field(metadata: &mut Metadata, element: &[u8], value: String) {
    match element {
        b"title" => metadata.title = value,
        b"creator" => metadata.authors.push(value),
        b"contributor" => metadata.contributors.push(value),
        b"language" => metadata.language = value,
        b"identifier" if metadata.identifier.is_empty() => metadata.identifier = value,
        b"publisher" => metadata.publisher = Some(value),
        b"description" => metadata.description = Some(value),
        b"subject" => metadata.subjects.push(value),
        b"date" => metadata.date = Some(value),
        b"rights" => metadata.rights = Some(value),
        _ => {}
    }
}

fn parse_ncx(content: &str) -> Result<Vec<TocEntry>> {
    let mut reader = Reader::from_str(content);

    // One frame per open navPoint; the bottom frame collects the top level.
    struct Frame {
        children: Vec<TocEntry>,
        text: Option<String>,
        src: Option<String>,
        play_order: Option<usize>,
    }

    impl Frame {
        fn new(play_order: Option<usize>) -> Self {
            Self {
                children: Vec::new(),
                text: None,
                src: None,
                play_order,
            }
        }

        fn push_text(&mut self, s: &str) {
            self.text.get_or_insert_with(String::new).push_str(s);
        }
    }

    let mut stack = vec![Frame::new(None)];
    let mut in_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.name();
                match local_name(name.as_ref()) {
                    b"navPoint" => {
                        let play_order = attribute(&e, b"playOrder")?.and_then(|s| s.parse().ok());
                        stack.push(Frame::new(play_order));
                    }
                    b"text" => in_text = true,
                    _ => {}
                }
            }
            Ok(Event::Empty(e)) => {
                let name = e.name();
                if local_name(name.as_ref()) == b"content"
                    && let Some(src) = attribute(&e, b"src")?
                    && let Some(frame) = stack.last_mut()
                {
                    frame.src = Some(src);
                }
            }
            Ok(Event::Text(e)) => {
                if in_text && let Some(frame) = stack.last_mut() {
                    frame.push_text(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if in_text
                    && let Some(frame) = stack.last_mut()
                    && let Some(c) = resolve_entity(&String::from_utf8_lossy(e.as_ref()))
                {
                    frame.push_text(c.encode_utf8(&mut [0; 4]));
                }
            }
            Ok(Event::End(e)) => {
                let name = e.name();
                match local_name(name.as_ref()) {
                    b"text" => in_text = false,
                    b"navPoint" => {
                        // Keep the bottom frame; a stray end tag must not drop the result.
                        if stack.len() > 1
                            && let Some(frame) = stack.pop()
                            && let (Some(text), Some(src)) = (frame.text, frame.src)
                            && let Some(parent) = stack.last_mut()
                        {
                            let mut entry = TocEntry::new(text.trim(), src);
                            entry.children = frame.children;
                            entry.play_order = frame.play_order;
                            parent.children.push(entry);
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::Xml(e)),
            _ => {}
        }
    }

    Ok(stack.into_iter().next().map(|f| f.children).unwrap_or_default())
}

fn attribute(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>> {
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == key {
            return Ok(Some(String::from_utf8(attr.value.to_vec())?));
        }
    }
    Ok(None)
}

fn read_archive_file<R: Read + Seek>(archive: &mut ZipArchive<R>, path: &str) -> Result<String> {
    let bytes = read_archive_file_bytes(archive, path)?;
    Ok(String::from_utf8(strip_bom(&bytes).to_vec())?)
}

fn read_archive_file_bytes<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    path: &str,
) -> Result<Vec<u8>> {
    match archive.by_name(path) {
        Ok(mut file) => {
            let mut contents = Vec::new();
            file.read_to_end(&mut contents)?;
            return Ok(contents);
        }
        Err(zip::result::ZipError::FileNotFound) => {}
        Err(e) => return Err(e.into()),
    }

    // Some producers percent-encode hrefs in the manifest but not in the archive.
    let decoded = percent_encoding::percent_decode_str(path)
        .decode_utf8()
        .map_err(|_| Error::InvalidEpub(format!("Invalid UTF-8 in path: {}", path)))?;

    let mut file = archive.by_name(&decoded)?;
    let mut contents = Vec::new();
    file.read_to_end(&mut contents)?;
    Ok(contents)
}

fn strip_bom(data: &[u8]) -> &[u8] {
    data.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(data)
}

fn resolve_path(base: &str, href: &str) -> String {
    if base.is_empty() {
        href.to_string()
    } else {
        format!("{}/{}", base, href)
    }
}
