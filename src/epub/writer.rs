use std::io::{Seek, Write};
use std::path::Path;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::book::{Book, TocEntry};
use crate::error::Result;
use crate::util::{escape_xml, href_to_id, uuid_v4};

/// Write a [`Book`] to an EPUB file on disk.
///
/// Creates a valid EPUB 2 file with OPF package document, NCX table of contents,
/// and all resources properly packaged.
///
/// # Example
///
/// ```no_run
/// use txtbook::{Book, Metadata, write_epub};
///
/// let mut book = Book::new();
/// book.metadata = Metadata::new("My Book").with_author("Me");
/// write_epub(&book, "output.epub")?;
/// # Ok::<(), txtbook::Error>(())
/// ```
pub fn write_epub<P: AsRef<Path>>(book: &Book, path: P) -> Result<()> {
    let file = std::fs::File::create(path)?;
    write_epub_to_writer(book, file)
}

/// Write a [`Book`] to any [`Write`] + [`Seek`] destination.
///
/// Useful for writing to memory buffers.
pub fn write_epub_to_writer<W: Write + Seek>(book: &Book, writer: W) -> Result<()> {
    let mut zip = ZipWriter::new(writer);

    // 1. Write mimetype (must be first, uncompressed)
    let options_stored =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    let options_deflate =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    zip.start_file("mimetype", options_stored)?;
    zip.write_all(b"application/epub+zip")?;

    // 2. Write META-INF/container.xml
    zip.start_file("META-INF/container.xml", options_deflate)?;
    zip.write_all(CONTAINER_XML.as_bytes())?;

    // Generate identifier once for consistency between OPF and NCX
    let identifier = if book.metadata.identifier.is_empty() {
        format!("urn:uuid:{}", uuid_v4())
    } else {
        book.metadata.identifier.clone()
    };

    // Manifest order follows href so repeated writes produce identical archives.
    let mut hrefs: Vec<&String> = book
        .resources
        .keys()
        .filter(|href| *href != "toc.ncx" && *href != "content.opf")
        .collect();
    hrefs.sort();

    // 3. Write content.opf
    let opf = generate_opf(book, &identifier, &hrefs);
    zip.start_file("OEBPS/content.opf", options_deflate)?;
    zip.write_all(opf.as_bytes())?;

    // 4. Write toc.ncx
    let ncx = generate_ncx(book, &identifier);
    zip.start_file("OEBPS/toc.ncx", options_deflate)?;
    zip.write_all(ncx.as_bytes())?;

    // 5. Write all resources
    for href in hrefs {
        let resource = &book.resources[href];
        zip.start_file(format!("OEBPS/{href}"), options_deflate)?;
        zip.write_all(&resource.data)?;
    }

    zip.finish()?;
    tracing::debug!(
        title = %book.metadata.title,
        documents = book.spine.len(),
        resources = book.resources.len(),
        "wrote epub"
    );
    Ok(())
}

const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

fn generate_opf(book: &Book, identifier: &str, hrefs: &[&String]) -> String {
    let mut opf = String::new();
    let meta = &book.metadata;

    opf.push_str(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="BookId">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:opf="http://www.idpf.org/2007/opf">
"#,
    );

    // Dublin Core metadata
    opf.push_str(&format!(
        "    <dc:title>{}</dc:title>\n",
        escape_xml(&meta.title)
    ));

    opf.push_str(&format!(
        "    <dc:identifier id=\"BookId\">{}</dc:identifier>\n",
        escape_xml(identifier)
    ));

    let language = if meta.language.is_empty() {
        "en"
    } else {
        &meta.language
    };
    opf.push_str(&format!(
        "    <dc:language>{}</dc:language>\n",
        escape_xml(language)
    ));

    for author in &meta.authors {
        opf.push_str(&format!(
            "    <dc:creator opf:role=\"aut\">{}</dc:creator>\n",
            escape_xml(author)
        ));
    }

    for contributor in &meta.contributors {
        opf.push_str(&format!(
            "    <dc:contributor>{}</dc:contributor>\n",
            escape_xml(contributor)
        ));
    }

    if let Some(ref publisher) = meta.publisher {
        opf.push_str(&format!(
            "    <dc:publisher>{}</dc:publisher>\n",
            escape_xml(publisher)
        ));
    }

    if let Some(ref description) = meta.description {
        opf.push_str(&format!(
            "    <dc:description>{}</dc:description>\n",
            escape_xml(description)
        ));
    }

    for subject in &meta.subjects {
        opf.push_str(&format!(
            "    <dc:subject>{}</dc:subject>\n",
            escape_xml(subject)
        ));
    }

    if let Some(ref date) = meta.date {
        opf.push_str(&format!("    <dc:date>{}</dc:date>\n", escape_xml(date)));
    }

    if let Some(ref rights) = meta.rights {
        opf.push_str(&format!(
            "    <dc:rights>{}</dc:rights>\n",
            escape_xml(rights)
        ));
    }

    if book.cover().is_some() {
        opf.push_str("    <meta name=\"cover\" content=\"cover-image\"/>\n");
    }

    opf.push_str("  </metadata>\n  <manifest>\n");

    // NCX item
    opf.push_str(
        "    <item id=\"ncx\" href=\"toc.ncx\" media-type=\"application/x-dtbncx+xml\"/>\n",
    );

    for href in hrefs {
        let resource = &book.resources[*href];
        let id = if meta.cover_image.as_deref() == Some(href.as_str()) {
            "cover-image".to_string()
        } else {
            href_to_id(href)
        };
        opf.push_str(&format!(
            "    <item id=\"{}\" href=\"{}\" media-type=\"{}\"/>\n",
            id,
            escape_xml(href),
            escape_xml(&resource.media_type)
        ));
    }

    opf.push_str("  </manifest>\n  <spine toc=\"ncx\">\n");

    for item in &book.spine {
        let id = if meta.cover_image.as_deref() == Some(item.href.as_str()) {
            "cover-image".to_string()
        } else {
            href_to_id(&item.href)
        };
        if item.linear {
            opf.push_str(&format!("    <itemref idref=\"{}\"/>\n", id));
        } else {
            opf.push_str(&format!("    <itemref idref=\"{}\" linear=\"no\"/>\n", id));
        }
    }

    opf.push_str("  </spine>\n</package>\n");
    opf
}

fn generate_ncx(book: &Book, identifier: &str) -> String {
    let mut ncx = String::new();

    ncx.push_str(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE ncx PUBLIC "-//NISO//DTD ncx 2005-1//EN" "http://www.daisy.org/z3986/2005/ncx-2005-1.dtd">
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head>
    <meta name="dtb:uid" content=""#,
    );

    ncx.push_str(&escape_xml(identifier));
    ncx.push_str(&format!(
        r#""/>
    <meta name="dtb:depth" content="{}"/>
    <meta name="dtb:totalPageCount" content="0"/>
    <meta name="dtb:maxPageNumber" content="0"/>
  </head>
  <docTitle>
    <text>"#,
        toc_depth(&book.toc).max(1)
    ));
    ncx.push_str(&escape_xml(&book.metadata.title));
    ncx.push_str(
        r#"</text>
  </docTitle>
  <navMap>
"#,
    );

    let mut play_order = 1;
    for entry in &book.toc {
        write_nav_point(&mut ncx, entry, &mut play_order, 2);
    }

    ncx.push_str("  </navMap>\n</ncx>\n");
    ncx
}

fn toc_depth(entries: &[TocEntry]) -> usize {
    entries
        .iter()
        .map(|entry| 1 + toc_depth(&entry.children))
        .max()
        .unwrap_or(0)
}

fn write_nav_point(ncx: &mut String, entry: &TocEntry, play_order: &mut usize, indent: usize) {
    let indent_str = "  ".repeat(indent);

    ncx.push_str(&format!(
        "{}<navPoint id=\"navpoint-{}\" playOrder=\"{}\">\n",
        indent_str, play_order, play_order
    ));
    ncx.push_str(&format!(
        "{}  <navLabel>\n{}    <text>{}</text>\n{}  </navLabel>\n",
        indent_str,
        indent_str,
        escape_xml(&entry.title),
        indent_str
    ));
    ncx.push_str(&format!(
        "{}  <content src=\"{}\"/>\n",
        indent_str,
        escape_xml(&entry.href)
    ));

    *play_order += 1;

    for child in &entry.children {
        write_nav_point(ncx, child, play_order, indent + 1);
    }

    ncx.push_str(&format!("{}</navPoint>\n", indent_str));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::Metadata;

    fn sample_book() -> Book {
        let mut book = Book::new();
        book.metadata = Metadata::new("Tom & Jerry")
            .with_author("作者")
            .with_contributor("etony")
            .with_language("zh")
            .with_identifier("id-1");
        book.add_resource("text/part_1.xhtml", b"<html/>".to_vec(), "application/xhtml+xml");
        book.add_spine_item("part_1", "text/part_1.xhtml", "application/xhtml+xml");
        book.toc.push(
            TocEntry::new("第一卷", "text/part_1.xhtml")
                .with_child(TocEntry::new("第一章", "text/part_1.xhtml#c1")),
        );
        book
    }

    #[test]
    fn test_opf_contains_metadata_and_manifest() {
        let book = sample_book();
        let hrefs: Vec<&String> = book.resources.keys().collect();
        let opf = generate_opf(&book, "id-1", &hrefs);

        assert!(opf.contains("<dc:title>Tom &amp; Jerry</dc:title>"));
        assert!(opf.contains("<dc:creator opf:role=\"aut\">作者</dc:creator>"));
        assert!(opf.contains("<dc:contributor>etony</dc:contributor>"));
        assert!(opf.contains("<dc:language>zh</dc:language>"));
        assert!(opf.contains("href=\"text/part_1.xhtml\""));
        assert!(opf.contains("<itemref idref=\"text_part_1_xhtml\"/>"));
        assert!(!opf.contains("name=\"cover\""));
    }

    #[test]
    fn test_ncx_nesting_and_depth() {
        let ncx = generate_ncx(&sample_book(), "id-1");
        assert!(ncx.contains("<meta name=\"dtb:depth\" content=\"2\"/>"));
        assert!(ncx.contains("playOrder=\"2\""));
        assert!(ncx.contains("<content src=\"text/part_1.xhtml#c1\"/>"));
    }

    #[test]
    fn test_mimetype_is_first_entry() {
        let mut buf = std::io::Cursor::new(Vec::new());
        write_epub_to_writer(&sample_book(), &mut buf).unwrap();

        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(buf.into_inner())).unwrap();
        let first = archive.by_index(0).unwrap();
        assert_eq!(first.name(), "mimetype");
        assert_eq!(first.compression(), zip::CompressionMethod::Stored);
    }
}
