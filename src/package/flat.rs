//! Flat (single XML file) documents to zip packages.

use std::io::{Cursor, Write};

use base64::Engine;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use super::manifest::{MANIFEST_PATH, Manifest};
use crate::dom::{Attribute, Document, Namespaces, NodeData, NodeId, QName, parse, write_document};
use crate::error::{Error, Result};
use crate::util::sniff_media_format;

/// Parts each top-level element of a flat document belongs to.
const PARTS: &[(&str, &[&str])] = &[
    ("meta", &["meta"]),
    ("settings", &["settings"]),
    ("scripts", &["content"]),
    ("font-face-decls", &["content", "styles"]),
    ("styles", &["styles"]),
    ("automatic-styles", &["content", "styles"]),
    ("master-styles", &["styles"]),
    ("body", &["content"]),
];

const DECLARATION: &str = r#"xml version="1.0" encoding="UTF-8""#;

/// An inline picture moved out of a flat document.
struct ExtractedImage {
    path: String,
    mime: &'static str,
    data: Vec<u8>,
}

/// Convert a flat OpenDocument file into the equivalent zip package.
pub fn flat_to_package(bytes: &[u8]) -> Result<Vec<u8>> {
    let flat = parse(bytes)?;
    let ns = Namespaces::from_document(&flat);
    let root = flat.root_element();
    if !ns.is(&flat, root, "office", "document") {
        let name = flat
            .element(root)
            .map(|el| el.name.qualified())
            .unwrap_or_default();
        return Err(Error::UnrecognizedFlatDocument(format!(
            "root element <{name}> is not office:document"
        )));
    }
    let mimetype = ns
        .attr(&flat, root, "office", "mimetype")
        .ok_or_else(|| Error::UnrecognizedFlatDocument("no office:mimetype".into()))?
        .to_string();

    let mut parts: Vec<(&'static str, Document, NodeId)> = Vec::new();
    let mut images = Vec::new();
    for child in flat.element_children(root) {
        let Some(el) = flat.element(child) else {
            continue;
        };
        let files = PARTS
            .iter()
            .find(|(local, _)| ns.matches(&el.name, "office", local))
            .map(|(_, files)| *files)
            .ok_or_else(|| {
                Error::UnrecognizedFlatDocument(format!("unexpected <{}>", el.name.qualified()))
            })?;

        for &file in files {
            let idx = match parts.iter().position(|(name, ..)| *name == file) {
                Some(idx) => idx,
                None => {
                    parts.push(new_part(&flat, &ns, root, file));
                    parts.len() - 1
                }
            };
            let (_, doc, part_root) = &mut parts[idx];
            let copy = doc.import(&flat, child);
            extract_images(doc, &ns, copy, &mut images)?;
            doc.append(*part_root, copy);
        }
    }

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let stored = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    let deflated =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    zip.start_file("mimetype", stored)?;
    zip.write_all(mimetype.as_bytes())?;

    let mut manifest = Manifest::empty()?;
    manifest.add_file_entry("/", &mimetype);
    for (name, doc, _) in &parts {
        let path = format!("{name}.xml");
        zip.start_file(path.as_str(), deflated)?;
        zip.write_all(&write_document(doc)?)?;
        manifest.add_file_entry(&path, "text/xml");
    }
    for image in &images {
        zip.start_file(image.path.as_str(), deflated)?;
        zip.write_all(&image.data)?;
        manifest.add_file_entry(&image.path, image.mime);
    }
    zip.start_file(MANIFEST_PATH, deflated)?;
    zip.write_all(&manifest.to_bytes()?)?;

    tracing::debug!(
        parts = parts.len(),
        images = images.len(),
        "converted flat document"
    );
    Ok(zip.finish()?.into_inner())
}

/// Empty `office:document-{file}` part carrying the flat root's namespace
/// declarations and version.
fn new_part(
    flat: &Document,
    ns: &Namespaces,
    root: NodeId,
    file: &'static str,
) -> (&'static str, Document, NodeId) {
    let attrs: Vec<Attribute> = flat
        .element(root)
        .map(|el| {
            el.attrs
                .iter()
                .filter(|a| {
                    a.name.is_xmlns()
                        || a.name.prefix == "xmlns"
                        || ns.matches(&a.name, "office", "version")
                })
                .cloned()
                .collect()
        })
        .unwrap_or_default();

    let mut doc = Document::new();
    let decl = doc.create(NodeData::Decl(DECLARATION.to_string()));
    doc.append(doc.root(), decl);
    doc.append_text(doc.root(), "\n");
    let name = QName::new(ns.local_prefix("office"), format!("document-{file}"));
    let part_root = doc.create_element(name, attrs);
    doc.append(doc.root(), part_root);
    (file, doc, part_root)
}

/// Move the inline data of every `draw:image` under `node` out of the tree,
/// pointing the image at `Pictures/image{N}{ext}` instead.
fn extract_images(
    doc: &mut Document,
    ns: &Namespaces,
    node: NodeId,
    images: &mut Vec<ExtractedImage>,
) -> Result<()> {
    let frames: Vec<NodeId> = doc
        .descendants(node)
        .filter(|&id| ns.is(doc, id, "draw", "image"))
        .collect();
    let href = ns.qualify("xlink", "href");

    for image in frames {
        let Some(binary) = doc
            .children(image)
            .find(|&id| ns.is(doc, id, "office", "binary-data"))
        else {
            continue;
        };
        let encoded: String = doc
            .text_content(binary)
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        let data = base64::engine::general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| Error::InvalidPackage(format!("bad inline image data: {e}")))?;
        let format = sniff_media_format(&data);
        let path = format!("Pictures/image{}{}", images.len(), format.extension());

        doc.detach(binary);
        if let Some(el) = doc.element_mut(image) {
            el.set_attr(&href, path.as_str());
        }
        images.push(ExtractedImage {
            path,
            mime: format.mime_type(),
            data,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use pretty_assertions::assert_eq;

    use super::*;

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];

    fn flat(body: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<office:document xmlns:office="urn:oasis:names:tc:opendocument:xmlns:office:1.0" xmlns:text="urn:oasis:names:tc:opendocument:xmlns:text:1.0" xmlns:draw="urn:oasis:names:tc:opendocument:xmlns:drawing:1.0" xmlns:xlink="http://www.w3.org/1999/xlink" office:version="1.3" office:mimetype="application/vnd.oasis.opendocument.text">{body}</office:document>"#
        )
    }

    fn read(archive: &mut zip::ZipArchive<Cursor<Vec<u8>>>, name: &str) -> String {
        let mut out = String::new();
        archive.by_name(name).unwrap().read_to_string(&mut out).unwrap();
        out
    }

    #[test]
    fn test_parts_are_split_by_table() {
        let xml = flat(
            "<office:automatic-styles/><office:master-styles/><office:body><office:text><text:p>hi</text:p></office:text></office:body>",
        );
        let bytes = flat_to_package(xml.as_bytes()).unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();

        let names: Vec<_> = archive.file_names().map(str::to_string).collect();
        assert_eq!(names[0], "mimetype");
        assert_eq!(
            archive.by_name("mimetype").unwrap().compression(),
            zip::CompressionMethod::Stored
        );

        let content = read(&mut archive, "content.xml");
        assert!(content.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<office:document-content "));
        assert!(content.contains("<office:automatic-styles/><office:body>"));
        assert!(content.contains("office:version=\"1.3\""));
        assert!(!content.contains("office:mimetype"));

        let styles = read(&mut archive, "styles.xml");
        assert!(styles.contains("<office:automatic-styles/><office:master-styles/></office:document-styles>"));

        let manifest = read(&mut archive, MANIFEST_PATH);
        let manifest = Manifest::parse(manifest.as_bytes()).unwrap();
        assert_eq!(manifest.paths(), vec!["/", "content.xml", "styles.xml"]);
        assert_eq!(
            manifest.media_type("/"),
            Some("application/vnd.oasis.opendocument.text")
        );
    }

    #[test]
    fn test_inline_images_are_extracted() {
        let encoded = base64::engine::general_purpose::STANDARD.encode(PNG);
        let xml = flat(&format!(
            "<office:body><office:text><draw:frame><draw:image><office:binary-data>\n{encoded}\n</office:binary-data></draw:image></draw:frame></office:text></office:body>"
        ));
        let bytes = flat_to_package(xml.as_bytes()).unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();

        let content = read(&mut archive, "content.xml");
        assert!(content.contains(r#"<draw:image xlink:href="Pictures/image0.png"/>"#));

        let mut data = Vec::new();
        archive
            .by_name("Pictures/image0.png")
            .unwrap()
            .read_to_end(&mut data)
            .unwrap();
        assert_eq!(data, PNG);

        let manifest = Manifest::parse(read(&mut archive, MANIFEST_PATH).as_bytes()).unwrap();
        assert_eq!(manifest.media_type("Pictures/image0.png"), Some("image/png"));
    }

    #[test]
    fn test_unknown_elements_are_rejected() {
        let xml = flat("<office:unknown/>");
        assert!(matches!(
            flat_to_package(xml.as_bytes()),
            Err(Error::UnrecognizedFlatDocument(_))
        ));
        assert!(matches!(
            flat_to_package(b"<html/>"),
            Err(Error::UnrecognizedFlatDocument(_))
        ));
    }
}
