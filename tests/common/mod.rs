//! Builders for small in-memory OpenDocument packages.

#![allow(dead_code)]

use std::io::{Cursor, Read, Write};

use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub const NAMESPACES: &str = concat!(
    r#"xmlns:office="urn:oasis:names:tc:opendocument:xmlns:office:1.0" "#,
    r#"xmlns:text="urn:oasis:names:tc:opendocument:xmlns:text:1.0" "#,
    r#"xmlns:table="urn:oasis:names:tc:opendocument:xmlns:table:1.0" "#,
    r#"xmlns:draw="urn:oasis:names:tc:opendocument:xmlns:drawing:1.0" "#,
    r#"xmlns:xlink="http://www.w3.org/1999/xlink" "#,
    r#"xmlns:svg="urn:oasis:names:tc:opendocument:xmlns:svg-compatible:1.0" "#,
    r#"xmlns:meta="urn:oasis:names:tc:opendocument:xmlns:meta:1.0" "#,
    r#"xmlns:dc="http://purl.org/dc/elements/1.1/""#,
);

pub const SETTINGS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<office:document-settings xmlns:office="urn:oasis:names:tc:opendocument:xmlns:office:1.0" office:version="1.3"><office:settings/></office:document-settings>"#;

pub const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<office:document-styles xmlns:office="urn:oasis:names:tc:opendocument:xmlns:office:1.0" office:version="1.3"><office:styles/></office:document-styles>"#;

pub const MANIFEST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<manifest:manifest xmlns:manifest="urn:oasis:names:tc:opendocument:xmlns:manifest:1.0" manifest:version="1.3">
 <manifest:file-entry manifest:full-path="/" manifest:media-type="application/vnd.oasis.opendocument.text"/>
 <manifest:file-entry manifest:full-path="Thumbnails/thumbnail.png" manifest:media-type="image/png"/>
 <manifest:file-entry manifest:full-path="Thumbnails/" manifest:media-type=""/>
 <manifest:file-entry manifest:full-path="content.xml" manifest:media-type="text/xml"/>
 <manifest:file-entry manifest:full-path="styles.xml" manifest:media-type="text/xml"/>
 <manifest:file-entry manifest:full-path="meta.xml" manifest:media-type="text/xml"/>
 <manifest:file-entry manifest:full-path="settings.xml" manifest:media-type="text/xml"/>
</manifest:manifest>"#;

/// A content part whose text body is `body`.
pub fn content(body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<office:document-content {NAMESPACES} office:version="1.3"><office:body><office:text>{body}</office:text></office:body></office:document-content>"#
    )
}

/// A spreadsheet content part whose body is `body`.
pub fn spreadsheet(body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<office:document-content {NAMESPACES} office:version="1.3"><office:body><office:spreadsheet>{body}</office:spreadsheet></office:body></office:document-content>"#
    )
}

/// A metadata part with a generator, an initial creator and `fields`.
pub fn meta(fields: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<office:document-meta {NAMESPACES} office:version="1.3"><office:meta><meta:generator>LibreOffice/7.6</meta:generator><meta:initial-creator>Someone</meta:initial-creator><meta:editing-cycles>12</meta:editing-cycles>{fields}</office:meta></office:document-meta>"#
    )
}

/// Statement hyperlink whose visible text is the expression itself.
pub fn link(expr: &str) -> String {
    format!(
        r#"<text:a xlink:href="relatorio://{}">{}</text:a>"#,
        utf8_percent_encode(expr, NON_ALPHANUMERIC),
        expr.replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;")
            .replace('"', "&quot;")
    )
}

/// Text document package around `content_xml`.
pub fn odt(content_xml: &str) -> Vec<u8> {
    odt_with_meta(content_xml, &meta(""))
}

pub fn odt_with_meta(content_xml: &str, meta_xml: &str) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let deflated = SimpleFileOptions::default();

    zip.start_file("mimetype", stored).unwrap();
    zip.write_all(b"application/vnd.oasis.opendocument.text").unwrap();
    for (name, data) in [
        ("content.xml", content_xml),
        ("styles.xml", STYLES),
        ("meta.xml", meta_xml),
        ("settings.xml", SETTINGS),
    ] {
        zip.start_file(name, deflated).unwrap();
        zip.write_all(data.as_bytes()).unwrap();
    }
    zip.start_file("Thumbnails/thumbnail.png", stored).unwrap();
    zip.write_all(b"\x89PNG\r\n\x1a\nthumb").unwrap();
    zip.start_file("META-INF/manifest.xml", deflated).unwrap();
    zip.write_all(MANIFEST.as_bytes()).unwrap();
    zip.finish().unwrap().into_inner()
}

/// Package holding exactly `entries`, deflated, in order.
pub fn package(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(data.as_bytes()).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

/// Decompressed entry of a rendered package.
pub fn read_entry(package: &[u8], name: &str) -> Option<String> {
    let mut archive = ZipArchive::new(Cursor::new(package)).unwrap();
    let mut entry = archive.by_name(name).ok()?;
    let mut out = String::new();
    entry.read_to_string(&mut out).unwrap();
    Some(out)
}

pub fn entry_names(package: &[u8]) -> Vec<String> {
    let mut archive = ZipArchive::new(Cursor::new(package)).unwrap();
    (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect()
}

/// Compression method of an entry.
pub fn compression_of(package: &[u8], name: &str) -> CompressionMethod {
    let mut archive = ZipArchive::new(Cursor::new(package)).unwrap();
    archive.by_name(name).unwrap().compression()
}

/// Text between `<office:text>` and `</office:text>`.
pub fn body(content_xml: &str) -> &str {
    if content_xml.contains("<office:text/>") {
        return "";
    }
    let start = content_xml.find("<office:text>").map_or(0, |i| i + "<office:text>".len());
    let end = content_xml.rfind("</office:text>").unwrap_or(content_xml.len());
    &content_xml[start..end]
}
