//! Streaming output archive.

use std::collections::{HashMap, HashSet};
use std::io::{Read, Seek, Write};

use chrono::{Datelike, Timelike};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::manifest::{MANIFEST_PATH, Manifest};
use super::resources::Resource;
use crate::config::RenderOptions;
use crate::dom::XmlWriter;
use crate::error::{Error, Result};
use crate::render::XmlEvent;

/// Entries never carried over to the output.
const OBJECT_REPLACEMENTS: &str = "ObjectReplacements";
const THUMBNAILS: &str = "Thumbnails/";

/// Writes rendered events into a copy of the template archive.
///
/// Creating the writer copies every entry that is not rendered. Events then
/// stream into the entry opened by the last [`XmlEvent::Part`]; serialized
/// bytes are flushed to it every `chunk_size` events. Resources handed over
/// while an entry is open wait until it is closed.
pub struct PackageWriter<W: Write + Seek> {
    zip: ZipWriter<W>,
    manifest: Manifest,
    manifest_options: SimpleFileOptions,
    parts: HashMap<String, CompressionMethod>,
    options: RenderOptions,
    timestamp: zip::DateTime,
    written: HashSet<String>,
    deferred: Vec<Resource>,
    xml: XmlWriter,
    current: Option<String>,
    events: usize,
}

impl<W: Write + Seek> PackageWriter<W> {
    /// Start the output archive, copying every entry of `source` except the
    /// rendered `parts`, thumbnails, object replacements and the manifest.
    pub fn new<R: Read + Seek>(
        source: &mut ZipArchive<R>,
        parts: &[&str],
        options: &RenderOptions,
        out: W,
    ) -> Result<Self> {
        let mut manifest_bytes = Vec::new();
        let mut manifest_options = SimpleFileOptions::default();
        let mut part_methods = HashMap::new();
        let mut zip = ZipWriter::new(out);
        let mut written = HashSet::new();
        let mut dropped = Vec::new();

        for i in 0..source.len() {
            let name = source.by_index_raw(i)?.name().to_string();
            if name.starts_with(OBJECT_REPLACEMENTS) {
                tracing::trace!(entry = %name, "dropping object replacement");
            } else if parts.contains(&name.as_str()) {
                part_methods.insert(name, source.by_index_raw(i)?.compression());
            } else if name == MANIFEST_PATH {
                let mut entry = source.by_index(i)?;
                manifest_options = manifest_options.compression_method(entry.compression());
                if let Some(modified) = entry.last_modified() {
                    manifest_options = manifest_options.last_modified_time(modified);
                }
                entry.read_to_end(&mut manifest_bytes)?;
            } else if name.starts_with(THUMBNAILS) {
                tracing::debug!(entry = %name, "dropping thumbnail");
                dropped.push(name);
            } else {
                zip.raw_copy_file(source.by_index_raw(i)?)?;
                written.insert(name);
            }
        }

        if manifest_bytes.is_empty() {
            return Err(Error::MissingPart(MANIFEST_PATH.into()));
        }
        let mut manifest = Manifest::parse(&manifest_bytes)?;
        for name in &dropped {
            manifest.remove_file_entry(name);
        }
        manifest.remove_file_entry(THUMBNAILS);

        tracing::debug!(
            copied = written.len(),
            rendered = part_methods.len(),
            "copied untouched entries"
        );

        Ok(Self {
            zip,
            manifest,
            manifest_options,
            parts: part_methods,
            options: options.clone(),
            timestamp: now(),
            written,
            deferred: Vec::new(),
            xml: XmlWriter::new(),
            current: None,
            events: 0,
        })
    }

    /// Options for an entry the writer creates.
    fn entry_options(&self, method: CompressionMethod) -> SimpleFileOptions {
        let options = SimpleFileOptions::default()
            .compression_method(method)
            .last_modified_time(self.timestamp)
            .large_file(self.options.zip64);
        match method {
            CompressionMethod::Stored => options,
            _ => options.compression_level(self.options.compression_level),
        }
    }

    /// Hand over resources to be written once no entry is open.
    pub fn add_resources(&mut self, resources: Vec<Resource>) {
        if resources.is_empty() {
            return;
        }
        if self.current.is_some() {
            tracing::trace!(count = resources.len(), "deferring resources");
        }
        self.deferred.extend(resources);
    }

    pub fn write_event(&mut self, event: XmlEvent) -> Result<()> {
        match event {
            XmlEvent::Part(path) => {
                self.close_entry()?;
                self.write_deferred()?;
                self.open_entry(path)?;
                return Ok(());
            }
            XmlEvent::RepeatStart { .. } | XmlEvent::RepeatEnd => return Ok(()),
            _ if self.current.is_none() => {
                return Err(Error::InvalidPackage(
                    "rendered content before the first part".into(),
                ));
            }
            XmlEvent::Decl(raw) | XmlEvent::Pi(raw) => self.xml.pi(&raw)?,
            XmlEvent::DocType(raw) => self.xml.doctype(&raw)?,
            XmlEvent::Start { name, attrs } => self
                .xml
                .start(&name, attrs.iter().map(|(k, v)| (k.as_str(), v.as_str())))?,
            XmlEvent::End { name } => self.xml.end(&name)?,
            XmlEvent::Text(text) => self.xml.text(&text)?,
            XmlEvent::Comment(text) => self.xml.comment(&text)?,
        }

        self.events += 1;
        if self.events > self.options.chunk_size {
            self.flush()?;
        }
        Ok(())
    }

    fn open_entry(&mut self, path: String) -> Result<()> {
        let method = self
            .parts
            .get(&path)
            .copied()
            .unwrap_or_else(|| self.options.compression.method());
        let options = self.entry_options(method);
        self.zip.start_file(path.as_str(), options)?;
        tracing::debug!(part = %path, "writing rendered part");
        self.written.insert(path.clone());
        self.current = Some(path);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        let bytes = self.xml.take();
        if !bytes.is_empty() {
            self.zip.write_all(&bytes)?;
        }
        self.events = 0;
        Ok(())
    }

    fn close_entry(&mut self) -> Result<()> {
        if self.current.take().is_none() {
            return Ok(());
        }
        let bytes = std::mem::take(&mut self.xml).finish()?;
        self.zip.write_all(&bytes)?;
        self.events = 0;
        Ok(())
    }

    fn write_deferred(&mut self) -> Result<()> {
        for resource in std::mem::take(&mut self.deferred) {
            if !self.written.insert(resource.path.clone()) {
                tracing::trace!(path = %resource.path, "resource already written");
                continue;
            }
            let options = self.entry_options(self.options.compression.method());
            self.zip.start_file(resource.path.as_str(), options)?;
            self.zip.write_all(&resource.data)?;
            self.manifest.add_file_entry(&resource.path, &resource.mime);
        }
        Ok(())
    }

    /// Close the last entry, write pending resources and the rebuilt
    /// manifest, and finish the archive.
    pub fn finish(mut self) -> Result<W> {
        self.close_entry()?;
        self.write_deferred()?;
        self.zip
            .start_file(MANIFEST_PATH, self.manifest_options)?;
        self.zip.write_all(&self.manifest.to_bytes()?)?;
        Ok(self.zip.finish()?)
    }
}

fn now() -> zip::DateTime {
    let now = chrono::Local::now();
    zip::DateTime::from_date_and_time(
        u16::try_from(now.year()).unwrap_or(1980),
        now.month() as u8,
        now.day() as u8,
        now.hour() as u8,
        now.minute() as u8,
        now.second() as u8,
    )
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::package::resource_path;

    const MANIFEST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<manifest:manifest xmlns:manifest="urn:oasis:names:tc:opendocument:xmlns:manifest:1.0">
 <manifest:file-entry manifest:full-path="/" manifest:media-type="application/vnd.oasis.opendocument.text"/>
 <manifest:file-entry manifest:full-path="content.xml" manifest:media-type="text/xml"/>
 <manifest:file-entry manifest:full-path="Thumbnails/thumbnail.png" manifest:media-type="image/png"/>
 <manifest:file-entry manifest:full-path="Thumbnails/" manifest:media-type=""/>
</manifest:manifest>"#;

    fn source() -> ZipArchive<Cursor<Vec<u8>>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        for (name, data) in [
            ("mimetype", "application/vnd.oasis.opendocument.text"),
            ("content.xml", "<template/>"),
            ("settings.xml", "<settings/>"),
            ("Thumbnails/thumbnail.png", "png"),
            ("ObjectReplacements/Object 1", "obj"),
            (MANIFEST_PATH, MANIFEST),
        ] {
            zip.start_file(name, stored).unwrap();
            zip.write_all(data.as_bytes()).unwrap();
        }
        ZipArchive::new(zip.finish().unwrap()).unwrap()
    }

    fn read(archive: &mut ZipArchive<Cursor<Vec<u8>>>, name: &str) -> String {
        let mut out = String::new();
        archive.by_name(name).unwrap().read_to_string(&mut out).unwrap();
        out
    }

    fn render(events: Vec<XmlEvent>, resources: Vec<Resource>, chunk_size: usize) -> ZipArchive<Cursor<Vec<u8>>> {
        let mut source = source();
        let options = RenderOptions::default().with_chunk_size(chunk_size);
        let mut writer =
            PackageWriter::new(&mut source, &["content.xml"], &options, Cursor::new(Vec::new()))
                .unwrap();
        for event in events {
            writer.write_event(event).unwrap();
            writer.add_resources(resources.clone());
        }
        ZipArchive::new(writer.finish().unwrap()).unwrap()
    }

    fn events() -> Vec<XmlEvent> {
        vec![
            XmlEvent::Part("content.xml".into()),
            XmlEvent::start("doc"),
            XmlEvent::text("a < b"),
            XmlEvent::start("empty"),
            XmlEvent::end("empty"),
            XmlEvent::end("doc"),
        ]
    }

    #[test]
    fn test_entries_copied_rendered_and_dropped() {
        let mut out = render(events(), Vec::new(), 1);
        let names: Vec<_> = out.file_names().map(str::to_string).collect();
        assert_eq!(
            names,
            vec!["mimetype", "settings.xml", "content.xml", MANIFEST_PATH]
        );
        assert_eq!(read(&mut out, "content.xml"), "<doc>a &lt; b<empty/></doc>");
        assert_eq!(read(&mut out, "settings.xml"), "<settings/>");
        assert_eq!(
            out.by_name("content.xml").unwrap().compression(),
            CompressionMethod::Stored
        );

        let manifest = Manifest::parse(read(&mut out, MANIFEST_PATH).as_bytes()).unwrap();
        assert_eq!(manifest.paths(), vec!["/", "content.xml"]);
    }

    #[test]
    fn test_chunking_does_not_change_output() {
        let mut small = render(events(), Vec::new(), 1);
        let mut large = render(events(), Vec::new(), 1000);
        assert_eq!(read(&mut small, "content.xml"), read(&mut large, "content.xml"));
    }

    #[test]
    fn test_resources_written_once_after_entry() {
        let data = b"0123456789".to_vec();
        let path = resource_path(&data, "image/png");
        let resource = Resource {
            path: path.clone(),
            mime: "image/png".into(),
            data,
        };
        let mut out = render(events(), vec![resource], 64);

        let names: Vec<_> = out.file_names().map(str::to_string).collect();
        assert_eq!(names.iter().filter(|n| **n == path).count(), 1);
        assert_eq!(names.last().map(String::as_str), Some(MANIFEST_PATH));
        assert_eq!(read(&mut out, "content.xml"), "<doc>a &lt; b<empty/></doc>");

        let manifest = Manifest::parse(read(&mut out, MANIFEST_PATH).as_bytes()).unwrap();
        assert_eq!(manifest.media_type(&path), Some("image/png"));
    }

    #[test]
    fn test_content_before_part_is_rejected() {
        let mut source = source();
        let mut writer = PackageWriter::new(
            &mut source,
            &["content.xml"],
            &RenderOptions::default(),
            Cursor::new(Vec::new()),
        )
        .unwrap();
        assert!(writer.write_event(XmlEvent::text("x")).is_err());
    }
}
