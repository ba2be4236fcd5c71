//! OpenDocument packages: reading template parts, writing rendered archives.
//!
//! A [`Package`] wraps the bytes of a zip package. Flat single-file documents
//! are converted to a package when opened, so everything downstream only deals
//! with zip archives.

mod flat;
mod manifest;
mod resources;
mod writer;

use std::collections::HashSet;
use std::io::{Read, Seek};
use std::sync::Arc;

use zip::ZipArchive;
use zip::result::ZipError;

use crate::dom::{Document, parse};
use crate::error::{Error, Result};
use crate::io::{ByteSource, ByteSourceCursor, MemorySource};
use crate::render::TemplatePart;

pub use flat::flat_to_package;
pub use manifest::{MANIFEST_PATH, Manifest};
pub use resources::{PICTURES_DIR, Resource, ResourceStore, resource_path};
pub use writer::PackageWriter;

pub const CONTENT: &str = "content.xml";
pub const STYLES: &str = "styles.xml";
pub const META: &str = "meta.xml";

/// A zip package opened for templating.
#[derive(Clone)]
pub struct Package {
    source: Arc<dyn ByteSource>,
}

impl std::fmt::Debug for Package {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Package")
            .field("len", &self.source.len())
            .finish()
    }
}

impl Package {
    /// Open a zip package or a flat document.
    pub fn open(source: Arc<dyn ByteSource>) -> Result<Self> {
        let zip_error = match ZipArchive::new(ByteSourceCursor::new(source.clone())) {
            Ok(_) => return Ok(Self { source }),
            Err(err) => err,
        };

        let bytes = source.read_all()?;
        if !looks_like_xml(&bytes) {
            return Err(Error::InvalidPackage(format!(
                "neither a zip archive nor a flat document ({zip_error})"
            )));
        }
        tracing::debug!(size = bytes.len(), "converting flat document");
        let converted = flat_to_package(&bytes)?;
        Ok(Self {
            source: Arc::new(MemorySource::new(converted)),
        })
    }

    /// A fresh reader over the archive.
    pub fn archive(&self) -> Result<ZipArchive<ByteSourceCursor>> {
        Ok(ZipArchive::new(ByteSourceCursor::new(self.source.clone()))?)
    }

    /// Read, parse and prepare the template parts.
    ///
    /// `prepare` restructures a part in place and returns the embedded
    /// sub-documents it references; their content and styles parts are read
    /// in turn. Parts come back in render order: every content part, then
    /// every styles part, then the metadata.
    pub fn unpack<F>(&self, mut prepare: F) -> Result<Vec<TemplatePart>>
    where
        F: FnMut(&mut Document, &str) -> Result<Vec<String>>,
    {
        let mut archive = self.archive()?;
        let mut pending = Vec::new();
        let mut seen = HashSet::new();
        let mut contents = Vec::new();
        let mut styles = Vec::new();

        let mut load = |archive: &mut ZipArchive<ByteSourceCursor>,
                        path: String,
                        required: bool,
                        pending: &mut Vec<String>|
         -> Result<Option<TemplatePart>> {
            let Some(bytes) = read_entry(archive, &path)? else {
                if required {
                    return Err(Error::MissingPart(path));
                }
                return Ok(None);
            };
            let mut document = parse(&bytes)?;
            for inner in prepare(&mut document, &path)? {
                if seen.insert(inner.clone()) {
                    tracing::debug!(part = %path, document = %inner, "found embedded document");
                    pending.push(inner);
                }
            }
            Ok(Some(TemplatePart { path, document }))
        };

        contents.extend(load(&mut archive, CONTENT.into(), true, &mut pending)?);
        styles.extend(load(&mut archive, STYLES.into(), false, &mut pending)?);
        let meta = load(&mut archive, META.into(), false, &mut pending)?;

        while let Some(inner) = pending.pop() {
            contents.extend(load(
                &mut archive,
                format!("{inner}/{CONTENT}"),
                true,
                &mut pending,
            )?);
            styles.extend(load(
                &mut archive,
                format!("{inner}/{STYLES}"),
                false,
                &mut pending,
            )?);
        }

        contents.extend(styles);
        contents.extend(meta);
        tracing::debug!(parts = contents.len(), "unpacked template parts");
        Ok(contents)
    }
}

/// Decompressed content of an entry, `None` when the archive has no such
/// entry.
pub fn read_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, path: &str) -> Result<Option<Vec<u8>>> {
    let mut entry = match archive.by_name(path) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let mut data = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut data)?;
    Ok(Some(data))
}

/// First significant byte is `<`, after an optional BOM and whitespace.
fn looks_like_xml(bytes: &[u8]) -> bool {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    bytes
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|&b| b == b'<')
}
