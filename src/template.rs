//! Parse a document once, render it many times.

use std::io::{Cursor, Seek, Write};
use std::path::Path;
use std::sync::Arc;

use crate::config::{RenderOptions, TemplateConfig};
use crate::error::{Result, Warning};
use crate::io::{ByteSource, FileSource, MemorySource};
use crate::package::{Package, PackageWriter};
use crate::render::{
    ColumnHeaderFilter, Context, Engine, EventSource, Interpreter, RenderState, TemplatePart,
};
use crate::restructure::Restructurer;
use crate::value::SubReport;

/// An OpenDocument template.
///
/// Restructuring happens once, when the template is created; each render
/// walks the prepared parts with its own state and writes a fresh archive.
///
/// # Example
///
/// ```no_run
/// use odf_template::{Context, Template, Value};
///
/// let template = Template::open("invoice.odt")?;
/// let mut context = Context::new();
/// context.insert("customer", Value::from("ACME"))?;
/// let document = template.render(context)?;
/// std::fs::write("invoice-acme.odt", document)?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct Template {
    package: Package,
    parts: Vec<TemplatePart>,
    warnings: Vec<Warning>,
    has_column_loops: bool,
    config: TemplateConfig,
}

impl Template {
    /// Open a template file with the default configuration.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, TemplateConfig::default())
    }

    pub fn open_with(path: impl AsRef<Path>, config: TemplateConfig) -> Result<Self> {
        Self::from_source(Arc::new(FileSource::open(path)?), config)
    }

    /// Template from the bytes of a package or flat document.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::from_source(Arc::new(MemorySource::new(bytes)), TemplateConfig::default())
    }

    pub fn from_source(source: Arc<dyn ByteSource>, config: TemplateConfig) -> Result<Self> {
        let package = Package::open(source)?;
        let mut restructurer = Restructurer::new(&config);
        let parts = package.unpack(|doc, path| restructurer.restructure(doc, path))?;
        let has_column_loops = restructurer.has_column_loops();
        let warnings = restructurer.into_warnings();

        tracing::debug!(
            parts = parts.len(),
            warnings = warnings.len(),
            has_column_loops,
            "template ready"
        );
        Ok(Self {
            package,
            parts,
            warnings,
            has_column_loops,
            config,
        })
    }

    /// The restructured parts, in render order.
    pub fn parts(&self) -> &[TemplatePart] {
        &self.parts
    }

    /// Content warnings collected while parsing.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn has_column_loops(&self) -> bool {
        self.has_column_loops
    }

    pub fn config(&self) -> &TemplateConfig {
        &self.config
    }

    /// Render with the built-in interpreter and default options.
    pub fn render(&self, context: Context) -> Result<Vec<u8>> {
        let out = self.render_to(context, &RenderOptions::default(), Cursor::new(Vec::new()))?;
        Ok(out.into_inner())
    }

    /// Render with the built-in interpreter into `out`.
    pub fn render_to<W: Write + Seek>(
        &self,
        context: Context,
        options: &RenderOptions,
        out: W,
    ) -> Result<W> {
        self.render_with(&Interpreter, context, options, out)
    }

    /// Render with `engine` into `out`.
    pub fn render_with<E, W>(
        &self,
        engine: &E,
        context: Context,
        options: &RenderOptions,
        out: W,
    ) -> Result<W>
    where
        E: Engine + ?Sized,
        W: Write + Seek,
    {
        let mut archive = self.package.archive()?;
        let paths: Vec<&str> = self.parts.iter().map(|p| p.path.as_str()).collect();
        let mut writer = PackageWriter::new(&mut archive, &paths, options, out)?;
        let mut state = RenderState::new(self.config.invalid_char_replacement);

        let stream = engine.generate(&self.parts, context);
        let mut stream: Box<dyn EventSource + '_> = if self.has_column_loops {
            Box::new(ColumnHeaderFilter::new(stream))
        } else {
            stream
        };

        while let Some(event) = stream.next_event(&mut state) {
            let event = event?;
            if state.resources.has_pending() {
                writer.add_resources(state.resources.take_pending());
            }
            writer.write_event(event)?;
        }
        writer.add_resources(state.resources.take_pending());

        tracing::debug!(resources = state.resources.len(), "rendered document");
        writer.finish()
    }
}

impl SubReport for Template {
    fn render_report(&self, context: &Context) -> Result<Vec<u8>> {
        self.render(context.clone())
    }
}
