//! Parse-time and render-time settings.

/// Settings applied once, when a template is parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateConfig {
    /// Substitute for characters XML cannot carry (default: space).
    pub invalid_char_replacement: char,
    /// Turn content warnings into errors.
    pub strict: bool,
    /// Refresh dates, statistics and the generator in `meta.xml`.
    pub update_meta: bool,
    /// Value written to `meta:generator`.
    pub generator: String,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            invalid_char_replacement: ' ',
            strict: false,
            update_meta: true,
            generator: concat!("odf-template/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl TemplateConfig {
    pub fn with_invalid_char_replacement(mut self, replacement: char) -> Self {
        self.invalid_char_replacement = replacement;
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_update_meta(mut self, update_meta: bool) -> Self {
        self.update_meta = update_meta;
        self
    }

    pub fn with_generator(mut self, generator: impl Into<String>) -> Self {
        self.generator = generator.into();
        self
    }
}

/// Compression method for entries the packager creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    Stored,
    #[default]
    Deflated,
}

impl Compression {
    pub(crate) fn method(self) -> zip::CompressionMethod {
        match self {
            Compression::Stored => zip::CompressionMethod::Stored,
            Compression::Deflated => zip::CompressionMethod::Deflated,
        }
    }
}

/// Output tuning for one render call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    /// Deflate level (0-9); `None` uses the zip crate default.
    pub compression_level: Option<i64>,
    /// Number of serialized events buffered before bytes are flushed to the
    /// archive entry.
    pub chunk_size: usize,
    /// Write large-file (zip64) headers for rendered parts.
    pub zip64: bool,
    pub compression: Compression,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            compression_level: None,
            chunk_size: 64,
            zip64: false,
            compression: Compression::Deflated,
        }
    }
}

impl RenderOptions {
    pub fn with_compression_level(mut self, level: Option<i64>) -> Self {
        self.compression_level = level;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_zip64(mut self, zip64: bool) -> Self {
        self.zip64 = zip64;
        self
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }
}
