//! Error and warning types for template parsing and rendering.

use std::fmt;

use thiserror::Error;

/// Errors that can occur while parsing a template or rendering a document.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("XML attribute error: {0}")]
    XmlAttr(#[from] quick_xml::events::attributes::AttrError),

    #[error("XML escape error: {0}")]
    Escape(#[from] quick_xml::escape::EscapeError),

    #[error("XML encoding error: {0}")]
    Encoding(#[from] quick_xml::encoding::EncodingError),

    #[error("UTF-8 decoding error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("Invalid package: {0}")]
    InvalidPackage(String),

    #[error("Missing part: {0}")]
    MissingPart(String),

    #[error("Unrecognized flat document: {0}")]
    UnrecognizedFlatDocument(String),

    #[error("Template error in {part}: {kind}")]
    Template { part: String, kind: TemplateError },

    #[error("Expression error: {0}")]
    Expression(String),

    #[error("Reserved context name: {0}")]
    ReservedName(String),
}

/// Structural problems found while turning markers into directives.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("no expression in statement")]
    EmptyExpression,

    #[error("closing statement '{0}' has no opening statement")]
    UnmatchedClosing(String),

    #[error("wrong pairing between '{opening}' and '{closing}'")]
    MismatchedPairing { opening: String, closing: String },

    #[error("statement '{0}' is never closed")]
    Unterminated(String),

    #[error("no common ancestor found for '{0}' and its closing statement")]
    NoCommonAncestor(String),

    #[error("no enclosing <{0}> for attribute directive")]
    MissingAttributeOwner(String),

    #[error(
        "incoherent column repetition in table '{0}': every row with repeated \
         columns must repeat the same columns"
    )]
    IncoherentColumnRepetition(String),

    #[error("malformed column loop: {0}")]
    MalformedColumnLoop(String),

    #[error("{0}")]
    Warning(Warning),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Kind of a non-fatal content problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// The statement node has no visible text.
    EmptyText,
    /// The visible text of a link does not match its encoded expression.
    TextMismatch,
}

/// A non-fatal problem found in template markup.
///
/// Warnings never stop processing unless the template is parsed in strict mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub kind: WarningKind,
    pub part: String,
    pub message: String,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.part, self.message)
    }
}
