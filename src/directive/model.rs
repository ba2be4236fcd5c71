use std::fmt;

use crate::value::ValueAttrNames;

/// Directive keywords recognised in statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    For,
    If,
    Choose,
    When,
    Otherwise,
    With,
    Attrs,
    Content,
    Replace,
    Strip,
}

impl Keyword {
    pub const ALL: [Keyword; 10] = [
        Keyword::For,
        Keyword::If,
        Keyword::Choose,
        Keyword::When,
        Keyword::Otherwise,
        Keyword::With,
        Keyword::Attrs,
        Keyword::Content,
        Keyword::Replace,
        Keyword::Strip,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Keyword::For => "for",
            Keyword::If => "if",
            Keyword::Choose => "choose",
            Keyword::When => "when",
            Keyword::Otherwise => "otherwise",
            Keyword::With => "with",
            Keyword::Attrs => "attrs",
            Keyword::Content => "content",
            Keyword::Replace => "replace",
            Keyword::Strip => "strip",
        }
    }

    /// Keywords that need a matching closing statement.
    pub const fn is_closing_eligible(self) -> bool {
        matches!(
            self,
            Keyword::For
                | Keyword::If
                | Keyword::Choose
                | Keyword::When
                | Keyword::Otherwise
                | Keyword::With
        )
    }

    /// Attribute name implied when a statement gives a bare argument
    /// (`for x in items` stands for `for each="x in items"`).
    pub const fn default_attr(self) -> Option<&'static str> {
        match self {
            Keyword::For => Some("each"),
            Keyword::If | Keyword::Choose | Keyword::When => Some("test"),
            Keyword::With => Some("vars"),
            _ => None,
        }
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `name="value"` pair of a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectiveAttr {
    pub name: String,
    pub value: String,
}

impl DirectiveAttr {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A control-flow node built from a matched statement pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub keyword: Keyword,
    pub attr: Option<DirectiveAttr>,
}

impl Directive {
    pub fn new(keyword: Keyword, attr: Option<DirectiveAttr>) -> Self {
        Self { keyword, attr }
    }

    /// The attribute value, or an empty string.
    pub fn arg(&self) -> &str {
        self.attr.as_ref().map(|a| a.value.as_str()).unwrap_or("")
    }
}

/// Identity of a column loop within a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoopId(pub u32);

/// Key of a value stored in the per-render expression cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(pub u32);

/// Column definitions of a table, replayed once per counted column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepeatMarker {
    pub table: String,
    /// Index of the cell that opens the loop.
    pub opening: usize,
    /// Index of the cell that closes the loop.
    pub closing: usize,
}

/// What replaces an element when it is rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Replacement {
    /// The evaluated expression, as given.
    Expr(String),
    /// The evaluated expression with XML-invalid characters replaced.
    Escaped(String),
    /// A value stored earlier in the expression cache.
    Cached(CacheKey),
}

/// Attribute computations attached to an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Computation {
    /// Expression evaluating to a name/value mapping merged into the
    /// attributes; `None` values remove an attribute.
    Attrs(String),
    ResetColumnCount(LoopId),
    IncrementColumnCount(LoopId),
    /// Evaluate, cache the value and derive the cell's value attributes.
    CellType {
        key: CacheKey,
        expr: String,
        names: ValueAttrNames,
    },
    /// Evaluate the image tuple, cache it and derive `svg:width`/`svg:height`
    /// from it, falling back to the frame's own size.
    ImageDimension {
        key: CacheKey,
        expr: String,
        width: String,
        height: String,
        svg_prefix: String,
    },
    /// Frame name from the cached image tuple.
    ImageName { key: CacheKey, attr: String },
    /// Store the cached image payload and point `attr` at it.
    ImageHref { key: CacheKey, attr: String },
}
