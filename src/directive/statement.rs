//! Statement grammar.

use std::sync::LazyLock;

use regex::Regex;

use super::model::{DirectiveAttr, Keyword};
use crate::dom::NodeId;

/// Optional closing slash, optional keyword, optional single `name="value"`
/// pair; anything else is a plain expression.
static STATEMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^(?:(/)?(for|if|choose|when|otherwise|with|attrs|content|replace|strip)\s*(?:\s([\w:-]+)=["'](.*)["']|$)|.*)"#,
    )
    .unwrap()
});

/// Closing-eligible keyword followed by a bare argument (`for x in items`).
static SHORTHAND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(for|if|choose|when|with)\s+(\S.*)$").unwrap());

/// Where a statement was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementSource {
    /// Hyperlink whose target carries the expression.
    Link,
    /// Placeholder whose text carries the expression.
    Placeholder,
}

/// The parts of a statement expression.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedStatement {
    pub closing: bool,
    pub keyword: Option<Keyword>,
    pub attr: Option<DirectiveAttr>,
}

impl ParsedStatement {
    /// Whether this is a plain value expression.
    pub fn is_plain(&self) -> bool {
        self.keyword.is_none()
    }
}

/// A statement found in a document tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub node: NodeId,
    pub source: StatementSource,
    /// The raw, decoded expression.
    pub expr: String,
    /// The visible text of the statement node.
    pub text: String,
    pub closing: bool,
    pub keyword: Option<Keyword>,
    pub attr: Option<DirectiveAttr>,
}

impl Statement {
    pub fn new(node: NodeId, source: StatementSource, expr: String, text: String) -> Self {
        let parsed = parse_statement(&expr);
        Self {
            node,
            source,
            expr,
            text,
            closing: parsed.closing,
            keyword: parsed.keyword,
            attr: parsed.attr,
        }
    }

    /// Opening statement of a closing-eligible keyword.
    pub fn opens_pair(&self) -> bool {
        !self.closing && self.keyword.is_some_and(Keyword::is_closing_eligible)
    }
}

/// Split a statement expression into closing flag, keyword and attribute.
pub fn parse_statement(expr: &str) -> ParsedStatement {
    if let Some(caps) = STATEMENT.captures(expr)
        && let Some(keyword) = caps.get(2).and_then(|m| Keyword::parse(m.as_str()))
    {
        let attr = match (caps.get(3), caps.get(4)) {
            (Some(name), Some(value)) => Some(DirectiveAttr::new(name.as_str(), value.as_str())),
            _ => None,
        };
        return ParsedStatement {
            closing: caps.get(1).is_some(),
            keyword: Some(keyword),
            attr,
        };
    }

    if let Some(caps) = SHORTHAND.captures(expr)
        && let Some(keyword) = Keyword::parse(&caps[1])
        && let Some(name) = keyword.default_attr()
    {
        return ParsedStatement {
            closing: false,
            keyword: Some(keyword),
            attr: Some(DirectiveAttr::new(name, caps[2].trim_end())),
        };
    }

    ParsedStatement::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(closing: bool, keyword: Keyword, attr: Option<(&str, &str)>) -> ParsedStatement {
        ParsedStatement {
            closing,
            keyword: Some(keyword),
            attr: attr.map(|(n, v)| DirectiveAttr::new(n, v)),
        }
    }

    #[test]
    fn test_keyword_with_attribute() {
        assert_eq!(
            parse_statement(r#"for each="line in o.lines""#),
            parsed(false, Keyword::For, Some(("each", "line in o.lines")))
        );
        assert_eq!(
            parse_statement("if test='x > 1'"),
            parsed(false, Keyword::If, Some(("test", "x > 1")))
        );
        assert_eq!(
            parse_statement(r#"attrs text:p="{'a': 1}""#),
            parsed(false, Keyword::Attrs, Some(("text:p", "{'a': 1}")))
        );
    }

    #[test]
    fn test_closing_statements() {
        assert_eq!(parse_statement("/for"), parsed(true, Keyword::For, None));
        assert_eq!(parse_statement("/choose"), parsed(true, Keyword::Choose, None));
        assert_eq!(parse_statement("otherwise"), parsed(false, Keyword::Otherwise, None));
    }

    #[test]
    fn test_plain_expressions() {
        assert!(parse_statement("o.name").is_plain());
        assert!(parse_statement("format(x)").is_plain());
        // keyword prefix without a separator
        assert!(parse_statement("formula").is_plain());
        assert!(parse_statement("/foo").is_plain());
        assert!(!parse_statement("/foo").closing);
    }

    #[test]
    fn test_bare_argument_shorthand() {
        assert_eq!(
            parse_statement("for x in items"),
            parsed(false, Keyword::For, Some(("each", "x in items")))
        );
        assert_eq!(
            parse_statement("with total = 0"),
            parsed(false, Keyword::With, Some(("vars", "total = 0")))
        );
        // attribute directives need an owner
        assert!(parse_statement("attrs x").is_plain());
    }
}
