//! Statement discovery and pairing.

use std::collections::HashMap;

use percent_encoding::percent_decode_str;

use super::model::Keyword;
use super::statement::{Statement, StatementSource};
use crate::dom::{Document, Namespaces, NodeId};
use crate::error::{TemplateError, Warning, WarningKind};

/// Scheme prefix of hyperlinks that carry a statement.
pub const LINK_PREFIX: &str = "relatorio://";

/// Statements of one part, in document order.
#[derive(Debug, Default)]
pub struct Extraction {
    /// Opening statements and plain expressions.
    pub statements: Vec<Statement>,
    /// Closing statement for each opening statement node.
    pub closers: HashMap<NodeId, Statement>,
    pub warnings: Vec<Warning>,
}

/// Whether a hyperlink target carries a statement.
pub fn is_statement_link(href: &str) -> bool {
    href.starts_with(LINK_PREFIX)
}

/// Find every statement in `doc` and pair closing statements with their
/// opening ones.
pub fn extract(
    doc: &Document,
    ns: &Namespaces,
    part: &str,
) -> Result<Extraction, TemplateError> {
    let mut out = Extraction::default();
    let mut opened: Vec<Statement> = Vec::new();

    for node in doc.descendants(doc.root()) {
        let Some(statement) = read_statement(doc, ns, node) else {
            continue;
        };
        if statement.expr.is_empty() {
            return Err(TemplateError::EmptyExpression);
        }

        if let Some(mut warning) = check_text(&statement, part) {
            if statement.closing
                && statement.keyword.is_some()
                && let Some(open) = opened.last()
            {
                warning.message.push_str(&format!(
                    " corresponding to opening tag '{}'",
                    open.text
                ));
            }
            tracing::warn!(part, "{}", warning.message);
            out.warnings.push(warning);
        }

        match statement.keyword {
            Some(keyword) if keyword.is_closing_eligible() => {
                if statement.closing {
                    let Some(open) = opened.pop() else {
                        return Err(TemplateError::UnmatchedClosing(statement.text));
                    };
                    if open.keyword != Some(keyword) {
                        return Err(TemplateError::MismatchedPairing {
                            opening: open.text,
                            closing: statement.text,
                        });
                    }
                    out.closers.insert(open.node, statement);
                } else {
                    opened.push(statement.clone());
                    out.statements.push(statement);
                }
            }
            _ => {
                if !statement.closing {
                    out.statements.push(statement);
                }
            }
        }
    }

    if let Some(open) = opened.pop() {
        return Err(TemplateError::Unterminated(open.text));
    }

    tracing::debug!(
        part,
        statements = out.statements.len(),
        pairs = out.closers.len(),
        "extracted statements"
    );
    Ok(out)
}

fn read_statement(doc: &Document, ns: &Namespaces, node: NodeId) -> Option<Statement> {
    if ns.is(doc, node, "text", "a") {
        let href = ns.attr(doc, node, "xlink", "href")?;
        let encoded = href.strip_prefix(LINK_PREFIX)?;
        let expr = percent_decode_str(encoded).decode_utf8_lossy().into_owned();
        let text = doc.leading_text(node);
        return Some(Statement::new(node, StatementSource::Link, expr, text));
    }
    if ns.is(doc, node, "text", "placeholder") {
        let text = doc.leading_text(node);
        let expr = strip_delimiters(&text).to_string();
        return Some(Statement::new(node, StatementSource::Placeholder, expr, text));
    }
    None
}

/// Placeholder text without its `<` `>` delimiters.
fn strip_delimiters(text: &str) -> &str {
    let mut chars = text.chars();
    if chars.next().is_none() || chars.next_back().is_none() {
        return "";
    }
    chars.as_str()
}

fn check_text(statement: &Statement, part: &str) -> Option<Warning> {
    if statement.text.is_empty() {
        return Some(Warning {
            kind: WarningKind::EmptyText,
            part: part.to_string(),
            message: format!("No statement text for '{}'", statement.expr),
        });
    }
    if statement.keyword != Some(Keyword::Attrs)
        && statement.source == StatementSource::Link
        && statement.expr != statement.text
    {
        return Some(Warning {
            kind: WarningKind::TextMismatch,
            part: part.to_string(),
            message: format!(
                "url and text do not match: {} != {}",
                statement.expr, statement.text
            ),
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse_str;

    const HEAD: &str = r#"<office:document-content xmlns:office="urn:oasis:names:tc:opendocument:xmlns:office:1.0" xmlns:text="urn:oasis:names:tc:opendocument:xmlns:text:1.0" xmlns:xlink="http://www.w3.org/1999/xlink"><office:body><office:text>"#;
    const TAIL: &str = "</office:text></office:body></office:document-content>";

    fn link(expr: &str) -> String {
        format!(
            r#"<text:a xlink:href="relatorio://{}">{}</text:a>"#,
            expr.replace(' ', "%20").replace('"', "%22"),
            expr.replace('"', "&quot;")
        )
    }

    fn run(body: &str) -> Result<Extraction, TemplateError> {
        let doc = parse_str(&format!("{HEAD}{body}{TAIL}")).unwrap();
        let ns = Namespaces::from_document(&doc);
        extract(&doc, &ns, "content.xml")
    }

    #[test]
    fn test_pairs_and_plain_expressions() {
        let body = format!(
            "<text:p>{}</text:p><text:p>{}</text:p><text:p>{}</text:p><text:p><text:placeholder>&lt;o.total&gt;</text:placeholder></text:p>",
            link(r#"for each="x in items""#),
            link("x"),
            link("/for"),
        );
        let out = run(&body).unwrap();
        let exprs: Vec<_> = out.statements.iter().map(|s| s.expr.as_str()).collect();
        assert_eq!(exprs, vec![r#"for each="x in items""#, "x", "o.total"]);
        assert_eq!(out.closers.len(), 1);
        let closer = &out.closers[&out.statements[0].node];
        assert!(closer.closing);
        assert_eq!(out.statements[2].source, StatementSource::Placeholder);
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn test_unmatched_closing_is_fatal() {
        let body = format!("<text:p>{}</text:p>", link("/if"));
        assert!(matches!(run(&body), Err(TemplateError::UnmatchedClosing(_))));
    }

    #[test]
    fn test_mismatched_pairing_is_fatal() {
        let body = format!(
            "<text:p>{}</text:p><text:p>{}</text:p>",
            link("if test=\"x\""),
            link("/for")
        );
        assert!(matches!(
            run(&body),
            Err(TemplateError::MismatchedPairing { .. })
        ));
    }

    #[test]
    fn test_unterminated_is_fatal() {
        let body = format!("<text:p>{}</text:p>", link("with vars=\"a = 1\""));
        assert!(matches!(run(&body), Err(TemplateError::Unterminated(_))));
    }

    #[test]
    fn test_text_warnings() {
        let body = r#"<text:p><text:a xlink:href="relatorio://o.name">name</text:a><text:a xlink:href="relatorio://o.id"/></text:p>"#;
        let out = run(body).unwrap();
        let kinds: Vec<_> = out.warnings.iter().map(|w| w.kind).collect();
        assert_eq!(kinds, vec![WarningKind::TextMismatch, WarningKind::EmptyText]);
        assert_eq!(out.statements.len(), 2);
    }

    #[test]
    fn test_closing_warning_names_opening_statement() {
        let body = format!(
            r#"<text:p>{}</text:p><text:p><text:a xlink:href="relatorio://%2Fif">end</text:a></text:p>"#,
            link("if test=\"x\"")
        );
        let out = run(&body).unwrap();
        assert_eq!(out.warnings.len(), 1);
        assert!(out.warnings[0].message.ends_with(r#"opening tag 'if test="x"'"#));
    }

    #[test]
    fn test_ordinary_links_are_ignored() {
        let body = r#"<text:p><text:a xlink:href="https://example.com">site</text:a></text:p>"#;
        let out = run(body).unwrap();
        assert!(out.statements.is_empty());
    }

    #[test]
    fn test_empty_placeholder_is_fatal() {
        let body = "<text:p><text:placeholder>&lt;&gt;</text:placeholder></text:p>";
        assert!(matches!(run(body), Err(TemplateError::EmptyExpression)));
    }
}
