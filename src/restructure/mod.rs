//! Tree restructuring.
//!
//! Turns the statements of a parsed part into directive nodes and element
//! annotations the render engine understands. Every part of a template goes
//! through one [`Restructurer`], which hands out the loop, cache and
//! temporary-variable identities so they stay unique across parts.

mod cleanup;
mod columns;
mod images;

use crate::config::TemplateConfig;
use crate::directive::{
    CacheKey, Computation, Directive, Keyword, LoopId, Replacement, Statement, extract,
};
use crate::dom::{Document, Namespaces, NodeData, NodeId, QName};
use crate::error::{Error, Result, TemplateError, Warning};
use crate::value::ValueAttrNames;

/// Paragraph attributes that give a cell's content its own style.
const TEXT_STYLE_ATTRS: [&str; 3] = ["class-names", "cond-style-name", "style-name"];

/// Rewrites parsed parts into directive trees.
#[derive(Debug)]
pub struct Restructurer {
    strict: bool,
    update_meta: bool,
    generator: String,
    next_loop: u32,
    next_cache: u32,
    next_temp: u32,
    has_column_loops: bool,
    warnings: Vec<Warning>,
}

impl Restructurer {
    pub fn new(config: &TemplateConfig) -> Self {
        Self {
            strict: config.strict,
            update_meta: config.update_meta,
            generator: config.generator.clone(),
            next_loop: 0,
            next_cache: 0,
            next_temp: 0,
            has_column_loops: false,
            warnings: Vec::new(),
        }
    }

    /// Whether any part contained a loop over table columns.
    pub fn has_column_loops(&self) -> bool {
        self.has_column_loops
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn into_warnings(self) -> Vec<Warning> {
        self.warnings
    }

    /// Restructure one part in place.
    ///
    /// Returns the archive paths of embedded sub-documents it references.
    pub fn restructure(&mut self, doc: &mut Document, part: &str) -> Result<Vec<String>> {
        let ns = Namespaces::from_document(doc);

        cleanup::remove_soft_page_breaks(doc, &ns);
        cleanup::invert_styles(doc, &ns);
        cleanup::handle_meta(doc, &ns, self.update_meta, &self.generator);
        self.handle_statements(doc, &ns, part)?;
        let images = images::handle_images(self, doc, &ns);
        let subdocuments = images::find_subdocuments(doc, &ns);

        tracing::debug!(
            part,
            images,
            subdocuments = subdocuments.len(),
            "restructured part"
        );
        Ok(subdocuments)
    }

    fn handle_statements(&mut self, doc: &mut Document, ns: &Namespaces, part: &str) -> Result<()> {
        let extraction = extract(doc, ns, part).map_err(|kind| template_error(part, kind))?;

        for warning in extraction.warnings {
            if self.strict {
                return Err(template_error(part, TemplateError::Warning(warning)));
            }
            self.warnings.push(warning);
        }

        for statement in &extraction.statements {
            match statement.keyword {
                Some(keyword) if keyword.is_closing_eligible() => {
                    let closer = extraction.closers.get(&statement.node).ok_or_else(|| {
                        template_error(part, TemplateError::Unterminated(statement.text.clone()))
                    })?;
                    self.wrap_pair(doc, ns, statement, keyword, closer.node)
                        .map_err(|kind| template_error(part, kind))?;
                }
                Some(keyword) => self
                    .attach_to_owner(doc, ns, statement, keyword)
                    .map_err(|kind| template_error(part, kind))?,
                None => self.plain_expression(doc, ns, statement),
            }
        }
        Ok(())
    }

    /// Replace an opening/closing pair and everything between them by one
    /// directive node.
    fn wrap_pair(
        &mut self,
        doc: &mut Document,
        ns: &Namespaces,
        statement: &Statement,
        keyword: Keyword,
        closing: NodeId,
    ) -> std::result::Result<(), TemplateError> {
        let opening = statement.node;
        let mut open_chain = vec![opening];
        let mut close_chain: Vec<NodeId> = std::iter::once(closing)
            .chain(doc.ancestors(closing))
            .collect();

        let mut ancestor = NodeId::NONE;
        for node in doc.ancestors(opening) {
            if let Some(idx) = close_chain.iter().position(|&n| n == node) {
                close_chain.truncate(idx);
                ancestor = node;
                break;
            }
            open_chain.push(node);
        }

        let (Some(&outer_open), Some(&outer_close)) = (open_chain.last(), close_chain.last())
        else {
            return Err(TemplateError::NoCommonAncestor(statement.text.clone()));
        };
        if ancestor.is_none() || outer_open == outer_close {
            return Err(TemplateError::NoCommonAncestor(statement.text.clone()));
        }

        let mut attr = statement.attr.clone();
        if keyword == Keyword::For && ns.is(doc, ancestor, "table", "table-row") {
            attr = columns::handle_column_loop(
                self,
                doc,
                ns,
                columns::ColumnLoop {
                    row: ancestor,
                    outer_open,
                    outer_close,
                    attr,
                },
            )?;
        }

        let node = doc.create(NodeData::Directive(Directive::new(keyword, attr)));
        doc.wrap_between(outer_open, outer_close, node);
        tracing::trace!(keyword = keyword.as_str(), "wrapped directive pair");
        Ok(())
    }

    /// Attach an `attrs`, `content`, `replace` or `strip` statement to the
    /// nearest enclosing element named by its attribute.
    fn attach_to_owner(
        &mut self,
        doc: &mut Document,
        ns: &Namespaces,
        statement: &Statement,
        keyword: Keyword,
    ) -> std::result::Result<(), TemplateError> {
        let Some(attr) = &statement.attr else {
            return Err(TemplateError::MissingAttributeOwner(keyword.as_str().into()));
        };
        let owner_name = QName::parse(&attr.name);
        let node = statement.node;
        let owner = std::iter::once(node)
            .chain(doc.ancestors(node))
            .find(|&id| ns.is(doc, id, &owner_name.prefix, &owner_name.local))
            .ok_or_else(|| TemplateError::MissingAttributeOwner(attr.name.clone()))?;

        let Some(el) = doc.element_mut(owner) else {
            return Err(TemplateError::MissingAttributeOwner(attr.name.clone()));
        };
        let value = attr.value.clone();
        match keyword {
            Keyword::Content => el.content = Some(value),
            Keyword::Replace => el.replace = Some(Replacement::Expr(value)),
            Keyword::Strip => el.strip = Some(value),
            _ => el.computed.push(Computation::Attrs(value)),
        }

        if owner != node {
            doc.remove_keeping_tail(node);
        }
        Ok(())
    }

    /// Replace a plain expression by its value; a value alone in a table cell
    /// also sets the cell's value type.
    fn plain_expression(&mut self, doc: &mut Document, ns: &Namespaces, statement: &Statement) {
        let node = statement.node;
        let parent = doc.parent(node);
        let cell = doc.parent(parent);

        if !is_sole_cell_content(doc, ns, node, parent, cell) {
            if let Some(el) = doc.element_mut(node) {
                el.replace = Some(Replacement::Escaped(statement.expr.clone()));
            }
            return;
        }

        let key = self.next_cache_key();
        if let Some(el) = doc.element_mut(node) {
            el.replace = Some(Replacement::Cached(key));
        }

        let names = ValueAttrNames {
            office: ns.local_prefix("office"),
            calcext: ns
                .declares("calcext")
                .then(|| ns.local_prefix("calcext")),
        };
        let mut stale = vec![ns.qualify("office", "value"), ns.qualify("office", "value-type")];
        if let Some(calcext) = &names.calcext {
            stale.push(format!("{calcext}:value-type"));
        }
        if let Some(el) = doc.element_mut(cell) {
            for name in &stale {
                el.remove_attr(name);
            }
            el.computed.push(Computation::CellType {
                key,
                expr: statement.expr.clone(),
                names,
            });
        }
    }

    pub(crate) fn next_loop_id(&mut self) -> LoopId {
        self.has_column_loops = true;
        self.next_loop += 1;
        LoopId(self.next_loop)
    }

    pub(crate) fn next_cache_key(&mut self) -> CacheKey {
        self.next_cache += 1;
        CacheKey(self.next_cache)
    }

    pub(crate) fn next_temp_var(&mut self) -> String {
        self.next_temp += 1;
        format!("__relatorio_temp{}", self.next_temp)
    }
}

fn template_error(part: &str, kind: TemplateError) -> Error {
    Error::Template {
        part: part.to_string(),
        kind,
    }
}

/// A statement is the sole content of a cell when it is the only child
/// element of an unstyled paragraph that is itself the only child element of
/// the cell, with nothing but whitespace around it.
fn is_sole_cell_content(
    doc: &Document,
    ns: &Namespaces,
    node: NodeId,
    parent: NodeId,
    cell: NodeId,
) -> bool {
    if !ns.is(doc, cell, "table", "table-cell") {
        return false;
    }
    let non_text = |id: NodeId| doc.children(id).filter(|&c| doc.text(c).is_none()).count();
    if non_text(cell) != 1 || non_text(parent) != 1 {
        return false;
    }
    if !doc.leading_text(parent).trim().is_empty() || !doc.trailing_text(node).trim().is_empty() {
        return false;
    }
    let styled = TEXT_STYLE_ATTRS
        .iter()
        .any(|local| ns.attr(doc, parent, "text", local).is_some());
    !styled
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::dom::parse_str;

    pub(crate) const HEAD: &str = r#"<office:document-content xmlns:office="urn:oasis:names:tc:opendocument:xmlns:office:1.0" xmlns:text="urn:oasis:names:tc:opendocument:xmlns:text:1.0" xmlns:table="urn:oasis:names:tc:opendocument:xmlns:table:1.0" xmlns:xlink="http://www.w3.org/1999/xlink"><office:body><office:text>"#;
    pub(crate) const TAIL: &str = "</office:text></office:body></office:document-content>";

    pub(crate) fn link(expr: &str) -> String {
        format!(
            r#"<text:a xlink:href="relatorio://{}">{}</text:a>"#,
            expr.replace('%', "%25").replace(' ', "%20").replace('"', "%22"),
            expr.replace('&', "&amp;").replace('"', "&quot;").replace('<', "&lt;")
        )
    }

    fn restructure(body: &str) -> (Document, Restructurer) {
        let mut doc = parse_str(&format!("{HEAD}{body}{TAIL}")).unwrap();
        let mut r = Restructurer::new(&TemplateConfig::default());
        r.restructure(&mut doc, "content.xml").unwrap();
        (doc, r)
    }

    fn office_text(doc: &Document) -> NodeId {
        doc.descendants(doc.root())
            .find(|&id| {
                doc.element(id)
                    .is_some_and(|el| el.name == QName::parse("office:text"))
            })
            .unwrap()
    }

    /// Compact structural dump: elements by name, directives as `@kw`,
    /// text as-is.
    fn dump(doc: &Document, id: NodeId) -> String {
        let mut out = String::new();
        for child in doc.children(id) {
            match &doc.get(child).unwrap().data {
                NodeData::Text(t) => out.push_str(t),
                NodeData::Element(el) => {
                    out.push_str(&format!("<{}>", el.name.qualified()));
                    out.push_str(&dump(doc, child));
                    out.push_str(&format!("</{}>", el.name.qualified()));
                }
                NodeData::Directive(d) => {
                    out.push_str(&format!("[@{} {}]", d.keyword, d.arg()));
                    out.push_str(&dump(doc, child));
                    out.push_str("[/]");
                }
                other => out.push_str(&format!("{other:?}")),
            }
        }
        out
    }

    #[test]
    fn test_paragraph_loop_wraps_between_paragraphs() {
        let body = format!(
            "<text:p>{}</text:p><text:p>line</text:p><text:p>{}</text:p>",
            link(r#"for each="x in items""#),
            link("/for")
        );
        let (doc, _) = restructure(&body);
        assert_eq!(
            dump(&doc, office_text(&doc)),
            "[@for x in items]<text:p>line</text:p>[/]"
        );
    }

    #[test]
    fn test_inline_pair_keeps_tails() {
        let body = format!(
            "<text:p>a {} b <text:span>c</text:span> {} d</text:p>",
            link(r#"if test="x""#),
            link("/if")
        );
        let (doc, _) = restructure(&body);
        assert_eq!(
            dump(&doc, office_text(&doc)),
            "<text:p>a [@if x] b <text:span>c</text:span> [/] d</text:p>"
        );
    }

    #[test]
    fn test_plain_expression_is_replaced() {
        let body = format!("<text:p>Total: {}</text:p>", link("o.total"));
        let (doc, _) = restructure(&body);
        let a = doc
            .descendants(doc.root())
            .find(|&id| doc.element(id).is_some_and(|el| el.name.local == "a"))
            .unwrap();
        assert_eq!(
            doc.element(a).unwrap().replace,
            Some(Replacement::Escaped("o.total".into()))
        );
    }

    #[test]
    fn test_cell_expression_gets_type_inference() {
        let body = format!(
            r#"<table:table table:name="T"><table:table-row><table:table-cell office:value-type="string" office:value="1"><text:p>{}</text:p></table:table-cell></table:table-row></table:table>"#,
            link("o.amount")
        );
        let (doc, _) = restructure(&body);
        let cell = doc
            .descendants(doc.root())
            .find(|&id| doc.element(id).is_some_and(|el| el.name.local == "table-cell"))
            .unwrap();
        let el = doc.element(cell).unwrap();
        assert_eq!(el.attr("office:value-type"), None);
        assert_eq!(el.attr("office:value"), None);
        assert!(matches!(
            el.computed.as_slice(),
            [Computation::CellType { expr, .. }] if expr == "o.amount"
        ));
    }

    #[test]
    fn test_styled_paragraph_in_cell_is_not_typed() {
        let body = format!(
            r#"<table:table table:name="T"><table:table-row><table:table-cell><text:p text:style-name="P1">{}</text:p></table:table-cell></table:table-row></table:table>"#,
            link("o.amount")
        );
        let (doc, _) = restructure(&body);
        let has_cell_type = doc.descendants(doc.root()).any(|id| {
            doc.element(id)
                .is_some_and(|el| el.computed.iter().any(|c| matches!(c, Computation::CellType { .. })))
        });
        assert!(!has_cell_type);
    }

    #[test]
    fn test_attrs_attach_to_owner() {
        let body = format!(
            "<text:p>before {} after</text:p>",
            link(r#"attrs text:p="{'text:style-name': style}""#)
        );
        let (doc, _) = restructure(&body);
        let p = doc.element_children(office_text(&doc))[0];
        assert_eq!(dump(&doc, p), "before  after");
        assert_eq!(
            doc.element(p).unwrap().computed,
            vec![Computation::Attrs("{'text:style-name': style}".into())]
        );
    }

    #[test]
    fn test_content_directive_on_owner() {
        let body = format!("<text:p>{}old</text:p>", link(r#"content text:p="o.name""#));
        let (doc, _) = restructure(&body);
        let p = doc.element_children(office_text(&doc))[0];
        assert_eq!(doc.element(p).unwrap().content.as_deref(), Some("o.name"));
    }

    #[test]
    fn test_missing_owner_is_fatal() {
        let body = format!("<text:p>{}</text:p>", link(r#"attrs table:table-cell="{}""#));
        let mut doc = parse_str(&format!("{HEAD}{body}{TAIL}")).unwrap();
        let mut r = Restructurer::new(&TemplateConfig::default());
        let err = r.restructure(&mut doc, "content.xml").unwrap_err();
        assert!(matches!(
            err,
            Error::Template {
                kind: TemplateError::MissingAttributeOwner(_),
                ..
            }
        ));
    }

    #[test]
    fn test_strict_mode_rejects_warnings() {
        let body = r#"<text:p><text:a xlink:href="relatorio://o.name">Name</text:a></text:p>"#;
        let mut doc = parse_str(&format!("{HEAD}{body}{TAIL}")).unwrap();
        let mut lenient = Restructurer::new(&TemplateConfig::default());
        lenient.restructure(&mut doc, "content.xml").unwrap();
        assert_eq!(lenient.warnings().len(), 1);

        let mut doc = parse_str(&format!("{HEAD}{body}{TAIL}")).unwrap();
        let mut strict = Restructurer::new(&TemplateConfig::default().with_strict(true));
        assert!(strict.restructure(&mut doc, "content.xml").is_err());
    }

    #[test]
    fn test_choose_when_otherwise_nest() {
        let body = format!(
            "<text:p>{}</text:p><text:p>{}</text:p><text:p>one</text:p><text:p>{}</text:p><text:p>{}</text:p><text:p>other</text:p><text:p>{}</text:p><text:p>{}</text:p>",
            link(r#"choose test="n""#),
            link(r#"when test="1""#),
            link("/when"),
            link("otherwise"),
            link("/otherwise"),
            link("/choose"),
        );
        let (doc, _) = restructure(&body);
        assert_eq!(
            dump(&doc, office_text(&doc)),
            "[@choose n][@when 1]<text:p>one</text:p>[/][@otherwise ]<text:p>other</text:p>[/][/]"
        );
    }
}
