//! Document clean-up passes run before statements are handled.

use crate::directive::{LINK_PREFIX, is_statement_link};
use crate::dom::{Document, Namespaces, NodeId, QName};

/// Metadata removed from a rendered document.
const STALE_META: [(&str, &str); 6] = [
    ("meta", "document-statistic"),
    ("meta", "editing-duration"),
    ("meta", "initial-creator"),
    ("meta", "print-date"),
    ("meta", "printed-by"),
    ("dc", "creator"),
];

/// Drop soft page breaks, which would otherwise end up in repeated content.
pub(super) fn remove_soft_page_breaks(doc: &mut Document, ns: &Namespaces) {
    let breaks: Vec<NodeId> = doc
        .descendants(doc.root())
        .filter(|&id| ns.is(doc, id, "text", "soft-page-break"))
        .collect();
    for node in breaks {
        doc.remove_keeping_tail(node);
    }

    let texts: Vec<NodeId> = doc
        .descendants(doc.root())
        .filter(|&id| ns.is(doc, id, "office", "text"))
        .collect();
    for node in texts {
        let name = doc.element(node).and_then(|el| {
            el.attrs
                .iter()
                .find(|a| ns.matches(&a.name, "text", "use-soft-page-breaks"))
                .map(|a| a.name.qualified())
        });
        if let (Some(name), Some(el)) = (name, doc.element_mut(node)) {
            el.remove_attr(&name);
        }
    }
}

/// Move a span that styles a statement link outside the link, so the style
/// survives when the link is replaced.
pub(super) fn invert_styles(doc: &mut Document, ns: &Namespaces) {
    let spans: Vec<NodeId> = doc
        .descendants(doc.root())
        .filter(|&id| ns.is(doc, id, "text", "span"))
        .filter(|&id| {
            let link = doc.parent(id);
            ns.is(doc, link, "text", "a")
                && ns
                    .attr(doc, link, "xlink", "href")
                    .is_some_and(is_statement_link)
        })
        .collect();

    for span in spans {
        let link = doc.parent(span);
        let outer = doc.parent(link);
        if outer.is_none() {
            continue;
        }
        let span_text = doc.leading_text_nodes(span);
        for node in doc.leading_text_nodes(link) {
            doc.detach(node);
        }
        doc.detach(span);
        let first = doc.first_child(link);
        for node in span_text {
            doc.detach(node);
            if first.is_some() {
                doc.insert_before(first, node);
            } else {
                doc.append(link, node);
            }
        }
        doc.replace(link, span);
        doc.append(span, link);
    }
}

/// Meta part handling: statements written as meta values become content
/// substitutions, and when `update` is set the dates, statistics and
/// generator are refreshed.
pub(super) fn handle_meta(doc: &mut Document, ns: &Namespaces, update: bool, generator: &str) {
    let root = doc.root_element();
    if !ns.is(doc, root, "office", "document-meta") {
        return;
    }

    let fields: Vec<(NodeId, String)> = doc
        .descendants(root)
        .filter(|&id| {
            doc.element(id).is_some_and(|el| {
                ns.matches(&el.name, "meta", "user-defined") || ns.in_namespace(&el.name, "dc")
            })
        })
        .filter_map(|id| {
            let text = doc.text_content(id);
            text.strip_prefix(LINK_PREFIX).map(|expr| (id, expr.to_string()))
        })
        .collect();
    for (id, expr) in fields {
        if let Some(el) = doc.element_mut(id) {
            el.content = Some(expr);
        }
    }

    if !update {
        return;
    }

    let meta = match doc
        .children(root)
        .find(|&id| ns.is(doc, id, "office", "meta"))
    {
        Some(meta) => meta,
        None => {
            let meta = doc.create_element(QName::new(ns.local_prefix("office"), "meta"), vec![]);
            doc.append(root, meta);
            meta
        }
    };

    for (prefix, local) in STALE_META {
        let stale: Vec<NodeId> = doc
            .children(meta)
            .filter(|&id| ns.is(doc, id, prefix, local))
            .collect();
        for node in stale {
            doc.remove_keeping_tail(node);
        }
    }

    let now = chrono::Local::now()
        .naive_local()
        .format("%Y-%m-%dT%H:%M:%S")
        .to_string();
    set_field(doc, ns, meta, "meta", "creation-date", &now);
    set_field(doc, ns, meta, "dc", "date", &now);
    set_field(doc, ns, meta, "meta", "editing-cycles", "1");
    set_field(doc, ns, meta, "meta", "generator", generator);
}

/// Set the text of the child `prefix:local` of `parent`, creating it when
/// missing.
fn set_field(
    doc: &mut Document,
    ns: &Namespaces,
    parent: NodeId,
    prefix: &str,
    local: &str,
    value: &str,
) {
    let existing = doc
        .children(parent)
        .find(|&id| ns.is(doc, id, prefix, local));
    let node = match existing {
        Some(node) => {
            let children: Vec<NodeId> = doc.children(node).collect();
            for child in children {
                doc.detach(child);
            }
            node
        }
        None => {
            let node = doc.create_element(QName::new(ns.local_prefix(prefix), local), vec![]);
            doc.append(parent, node);
            node
        }
    };
    let text = doc.create_text(value);
    doc.append(node, text);
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::dom::{parse_str, write_document};

    fn render(doc: &Document) -> String {
        String::from_utf8(write_document(doc).unwrap()).unwrap()
    }

    #[test]
    fn test_soft_page_breaks_removed() {
        let mut doc = parse_str(
            r#"<office:text text:use-soft-page-breaks="true"><text:p>a<text:soft-page-break/>b</text:p></office:text>"#,
        )
        .unwrap();
        let ns = Namespaces::from_document(&doc);
        remove_soft_page_breaks(&mut doc, &ns);
        assert_eq!(render(&doc), "<office:text><text:p>ab</text:p></office:text>");
    }

    #[test]
    fn test_span_moves_outside_statement_link() {
        let mut doc = parse_str(
            r#"<text:p><text:a xlink:href="relatorio://o.name"><text:span text:style-name="T1">o.name</text:span></text:a> end</text:p>"#,
        )
        .unwrap();
        let ns = Namespaces::from_document(&doc);
        invert_styles(&mut doc, &ns);
        assert_eq!(
            render(&doc),
            r#"<text:p><text:span text:style-name="T1"><text:a xlink:href="relatorio://o.name">o.name</text:a></text:span> end</text:p>"#
        );
    }

    #[test]
    fn test_span_in_ordinary_link_is_kept() {
        let xml = r#"<text:p><text:a xlink:href="http://x"><text:span>x</text:span></text:a></text:p>"#;
        let mut doc = parse_str(xml).unwrap();
        let ns = Namespaces::from_document(&doc);
        invert_styles(&mut doc, &ns);
        assert_eq!(render(&doc), xml);
    }

    #[test]
    fn test_meta_fields_and_refresh() {
        let mut doc = parse_str(
            r#"<office:document-meta><office:meta><meta:initial-creator>me</meta:initial-creator><meta:user-defined meta:name="Ref">relatorio://o.ref</meta:user-defined><meta:editing-cycles>7</meta:editing-cycles></office:meta></office:document-meta>"#,
        )
        .unwrap();
        let ns = Namespaces::from_document(&doc);
        handle_meta(&mut doc, &ns, true, "odf-template/test");

        let user = doc
            .descendants(doc.root())
            .find(|&id| ns.is(&doc, id, "meta", "user-defined"))
            .unwrap();
        assert_eq!(doc.element(user).unwrap().content.as_deref(), Some("o.ref"));

        let out = render(&doc);
        assert!(!out.contains("initial-creator"));
        assert!(out.contains("<meta:editing-cycles>1</meta:editing-cycles>"));
        assert!(out.contains("<meta:generator>odf-template/test</meta:generator>"));
        assert!(out.contains("<meta:creation-date>"));
        assert!(out.contains("<dc:date>"));
    }

    #[test]
    fn test_meta_left_alone_without_update() {
        let xml = r#"<office:document-meta><office:meta><meta:editing-cycles>7</meta:editing-cycles></office:meta></office:document-meta>"#;
        let mut doc = parse_str(xml).unwrap();
        let ns = Namespaces::from_document(&doc);
        handle_meta(&mut doc, &ns, false, "x");
        assert_eq!(render(&doc), xml);
    }
}
