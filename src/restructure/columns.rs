//! Loops that repeat table cells horizontally.
//!
//! A column loop adds cells to a row, so the table's column definitions must
//! be repeated too. The number of columns is only known once every row was
//! rendered: the row resets a counter, the first repeated cell increments it,
//! and a store instruction at the end of the row folds it into a per-table
//! maximum. The column definitions of the repeated range are wrapped in a
//! [`RepeatMarker`] that the render pipeline expands afterwards.

use super::Restructurer;
use crate::directive::{Computation, Directive, DirectiveAttr, Keyword, RepeatMarker};
use crate::dom::{Document, Namespaces, NodeData, NodeId};
use crate::error::TemplateError;

/// Column groups that may hold column definitions.
const COLUMN_GROUPS: [&str; 3] = ["table-columns", "table-header-columns", "table-column-group"];

pub(super) struct ColumnLoop {
    pub row: NodeId,
    pub outer_open: NodeId,
    pub outer_close: NodeId,
    pub attr: Option<DirectiveAttr>,
}

/// Prepare a loop whose boundaries are cells of one row.
///
/// Returns the loop attribute to use, which changes when the loop spans
/// several rows.
pub(super) fn handle_column_loop(
    r: &mut Restructurer,
    doc: &mut Document,
    ns: &Namespaces,
    lp: ColumnLoop,
) -> Result<Option<DirectiveAttr>, TemplateError> {
    let table = doc
        .ancestors(lp.row)
        .find(|&id| ns.is(doc, id, "table", "table"))
        .ok_or_else(|| malformed("column loop outside of a table"))?;
    let table_name = ns
        .attr(doc, table, "table", "name")
        .ok_or_else(|| malformed("table has no name"))?
        .to_string();

    let loop_id = r.next_loop_id();
    if let Some(row) = doc.element_mut(lp.row) {
        row.computed.push(Computation::ResetColumnCount(loop_id));
    }

    let enclosed = next_non_text_sibling(doc, lp.outer_open);
    if !ns.is(doc, enclosed, "table", "table-cell") {
        return Err(malformed("the loop must enclose table cells"));
    }
    if let Some(cell) = doc.element_mut(enclosed) {
        cell.computed.push(Computation::IncrementColumnCount(loop_id));
    }

    let store = doc.create(NodeData::StoreColumnCount {
        loop_id,
        table: table_name.clone(),
    });
    doc.append(lp.row, store);

    let opening = doc.preceding_non_text_siblings(lp.outer_open);
    let closing = doc.preceding_non_text_siblings(lp.outer_close);

    let attr = handle_row_span(r, doc, ns, &lp, opening, closing)?;

    match find_repeat_marker(doc, ns, table) {
        Some(marker) => {
            if (marker.opening, marker.closing) != (opening, closing) {
                return Err(TemplateError::IncoherentColumnRepetition(table_name));
            }
        }
        None => mark_columns(doc, ns, table, &table_name, opening, closing)?,
    }

    tracing::debug!(table = %table_name, opening, closing, "column loop");
    Ok(attr)
}

/// When the opening cell spans several rows, loop over a materialized copy
/// of the iterable and repeat the covered cells of the following rows with
/// the same loop.
fn handle_row_span(
    r: &mut Restructurer,
    doc: &mut Document,
    ns: &Namespaces,
    lp: &ColumnLoop,
    opening: usize,
    closing: usize,
) -> Result<Option<DirectiveAttr>, TemplateError> {
    let spanned: usize = ns
        .attr(doc, lp.outer_open, "table", "number-rows-spanned")
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(1);
    if spanned <= 1 {
        return Ok(lp.attr.clone());
    }

    let attr = lp
        .attr
        .as_ref()
        .ok_or_else(|| malformed("column loop without an iterable"))?;
    let (target, iterable) = attr
        .value
        .split_once(" in ")
        .ok_or_else(|| malformed(&format!("cannot read loop '{}'", attr.value)))?;

    let temp = r.next_temp_var();
    let vars = format!("{temp} = list({})", iterable.trim());
    let value = format!("{target} in {temp}");
    let with_node = doc.create(NodeData::Directive(Directive::new(
        Keyword::With,
        Some(DirectiveAttr::new("vars", vars)),
    )));

    let row = lp.row;
    doc.insert_before(row, with_node);
    let mut rows = vec![row];
    let mut next = doc.next_sibling(row);

    for _ in 1..spanned {
        while next.is_some() && !ns.is(doc, next, "table", "table-row") {
            next = doc.next_sibling(next);
        }
        if next.is_none() {
            return Err(malformed("row span goes past the last row"));
        }
        let next_row = next;
        next = doc.next_sibling(next_row);
        rows.push(next_row);

        let cells: Vec<NodeId> = doc
            .children(next_row)
            .filter(|&c| doc.text(c).is_none())
            .collect();
        let (Some(&first), Some(&last)) = (cells.get(opening), cells.get(closing)) else {
            return Err(malformed("spanned row is too short"));
        };
        if !ns.is(doc, first, "table", "covered-table-cell")
            || !ns.is(doc, last, "table", "covered-table-cell")
        {
            return Err(malformed("spanned row must hold covered cells under the loop"));
        }
        let for_node = doc.create(NodeData::Directive(Directive::new(
            Keyword::For,
            Some(DirectiveAttr::new(attr.name.clone(), value.clone())),
        )));
        doc.wrap_between(first, last, for_node);
    }

    for row in rows {
        doc.detach(row);
        doc.append(with_node, row);
    }
    Ok(Some(DirectiveAttr::new(attr.name.clone(), value)))
}

/// Nodes of a table, nested tables excluded.
fn table_scope(doc: &Document, ns: &Namespaces, table: NodeId) -> Vec<NodeId> {
    let mut out = Vec::new();
    let mut stack: Vec<NodeId> = doc.children(table).collect();
    stack.reverse();
    while let Some(id) = stack.pop() {
        out.push(id);
        if ns.is(doc, id, "table", "table") {
            continue;
        }
        let mut children: Vec<NodeId> = doc.children(id).collect();
        children.reverse();
        stack.extend(children);
    }
    out
}

fn find_repeat_marker(doc: &Document, ns: &Namespaces, table: NodeId) -> Option<RepeatMarker> {
    table_scope(doc, ns, table)
        .into_iter()
        .find_map(|id| match doc.get(id).map(|n| &n.data) {
            Some(NodeData::RepeatMarker(marker)) => Some(marker.clone()),
            _ => None,
        })
}

/// Column definitions of a table in column order.
fn column_definitions(doc: &Document, ns: &Namespaces, table: NodeId) -> Vec<NodeId> {
    let mut out = Vec::new();
    collect_columns(doc, ns, table, &mut out);
    out
}

fn collect_columns(doc: &Document, ns: &Namespaces, parent: NodeId, out: &mut Vec<NodeId>) {
    for child in doc.children(parent) {
        if ns.is(doc, child, "table", "table-column") {
            out.push(child);
        } else if COLUMN_GROUPS.iter().any(|g| ns.is(doc, child, "table", g)) {
            collect_columns(doc, ns, child, out);
        }
    }
}

fn repeat_count(doc: &Document, ns: &Namespaces, column: NodeId) -> usize {
    ns.attr(doc, column, "table", "number-columns-repeated")
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(1)
        .max(1)
}

/// Wrap the column definitions strictly between the loop's boundary columns
/// in a repeat marker.
fn mark_columns(
    doc: &mut Document,
    ns: &Namespaces,
    table: NodeId,
    table_name: &str,
    opening: usize,
    closing: usize,
) -> Result<(), TemplateError> {
    // Collapsed definitions holding a boundary column are split so that each
    // boundary has a definition of its own.
    let mut start = 0;
    for column in column_definitions(doc, ns, table) {
        let count = repeat_count(doc, ns, column);
        let end = start + count;
        let holds = |pos: usize| start <= pos && pos < end;
        if count > 1 && (holds(opening) || holds(closing)) {
            split_column(doc, ns, column, count);
        }
        start = end;
    }

    let columns = column_definitions(doc, ns, table);
    let at = |pos: usize| {
        let mut start = 0;
        for &column in &columns {
            if start == pos {
                return Some(column);
            }
            start += repeat_count(doc, ns, column);
            if start > pos {
                return None;
            }
        }
        None
    };
    let (Some(first), Some(last)) = (at(opening), at(closing)) else {
        return Err(malformed("table has fewer column definitions than cells"));
    };
    if doc.parent(first) != doc.parent(last) {
        return Err(malformed("loop boundary columns are in different column groups"));
    }

    let marker = doc.create(NodeData::RepeatMarker(RepeatMarker {
        table: table_name.to_string(),
        opening,
        closing,
    }));
    doc.wrap_between(first, last, marker);
    Ok(())
}

fn split_column(doc: &mut Document, ns: &Namespaces, column: NodeId, count: usize) {
    let repeat_attr = doc.element(column).and_then(|el| {
        el.attrs
            .iter()
            .find(|a| ns.matches(&a.name, "table", "number-columns-repeated"))
            .map(|a| a.name.qualified())
    });
    if let (Some(name), Some(el)) = (repeat_attr, doc.element_mut(column)) {
        el.remove_attr(&name);
    }
    for _ in 0..count {
        let copy = doc.deep_clone(column);
        doc.insert_before(column, copy);
    }
    doc.detach(column);
}

fn next_non_text_sibling(doc: &Document, id: NodeId) -> NodeId {
    let mut current = doc.next_sibling(id);
    while current.is_some() && doc.text(current).is_some() {
        current = doc.next_sibling(current);
    }
    current
}

fn malformed(message: &str) -> TemplateError {
    TemplateError::MalformedColumnLoop(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::super::tests::{HEAD, TAIL, link};
    use super::*;
    use crate::config::TemplateConfig;
    use crate::dom::parse_str;
    use crate::error::Error;

    fn cell(content: &str) -> String {
        format!("<table:table-cell><text:p>{content}</text:p></table:table-cell>")
    }

    fn loop_row() -> String {
        format!(
            "<table:table-row>{}{}{}{}</table:table-row>",
            cell("head"),
            cell(&link(r#"for each="c in cols""#)),
            cell("value"),
            cell(&link("/for")),
        )
    }

    fn run(xml_body: &str) -> crate::error::Result<(Document, Restructurer)> {
        let mut doc = parse_str(&format!("{HEAD}{xml_body}{TAIL}"))?;
        let mut r = Restructurer::new(&TemplateConfig::default());
        r.restructure(&mut doc, "content.xml")?;
        Ok((doc, r))
    }

    fn find(doc: &Document, pred: impl Fn(&NodeData) -> bool) -> Vec<NodeId> {
        doc.descendants(doc.root())
            .filter(|&id| pred(&doc.get(id).unwrap().data))
            .collect()
    }

    #[test]
    fn test_column_loop_instructions_and_marker() {
        let body = format!(
            r#"<table:table table:name="Sheet"><table:table-column table:number-columns-repeated="4"/>{}</table:table>"#,
            loop_row()
        );
        let (doc, r) = run(&body).unwrap();
        assert!(r.has_column_loops());

        let markers = find(&doc, |d| matches!(d, NodeData::RepeatMarker(_)));
        assert_eq!(markers.len(), 1);
        let NodeData::RepeatMarker(marker) = &doc.get(markers[0]).unwrap().data else {
            unreachable!()
        };
        assert_eq!((marker.opening, marker.closing), (1, 3));
        // the collapsed definition was split and the middle column wrapped
        assert_eq!(doc.children(markers[0]).count(), 1);

        let stores = find(&doc, |d| matches!(d, NodeData::StoreColumnCount { table, .. } if table == "Sheet"));
        assert_eq!(stores.len(), 1);
        let row = doc.parent(stores[0]);
        assert_eq!(doc.last_child(row), stores[0]);
        assert!(matches!(
            doc.element(row).unwrap().computed.as_slice(),
            [Computation::ResetColumnCount(_)]
        ));

        let loops = find(&doc, |d| matches!(d, NodeData::Directive(d) if d.keyword == Keyword::For));
        assert_eq!(loops.len(), 1);
        let inner = doc.element_children(loops[0]);
        assert_eq!(inner.len(), 1);
        assert!(matches!(
            doc.element(inner[0]).unwrap().computed.as_slice(),
            [Computation::IncrementColumnCount(_)]
        ));
    }

    #[test]
    fn test_second_row_with_same_range_is_accepted() {
        let body = format!(
            r#"<table:table table:name="Sheet"><table:table-column/><table:table-column/><table:table-column/><table:table-column/>{}{}</table:table>"#,
            loop_row(),
            loop_row()
        );
        let (doc, _) = run(&body).unwrap();
        assert_eq!(find(&doc, |d| matches!(d, NodeData::RepeatMarker(_))).len(), 1);
        assert_eq!(
            find(&doc, |d| matches!(d, NodeData::StoreColumnCount { .. })).len(),
            2
        );
    }

    #[test]
    fn test_incoherent_ranges_are_fatal() {
        let other_row = format!(
            "<table:table-row>{}{}{}</table:table-row>",
            cell(&link(r#"for each="c in cols""#)),
            cell("value"),
            cell(&link("/for")),
        );
        let body = format!(
            r#"<table:table table:name="Sheet"><table:table-column table:number-columns-repeated="4"/>{}{}</table:table>"#,
            loop_row(),
            other_row
        );
        let err = run(&body).unwrap_err();
        assert!(matches!(
            err,
            Error::Template {
                kind: TemplateError::IncoherentColumnRepetition(ref t),
                ..
            } if t == "Sheet"
        ));
    }

    #[test]
    fn test_row_spanned_loop_binds_temporary_list() {
        let body = format!(
            r#"<table:table table:name="Sheet"><table:table-column table:number-columns-repeated="4"/><table:table-row>{}<table:table-cell table:number-rows-spanned="2"><text:p>{}</text:p></table:table-cell>{}{}</table:table-row><table:table-row>{}<table:covered-table-cell/>{}<table:covered-table-cell/></table:table-row></table:table>"#,
            cell("head"),
            link(r#"for each="c in cols""#),
            cell("value"),
            cell(&link("/for")),
            cell("head 2"),
            cell("value 2"),
        );
        let (doc, _) = run(&body).unwrap();

        let withs = find(&doc, |d| matches!(d, NodeData::Directive(d) if d.keyword == Keyword::With));
        assert_eq!(withs.len(), 1);
        let NodeData::Directive(with) = &doc.get(withs[0]).unwrap().data else {
            unreachable!()
        };
        assert_eq!(with.arg(), "__relatorio_temp1 = list(cols)");
        assert_eq!(doc.element_children(withs[0]).len(), 2);

        let loops: Vec<String> = find(&doc, |d| matches!(d, NodeData::Directive(d) if d.keyword == Keyword::For))
            .into_iter()
            .map(|id| match &doc.get(id).unwrap().data {
                NodeData::Directive(d) => d.arg().to_string(),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(loops, vec!["c in __relatorio_temp1", "c in __relatorio_temp1"]);
    }

    #[test]
    fn test_loop_must_enclose_cells() {
        let body = format!(
            r#"<table:table table:name="Sheet"><table:table-column table:number-columns-repeated="3"/><table:table-row>{}<table:covered-table-cell/>{}</table:table-row></table:table>"#,
            cell(&link(r#"for each="c in cols""#)),
            cell(&link("/for")),
        );
        assert!(matches!(
            run(&body),
            Err(Error::Template {
                kind: TemplateError::MalformedColumnLoop(_),
                ..
            })
        ));
    }
}
