//! Image frames and embedded sub-documents.

use super::Restructurer;
use crate::directive::Computation;
use crate::dom::{Document, Namespaces, NodeId, QName};

/// Frame name prefix marking an image placeholder.
const IMAGE_PREFIX: &str = "image:";

/// Rewrite every `draw:frame` named `image: <expr>` so that its picture is
/// produced from the expression. Returns the number of frames rewritten.
///
/// The expression evaluates to `(payload, mime[, width, height[, name]])`.
pub(super) fn handle_images(r: &mut Restructurer, doc: &mut Document, ns: &Namespaces) -> usize {
    let frames: Vec<NodeId> = doc
        .descendants(doc.root())
        .filter(|&id| {
            ns.is(doc, id, "draw", "frame")
                && ns
                    .attr(doc, id, "draw", "name")
                    .is_some_and(|n| n.starts_with(IMAGE_PREFIX))
        })
        .collect();

    for &frame in &frames {
        let key = r.next_cache_key();
        let Some(name_attr) = attr_name(doc, ns, frame, "draw", "name") else {
            continue;
        };
        let expr = ns
            .attr(doc, frame, "draw", "name")
            .map(|n| n[IMAGE_PREFIX.len()..].trim().to_string())
            .unwrap_or_default();
        let prefix = doc
            .element(frame)
            .map(|el| el.name.prefix.clone())
            .unwrap_or_else(|| "draw".into());

        let image = doc.create_element(QName::new(prefix, "image"), vec![]);
        if let Some(el) = doc.element_mut(image) {
            el.computed.push(Computation::ImageHref {
                key,
                attr: ns.qualify("xlink", "href"),
            });
        }
        let first = doc.children(frame).find(|&c| doc.is_element(c));
        match first {
            Some(first) => doc.replace(first, image),
            None => doc.append(frame, image),
        }

        let width = remove_ns_attr(doc, ns, frame, "svg", "width").unwrap_or_default();
        let height = remove_ns_attr(doc, ns, frame, "svg", "height").unwrap_or_default();
        remove_ns_attr(doc, ns, frame, "table", "end-cell-address");
        let svg_prefix = ns.local_prefix("svg");

        if let Some(el) = doc.element_mut(frame) {
            el.remove_attr(&name_attr);
            el.computed.push(Computation::ImageDimension {
                key,
                expr,
                width,
                height,
                svg_prefix,
            });
            el.computed.push(Computation::ImageName {
                key,
                attr: name_attr,
            });
        }
    }
    frames.len()
}

/// Archive directories of sub-documents embedded with `xlink:show="embed"`
/// and a relative `./` link.
pub(super) fn find_subdocuments(doc: &Document, ns: &Namespaces) -> Vec<String> {
    doc.descendants(doc.root())
        .filter(|&id| ns.is(doc, id, "draw", "object"))
        .filter(|&id| ns.attr(doc, id, "xlink", "show") == Some("embed"))
        .filter_map(|id| ns.attr(doc, id, "xlink", "href"))
        .filter_map(|href| href.strip_prefix("./"))
        .map(|path| path.trim_end_matches('/').to_string())
        .collect()
}

/// Qualified name of the attribute `prefix:local` as written on the element.
fn attr_name(
    doc: &Document,
    ns: &Namespaces,
    id: NodeId,
    prefix: &str,
    local: &str,
) -> Option<String> {
    doc.element(id)?
        .attrs
        .iter()
        .find(|a| ns.matches(&a.name, prefix, local))
        .map(|a| a.name.qualified())
}

fn remove_ns_attr(
    doc: &mut Document,
    ns: &Namespaces,
    id: NodeId,
    prefix: &str,
    local: &str,
) -> Option<String> {
    let name = attr_name(doc, ns, id, prefix, local)?;
    doc.element_mut(id)?.remove_attr(&name)
}
