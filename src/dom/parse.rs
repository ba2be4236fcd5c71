//! XML parsing into the arena tree.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use super::tree::{Attribute, Document, NodeData, QName};
use crate::error::{Error, Result};
use crate::util::{decode_text, extract_xml_encoding};

/// Parse XML bytes, honouring the encoding named in the declaration.
pub fn parse(bytes: &[u8]) -> Result<Document> {
    let content = decode_text(bytes, extract_xml_encoding(bytes));
    parse_str(&content)
}

/// Parse an XML string into a document.
///
/// Whitespace, comments, processing instructions and the declaration are kept
/// so that an untouched document serializes back to the same bytes.
pub fn parse_str(content: &str) -> Result<Document> {
    let mut reader = Reader::from_str(content);
    let mut doc = Document::new();
    let mut stack = vec![doc.root()];

    loop {
        let parent = stack.last().copied().unwrap_or(doc.root());
        match reader.read_event()? {
            Event::Start(e) => {
                let id = create_element(&reader, &e, &mut doc)?;
                doc.append(parent, id);
                stack.push(id);
            }
            Event::Empty(e) => {
                let id = create_element(&reader, &e, &mut doc)?;
                doc.append(parent, id);
            }
            Event::End(_) => {
                if stack.len() <= 1 {
                    return Err(Error::InvalidPackage("unbalanced end tag".into()));
                }
                stack.pop();
            }
            Event::Text(e) => {
                let text = reader.decoder().decode(&e)?;
                doc.append_text(parent, &text);
            }
            Event::GeneralRef(e) => {
                let entity = reader.decoder().decode(&e)?;
                match resolve_entity(&entity) {
                    Some(resolved) => doc.append_text(parent, &resolved),
                    None => {
                        return Err(Error::InvalidPackage(format!(
                            "unknown entity reference &{entity};"
                        )));
                    }
                }
            }
            Event::CData(e) => {
                doc.append_text(parent, &String::from_utf8_lossy(&e));
            }
            Event::Comment(e) => {
                let text = reader.decoder().decode(&e)?.into_owned();
                let id = doc.create(NodeData::Comment(text));
                doc.append(parent, id);
            }
            Event::Decl(e) => {
                let raw = String::from_utf8_lossy(&e).into_owned();
                let id = doc.create(NodeData::Decl(raw));
                doc.append(parent, id);
            }
            Event::PI(e) => {
                let raw = String::from_utf8_lossy(&e).into_owned();
                let id = doc.create(NodeData::Pi(raw));
                doc.append(parent, id);
            }
            Event::DocType(e) => {
                let raw = reader.decoder().decode(&e)?.into_owned();
                let id = doc.create(NodeData::DocType(raw));
                doc.append(parent, id);
            }
            Event::Eof => break,
        }
    }

    if stack.len() > 1 {
        return Err(Error::InvalidPackage("unclosed element at end of part".into()));
    }
    if doc.root_element().is_none() {
        return Err(Error::InvalidPackage("part has no root element".into()));
    }
    Ok(doc)
}

fn create_element(
    reader: &Reader<&[u8]>,
    e: &BytesStart<'_>,
    doc: &mut Document,
) -> Result<super::tree::NodeId> {
    let qname = e.name();
    let name = reader.decoder().decode(qname.as_ref())?;
    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr = attr?;
        let key = reader.decoder().decode(attr.key.as_ref())?;
        let value = attr.unescape_value()?;
        attrs.push(Attribute {
            name: QName::parse(&key),
            value: value.into_owned(),
        });
    }
    Ok(doc.create_element(QName::parse(&name), attrs))
}

/// Resolve XML entity references.
fn resolve_entity(entity: &str) -> Option<String> {
    match entity {
        "apos" => return Some("'".to_string()),
        "quot" => return Some("\"".to_string()),
        "lt" => return Some("<".to_string()),
        "gt" => return Some(">".to_string()),
        "amp" => return Some("&".to_string()),
        _ => {}
    }

    if let Some(hex) = entity.strip_prefix("#x") {
        if let Ok(code) = u32::from_str_radix(hex, 16)
            && let Some(c) = char::from_u32(code)
        {
            return Some(c.to_string());
        }
    } else if let Some(dec) = entity.strip_prefix('#')
        && let Ok(code) = dec.parse::<u32>()
        && let Some(c) = char::from_u32(code)
    {
        return Some(c.to_string());
    }

    None
}
