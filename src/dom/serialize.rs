//! XML serialization.
//!
//! [`XmlWriter`] is shared by the streaming packager and by the parts the
//! crate writes itself (manifest, flat-format conversion). A start tag is
//! held back until the next event so that an element with no content is
//! written in its self-closing form, as it was read.

use quick_xml::Writer;
use quick_xml::escape::partial_escape;
use quick_xml::events::{BytesEnd, BytesPI, BytesStart, BytesText, Event};

use super::tree::{Document, NodeData, NodeId};
use crate::error::Result;

/// Incremental XML writer over an in-memory buffer.
pub struct XmlWriter {
    writer: Writer<Vec<u8>>,
    pending: Option<BytesStart<'static>>,
}

impl XmlWriter {
    pub fn new() -> Self {
        Self {
            writer: Writer::new(Vec::new()),
            pending: None,
        }
    }

    fn flush_pending(&mut self) -> Result<()> {
        if let Some(start) = self.pending.take() {
            self.writer.write_event(Event::Start(start))?;
        }
        Ok(())
    }

    pub fn start<'a, I>(&mut self, name: &str, attrs: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        self.flush_pending()?;
        let mut start = BytesStart::new(name.to_string());
        for attr in attrs {
            start.push_attribute(attr);
        }
        self.pending = Some(start);
        Ok(())
    }

    pub fn end(&mut self, name: &str) -> Result<()> {
        match self.pending.take() {
            Some(start) => self.writer.write_event(Event::Empty(start))?,
            None => self.writer.write_event(Event::End(BytesEnd::new(name)))?,
        }
        Ok(())
    }

    pub fn text(&mut self, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        self.flush_pending()?;
        self.writer
            .write_event(Event::Text(BytesText::from_escaped(partial_escape(text))))?;
        Ok(())
    }

    pub fn comment(&mut self, text: &str) -> Result<()> {
        self.flush_pending()?;
        self.writer
            .write_event(Event::Comment(BytesText::from_escaped(text)))?;
        Ok(())
    }

    /// Write `<?raw?>`; used for both processing instructions and the
    /// XML declaration.
    pub fn pi(&mut self, raw: &str) -> Result<()> {
        self.flush_pending()?;
        self.writer.write_event(Event::PI(BytesPI::new(raw)))?;
        Ok(())
    }

    pub fn doctype(&mut self, raw: &str) -> Result<()> {
        self.flush_pending()?;
        self.writer
            .write_event(Event::DocType(BytesText::from_escaped(raw)))?;
        Ok(())
    }

    /// Bytes written so far and not yet taken.
    pub fn buffered(&self) -> usize {
        self.writer.get_ref().len()
    }

    /// Take the completed bytes; a held-back start tag stays pending.
    pub fn take(&mut self) -> Vec<u8> {
        std::mem::take(self.writer.get_mut())
    }

    /// Flush everything, including a held-back start tag.
    pub fn finish(mut self) -> Result<Vec<u8>> {
        self.flush_pending()?;
        Ok(self.writer.into_inner())
    }
}

impl Default for XmlWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Serialize a document as plain XML.
///
/// Template annotations are ignored and directive wrappers are transparent;
/// this is for parts the crate builds or edits itself.
pub fn write_document(doc: &Document) -> Result<Vec<u8>> {
    let mut out = XmlWriter::new();
    for child in doc.children(doc.root()) {
        write_node(doc, child, &mut out)?;
    }
    out.finish()
}

fn write_node(doc: &Document, id: NodeId, out: &mut XmlWriter) -> Result<()> {
    let Some(node) = doc.get(id) else {
        return Ok(());
    };
    match &node.data {
        NodeData::Element(el) => {
            let name = el.name.qualified();
            let attrs: Vec<(String, &str)> = el
                .attrs
                .iter()
                .map(|a| (a.name.qualified(), a.value.as_str()))
                .collect();
            out.start(&name, attrs.iter().map(|(k, v)| (k.as_str(), *v)))?;
            for child in doc.children(id) {
                write_node(doc, child, out)?;
            }
            out.end(&name)?;
        }
        NodeData::Text(text) => out.text(text)?,
        NodeData::Comment(text) => out.comment(text)?,
        NodeData::Pi(raw) | NodeData::Decl(raw) => out.pi(raw)?,
        NodeData::DocType(raw) => out.doctype(raw)?,
        NodeData::Document | NodeData::Directive(_) | NodeData::RepeatMarker(_) => {
            for child in doc.children(id) {
                write_node(doc, child, out)?;
            }
        }
        NodeData::StoreColumnCount { .. } => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::dom::parse_str;

    #[test]
    fn test_round_trip_is_byte_identical() {
        let xml = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<office:document-content xmlns:office=\"urn:office\" office:version=\"1.3\"><!-- note --><text:p text:style-name=\"P1\">It's &lt;5 &amp; \"quoted\"</text:p>\n<text:p/></office:document-content>";
        let doc = parse_str(xml).unwrap();
        let out = write_document(&doc).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), xml);
    }

    #[test]
    fn test_pending_start_becomes_empty_element() {
        let mut w = XmlWriter::new();
        w.start("a", [("x", "1")]).unwrap();
        w.end("a").unwrap();
        w.start("b", []).unwrap();
        w.text("t").unwrap();
        w.end("b").unwrap();
        assert_eq!(w.finish().unwrap(), br#"<a x="1"/><b>t</b>"#);
    }

    #[test]
    fn test_take_keeps_pending_start() {
        let mut w = XmlWriter::new();
        w.start("a", []).unwrap();
        assert!(w.take().is_empty());
        w.end("a").unwrap();
        assert_eq!(w.take(), b"<a/>");
    }
}
