/// One event of a rendered document stream.
///
/// A stream covers every template part in turn; [`XmlEvent::Part`] opens the
/// archive entry the following events belong to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlEvent {
    /// Start of the archive entry at this path.
    Part(String),
    /// XML declaration, raw content.
    Decl(String),
    DocType(String),
    Start {
        name: String,
        attrs: Vec<(String, String)>,
    },
    End {
        name: String,
    },
    Text(String),
    Comment(String),
    /// Processing instruction, raw content including the target.
    Pi(String),
    /// Column definitions follow that are replayed once per counted column.
    RepeatStart {
        table: String,
    },
    RepeatEnd,
}

impl XmlEvent {
    pub fn start(name: impl Into<String>) -> Self {
        XmlEvent::Start {
            name: name.into(),
            attrs: Vec::new(),
        }
    }

    pub fn end(name: impl Into<String>) -> Self {
        XmlEvent::End { name: name.into() }
    }

    pub fn text(text: impl Into<String>) -> Self {
        XmlEvent::Text(text.into())
    }
}
