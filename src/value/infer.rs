//! Spreadsheet cell type inference.

use chrono::Timelike;

use super::{Value, duration_parts, escape_invalid_chars, format_float};

/// Prefixes a document uses for the cell value attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueAttrNames {
    pub office: String,
    /// Set when the document declares the LibreOffice `calcext` namespace.
    pub calcext: Option<String>,
}

impl Default for ValueAttrNames {
    fn default() -> Self {
        Self {
            office: "office".into(),
            calcext: None,
        }
    }
}

/// Office value type of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellType {
    Boolean,
    Date,
    Float,
    String,
    Time,
    Void,
}

impl CellType {
    pub const fn as_str(self) -> &'static str {
        match self {
            CellType::Boolean => "boolean",
            CellType::Date => "date",
            CellType::Float => "float",
            CellType::String => "string",
            CellType::Time => "time",
            CellType::Void => "void",
        }
    }

    /// Local name of the attribute holding the value.
    pub const fn value_attr(self) -> &'static str {
        match self {
            CellType::Boolean => "boolean-value",
            CellType::Date => "date-value",
            CellType::String => "string-value",
            CellType::Time => "time-value",
            CellType::Float | CellType::Void => "value",
        }
    }
}

/// Value attributes that a type switch must clear.
const VALUE_ATTRS: [&str; 6] = [
    "boolean-value",
    "currency",
    "date-value",
    "value",
    "string-value",
    "time-value",
];

/// Classify a value and produce its canonical attribute text.
///
/// `None` text means the value attribute is removed.
pub fn guess_type(value: &Value, replacement: char) -> (CellType, Option<String>) {
    match value {
        Value::Bool(b) => (CellType::Boolean, Some(b.to_string())),
        Value::Date(d) => (CellType::Date, Some(d.format("%Y-%m-%d").to_string())),
        Value::DateTime(dt) => {
            let text = if dt.nanosecond() == 0 {
                dt.format("%Y-%m-%dT%H:%M:%S").to_string()
            } else {
                dt.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
            };
            (CellType::Date, Some(text))
        }
        Value::Int(i) => (CellType::Float, Some(i.to_string())),
        Value::Float(f) => (CellType::Float, Some(format_float(*f))),
        Value::Str(s) => (CellType::String, Some(escape_invalid_chars(s, replacement))),
        Value::Duration(d) => {
            let (days, secs) = duration_parts(*d);
            (CellType::Time, Some(format!("P{days}D{secs}S")))
        }
        Value::None | Value::List(_) | Value::Map(_) | Value::Payload(_) => (CellType::Void, None),
    }
}

/// Attribute updates for a cell of type `kind` holding `text`.
///
/// Every value attribute is cleared, then the one matching the type is set
/// together with the value type.
pub fn cell_attributes(
    kind: CellType,
    text: Option<String>,
    names: &ValueAttrNames,
) -> Vec<(String, Option<String>)> {
    let qualify = |local: &str| format!("{}:{local}", names.office);

    let mut attrs: Vec<(String, Option<String>)> =
        VALUE_ATTRS.iter().map(|local| (qualify(local), None)).collect();
    let target = qualify(kind.value_attr());
    if let Some(slot) = attrs.iter_mut().find(|(name, _)| *name == target) {
        slot.1 = text;
    }
    attrs.push((qualify("value-type"), Some(kind.as_str().to_string())));
    if let Some(calcext) = &names.calcext {
        attrs.push((
            format!("{calcext}:value-type"),
            Some(kind.as_str().to_string()),
        ));
    }
    attrs
}
