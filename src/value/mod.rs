//! Runtime values bound in a render context.

mod escape;
mod infer;

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::io::{Read, Seek, SeekFrom};
use std::rc::Rc;

use chrono::{NaiveDate, NaiveDateTime, TimeDelta, Timelike};

pub use escape::{escape_invalid_chars, is_xml_invalid};
pub use infer::{CellType, ValueAttrNames, cell_attributes, guess_type};

use crate::error::{Error, Result};
use crate::render::Context;

/// A readable, seekable stream usable as an image payload.
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek> ReadSeek for T {}

/// Something that renders into archive bytes, such as another template.
pub trait SubReport {
    fn render_report(&self, context: &Context) -> Result<Vec<u8>>;
}

/// Binary content of an image or embedded object.
#[derive(Clone)]
pub enum Payload {
    Bytes(Rc<[u8]>),
    Stream(Rc<RefCell<dyn ReadSeek>>),
    /// Rendered with the current context when the resource is stored.
    Report(Rc<dyn SubReport>),
}

impl Payload {
    /// Read the full content, rewinding streams first.
    pub fn read(&self, context: &Context) -> Result<Vec<u8>> {
        match self {
            Payload::Bytes(bytes) => Ok(bytes.to_vec()),
            Payload::Stream(stream) => {
                let mut stream = stream.borrow_mut();
                stream.seek(SeekFrom::Start(0))?;
                let mut out = Vec::new();
                stream.read_to_end(&mut out)?;
                Ok(out)
            }
            Payload::Report(report) => report.render_report(context),
        }
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            Payload::Stream(_) => f.write_str("Stream"),
            Payload::Report(_) => f.write_str("Report"),
        }
    }
}

impl PartialEq for Payload {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Payload::Bytes(a), Payload::Bytes(b)) => a == b,
            (Payload::Stream(a), Payload::Stream(b)) => Rc::ptr_eq(a, b),
            (Payload::Report(a), Payload::Report(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// A dynamically typed value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Duration(TimeDelta),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Payload(Payload),
}

impl Value {
    /// Raw bytes payload.
    pub fn bytes(data: impl Into<Vec<u8>>) -> Self {
        let data: Vec<u8> = data.into();
        Value::Payload(Payload::Bytes(Rc::from(data)))
    }

    /// Seekable stream payload.
    pub fn stream<R: Read + Seek + 'static>(reader: R) -> Self {
        Value::Payload(Payload::Stream(Rc::new(RefCell::new(reader))))
    }

    /// Sub-report payload.
    pub fn report<R: SubReport + 'static>(report: R) -> Self {
        Value::Payload(Payload::Report(Rc::new(report)))
    }

    /// Build a mapping value from pairs.
    pub fn map<K: Into<String>, V: Into<Value>>(pairs: impl IntoIterator<Item = (K, V)>) -> Self {
        Value::Map(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Date(_) => "date",
            Value::DateTime(_) => "datetime",
            Value::Duration(_) => "timedelta",
            Value::List(_) => "list",
            Value::Map(_) => "dict",
            Value::Payload(_) => "bytes",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    /// Truth value: empty, zero and `None` are false.
    pub fn truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Duration(d) => !d.is_zero(),
            Value::List(items) => !items.is_empty(),
            Value::Map(map) => !map.is_empty(),
            Value::Payload(Payload::Bytes(b)) => !b.is_empty(),
            Value::Date(_) | Value::DateTime(_) | Value::Payload(_) => true,
        }
    }

    /// Numeric view used by arithmetic and comparisons.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Bool(b) => Some(f64::from(u8::from(*b))),
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Item of a list (negative indices count from the end) or entry of a
    /// mapping.
    pub fn index(&self, key: &Value) -> Result<Value> {
        match (self, key) {
            (Value::List(items), Value::Int(i)) => {
                let len = items.len() as i64;
                let idx = if *i < 0 { len + i } else { *i };
                if (0..len).contains(&idx) {
                    Ok(items[idx as usize].clone())
                } else {
                    Err(Error::Expression(format!("list index {i} out of range")))
                }
            }
            (Value::Str(s), Value::Int(i)) => {
                let chars: Vec<char> = s.chars().collect();
                let len = chars.len() as i64;
                let idx = if *i < 0 { len + i } else { *i };
                if (0..len).contains(&idx) {
                    Ok(Value::Str(chars[idx as usize].to_string()))
                } else {
                    Err(Error::Expression(format!("string index {i} out of range")))
                }
            }
            (Value::Map(map), Value::Str(k)) => map
                .get(k)
                .cloned()
                .ok_or_else(|| Error::Expression(format!("key '{k}' not found"))),
            _ => Err(Error::Expression(format!(
                "'{}' object is not subscriptable by '{}'",
                self.type_name(),
                key.type_name()
            ))),
        }
    }

    /// Mapping entry accessed with dotted notation.
    pub fn attr(&self, name: &str) -> Result<Value> {
        match self {
            Value::Map(map) => map.get(name).cloned().ok_or_else(|| {
                Error::Expression(format!("'dict' object has no attribute '{name}'"))
            }),
            _ => Err(Error::Expression(format!(
                "'{}' object has no attribute '{name}'",
                self.type_name()
            ))),
        }
    }

    /// Items produced when iterating over the value.
    pub fn items(&self) -> Result<Vec<Value>> {
        match self {
            Value::List(items) => Ok(items.clone()),
            Value::Map(map) => Ok(map.keys().map(|k| Value::Str(k.clone())).collect()),
            Value::Str(s) => Ok(s.chars().map(|c| Value::Str(c.to_string())).collect()),
            _ => Err(Error::Expression(format!(
                "'{}' object is not iterable",
                self.type_name()
            ))),
        }
    }

    /// Text rendering, following the usual string conversion of each type.
    pub fn to_text(&self) -> String {
        match self {
            Value::None => String::new(),
            Value::Str(s) => s.clone(),
            other => other.repr(),
        }
    }

    /// Representation used inside containers (strings are quoted).
    pub fn repr(&self) -> String {
        match self {
            Value::None => "None".into(),
            Value::Bool(true) => "True".into(),
            Value::Bool(false) => "False".into(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => format_float(*f),
            Value::Str(s) => format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
            Value::DateTime(dt) => {
                if dt.nanosecond() == 0 {
                    dt.format("%Y-%m-%d %H:%M:%S").to_string()
                } else {
                    dt.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
                }
            }
            Value::Duration(d) => format_duration(*d),
            Value::List(items) => {
                let inner: Vec<_> = items.iter().map(Value::repr).collect();
                format!("[{}]", inner.join(", "))
            }
            Value::Map(map) => {
                let inner: Vec<_> = map
                    .iter()
                    .map(|(k, v)| format!("'{k}': {}", v.repr()))
                    .collect();
                format!("{{{}}}", inner.join(", "))
            }
            Value::Payload(p) => format!("<{p:?}>"),
        }
    }
}

/// Float text with a trailing `.0` for integral values.
pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        "nan".into()
    } else if f.is_infinite() {
        if f > 0.0 { "inf".into() } else { "-inf".into() }
    } else if f.fract() == 0.0 && f.abs() < 1e16 {
        format!("{f:.1}")
    } else {
        f.to_string()
    }
}

/// Days and remaining seconds, with the seconds always non-negative.
///
/// Fractions of a second are floored, so a negative duration never rounds
/// up towards zero.
pub fn duration_parts(d: TimeDelta) -> (i64, i64) {
    let mut total = d.num_seconds();
    if d.subsec_nanos() < 0 {
        total -= 1;
    }
    (total.div_euclid(86_400), total.rem_euclid(86_400))
}

fn format_duration(d: TimeDelta) -> String {
    let (days, secs) = duration_parts(d);
    let clock = format!("{}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60);
    match days {
        0 => clock,
        1 | -1 => format!("{days} day, {clock}"),
        _ => format!("{days} days, {clock}"),
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::Duration(a), Value::Duration(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Payload(a), Value::Payload(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
            (Value::Str(a), Value::Str(b)) => a.partial_cmp(b),
            (Value::Date(a), Value::Date(b)) => a.partial_cmp(b),
            (Value::DateTime(a), Value::DateTime(b)) => a.partial_cmp(b),
            (Value::Duration(a), Value::Duration(b)) => a.partial_cmp(b),
            (Value::List(a), Value::List(b)) => a.partial_cmp(b),
            (a, b) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::$variant(v.into())
            }
        })*
    };
}

impl_from! {
    bool => Bool,
    i32 => Int,
    i64 => Int,
    u32 => Int,
    f32 => Float,
    f64 => Float,
    String => Str,
    &str => Str,
    NaiveDate => Date,
    NaiveDateTime => DateTime,
    TimeDelta => Duration,
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::None)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Value::Map(map)
    }
}

#[cfg(feature = "json")]
impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::None,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}
