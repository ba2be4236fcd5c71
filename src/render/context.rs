//! Named values a template is rendered with.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::value::Value;

/// Prefix of names reserved for the render hooks.
pub const RESERVED_PREFIX: &str = "__relatorio_";

/// Values bound by name for one render call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Context {
    values: BTreeMap<String, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name`, replacing any previous value.
    ///
    /// Names starting with `__relatorio_` belong to the render hooks and are
    /// rejected.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        let name = name.into();
        if name.starts_with(RESERVED_PREFIX) {
            return Err(Error::ReservedName(name));
        }
        self.values.insert(name, value.into());
        Ok(())
    }

    /// Builder form of [`Context::insert`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Result<Self> {
        self.insert(name, value)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Build a context from the members of a JSON object.
    #[cfg(feature = "json")]
    pub fn from_json(json: serde_json::Value) -> Result<Self> {
        let serde_json::Value::Object(map) = json else {
            return Err(Error::Expression(
                "context must be built from a JSON object".into(),
            ));
        };
        let mut context = Self::new();
        for (name, value) in map {
            context.insert(name, Value::from(value))?;
        }
        Ok(context)
    }
}

#[cfg(feature = "json")]
impl TryFrom<serde_json::Value> for Context {
    type Error = Error;

    fn try_from(json: serde_json::Value) -> Result<Self> {
        Self::from_json(json)
    }
}
