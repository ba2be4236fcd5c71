//! The contract between restructured templates and the render engine.
//!
//! Directive trees call back into the renderer through a fixed set of hooks.
//! Engines reach them through the [`Hooks`] trait; the names under which a
//! name-based engine would bind them are listed by [`Hook`].

use crate::directive::{CacheKey, LoopId};
use crate::error::{Error, Result};
use crate::value::{CellType, Payload, Value};

use super::Context;

/// Version of the hook contract. Bumped whenever a hook is added, removed or
/// changes meaning.
pub const HOOK_CONTRACT_VERSION: u32 = 1;

/// The reserved hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    MakeHref,
    MakeDimension,
    GuessType,
    EscapeInvalidChars,
    ResetColCount,
    IncColCount,
    StoreColCount,
    StoreCache,
    GetCache,
}

impl Hook {
    pub const ALL: [Hook; 9] = [
        Hook::MakeHref,
        Hook::MakeDimension,
        Hook::GuessType,
        Hook::EscapeInvalidChars,
        Hook::ResetColCount,
        Hook::IncColCount,
        Hook::StoreColCount,
        Hook::StoreCache,
        Hook::GetCache,
    ];

    /// Reserved context name of the hook.
    pub const fn name(self) -> &'static str {
        match self {
            Hook::MakeHref => "__relatorio_make_href",
            Hook::MakeDimension => "__relatorio_make_dimension",
            Hook::GuessType => "__relatorio_guess_type",
            Hook::EscapeInvalidChars => "__relatorio_escape_invalid_chars",
            Hook::ResetColCount => "__relatorio_reset_col_count",
            Hook::IncColCount => "__relatorio_inc_col_count",
            Hook::StoreColCount => "__relatorio_store_col_count",
            Hook::StoreCache => "__relatorio_store_cache",
            Hook::GetCache => "__relatorio_get_cache",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|hook| hook.name() == name)
    }
}

/// Render-time services a directive tree relies on.
pub trait Hooks {
    /// Store an image and return the archive path to link to.
    fn make_href(&mut self, image: &ImageSpec, context: &Context) -> Result<String>;

    /// Frame size for an image, falling back to the template's own size.
    fn make_dimension(
        &mut self,
        image: &ImageSpec,
        width: &str,
        height: &str,
    ) -> (Option<String>, Option<String>);

    /// Spreadsheet type and canonical text of a value.
    fn guess_type(&self, value: &Value) -> (CellType, Option<String>);

    /// Replace characters XML cannot carry.
    fn escape_invalid_chars(&self, text: &str) -> String;

    fn reset_col_count(&mut self, id: LoopId);
    fn inc_col_count(&mut self, id: LoopId);

    /// Fold the loop's running count into the per-table maximum.
    fn store_col_count(&mut self, id: LoopId, table: &str);

    /// Largest cell count stored for `table`. Read by the column header
    /// filter, not bound under a reserved name.
    fn column_count(&self, table: &str) -> usize;

    /// Remember a value and hand it back.
    fn store_cache(&mut self, key: CacheKey, value: Value) -> Value;
    fn get_cache(&self, key: CacheKey) -> Result<Value>;
}

/// An image expression: `(payload, mime[, width, height[, name]])`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageSpec {
    pub payload: Option<Payload>,
    pub mime: String,
    pub width: Option<String>,
    pub height: Option<String>,
    pub name: Option<String>,
}

impl ImageSpec {
    pub fn from_value(value: &Value) -> Result<Self> {
        let Value::List(items) = value else {
            return Err(Error::Expression(format!(
                "image must be a tuple, not '{}'",
                value.type_name()
            )));
        };
        if items.len() < 2 {
            return Err(Error::Expression(
                "image tuple needs a payload and a mime type".into(),
            ));
        }
        let payload = match &items[0] {
            Value::Payload(p) => Some(p.clone()),
            Value::Str(s) => Some(Payload::Bytes(s.as_bytes().into())),
            Value::None => None,
            other => {
                return Err(Error::Expression(format!(
                    "'{}' object cannot be used as image data",
                    other.type_name()
                )));
            }
        };
        let text = |idx: usize| {
            items
                .get(idx)
                .filter(|v| v.truthy())
                .map(Value::to_text)
        };
        Ok(Self {
            payload,
            mime: items[1].to_text(),
            width: text(2),
            height: text(3),
            name: text(4),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hook_names_round_trip() {
        for hook in Hook::ALL {
            assert!(hook.name().starts_with(super::super::context::RESERVED_PREFIX));
            assert_eq!(Hook::from_name(hook.name()), Some(hook));
        }
        assert_eq!(Hook::from_name("__relatorio_unknown"), None);
    }

    #[test]
    fn test_image_spec_from_tuple() {
        let value = Value::List(vec![
            Value::bytes(b"png".to_vec()),
            "image/png".into(),
            "2cm".into(),
            Value::None,
            "logo".into(),
        ]);
        let spec = ImageSpec::from_value(&value).unwrap();
        assert_eq!(spec.mime, "image/png");
        assert_eq!(spec.width.as_deref(), Some("2cm"));
        assert_eq!(spec.height, None);
        assert_eq!(spec.name.as_deref(), Some("logo"));

        assert!(ImageSpec::from_value(&Value::from("x")).is_err());
        assert!(ImageSpec::from_value(&Value::List(vec![Value::None])).is_err());
    }
}
