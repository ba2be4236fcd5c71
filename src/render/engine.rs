//! The seam between restructured templates and whatever evaluates them.

use crate::dom::Document;
use crate::error::Result;

use super::{Context, Hooks, XmlEvent};

/// A restructured part ready for evaluation.
#[derive(Debug)]
pub struct TemplatePart {
    /// Archive path of the part.
    pub path: String,
    pub document: Document,
}

/// A lazy, pull-based stream of rendered events.
///
/// The hooks are passed on every pull so the caller keeps ownership of the
/// render state and can read it between events.
pub trait EventSource {
    /// The next event, `None` once the stream is exhausted. A stream that
    /// returned an error yields nothing further.
    fn next_event(&mut self, hooks: &mut dyn Hooks) -> Option<Result<XmlEvent>>;
}

/// Evaluates directive trees against a context.
pub trait Engine {
    /// Start rendering `parts`, in order, each introduced by an
    /// [`XmlEvent::Part`] event.
    fn generate<'t>(&self, parts: &'t [TemplatePart], context: Context)
    -> Box<dyn EventSource + 't>;
}

impl<S: EventSource + ?Sized> EventSource for Box<S> {
    fn next_event(&mut self, hooks: &mut dyn Hooks) -> Option<Result<XmlEvent>> {
        (**self).next_event(hooks)
    }
}
