//! Replays column definitions once per counted column.

use std::collections::VecDeque;

use crate::error::Result;

use super::{EventSource, Hooks, XmlEvent};

/// Stream filter expanding [`XmlEvent::RepeatStart`] regions.
///
/// Column counts are only final once the rows of a table are rendered, so
/// from the first marker on, events are held back until the part ends. Each
/// marker's events are then emitted as many times as the widest row of its
/// table had cells; the marker events themselves are dropped.
pub struct ColumnHeaderFilter<S> {
    inner: S,
    held: Option<Vec<XmlEvent>>,
    ready: VecDeque<XmlEvent>,
    done: bool,
}

impl<S: EventSource> ColumnHeaderFilter<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            held: None,
            ready: VecDeque::new(),
            done: false,
        }
    }

    fn release(&mut self, hooks: &dyn Hooks) {
        if let Some(held) = self.held.take() {
            let mut events = held.into_iter();
            expand(&mut events, hooks, &mut self.ready);
        }
    }
}

/// Copy events to `out` until the end of `events` or an unmatched
/// [`XmlEvent::RepeatEnd`], expanding nested repeat regions.
fn expand(
    events: &mut impl Iterator<Item = XmlEvent>,
    hooks: &dyn Hooks,
    out: &mut VecDeque<XmlEvent>,
) {
    while let Some(event) = events.next() {
        match event {
            XmlEvent::RepeatStart { table } => {
                let mut region = VecDeque::new();
                expand(events, hooks, &mut region);
                let count = hooks.column_count(&table);
                tracing::trace!(table = %table, count, "repeating column definitions");
                for _ in 0..count {
                    out.extend(region.iter().cloned());
                }
            }
            XmlEvent::RepeatEnd => return,
            other => out.push_back(other),
        }
    }
}

impl<S: EventSource> EventSource for ColumnHeaderFilter<S> {
    fn next_event(&mut self, hooks: &mut dyn Hooks) -> Option<Result<XmlEvent>> {
        loop {
            if let Some(event) = self.ready.pop_front() {
                return Some(Ok(event));
            }
            if self.done {
                return None;
            }
            match self.inner.next_event(hooks) {
                None => {
                    self.done = true;
                    self.release(hooks);
                }
                Some(Err(err)) => {
                    self.done = true;
                    self.held = None;
                    return Some(Err(err));
                }
                Some(Ok(event)) => match (&mut self.held, event) {
                    (Some(_), XmlEvent::Part(path)) => {
                        self.release(hooks);
                        self.ready.push_back(XmlEvent::Part(path));
                    }
                    (Some(held), event) => held.push(event),
                    (None, event @ XmlEvent::RepeatStart { .. }) => {
                        self.held = Some(vec![event]);
                    }
                    (None, event) => return Some(Ok(event)),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::directive::LoopId;
    use crate::render::RenderState;

    struct Replay(VecDeque<XmlEvent>);

    impl EventSource for Replay {
        fn next_event(&mut self, _hooks: &mut dyn Hooks) -> Option<Result<XmlEvent>> {
            self.0.pop_front().map(Ok)
        }
    }

    /// Events of a table whose single column definition is repeated and
    /// whose row counts cells with loop 1.
    fn table(table: &str) -> Vec<XmlEvent> {
        vec![
            XmlEvent::start("table:table"),
            XmlEvent::RepeatStart {
                table: table.into(),
            },
            XmlEvent::start("table:table-column"),
            XmlEvent::end("table:table-column"),
            XmlEvent::RepeatEnd,
            XmlEvent::start("table:table-row"),
            XmlEvent::end("table:table-row"),
            XmlEvent::end("table:table"),
        ]
    }

    fn columns(events: &[XmlEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, XmlEvent::Start { name, .. } if name == "table:table-column"))
            .count()
    }

    #[test]
    fn test_definitions_repeat_per_counted_column() {
        let mut events = vec![XmlEvent::Part("content.xml".into())];
        events.extend(table("T"));
        events.push(XmlEvent::Part("styles.xml".into()));
        events.push(XmlEvent::text("s"));

        let mut state = RenderState::new(' ');
        state.counter.reset(LoopId(1));
        for _ in 0..3 {
            state.counter.inc(LoopId(1));
        }
        state.counter.store(LoopId(1), "T");

        let mut filter = ColumnHeaderFilter::new(Replay(events.into()));
        let mut out = Vec::new();
        while let Some(event) = filter.next_event(&mut state) {
            out.push(event.unwrap());
        }

        assert_eq!(columns(&out), 3);
        assert!(!out.iter().any(|e| matches!(e, XmlEvent::RepeatStart { .. } | XmlEvent::RepeatEnd)));
        assert_eq!(out.first(), Some(&XmlEvent::Part("content.xml".into())));
        assert_eq!(out[out.len() - 2], XmlEvent::Part("styles.xml".into()));
        assert_eq!(out.last(), Some(&XmlEvent::text("s")));
    }

    #[test]
    fn test_uncounted_table_drops_definitions() {
        let mut state = RenderState::new(' ');
        let mut filter = ColumnHeaderFilter::new(Replay(table("Unknown").into()));
        let mut out = Vec::new();
        while let Some(event) = filter.next_event(&mut state) {
            out.push(event.unwrap());
        }
        assert_eq!(columns(&out), 0);
        assert_eq!(out.len(), 4);
        assert_eq!(out.first(), Some(&XmlEvent::start("table:table")));
        assert_eq!(out.last(), Some(&XmlEvent::end("table:table")));
    }
}
