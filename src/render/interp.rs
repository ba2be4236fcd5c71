//! The built-in evaluation engine.
//!
//! [`Interpreter`] walks restructured parts with an explicit stack of frames
//! so that events are produced one pull at a time: nothing of the output is
//! materialised beyond the events of the node being visited.

use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use crate::directive::{Computation, Directive, Keyword, Replacement};
use crate::dom::{Document, NodeData, NodeId};
use crate::error::{Error, Result};
use crate::value::{Value, cell_attributes};

use super::expr::{Expr, Scope};
use super::{Context, EventSource, Engine, Hooks, ImageSpec, TemplatePart, XmlEvent};

/// Reference engine for restructured templates.
#[derive(Debug, Clone, Copy, Default)]
pub struct Interpreter;

impl Engine for Interpreter {
    fn generate<'t>(
        &self,
        parts: &'t [TemplatePart],
        context: Context,
    ) -> Box<dyn EventSource + 't> {
        Box::new(InterpreterStream::new(parts, context))
    }
}

enum Frame<'t> {
    /// Children of a node still to visit.
    Children {
        doc: &'t Document,
        next: NodeId,
        end: Option<XmlEvent>,
        pop_scope: bool,
        pop_choose: bool,
    },
    /// Remaining iterations of a `for` directive.
    Loop {
        doc: &'t Document,
        node: NodeId,
        targets: Vec<String>,
        items: std::vec::IntoIter<Value>,
    },
}

/// State of an enclosing `choose` directive.
struct Choice {
    value: Option<Value>,
    matched: bool,
}

/// Variables visible to an expression: loop and `with` bindings over the
/// render context.
struct Vars<'a> {
    context: &'a Context,
    scopes: &'a [HashMap<String, Value>],
}

impl Scope for Vars<'_> {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .or_else(|| self.context.get(name))
            .cloned()
    }
}

/// Event stream produced by [`Interpreter`].
pub struct InterpreterStream<'t> {
    parts: &'t [TemplatePart],
    next_part: usize,
    context: Context,
    scopes: Vec<HashMap<String, Value>>,
    choices: Vec<Choice>,
    frames: Vec<Frame<'t>>,
    queue: VecDeque<XmlEvent>,
    compiled: HashMap<String, Rc<Expr>>,
    failed: bool,
}

impl<'t> InterpreterStream<'t> {
    pub fn new(parts: &'t [TemplatePart], context: Context) -> Self {
        Self {
            parts,
            next_part: 0,
            context,
            scopes: Vec::new(),
            choices: Vec::new(),
            frames: Vec::new(),
            queue: VecDeque::new(),
            compiled: HashMap::new(),
            failed: false,
        }
    }

    fn eval(&mut self, src: &str) -> Result<Value> {
        let expr = match self.compiled.get(src) {
            Some(expr) => Rc::clone(expr),
            None => {
                let expr = Rc::new(Expr::parse(src)?);
                self.compiled.insert(src.to_string(), Rc::clone(&expr));
                expr
            }
        };
        expr.eval(&Vars {
            context: &self.context,
            scopes: &self.scopes,
        })
    }

    fn push_children(&mut self, doc: &'t Document, node: NodeId, end: Option<XmlEvent>) {
        self.frames.push(Frame::Children {
            doc,
            next: doc.first_child(node),
            end,
            pop_scope: false,
            pop_choose: false,
        });
    }

    /// Advance by one node. Returns `false` once every part is done.
    fn step(&mut self, hooks: &mut dyn Hooks) -> Result<bool> {
        let Some(frame) = self.frames.last_mut() else {
            let Some(part) = self.parts.get(self.next_part) else {
                return Ok(false);
            };
            self.next_part += 1;
            tracing::trace!(part = %part.path, "rendering part");
            self.queue.push_back(XmlEvent::Part(part.path.clone()));
            self.push_children(&part.document, part.document.root(), None);
            return Ok(true);
        };

        match frame {
            Frame::Children { doc, next, .. } if next.is_some() => {
                let (doc, node) = (*doc, *next);
                *next = doc.next_sibling(node);
                self.visit(doc, node, hooks)?;
            }
            Frame::Children { .. } => {
                if let Some(Frame::Children {
                    end,
                    pop_scope,
                    pop_choose,
                    ..
                }) = self.frames.pop()
                {
                    if pop_scope {
                        self.scopes.pop();
                    }
                    if pop_choose {
                        self.choices.pop();
                    }
                    self.queue.extend(end);
                }
            }
            Frame::Loop {
                doc,
                node,
                targets,
                items,
            } => match items.next() {
                Some(item) => {
                    let (doc, node) = (*doc, *node);
                    let bindings = bind(targets, item)?;
                    self.scopes.push(bindings);
                    self.frames.push(Frame::Children {
                        doc,
                        next: doc.first_child(node),
                        end: None,
                        pop_scope: true,
                        pop_choose: false,
                    });
                }
                None => {
                    self.frames.pop();
                }
            },
        }
        Ok(true)
    }

    fn visit(&mut self, doc: &'t Document, node: NodeId, hooks: &mut dyn Hooks) -> Result<()> {
        let Some(data) = doc.get(node).map(|n| &n.data) else {
            return Ok(());
        };
        match data {
            NodeData::Document => self.push_children(doc, node, None),
            NodeData::Element(_) => self.visit_element(doc, node, hooks)?,
            NodeData::Text(text) => self.queue.push_back(XmlEvent::Text(text.clone())),
            NodeData::Comment(text) => self.queue.push_back(XmlEvent::Comment(text.clone())),
            NodeData::Pi(raw) => self.queue.push_back(XmlEvent::Pi(raw.clone())),
            NodeData::Decl(raw) => self.queue.push_back(XmlEvent::Decl(raw.clone())),
            NodeData::DocType(raw) => self.queue.push_back(XmlEvent::DocType(raw.clone())),
            NodeData::Directive(directive) => self.visit_directive(doc, node, directive)?,
            NodeData::StoreColumnCount { loop_id, table } => {
                hooks.store_col_count(*loop_id, table);
            }
            NodeData::RepeatMarker(marker) => {
                self.queue.push_back(XmlEvent::RepeatStart {
                    table: marker.table.clone(),
                });
                self.push_children(doc, node, Some(XmlEvent::RepeatEnd));
            }
        }
        Ok(())
    }

    fn visit_directive(
        &mut self,
        doc: &'t Document,
        node: NodeId,
        directive: &Directive,
    ) -> Result<()> {
        let arg = directive.arg();
        match directive.keyword {
            Keyword::If => {
                if self.eval(arg)?.truthy() {
                    self.push_children(doc, node, None);
                }
            }
            Keyword::For => {
                let (targets, iterable) = parse_loop(arg)?;
                let items = self.eval(iterable)?.items()?;
                self.frames.push(Frame::Loop {
                    doc,
                    node,
                    targets,
                    items: items.into_iter(),
                });
            }
            Keyword::With => {
                self.scopes.push(HashMap::new());
                for (targets, expr) in parse_bindings(arg)? {
                    let value = self.eval(expr)?;
                    let bound = bind(&targets, value)?;
                    if let Some(scope) = self.scopes.last_mut() {
                        scope.extend(bound);
                    }
                }
                self.frames.push(Frame::Children {
                    doc,
                    next: doc.first_child(node),
                    end: None,
                    pop_scope: true,
                    pop_choose: false,
                });
            }
            Keyword::Choose => {
                let value = if arg.trim().is_empty() {
                    None
                } else {
                    Some(self.eval(arg)?)
                };
                self.choices.push(Choice {
                    value,
                    matched: false,
                });
                self.frames.push(Frame::Children {
                    doc,
                    next: doc.first_child(node),
                    end: None,
                    pop_scope: false,
                    pop_choose: true,
                });
            }
            Keyword::When => {
                let Some(choice) = self.choices.last() else {
                    return Err(Error::Expression("'when' outside of a 'choose'".into()));
                };
                if choice.matched {
                    return Ok(());
                }
                let expected = choice.value.clone();
                let test = self.eval(arg)?;
                let matched = match expected {
                    Some(value) => value == test,
                    None => test.truthy(),
                };
                if matched {
                    if let Some(choice) = self.choices.last_mut() {
                        choice.matched = true;
                    }
                    self.push_children(doc, node, None);
                }
            }
            Keyword::Otherwise => {
                let Some(choice) = self.choices.last_mut() else {
                    return Err(Error::Expression(
                        "'otherwise' outside of a 'choose'".into(),
                    ));
                };
                if !choice.matched {
                    choice.matched = true;
                    self.push_children(doc, node, None);
                }
            }
            Keyword::Attrs | Keyword::Content | Keyword::Replace | Keyword::Strip => {
                self.push_children(doc, node, None);
            }
        }
        Ok(())
    }

    fn visit_element(
        &mut self,
        doc: &'t Document,
        node: NodeId,
        hooks: &mut dyn Hooks,
    ) -> Result<()> {
        let Some(el) = doc.element(node) else {
            return Ok(());
        };

        if let Some(replacement) = &el.replace {
            let value = match replacement {
                Replacement::Expr(expr) => self.eval(expr)?.to_text(),
                Replacement::Escaped(expr) => {
                    let value = self.eval(expr)?;
                    hooks.escape_invalid_chars(&value.to_text())
                }
                Replacement::Cached(key) => {
                    let value = hooks.get_cache(*key)?;
                    hooks.escape_invalid_chars(&value.to_text())
                }
            };
            if !value.is_empty() {
                self.queue.push_back(XmlEvent::Text(value));
            }
            return Ok(());
        }

        let name = el.name.qualified();
        let mut attrs: Vec<(String, String)> = el
            .attrs
            .iter()
            .map(|a| (a.name.qualified(), a.value.clone()))
            .collect();
        for computation in &el.computed {
            for (attr, value) in self.compute(computation, hooks)? {
                set_attr(&mut attrs, attr, value);
            }
        }

        let strip = match &el.strip {
            Some(expr) if expr.trim().is_empty() => true,
            Some(expr) => self.eval(expr)?.truthy(),
            None => false,
        };

        if let Some(expr) = &el.content {
            let text = self.eval(expr)?.to_text();
            if !strip {
                self.queue.push_back(XmlEvent::Start {
                    name: name.clone(),
                    attrs,
                });
            }
            if !text.is_empty() {
                self.queue.push_back(XmlEvent::Text(text));
            }
            if !strip {
                self.queue.push_back(XmlEvent::End { name });
            }
            return Ok(());
        }

        if strip {
            self.push_children(doc, node, None);
        } else {
            self.queue.push_back(XmlEvent::Start {
                name: name.clone(),
                attrs,
            });
            self.push_children(doc, node, Some(XmlEvent::End { name }));
        }
        Ok(())
    }

    /// Attribute updates of one computation; `None` removes the attribute.
    fn compute(
        &mut self,
        computation: &Computation,
        hooks: &mut dyn Hooks,
    ) -> Result<Vec<(String, Option<String>)>> {
        let updates = match computation {
            Computation::Attrs(expr) => match self.eval(expr)? {
                Value::None => Vec::new(),
                Value::Map(map) => map
                    .into_iter()
                    .map(|(k, v)| (k, (!v.is_none()).then(|| v.to_text())))
                    .collect(),
                Value::List(pairs) => pairs
                    .into_iter()
                    .map(|pair| match pair.items()?.as_slice() {
                        [k, v] => Ok((k.to_text(), (!v.is_none()).then(|| v.to_text()))),
                        _ => Err(Error::Expression(
                            "attribute pairs must have two elements".into(),
                        )),
                    })
                    .collect::<Result<_>>()?,
                other => {
                    return Err(Error::Expression(format!(
                        "attributes must be a mapping, not '{}'",
                        other.type_name()
                    )));
                }
            },
            Computation::ResetColumnCount(id) => {
                hooks.reset_col_count(*id);
                Vec::new()
            }
            Computation::IncrementColumnCount(id) => {
                hooks.inc_col_count(*id);
                Vec::new()
            }
            Computation::CellType { key, expr, names } => {
                let value = self.eval(expr)?;
                let value = hooks.store_cache(*key, value);
                let (kind, text) = hooks.guess_type(&value);
                cell_attributes(kind, text, names)
            }
            Computation::ImageDimension {
                key,
                expr,
                width,
                height,
                svg_prefix,
            } => {
                let value = self.eval(expr)?;
                let value = hooks.store_cache(*key, value);
                let spec = ImageSpec::from_value(&value)?;
                let (width, height) = hooks.make_dimension(&spec, width, height);
                let mut updates = Vec::new();
                if let Some(width) = width {
                    updates.push((format!("{svg_prefix}:width"), Some(width)));
                }
                if let Some(height) = height {
                    updates.push((format!("{svg_prefix}:height"), Some(height)));
                }
                updates
            }
            Computation::ImageName { key, attr } => {
                let spec = ImageSpec::from_value(&hooks.get_cache(*key)?)?;
                vec![(attr.clone(), Some(spec.name.unwrap_or_default()))]
            }
            Computation::ImageHref { key, attr } => {
                let spec = ImageSpec::from_value(&hooks.get_cache(*key)?)?;
                let path = hooks.make_href(&spec, &self.context)?;
                vec![(attr.clone(), Some(path))]
            }
        };
        Ok(updates)
    }
}

impl EventSource for InterpreterStream<'_> {
    fn next_event(&mut self, hooks: &mut dyn Hooks) -> Option<Result<XmlEvent>> {
        loop {
            if let Some(event) = self.queue.pop_front() {
                return Some(Ok(event));
            }
            if self.failed {
                return None;
            }
            match self.step(hooks) {
                Ok(true) => {}
                Ok(false) => return None,
                Err(err) => {
                    self.failed = true;
                    self.frames.clear();
                    return Some(Err(err));
                }
            }
        }
    }
}

fn set_attr(attrs: &mut Vec<(String, String)>, name: String, value: Option<String>) {
    let existing = attrs.iter().position(|(n, _)| *n == name);
    match (existing, value) {
        (Some(idx), Some(value)) => attrs[idx].1 = value,
        (Some(idx), None) => {
            attrs.remove(idx);
        }
        (None, Some(value)) => attrs.push((name, value)),
        (None, None) => {}
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}

/// Names of a binding target: `x`, `a, b` or `(a, b)`.
fn parse_targets(text: &str) -> Result<Vec<String>> {
    let text = text.trim();
    let inner = text
        .strip_prefix('(')
        .and_then(|t| t.strip_suffix(')'))
        .unwrap_or(text);
    let targets: Vec<String> = inner
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();
    if targets.is_empty() || !targets.iter().all(|t| is_identifier(t)) {
        return Err(Error::Expression(format!("invalid binding target '{text}'")));
    }
    Ok(targets)
}

/// Split `targets in iterable`.
fn parse_loop(arg: &str) -> Result<(Vec<String>, &str)> {
    let Some((targets, iterable)) = arg.split_once(" in ") else {
        return Err(Error::Expression(format!(
            "loop '{arg}' must have the form 'name in iterable'"
        )));
    };
    Ok((parse_targets(targets)?, iterable.trim()))
}

/// Split `a = expr; b = expr` into bindings, ignoring separators inside
/// strings and brackets.
fn parse_bindings(arg: &str) -> Result<Vec<(Vec<String>, &str)>> {
    let mut bindings = Vec::new();
    for statement in split_top_level(arg, ';') {
        if statement.trim().is_empty() {
            continue;
        }
        let eq = find_assignment(statement).ok_or_else(|| {
            Error::Expression(format!("binding '{}' must have the form 'name = expr'", statement.trim()))
        })?;
        let targets = parse_targets(&statement[..eq])?;
        bindings.push((targets, statement[eq + 1..].trim()));
    }
    Ok(bindings)
}

fn split_top_level(text: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            c if c == separator && depth == 0 => {
                parts.push(&text[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

/// Byte offset of the `=` of an assignment, skipping comparison operators.
fn find_assignment(statement: &str) -> Option<usize> {
    let bytes = statement.as_bytes();
    (0..bytes.len()).find(|&i| {
        bytes[i] == b'='
            && bytes.get(i + 1) != Some(&b'=')
            && !matches!(i.checked_sub(1).map(|p| bytes[p]), Some(b'=' | b'!' | b'<' | b'>'))
    })
}

/// Bind a value to target names, unpacking sequences for several names.
fn bind(targets: &[String], value: Value) -> Result<HashMap<String, Value>> {
    if let [name] = targets {
        return Ok(HashMap::from([(name.clone(), value)]));
    }
    let items = value.items()?;
    if items.len() != targets.len() {
        return Err(Error::Expression(format!(
            "cannot unpack {} values into {} names",
            items.len(),
            targets.len()
        )));
    }
    Ok(targets.iter().cloned().zip(items).collect())
}
