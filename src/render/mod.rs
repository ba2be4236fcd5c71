//! Rendering restructured templates.
//!
//! The evaluation engine sits behind the [`Engine`] and [`EventSource`]
//! traits and calls back into per-render state through [`Hooks`]. The crate
//! ships [`Interpreter`], a small reference engine with a Python-like
//! expression language.

mod columns;
mod context;
mod engine;
mod event;
mod expr;
mod hooks;
mod interp;
mod state;

pub use columns::ColumnHeaderFilter;
pub use context::{Context, RESERVED_PREFIX};
pub use engine::{Engine, EventSource, TemplatePart};
pub use event::XmlEvent;
pub use expr::{Expr, Scope, evaluate};
pub use hooks::{HOOK_CONTRACT_VERSION, Hook, Hooks, ImageSpec};
pub use interp::{Interpreter, InterpreterStream};
pub use state::{ColumnCounter, ExpressionCache, RenderState};
