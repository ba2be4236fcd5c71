//! # odf-template
//!
//! Turn OpenDocument files (`.odt`, `.ods`, ...) written in an office suite
//! into document templates.
//!
//! Authors mark up a document with `relatorio://` hyperlinks and text
//! placeholders holding expressions and control-flow statements. Parsing a
//! [`Template`] converts those markers into a directive tree once; each render
//! evaluates the tree against a [`Context`] and streams the result into a new
//! archive, leaving every part it did not touch byte-for-byte intact.
//!
//! ## Quick Start
//!
//! ```no_run
//! use odf_template::{Context, Template, Value};
//!
//! let template = Template::open("report.odt")?;
//! let context = Context::new()
//!     .with("title", "Monthly report")?
//!     .with("items", vec![Value::from(1), Value::from(2)])?;
//! std::fs::write("report-out.odt", template.render(context)?)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Markup
//!
//! - `relatorio://for each="item in items"` ... `relatorio:///for` repeats
//!   what lies between the two links, across paragraphs, rows or columns.
//! - `if`, `choose`/`when`/`otherwise` and `with` work the same way.
//! - A placeholder `<item.name>` is replaced by the value of its expression;
//!   alone in a spreadsheet cell, the cell also takes the value's type.
//! - A frame named `image: expr` shows the picture the expression yields.
//!
//! ## Engines
//!
//! Rendering goes through the [`render::Engine`] trait. The crate ships
//! [`render::Interpreter`], a small engine with a Python-like expression
//! language; [`Template::render_with`] accepts any other.

pub mod config;
pub mod directive;
pub mod dom;
pub mod error;
pub mod io;
pub mod package;
pub mod render;
pub mod restructure;
pub mod template;
pub(crate) mod util;
pub mod value;

pub use config::{Compression, RenderOptions, TemplateConfig};
pub use error::{Error, Result, TemplateError, Warning, WarningKind};
pub use render::{Context, Engine, EventSource, Hooks, Interpreter, XmlEvent};
pub use template::Template;
pub use value::{CellType, Payload, SubReport, Value};
