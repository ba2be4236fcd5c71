//! Directive statements and the annotations they turn into.
//!
//! Authors write statements as hyperlinks with a `relatorio://` target or as
//! placeholders. The extractor finds them and pairs opening and closing
//! statements; the restructurer then rewrites the tree using the types in
//! this module.

mod extract;
mod model;
mod statement;

pub use extract::{Extraction, LINK_PREFIX, extract, is_statement_link};
pub use model::{
    CacheKey, Computation, Directive, DirectiveAttr, Keyword, LoopId, RepeatMarker, Replacement,
};
pub use statement::{ParsedStatement, Statement, StatementSource, parse_statement};
