//! Per-render state behind the hooks.

use std::collections::HashMap;

use crate::directive::{CacheKey, LoopId};
use crate::error::{Error, Result};
use crate::package::ResourceStore;
use crate::value::{CellType, Value, escape_invalid_chars, guess_type};

use super::{Context, Hooks, ImageSpec};

/// Cells counted by column loops.
///
/// Each active loop has a running count; storing it folds it into the
/// maximum for its table.
#[derive(Debug, Default)]
pub struct ColumnCounter {
    running: HashMap<LoopId, usize>,
    tables: HashMap<String, usize>,
}

impl ColumnCounter {
    pub fn reset(&mut self, id: LoopId) {
        self.running.insert(id, 0);
    }

    pub fn inc(&mut self, id: LoopId) {
        *self.running.entry(id).or_default() += 1;
    }

    pub fn store(&mut self, id: LoopId, table: &str) {
        let count = self.running.remove(&id).unwrap_or(0);
        let max = self.tables.entry(table.to_string()).or_default();
        *max = (*max).max(count);
    }

    /// Largest count recorded for `table`, zero when none was.
    pub fn count(&self, table: &str) -> usize {
        self.tables.get(table).copied().unwrap_or(0)
    }
}

/// Values evaluated once and read back by later computations.
#[derive(Debug, Default)]
pub struct ExpressionCache {
    values: HashMap<CacheKey, Value>,
}

impl ExpressionCache {
    pub fn store(&mut self, key: CacheKey, value: Value) -> Value {
        self.values.insert(key, value.clone());
        value
    }

    pub fn get(&self, key: CacheKey) -> Result<Value> {
        self.values
            .get(&key)
            .cloned()
            .ok_or_else(|| Error::Expression(format!("no cached value for key {}", key.0)))
    }
}

/// Everything one render call accumulates.
#[derive(Debug)]
pub struct RenderState {
    pub counter: ColumnCounter,
    pub cache: ExpressionCache,
    pub resources: ResourceStore,
    replacement: char,
}

impl RenderState {
    pub fn new(replacement: char) -> Self {
        Self {
            counter: ColumnCounter::default(),
            cache: ExpressionCache::default(),
            resources: ResourceStore::new(),
            replacement,
        }
    }
}

impl Hooks for RenderState {
    fn make_href(&mut self, image: &ImageSpec, context: &Context) -> Result<String> {
        let data = match &image.payload {
            Some(payload) => payload.read(context)?,
            None => Vec::new(),
        };
        Ok(self.resources.add(data, &image.mime))
    }

    fn make_dimension(
        &mut self,
        image: &ImageSpec,
        width: &str,
        height: &str,
    ) -> (Option<String>, Option<String>) {
        let pick = |explicit: &Option<String>, default: &str| {
            explicit
                .clone()
                .or_else(|| (!default.is_empty()).then(|| default.to_string()))
        };
        (pick(&image.width, width), pick(&image.height, height))
    }

    fn guess_type(&self, value: &Value) -> (CellType, Option<String>) {
        guess_type(value, self.replacement)
    }

    fn escape_invalid_chars(&self, text: &str) -> String {
        escape_invalid_chars(text, self.replacement)
    }

    fn reset_col_count(&mut self, id: LoopId) {
        self.counter.reset(id);
    }

    fn inc_col_count(&mut self, id: LoopId) {
        self.counter.inc(id);
    }

    fn store_col_count(&mut self, id: LoopId, table: &str) {
        self.counter.store(id, table);
    }

    fn column_count(&self, table: &str) -> usize {
        self.counter.count(table)
    }

    fn store_cache(&mut self, key: CacheKey, value: Value) -> Value {
        self.cache.store(key, value)
    }

    fn get_cache(&self, key: CacheKey) -> Result<Value> {
        self.cache.get(key)
    }
}
