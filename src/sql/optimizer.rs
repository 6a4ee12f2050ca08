//! Statement optimizer.
//!
//! Pass-through today: `optimize` returns `None`, meaning "use the original
//! statement". The call site exists so rewrites (predicate pushdown, constant
//! folding, column pruning, join reordering) can slot in without touching the
//! executor.

use crate::error::DbResult;
use crate::sql::statement::Statement;

pub struct Optimizer;

impl Optimizer {
    pub fn new() -> Self {
        Self
    }

    /// Returns a rewritten statement, or `None` to keep the input.
    pub fn optimize(&self, _stmt: &Statement) -> DbResult<Option<Statement>> {
        Ok(None)
    }
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new()
    }
}
