//! Nested-loop join operator.
//!
//! Left-major, right-minor: for every left row the right child is rescanned
//! via `reset` (the right scan keeps its loaded data, so the rescan is an
//! in-memory replay). Each `next` call emits one merged row; a missing
//! predicate makes every pair match, producing the Cartesian product.
//!
//! Only INNER joins execute. The outer variants exist in the type system but
//! have no NULL-padding representation, so they are rejected up front.

use log::debug;

use crate::error::{DbError, DbResult};
use crate::exec::eval::ExpressionEvaluator;
use crate::exec::operators::{ExecutionContext, Operator, OperatorState};
use crate::sql::statement::Expression;
use crate::types::{ColumnVector, DataChunk, DataType, JoinType};

#[derive(Debug)]
pub struct NestedLoopJoinOperator {
    left: Box<Operator>,
    right: Box<Operator>,
    /// `None` means every pair matches.
    condition: Option<Expression>,
    join_type: JoinType,
    left_chunk: DataChunk,
    right_chunk: DataChunk,
    left_row: usize,
    right_row: usize,
    output_columns: Vec<String>,
    output_types: Vec<DataType>,
    state: OperatorState,
}

impl NestedLoopJoinOperator {
    pub fn new(
        left: Box<Operator>,
        right: Box<Operator>,
        condition: Option<Expression>,
        join_type: JoinType,
    ) -> Self {
        Self {
            left,
            right,
            condition,
            join_type,
            left_chunk: DataChunk::default(),
            right_chunk: DataChunk::default(),
            left_row: 0,
            right_row: 0,
            output_columns: Vec::new(),
            output_types: Vec::new(),
            state: OperatorState::Ready,
        }
    }

    pub fn initialize(&mut self, context: &ExecutionContext) -> DbResult<()> {
        if self.join_type != JoinType::Inner {
            return Err(DbError::Execution(format!(
                "{} joins are not supported",
                self.join_type
            )));
        }

        self.left.initialize(context)?;
        self.right.initialize(context)?;

        // Output schema is left columns followed by right columns, qualified.
        self.output_columns = self.left.output_columns();
        self.output_columns.extend(self.right.output_columns());
        self.output_types = self.left.output_types();
        self.output_types.extend(self.right.output_types());

        self.left_chunk.clear();
        self.right_chunk.clear();
        self.left_row = 0;
        self.right_row = 0;
        self.state = OperatorState::Ready;

        debug!(
            "query#{}: join initialized with {} output columns",
            context.query_id,
            self.output_columns.len()
        );
        Ok(())
    }

    pub fn next(&mut self, context: &ExecutionContext, chunk: &mut DataChunk) -> DbResult<()> {
        chunk.clear();

        if self.state == OperatorState::Finished {
            return Ok(());
        }
        self.state = OperatorState::Running;

        loop {
            // Advance the left side when its current chunk is spent.
            if self.left_chunk.is_empty() || self.left_row >= self.left_chunk.row_count {
                if let Err(e) = self.left.next(context, &mut self.left_chunk) {
                    self.state = OperatorState::Error;
                    return Err(e);
                }
                if self.left_chunk.is_empty() {
                    self.state = OperatorState::Finished;
                    return Ok(());
                }
                self.left_row = 0;
                self.restart_right()?;
            }

            // Advance the right side when its current chunk is spent.
            if self.right_chunk.is_empty() || self.right_row >= self.right_chunk.row_count {
                if let Err(e) = self.right.next(context, &mut self.right_chunk) {
                    self.state = OperatorState::Error;
                    return Err(e);
                }
                if self.right_chunk.is_empty() {
                    // Right side drained for this left row; move on.
                    self.left_row += 1;
                    self.restart_right()?;
                    continue;
                }
                self.right_row = 0;
            }

            let matched = self.pair_matches()?;
            if matched {
                self.merge_rows(chunk)?;
                self.right_row += 1;
                return Ok(());
            }
            self.right_row += 1;
        }
    }

    pub fn reset(&mut self) -> DbResult<()> {
        self.left.reset()?;
        self.right.reset()?;
        self.left_chunk.clear();
        self.right_chunk.clear();
        self.left_row = 0;
        self.right_row = 0;
        self.state = OperatorState::Ready;
        Ok(())
    }

    pub fn output_columns(&self) -> Vec<String> {
        self.output_columns.clone()
    }

    pub fn output_types(&self) -> Vec<DataType> {
        self.output_types.clone()
    }

    pub fn state(&self) -> OperatorState {
        self.state
    }

    fn restart_right(&mut self) -> DbResult<()> {
        self.right.reset()?;
        self.right_chunk.clear();
        self.right_row = 0;
        Ok(())
    }

    /// Evaluates the join condition over an ephemeral single-row chunk built
    /// from the current (left, right) pair.
    fn pair_matches(&self) -> DbResult<bool> {
        let Some(condition) = &self.condition else {
            return Ok(true);
        };
        let mut merged = DataChunk::default();
        self.merge_pair(&mut merged)?;
        let value = ExpressionEvaluator::new(condition).evaluate_row(&merged, 0)?;
        Ok(value.as_bool())
    }

    fn merge_rows(&self, chunk: &mut DataChunk) -> DbResult<()> {
        chunk.clear();
        self.merge_pair(chunk)
    }

    fn merge_pair(&self, chunk: &mut DataChunk) -> DbResult<()> {
        for column in &self.left_chunk.columns {
            let mut merged = ColumnVector::new(column.name.clone(), column.data_type);
            merged.append_from(column, self.left_row)?;
            chunk.add_column(merged);
        }
        for column in &self.right_chunk.columns {
            let mut merged = ColumnVector::new(column.name.clone(), column.data_type);
            merged.append_from(column, self.right_row)?;
            chunk.add_column(merged);
        }
        chunk.row_count = 1;
        Ok(())
    }
}
