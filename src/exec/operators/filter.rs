//! Filter operator.
//!
//! Evaluates its predicate over each child chunk and keeps the rows where it
//! coerces to true, preserving order. All-false chunks are skipped rather
//! than returned, so downstream operators only ever see an empty chunk at
//! end-of-stream.

use log::debug;

use crate::error::DbResult;
use crate::exec::eval::ExpressionEvaluator;
use crate::exec::operators::{ExecutionContext, Operator, OperatorState};
use crate::sql::statement::Expression;
use crate::types::{ColumnVector, DataChunk, DataType};

#[derive(Debug)]
pub struct FilterOperator {
    predicate: Expression,
    child: Box<Operator>,
    state: OperatorState,
}

impl FilterOperator {
    pub fn new(predicate: Expression, child: Box<Operator>) -> Self {
        Self {
            predicate,
            child,
            state: OperatorState::Ready,
        }
    }

    pub fn initialize(&mut self, context: &ExecutionContext) -> DbResult<()> {
        self.child.initialize(context)?;
        self.state = OperatorState::Ready;
        Ok(())
    }

    pub fn next(&mut self, context: &ExecutionContext, chunk: &mut DataChunk) -> DbResult<()> {
        chunk.clear();

        if self.state == OperatorState::Finished {
            return Ok(());
        }
        self.state = OperatorState::Running;

        loop {
            let mut input = DataChunk::default();
            if let Err(e) = self.child.next(context, &mut input) {
                self.state = OperatorState::Error;
                return Err(e);
            }

            if input.is_empty() {
                self.state = OperatorState::Finished;
                return Ok(());
            }

            let selection = match self.evaluate_predicate(&input) {
                Ok(selection) => selection,
                Err(e) => {
                    self.state = OperatorState::Error;
                    return Err(e);
                }
            };

            apply_selection(&input, &selection, chunk)?;
            if !chunk.is_empty() {
                debug!(
                    "query#{}: filter kept {} of {} rows",
                    context.query_id, chunk.row_count, input.row_count
                );
                return Ok(());
            }
            // Nothing matched; pull the next child chunk.
        }
    }

    pub fn reset(&mut self) -> DbResult<()> {
        self.child.reset()?;
        self.state = OperatorState::Ready;
        Ok(())
    }

    pub fn output_columns(&self) -> Vec<String> {
        self.child.output_columns()
    }

    pub fn output_types(&self) -> Vec<DataType> {
        self.child.output_types()
    }

    pub fn state(&self) -> OperatorState {
        self.state
    }

    fn evaluate_predicate(&self, chunk: &DataChunk) -> DbResult<Vec<bool>> {
        let values = ExpressionEvaluator::new(&self.predicate).evaluate(chunk)?;
        Ok(values.iter().map(|v| v.as_bool()).collect())
    }
}

/// Copies the selected rows into `output`, in their original order.
fn apply_selection(input: &DataChunk, selection: &[bool], output: &mut DataChunk) -> DbResult<()> {
    output.clear();

    let selected = selection.iter().filter(|&&s| s).count();
    if selected == 0 {
        return Ok(());
    }

    for input_column in &input.columns {
        let mut column = ColumnVector::new(input_column.name.clone(), input_column.data_type);
        column.reserve(selected);
        for (row, &keep) in selection.iter().enumerate() {
            if keep {
                column.append_from(input_column, row)?;
            }
        }
        output.add_column(column);
    }
    output.row_count = selected;
    Ok(())
}
