//! Final-result operator.
//!
//! Drains its child on the first `next` call and accumulates a printable
//! text block: a header row of column names, then one ` | `-separated line
//! per row. Decimals print with two fractional digits.

use log::debug;

use crate::error::DbResult;
use crate::exec::operators::{ExecutionContext, Operator, OperatorState};
use crate::types::{ColumnVector, DataChunk, DataType};

#[derive(Debug)]
pub struct FinalResultOperator {
    child: Box<Operator>,
    result: String,
    header_written: bool,
    state: OperatorState,
}

impl FinalResultOperator {
    pub fn new(child: Box<Operator>) -> Self {
        Self {
            child,
            result: String::new(),
            header_written: false,
            state: OperatorState::Ready,
        }
    }

    pub fn initialize(&mut self, context: &ExecutionContext) -> DbResult<()> {
        self.child.initialize(context)?;
        self.result.clear();
        self.header_written = false;
        self.state = OperatorState::Ready;
        Ok(())
    }

    /// Produces the whole result on the first call; subsequent calls return
    /// an empty chunk.
    pub fn next(&mut self, context: &ExecutionContext, chunk: &mut DataChunk) -> DbResult<()> {
        chunk.clear();

        if self.state == OperatorState::Finished {
            return Ok(());
        }
        self.state = OperatorState::Running;

        if !self.header_written {
            self.write_header();
            self.header_written = true;
        }

        loop {
            let mut input = DataChunk::default();
            if let Err(e) = self.child.next(context, &mut input) {
                self.state = OperatorState::Error;
                return Err(e);
            }
            if input.is_empty() {
                break;
            }
            self.write_chunk(&input);
        }

        self.state = OperatorState::Finished;
        debug!("query#{}: result block assembled", context.query_id);
        Ok(())
    }

    pub fn reset(&mut self) -> DbResult<()> {
        self.child.reset()?;
        self.result.clear();
        self.header_written = false;
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

    pub fn result_text(&self) -> &str {
        &self.result
    }

    fn write_header(&mut self) {
        let columns = self.child.output_columns();
        if columns.is_empty() {
            return;
        }
        self.result.push_str(&columns.join(" | "));
        self.result.push('\n');
    }

    fn write_chunk(&mut self, chunk: &DataChunk) {
        for row in 0..chunk.row_count {
            for (index, column) in chunk.columns.iter().enumerate() {
                if index > 0 {
                    self.result.push_str(" | ");
                }
                self.result.push_str(&format_value(column, row));
            }
            self.result.push('\n');
        }
    }
}

fn format_value(column: &ColumnVector, row: usize) -> String {
    match column.data_type {
        DataType::Int => column.get_int(row).to_string(),
        DataType::String => column.get_string(row),
        DataType::Bool => if column.get_bool(row) { "true" } else { "false" }.to_string(),
        DataType::Decimal => format!("{:.2}", column.get_decimal(row)),
    }
}
