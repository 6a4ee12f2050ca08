//! Projection operator.
//!
//! Narrows child chunks to the requested columns, one output chunk per child
//! chunk. Requested names are matched against the child's qualified output
//! columns at initialize time; `*` expands to the full child column set.

use crate::error::{DbError, DbResult};
use crate::exec::operators::{ExecutionContext, Operator, OperatorState};
use crate::types::{DataChunk, DataType};

#[derive(Debug)]
pub struct ProjectionOperator {
    requested: Vec<String>,
    indices: Vec<usize>,
    child: Box<Operator>,
    state: OperatorState,
}

impl ProjectionOperator {
    pub fn new(requested: Vec<String>, child: Box<Operator>) -> Self {
        Self {
            requested,
            indices: Vec::new(),
            child,
            state: OperatorState::Ready,
        }
    }

    pub fn initialize(&mut self, context: &ExecutionContext) -> DbResult<()> {
        self.child.initialize(context)?;

        let child_columns = self.child.output_columns();

        // "*" anywhere in the list expands to every child column.
        if self.requested.iter().any(|name| name == "*") {
            self.requested = child_columns.clone();
        }

        self.indices.clear();
        for name in &self.requested {
            let index = child_columns
                .iter()
                .position(|c| c.eq_ignore_ascii_case(name))
                .ok_or_else(|| DbError::NotFound(format!("Column not found: {}", name)))?;
            self.indices.push(index);
        }

        self.state = OperatorState::Ready;
        Ok(())
    }

    pub fn next(&mut self, context: &ExecutionContext, chunk: &mut DataChunk) -> DbResult<()> {
        chunk.clear();

        if self.state == OperatorState::Finished {
            return Ok(());
        }
        self.state = OperatorState::Running;

        let mut input = DataChunk::default();
        if let Err(e) = self.child.next(context, &mut input) {
            self.state = OperatorState::Error;
            return Err(e);
        }

        if input.is_empty() {
            self.state = OperatorState::Finished;
            return Ok(());
        }

        for &index in &self.indices {
            chunk.add_column(input.columns[index].clone());
        }
        chunk.row_count = input.row_count;
        Ok(())
    }

    pub fn reset(&mut self) -> DbResult<()> {
        self.child.reset()?;
        self.state = OperatorState::Ready;
        Ok(())
    }

    pub fn output_columns(&self) -> Vec<String> {
        self.requested.clone()
    }

    pub fn output_types(&self) -> Vec<DataType> {
        let child_types = self.child.output_types();
        self.indices.iter().map(|&i| child_types[i]).collect()
    }

    pub fn state(&self) -> OperatorState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::operators::ScanOperator;
    use crate::storage::table::Table;
    use crate::types::{Row, TableSchema};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn scan_three_columns(dir: &std::path::Path) -> Box<Operator> {
        let mut schema = TableSchema::new("T");
        schema.add_column("A", DataType::Int);
        schema.add_column("B", DataType::String);
        schema.add_column("C", DataType::Bool);
        let table = Table::new("T", schema, dir);
        table
            .insert_rows(&[
                Row::new(vec!["1".into(), "x".into(), "true".into()]),
                Row::new(vec!["2".into(), "y".into(), "false".into()]),
            ])
            .expect("insert");
        Box::new(Operator::Scan(ScanOperator::new(
            "T",
            vec![],
            Arc::new(table),
        )))
    }

    #[test]
    fn narrows_and_reorders_columns() {
        let dir = tempdir().expect("tempdir");
        let ctx = ExecutionContext { query_id: 1 };
        let mut projection = ProjectionOperator::new(
            vec!["T.C".to_string(), "T.A".to_string()],
            scan_three_columns(dir.path()),
        );
        projection.initialize(&ctx).expect("initialize");
        assert_eq!(projection.output_columns(), vec!["T.C", "T.A"]);
        assert_eq!(
            projection.output_types(),
            vec![DataType::Bool, DataType::Int]
        );

        let mut chunk = DataChunk::default();
        projection.next(&ctx, &mut chunk).expect("next");
        assert_eq!(chunk.row_count, 2);
        assert_eq!(chunk.columns.len(), 2);
        assert!(chunk.columns[0].get_bool(0));
        assert_eq!(chunk.columns[1].get_int(1), 2);
    }

    #[test]
    fn star_expands_to_all_child_columns() {
        let dir = tempdir().expect("tempdir");
        let ctx = ExecutionContext { query_id: 1 };
        let mut projection =
            ProjectionOperator::new(vec!["*".to_string()], scan_three_columns(dir.path()));
        projection.initialize(&ctx).expect("initialize");
        assert_eq!(projection.output_columns(), vec!["T.A", "T.B", "T.C"]);
    }

    #[test]
    fn unknown_column_fails_initialize() {
        let dir = tempdir().expect("tempdir");
        let ctx = ExecutionContext { query_id: 1 };
        let mut projection =
            ProjectionOperator::new(vec!["T.NOPE".to_string()], scan_three_columns(dir.path()));
        let err = projection.initialize(&ctx).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn one_output_chunk_per_child_chunk() {
        let dir = tempdir().expect("tempdir");
        let ctx = ExecutionContext { query_id: 1 };
        let mut projection =
            ProjectionOperator::new(vec!["T.A".to_string()], scan_three_columns(dir.path()));
        projection.initialize(&ctx).expect("initialize");

        let mut chunk = DataChunk::default();
        projection.next(&ctx, &mut chunk).expect("next");
        assert_eq!(chunk.row_count, 2);
        projection.next(&ctx, &mut chunk).expect("next");
        assert!(chunk.is_empty());
        assert_eq!(projection.state(), OperatorState::Finished);
    }
}
