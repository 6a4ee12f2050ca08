//! Table scan operator.
//!
//! Loads the requested column set into memory on the first `next` call and
//! slices it into batches of up to [`BATCH_SIZE`] rows. Output columns carry
//! qualified `table.column` names. `reset` rewinds to the first batch but
//! keeps the loaded data; the join's right-side rescan depends on that.

use std::sync::Arc;

use log::debug;

use crate::error::{DbError, DbResult};
use crate::exec::operators::{ExecutionContext, OperatorState};
use crate::storage::table::Table;
use crate::types::{BATCH_SIZE, ColumnVector, DataChunk, DataType};

#[derive(Debug)]
pub struct ScanOperator {
    table_name: String,
    /// Requested column names; empty means every column.
    columns: Vec<String>,
    table: Arc<Table>,
    table_data: Vec<ColumnVector>,
    data_loaded: bool,
    current_offset: usize,
    output_columns: Vec<String>,
    state: OperatorState,
}

impl ScanOperator {
    pub fn new(table_name: impl Into<String>, columns: Vec<String>, table: Arc<Table>) -> Self {
        Self {
            table_name: table_name.into(),
            columns,
            table,
            table_data: Vec::new(),
            data_loaded: false,
            current_offset: 0,
            output_columns: Vec::new(),
            state: OperatorState::Ready,
        }
    }

    pub fn initialize(&mut self, context: &ExecutionContext) -> DbResult<()> {
        let schema = self.table.schema();
        for name in &self.columns {
            if schema.get_column_index(name).is_none() {
                return Err(DbError::NotFound(format!(
                    "Column not found: {} in table {}",
                    name, self.table_name
                )));
            }
        }

        let scanned: &[String] = if self.columns.is_empty() {
            &schema.column_names
        } else {
            &self.columns
        };
        self.output_columns = scanned
            .iter()
            .map(|c| format!("{}.{}", self.table_name, c))
            .collect();

        self.current_offset = 0;
        self.data_loaded = false;
        self.table_data.clear();
        self.state = OperatorState::Ready;

        debug!(
            "query#{}: scan of {} initialized ({} columns)",
            context.query_id,
            self.table_name,
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

        if !self.data_loaded {
            let result = if self.columns.is_empty() {
                self.table.scan_all()
            } else {
                self.table.scan_columns(&self.columns)
            };
            self.table_data = match result {
                Ok(columns) => columns,
                Err(e) => {
                    self.state = OperatorState::Error;
                    return Err(e);
                }
            };
            self.data_loaded = true;
        }

        let total_rows = self.table_data.first().map(|c| c.row_count).unwrap_or(0);
        if self.current_offset >= total_rows {
            self.state = OperatorState::Finished;
            return Ok(());
        }

        let batch = BATCH_SIZE.min(total_rows - self.current_offset);
        self.fill_chunk(self.current_offset, batch, chunk)?;
        self.current_offset += batch;

        debug!(
            "query#{}: scan of {} produced {} rows",
            context.query_id, self.table_name, batch
        );
        Ok(())
    }

    /// Rewinds to the first batch. Keeps the in-memory copy; a reset scan
    /// does not re-read the table.
    pub fn reset(&mut self) -> DbResult<()> {
        self.current_offset = 0;
        self.state = OperatorState::Ready;
        Ok(())
    }

    pub fn output_columns(&self) -> Vec<String> {
        self.output_columns.clone()
    }

    pub fn output_types(&self) -> Vec<DataType> {
        let schema = self.table.schema();
        let scanned: &[String] = if self.columns.is_empty() {
            &schema.column_names
        } else {
            &self.columns
        };
        scanned
            .iter()
            .filter_map(|c| schema.get_column_type(c))
            .collect()
    }

    pub fn state(&self) -> OperatorState {
        self.state
    }

    fn fill_chunk(&self, offset: usize, count: usize, chunk: &mut DataChunk) -> DbResult<()> {
        for (source, name) in self.table_data.iter().zip(&self.output_columns) {
            let mut column = ColumnVector::new(name.clone(), source.data_type);
            match source.data_type.fixed_size() {
                Some(size) => {
                    let start = offset * size;
                    let end = start + count * size;
                    column.data.extend_from_slice(&source.data[start..end]);
                    column.row_count = count;
                }
                None => {
                    for row in offset..offset + count {
                        column.append_string(&source.get_string(row))?;
                    }
                }
            }
            chunk.add_column(column);
        }
        chunk.row_count = count;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Row, TableSchema};
    use tempfile::tempdir;

    fn table_with_rows(dir: &std::path::Path, rows: usize) -> Arc<Table> {
        let mut schema = TableSchema::new("T");
        schema.add_column("N", DataType::Int);
        schema.add_column("S", DataType::String);
        let table = Table::new("T", schema, dir);
        let data: Vec<Row> = (0..rows)
            .map(|i| Row::new(vec![i.to_string(), format!("row{}", i)]))
            .collect();
        table.insert_rows(&data).expect("insert");
        Arc::new(table)
    }

    fn drain(scan: &mut ScanOperator, ctx: &ExecutionContext) -> Vec<DataChunk> {
        let mut chunks = Vec::new();
        loop {
            let mut chunk = DataChunk::default();
            scan.next(ctx, &mut chunk).expect("next");
            if chunk.is_empty() {
                break;
            }
            chunks.push(chunk);
        }
        chunks
    }

    #[test]
    fn emits_qualified_column_names() {
        let dir = tempdir().expect("tempdir");
        let table = table_with_rows(dir.path(), 3);
        let ctx = ExecutionContext { query_id: 1 };

        let mut scan = ScanOperator::new("T", vec![], table);
        scan.initialize(&ctx).expect("initialize");
        assert_eq!(scan.output_columns(), vec!["T.N", "T.S"]);
        assert_eq!(
            scan.output_types(),
            vec![DataType::Int, DataType::String]
        );
    }

    #[test]
    fn batches_rows_at_batch_size() {
        let dir = tempdir().expect("tempdir");
        let table = table_with_rows(dir.path(), BATCH_SIZE + 100);
        let ctx = ExecutionContext { query_id: 1 };

        let mut scan = ScanOperator::new("T", vec![], table);
        scan.initialize(&ctx).expect("initialize");
        let chunks = drain(&mut scan, &ctx);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].row_count, BATCH_SIZE);
        assert_eq!(chunks[1].row_count, 100);
        assert_eq!(scan.state(), OperatorState::Finished);

        // Values survive the slicing.
        assert_eq!(chunks[0].columns[0].get_int(0), 0);
        assert_eq!(chunks[1].columns[0].get_int(0), BATCH_SIZE as i32);
        assert_eq!(chunks[1].columns[1].get_string(0), format!("row{}", BATCH_SIZE));
    }

    #[test]
    fn reset_replays_the_same_stream() {
        let dir = tempdir().expect("tempdir");
        let table = table_with_rows(dir.path(), 10);
        let ctx = ExecutionContext { query_id: 1 };

        let mut scan = ScanOperator::new("T", vec![], table);
        scan.initialize(&ctx).expect("initialize");
        let first: Vec<i32> = drain(&mut scan, &ctx)
            .iter()
            .flat_map(|c| (0..c.row_count).map(|i| c.columns[0].get_int(i)).collect::<Vec<_>>())
            .collect();

        scan.reset().expect("reset");
        let second: Vec<i32> = drain(&mut scan, &ctx)
            .iter()
            .flat_map(|c| (0..c.row_count).map(|i| c.columns[0].get_int(i)).collect::<Vec<_>>())
            .collect();

        assert_eq!(first, second);

        // Reset is idempotent.
        scan.reset().expect("reset");
        scan.reset().expect("reset again");
        let third: Vec<i32> = drain(&mut scan, &ctx)
            .iter()
            .flat_map(|c| (0..c.row_count).map(|i| c.columns[0].get_int(i)).collect::<Vec<_>>())
            .collect();
        assert_eq!(first, third);
    }

    #[test]
    fn scan_of_missing_column_fails_initialize() {
        let dir = tempdir().expect("tempdir");
        let table = table_with_rows(dir.path(), 1);
        let ctx = ExecutionContext { query_id: 1 };

        let mut scan = ScanOperator::new("T", vec!["ABSENT".to_string()], table);
        let err = scan.initialize(&ctx).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn scan_of_never_written_table_is_empty() {
        let dir = tempdir().expect("tempdir");
        let mut schema = TableSchema::new("E");
        schema.add_column("X", DataType::Int);
        let table = Arc::new(Table::new("E", schema, dir.path()));
        let ctx = ExecutionContext { query_id: 1 };

        let mut scan = ScanOperator::new("E", vec![], table);
        scan.initialize(&ctx).expect("initialize");
        let chunks = drain(&mut scan, &ctx);
        assert!(chunks.is_empty());
        assert_eq!(scan.state(), OperatorState::Finished);
    }
}
