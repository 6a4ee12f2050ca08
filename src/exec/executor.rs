//! Plan execution.
//!
//! DDL goes straight to the catalog; INSERT and DELETE work through the
//! table layer; SELECT drives its operator tree to completion and returns
//! the accumulated text block. Each execution gets a fresh query id that
//! tags every log line it produces.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{error, info};

use crate::error::{DbError, DbResult};
use crate::exec::eval::ExpressionEvaluator;
use crate::exec::operators::{ExecutionContext, Operator};
use crate::exec::plan::Plan;
use crate::sql::statement::Expression;
use crate::storage::catalog::Catalog;
use crate::storage::table::TableManager;
use crate::types::{DataChunk, Row, TableSchema};

/// Result of a successfully executed plan.
#[derive(Debug, Clone, Default)]
pub struct QueryOutput {
    /// Printable result block; empty for statements with no result set.
    pub text: String,
    pub rows_affected: u64,
}

impl QueryOutput {
    fn status(text: &str, rows_affected: u64) -> Self {
        Self {
            text: text.to_string(),
            rows_affected,
        }
    }
}

pub struct QueryExecutor {
    catalog: Arc<Catalog>,
    table_manager: Arc<TableManager>,
    next_query_id: AtomicU64,
}

impl QueryExecutor {
    pub fn new(catalog: Arc<Catalog>, table_manager: Arc<TableManager>) -> Self {
        Self {
            catalog,
            table_manager,
            next_query_id: AtomicU64::new(1),
        }
    }

    pub fn execute(&self, plan: Plan) -> DbResult<QueryOutput> {
        let query_id = self.next_query_id.fetch_add(1, Ordering::Relaxed);
        info!("query#{}: executing {}", query_id, plan.kind());

        let result = match plan {
            Plan::CreateTable {
                table_name,
                schema,
                if_not_exists,
            } => self.execute_create_table(&table_name, schema, if_not_exists),
            Plan::DropTable {
                table_name,
                if_exists,
            } => self.execute_drop_table(&table_name, if_exists),
            Plan::Insert {
                table_name,
                column_indices,
                rows,
            } => self.execute_insert(&table_name, &column_indices, &rows),
            Plan::Select { root } => self.execute_select(query_id, root),
            Plan::Delete {
                table_name,
                where_clause,
            } => self.execute_delete(&table_name, where_clause.as_ref()),
        };

        match &result {
            Ok(output) => info!(
                "query#{}: finished ({} rows affected)",
                query_id, output.rows_affected
            ),
            Err(e) => error!("query#{}: failed: {}", query_id, e),
        }
        result
    }

    fn execute_create_table(
        &self,
        table_name: &str,
        schema: TableSchema,
        if_not_exists: bool,
    ) -> DbResult<QueryOutput> {
        self.catalog.create_table(table_name, schema, if_not_exists)?;
        Ok(QueryOutput::status("Table created successfully", 0))
    }

    fn execute_drop_table(&self, table_name: &str, if_exists: bool) -> DbResult<QueryOutput> {
        self.catalog.drop_table(table_name, if_exists)?;
        self.table_manager.close_table(table_name)?;
        Ok(QueryOutput::status("Table dropped successfully", 0))
    }

    fn execute_insert(
        &self,
        table_name: &str,
        column_indices: &[usize],
        rows: &[Vec<Expression>],
    ) -> DbResult<QueryOutput> {
        let table = self.table_manager.open_table(table_name)?;
        let schema = table.schema().clone();

        let mut converted = Vec::with_capacity(rows.len());
        for values in rows {
            converted.push(build_row(&schema, column_indices, values)?);
        }

        table.insert_rows(&converted)?;

        let row_count = table.row_count()?;
        self.catalog.update_row_count(table_name, row_count)?;

        Ok(QueryOutput::status(
            "Rows inserted successfully",
            converted.len() as u64,
        ))
    }

    fn execute_select(&self, query_id: u64, mut root: Box<Operator>) -> DbResult<QueryOutput> {
        let context = ExecutionContext { query_id };
        root.initialize(&context)?;

        let mut chunk = DataChunk::default();
        root.next(&context, &mut chunk)?;

        let Operator::FinalResult(final_op) = root.as_ref() else {
            return Err(DbError::Internal(
                "SELECT plan is not rooted at a final-result operator".to_string(),
            ));
        };
        Ok(QueryOutput {
            text: final_op.result_text().to_string(),
            rows_affected: 0,
        })
    }

    fn execute_delete(
        &self,
        table_name: &str,
        where_clause: Option<&Expression>,
    ) -> DbResult<QueryOutput> {
        let table = self.table_manager.open_table(table_name)?;
        let columns = table.scan_all()?;
        let total_rows = columns.first().map(|c| c.row_count).unwrap_or(0);

        let rows_to_delete: Vec<usize> = match where_clause {
            Some(predicate) => {
                // Qualify the column names the way a scan would, so the
                // compiled predicate resolves against the chunk.
                let mut chunk = DataChunk::default();
                for mut column in columns {
                    column.name = format!("{}.{}", table_name, column.name);
                    chunk.add_column(column);
                }
                chunk.row_count = total_rows;

                let values = ExpressionEvaluator::new(predicate).evaluate(&chunk)?;
                values
                    .iter()
                    .enumerate()
                    .filter(|(_, v)| v.as_bool())
                    .map(|(i, _)| i)
                    .collect()
            }
            None => (0..total_rows).collect(),
        };

        if !rows_to_delete.is_empty() {
            table.delete_rows(&rows_to_delete)?;
            let row_count = table.row_count()?;
            self.catalog.update_row_count(table_name, row_count)?;
        }

        Ok(QueryOutput::status(
            "Rows deleted successfully",
            rows_to_delete.len() as u64,
        ))
    }
}

/// Builds a full-width row: evaluated values land at their target indices,
/// unmentioned columns get their type default.
fn build_row(
    schema: &TableSchema,
    column_indices: &[usize],
    values: &[Expression],
) -> DbResult<Row> {
    let mut row = Row::new(
        schema
            .column_types
            .iter()
            .map(|t| t.default_value().to_string())
            .collect(),
    );

    // Value expressions are constant here; an empty one-row chunk is enough
    // for the evaluator.
    let scratch = DataChunk {
        columns: Vec::new(),
        row_count: 1,
    };
    for (&index, expr) in column_indices.iter().zip(values) {
        let value = ExpressionEvaluator::new(expr).evaluate_row(&scratch, 0)?;
        row.values[index] = value.as_string();
    }
    Ok(row)
}
