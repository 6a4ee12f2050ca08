//! Physical plans.
//!
//! One variant per statement type. DDL and DML plans are shallow records the
//! executor dispatches directly; the SELECT plan owns the operator tree,
//! rooted at a final-result operator, which the executor consumes.

use crate::exec::operators::Operator;
use crate::sql::statement::Expression;
use crate::types::TableSchema;

#[derive(Debug)]
pub enum Plan {
    CreateTable {
        table_name: String,
        schema: TableSchema,
        if_not_exists: bool,
    },
    DropTable {
        table_name: String,
        if_exists: bool,
    },
    Insert {
        table_name: String,
        column_indices: Vec<usize>,
        rows: Vec<Vec<Expression>>,
    },
    Select {
        root: Box<Operator>,
    },
    Delete {
        table_name: String,
        where_clause: Option<Expression>,
    },
}

impl Plan {
    pub fn kind(&self) -> &'static str {
        match self {
            Plan::CreateTable { .. } => "CREATE TABLE",
            Plan::DropTable { .. } => "DROP TABLE",
            Plan::Insert { .. } => "INSERT",
            Plan::Select { .. } => "SELECT",
            Plan::Delete { .. } => "DELETE",
        }
    }
}
