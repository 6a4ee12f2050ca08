//! Typed, semantically resolved statements.
//!
//! Produced by the compiler. Every column reference carries the table it
//! resolved to, its index within that table's schema, and its type. The
//! statement fully owns its expression trees; cloning an expression yields a
//! structurally equal, independent copy.

use crate::sql::ast::{BinaryOp, FunctionKind};
use crate::types::{DataType, JoinType, TableSchema};

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal {
        value: String,
        data_type: DataType,
    },
    ColumnRef {
        /// Resolved table name (aliases have been replaced).
        table: String,
        column: String,
        column_index: usize,
        data_type: DataType,
    },
    Binary {
        op: BinaryOp,
        data_type: DataType,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Function {
        func: FunctionKind,
        data_type: DataType,
        args: Vec<Expression>,
    },
}

impl Expression {
    /// Inferred result type. Not enforced between operands; the evaluator
    /// widens numerics as needed.
    pub fn data_type(&self) -> DataType {
        match self {
            Expression::Literal { data_type, .. }
            | Expression::ColumnRef { data_type, .. }
            | Expression::Binary { data_type, .. }
            | Expression::Function { data_type, .. } => *data_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateTableStatement {
    pub table_name: String,
    pub schema: TableSchema,
    pub if_not_exists: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DropTableStatement {
    pub table_name: String,
    pub if_exists: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    pub table_name: String,
    /// Target schema index for each value position.
    pub column_indices: Vec<usize>,
    pub rows: Vec<Vec<Expression>>,
}

/// One JOIN clause after resolution, with the joined table's schema captured
/// for downstream planning.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinInfo {
    pub table_name: String,
    pub alias: String,
    pub join_type: JoinType,
    pub condition: Expression,
    pub joined_columns: Vec<String>,
    pub joined_types: Vec<DataType>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    pub table_name: String,
    pub alias: String,
    pub joins: Vec<JoinInfo>,
    /// True when the select list was `*`.
    pub select_all: bool,
    /// Qualified `table.column` projection names in select-list order.
    pub select_columns: Vec<String>,
    /// Schema index of each projected column within its own table. For `*`
    /// over a join these are placeholders; execution binds by name.
    pub select_column_indices: Vec<usize>,
    pub where_clause: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStatement {
    pub table_name: String,
    pub where_clause: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    CreateTable(CreateTableStatement),
    DropTable(DropTableStatement),
    Insert(InsertStatement),
    Select(SelectStatement),
    Delete(DeleteStatement),
}

impl Statement {
    /// Short form for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Statement::CreateTable(_) => "CREATE TABLE",
            Statement::DropTable(_) => "DROP TABLE",
            Statement::Insert(_) => "INSERT",
            Statement::Select(_) => "SELECT",
            Statement::Delete(_) => "DELETE",
        }
    }
}
