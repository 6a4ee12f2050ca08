//! Semantic resolution: AST + catalog -> typed Statement.
//!
//! Resolves every identifier against the catalog: table existence, column
//! indices, ambiguity of unqualified references, and type propagation through
//! expressions. Aliases are replaced by the table names they stand for, so
//! downstream stages only ever see concrete table names.

use log::debug;

use crate::error::{DbError, DbResult};
use crate::sql::ast::{BinaryOp, Expr, FunctionKind, Stmt, TableRef};
use crate::sql::statement::{
    CreateTableStatement, DeleteStatement, DropTableStatement, Expression, InsertStatement,
    JoinInfo, SelectStatement, Statement,
};
use crate::storage::catalog::Catalog;
use crate::types::{DataType, TableSchema};

pub struct Compiler<'a> {
    catalog: &'a Catalog,
}

impl<'a> Compiler<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    pub fn compile(&self, ast: &Stmt) -> DbResult<Statement> {
        match ast {
            Stmt::CreateTable {
                table,
                columns,
                if_not_exists,
            } => {
                let mut schema = TableSchema::new(table.clone());
                for col in columns {
                    schema.add_column(col.name.clone(), col.data_type);
                }
                Ok(Statement::CreateTable(CreateTableStatement {
                    table_name: table.clone(),
                    schema,
                    if_not_exists: *if_not_exists,
                }))
            }
            Stmt::DropTable { table, if_exists } => Ok(Statement::DropTable(DropTableStatement {
                table_name: table.clone(),
                if_exists: *if_exists,
            })),
            Stmt::Insert {
                table,
                columns,
                rows,
            } => self.compile_insert(table, columns, rows),
            Stmt::Select {
                select_list,
                from,
                joins,
                where_clause,
            } => self.compile_select(select_list, from.as_ref(), joins, where_clause.as_ref()),
            Stmt::Delete { from, where_clause } => self.compile_delete(from, where_clause.as_ref()),
        }
    }

    fn compile_insert(
        &self,
        table: &str,
        columns: &[String],
        rows: &[Vec<Expr>],
    ) -> DbResult<Statement> {
        let metadata = self.catalog.get_table_metadata(table)?;
        let schema = metadata.schema;

        // Empty column list means every column in schema order.
        let column_indices: Vec<usize> = if columns.is_empty() {
            (0..schema.column_count()).collect()
        } else {
            columns
                .iter()
                .map(|name| {
                    schema.get_column_index(name).ok_or_else(|| {
                        DbError::NotFound(format!(
                            "Column not found: {} in table {}",
                            name, schema.table_name
                        ))
                    })
                })
                .collect::<DbResult<_>>()?
        };

        let context = ResolutionContext::single(&schema);
        let mut compiled_rows = Vec::with_capacity(rows.len());
        for row in rows {
            if row.len() != column_indices.len() {
                return Err(DbError::InvalidArgument("Column count mismatch".to_string()));
            }
            let values = row
                .iter()
                .map(|expr| self.compile_expression(expr, &context))
                .collect::<DbResult<Vec<_>>>()?;
            compiled_rows.push(values);
        }

        Ok(Statement::Insert(InsertStatement {
            table_name: schema.table_name.clone(),
            column_indices,
            rows: compiled_rows,
        }))
    }

    fn compile_select(
        &self,
        select_list: &[Expr],
        from: Option<&TableRef>,
        joins: &[crate::sql::ast::JoinClause],
        where_clause: Option<&Expr>,
    ) -> DbResult<Statement> {
        let from = from.ok_or_else(|| {
            DbError::InvalidArgument("SELECT requires a FROM clause".to_string())
        })?;
        let metadata = self.catalog.get_table_metadata(&from.table)?;
        let from_schema = metadata.schema;
        let from_alias = from.effective_alias().to_string();

        // Accumulate (schema, alias) pairs left to right; each ON condition
        // sees the tables joined so far plus its own.
        let mut context = ResolutionContext {
            schemas: vec![from_schema.clone()],
            aliases: vec![from_alias.clone()],
        };

        let mut join_infos = Vec::with_capacity(joins.len());
        for clause in joins {
            let joined = self.catalog.get_table_metadata(&clause.table.table)?;
            let joined_schema = joined.schema;
            let alias = clause.table.effective_alias().to_string();
            context.schemas.push(joined_schema.clone());
            context.aliases.push(alias.clone());

            let condition = self.compile_expression(&clause.condition, &context)?;
            join_infos.push(JoinInfo {
                table_name: joined_schema.table_name.clone(),
                alias,
                join_type: clause.join_type,
                condition,
                joined_columns: joined_schema.column_names.clone(),
                joined_types: joined_schema.column_types.clone(),
            });
        }

        let select_all = matches!(
            select_list,
            [Expr::ColumnRef { table: None, column }] if column == "*"
        );

        let mut select_columns = Vec::new();
        let mut select_column_indices = Vec::new();
        if select_all {
            // Flatten every schema's columns in declaration order. Over a
            // join the indices are placeholders; execution binds by name.
            for schema in &context.schemas {
                for (index, column) in schema.column_names.iter().enumerate() {
                    select_columns.push(format!("{}.{}", schema.table_name, column));
                    select_column_indices.push(if context.schemas.len() == 1 {
                        index
                    } else {
                        0
                    });
                }
            }
        } else {
            for expr in select_list {
                let Expr::ColumnRef { table, column } = expr else {
                    return Err(DbError::InvalidArgument(
                        "Only column references are supported in the select list".to_string(),
                    ));
                };
                let resolved = context.resolve_column(table.as_deref(), column)?;
                select_columns.push(format!("{}.{}", resolved.table_name, resolved.column));
                select_column_indices.push(resolved.column_index);
            }
        }

        let where_clause = where_clause
            .map(|expr| self.compile_expression(expr, &context))
            .transpose()?;

        debug!(
            "compiled SELECT over {} ({} joins, {} projections)",
            from_schema.table_name,
            join_infos.len(),
            select_columns.len()
        );

        Ok(Statement::Select(SelectStatement {
            table_name: from_schema.table_name.clone(),
            alias: from_alias,
            joins: join_infos,
            select_all,
            select_columns,
            select_column_indices,
            where_clause,
        }))
    }

    fn compile_delete(&self, from: &TableRef, where_clause: Option<&Expr>) -> DbResult<Statement> {
        let metadata = self.catalog.get_table_metadata(&from.table)?;
        let schema = metadata.schema;

        let context = ResolutionContext {
            schemas: vec![schema.clone()],
            aliases: vec![from.effective_alias().to_string()],
        };
        let where_clause = where_clause
            .map(|expr| self.compile_expression(expr, &context))
            .transpose()?;

        Ok(Statement::Delete(DeleteStatement {
            table_name: schema.table_name.clone(),
            where_clause,
        }))
    }

    fn compile_expression(&self, expr: &Expr, context: &ResolutionContext) -> DbResult<Expression> {
        match expr {
            Expr::Literal { value, data_type } => Ok(Expression::Literal {
                value: value.clone(),
                data_type: *data_type,
            }),
            Expr::ColumnRef { table, column } => {
                let resolved = context.resolve_column(table.as_deref(), column)?;
                Ok(Expression::ColumnRef {
                    table: resolved.table_name,
                    column: resolved.column,
                    column_index: resolved.column_index,
                    data_type: resolved.data_type,
                })
            }
            Expr::Binary { op, left, right } => {
                let left = self.compile_expression(left, context)?;
                let right = self.compile_expression(right, context)?;
                let data_type = infer_binary_result_type(left.data_type(), right.data_type(), *op);
                Ok(Expression::Binary {
                    op: *op,
                    data_type,
                    left: Box::new(left),
                    right: Box::new(right),
                })
            }
            Expr::Function { func, args } => {
                let args = args
                    .iter()
                    .map(|arg| self.compile_expression(arg, context))
                    .collect::<DbResult<Vec<_>>>()?;
                Ok(Expression::Function {
                    func: *func,
                    data_type: infer_function_result_type(*func),
                    args,
                })
            }
        }
    }
}

/// Tables visible to an expression, in join order.
struct ResolutionContext {
    schemas: Vec<TableSchema>,
    aliases: Vec<String>,
}

struct ResolvedColumn {
    table_name: String,
    column: String,
    column_index: usize,
    data_type: DataType,
}

impl ResolutionContext {
    fn single(schema: &TableSchema) -> Self {
        Self {
            schemas: vec![schema.clone()],
            aliases: vec![schema.table_name.clone()],
        }
    }

    /// Qualified references must name a visible alias or table; unqualified
    /// ones must match exactly one schema.
    fn resolve_column(&self, qualifier: Option<&str>, column: &str) -> DbResult<ResolvedColumn> {
        if let Some(qualifier) = qualifier {
            let slot = self.schemas.iter().zip(&self.aliases).find(|(schema, alias)| {
                alias.eq_ignore_ascii_case(qualifier)
                    || schema.table_name.eq_ignore_ascii_case(qualifier)
            });
            let Some((schema, _)) = slot else {
                return Err(DbError::NotFound(format!("Table not found: {}", qualifier)));
            };
            let Some(column_index) = schema.get_column_index(column) else {
                return Err(DbError::NotFound(format!(
                    "Column not found: {} in table {}",
                    column, schema.table_name
                )));
            };
            return Ok(ResolvedColumn {
                table_name: schema.table_name.clone(),
                column: schema.column_names[column_index].clone(),
                column_index,
                data_type: schema.column_types[column_index],
            });
        }

        let mut found: Option<ResolvedColumn> = None;
        for schema in &self.schemas {
            if let Some(column_index) = schema.get_column_index(column) {
                if found.is_some() {
                    return Err(DbError::InvalidArgument(format!(
                        "Ambiguous column reference: {}",
                        column
                    )));
                }
                found = Some(ResolvedColumn {
                    table_name: schema.table_name.clone(),
                    column: schema.column_names[column_index].clone(),
                    column_index,
                    data_type: schema.column_types[column_index],
                });
            }
        }
        found.ok_or_else(|| DbError::NotFound(format!("Column not found: {}", column)))
    }
}

fn infer_binary_result_type(left: DataType, right: DataType, op: BinaryOp) -> DataType {
    match op {
        BinaryOp::Add | BinaryOp::Subtract | BinaryOp::Multiply | BinaryOp::Divide => {
            if left == DataType::Decimal || right == DataType::Decimal {
                DataType::Decimal
            } else {
                DataType::Int
            }
        }
        BinaryOp::Equal
        | BinaryOp::NotEqual
        | BinaryOp::LessThan
        | BinaryOp::LessEqual
        | BinaryOp::GreaterThan
        | BinaryOp::GreaterEqual
        | BinaryOp::And
        | BinaryOp::Or => DataType::Bool,
    }
}

fn infer_function_result_type(func: FunctionKind) -> DataType {
    match func {
        FunctionKind::Sin | FunctionKind::Cos => DataType::Decimal,
        FunctionKind::Substr => DataType::String,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::parser::SqlParser;
    use crate::storage::catalog::Catalog;
    use tempfile::tempdir;

    fn catalog_with_tables() -> (tempfile::TempDir, Catalog) {
        let dir = tempdir().expect("tempdir");
        let catalog = Catalog::new(dir.path());
        catalog.initialize().expect("initialize");

        let mut t1 = TableSchema::new("T1");
        t1.add_column("C1", DataType::Int);
        t1.add_column("NAME", DataType::String);
        catalog.create_table("T1", t1, false).expect("create T1");

        let mut t2 = TableSchema::new("T2");
        t2.add_column("C2", DataType::Int);
        t2.add_column("SCORE", DataType::Decimal);
        catalog.create_table("T2", t2, false).expect("create T2");

        (dir, catalog)
    }

    fn compile(catalog: &Catalog, sql: &str) -> DbResult<Statement> {
        let ast = SqlParser::new(sql)?.parse()?;
        Compiler::new(catalog).compile(&ast)
    }

    #[test]
    fn select_star_expands_schema_columns() {
        let (_dir, catalog) = catalog_with_tables();
        let Statement::Select(select) = compile(&catalog, "SELECT * FROM t1").unwrap() else {
            panic!("expected select");
        };
        assert!(select.select_all);
        assert_eq!(select.select_columns, vec!["T1.C1", "T1.NAME"]);
        assert_eq!(select.select_column_indices, vec![0, 1]);
    }

    #[test]
    fn named_columns_resolve_to_indices() {
        let (_dir, catalog) = catalog_with_tables();
        let Statement::Select(select) = compile(&catalog, "SELECT name, c1 FROM t1").unwrap()
        else {
            panic!("expected select");
        };
        assert!(!select.select_all);
        assert_eq!(select.select_columns, vec!["T1.NAME", "T1.C1"]);
        assert_eq!(select.select_column_indices, vec![1, 0]);
    }

    #[test]
    fn missing_table_is_not_found() {
        let (_dir, catalog) = catalog_with_tables();
        let err = compile(&catalog, "SELECT * FROM nope").unwrap_err();
        assert!(err.is_not_found(), "got {:?}", err);
    }

    #[test]
    fn missing_column_names_table() {
        let (_dir, catalog) = catalog_with_tables();
        let err = compile(&catalog, "SELECT missing FROM t1").unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("MISSING"), "got: {}", err);
    }

    #[test]
    fn select_without_from_rejected() {
        let (_dir, catalog) = catalog_with_tables();
        let err = compile(&catalog, "SELECT 1").unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn insert_records_explicit_column_indices() {
        let (_dir, catalog) = catalog_with_tables();
        let Statement::Insert(insert) =
            compile(&catalog, "INSERT INTO t1(name, c1) VALUES ('x', 1)").unwrap()
        else {
            panic!("expected insert");
        };
        assert_eq!(insert.column_indices, vec![1, 0]);
        assert_eq!(insert.rows.len(), 1);
    }

    #[test]
    fn insert_defaults_to_all_columns() {
        let (_dir, catalog) = catalog_with_tables();
        let Statement::Insert(insert) =
            compile(&catalog, "INSERT INTO t1 VALUES (1, 'a'), (2, 'b')").unwrap()
        else {
            panic!("expected insert");
        };
        assert_eq!(insert.column_indices, vec![0, 1]);
        assert_eq!(insert.rows.len(), 2);
    }

    #[test]
    fn insert_arity_mismatch_rejected() {
        let (_dir, catalog) = catalog_with_tables();
        let err = compile(&catalog, "INSERT INTO t1(c1) VALUES (1, 'extra')").unwrap_err();
        assert!(err.is_invalid_argument());
        assert!(err.to_string().contains("Column count mismatch"));
    }

    #[test]
    fn join_condition_resolves_both_sides() {
        let (_dir, catalog) = catalog_with_tables();
        let Statement::Select(select) =
            compile(&catalog, "SELECT * FROM t1 JOIN t2 ON t1.c1 = t2.c2").unwrap()
        else {
            panic!("expected select");
        };
        assert_eq!(select.joins.len(), 1);
        let join = &select.joins[0];
        assert_eq!(join.table_name, "T2");
        assert_eq!(join.joined_columns, vec!["C2", "SCORE"]);
        let Expression::Binary { left, right, .. } = &join.condition else {
            panic!("expected binary condition");
        };
        assert!(matches!(
            &**left,
            Expression::ColumnRef { table, column_index: 0, .. } if table == "T1"
        ));
        assert!(matches!(
            &**right,
            Expression::ColumnRef { table, column_index: 0, .. } if table == "T2"
        ));
    }

    #[test]
    fn aliases_resolve_to_table_names() {
        let (_dir, catalog) = catalog_with_tables();
        let Statement::Select(select) =
            compile(&catalog, "SELECT a.c1 FROM t1 AS a JOIN t2 b ON a.c1 = b.c2").unwrap()
        else {
            panic!("expected select");
        };
        // The alias disappears after resolution.
        assert_eq!(select.select_columns, vec!["T1.C1"]);
        assert_eq!(select.alias, "A");
        assert_eq!(select.joins[0].alias, "B");
    }

    #[test]
    fn unqualified_unique_column_resolves_across_tables() {
        let (_dir, catalog) = catalog_with_tables();
        let Statement::Select(select) =
            compile(&catalog, "SELECT score FROM t1 JOIN t2 ON c1 = c2").unwrap()
        else {
            panic!("expected select");
        };
        assert_eq!(select.select_columns, vec!["T2.SCORE"]);
    }

    #[test]
    fn ambiguous_unqualified_column_rejected() {
        let (_dir, catalog) = catalog_with_tables();
        // Both T1 and T3 have a NAME column.
        let mut t3 = TableSchema::new("T3");
        t3.add_column("NAME", DataType::String);
        catalog.create_table("T3", t3, false).expect("create T3");

        let err = compile(&catalog, "SELECT name FROM t1 JOIN t3 ON t1.c1 = t1.c1").unwrap_err();
        assert!(err.is_invalid_argument());
        assert!(err.to_string().contains("Ambiguous"), "got: {}", err);
    }

    #[test]
    fn select_star_over_join_flattens_with_placeholders() {
        let (_dir, catalog) = catalog_with_tables();
        let Statement::Select(select) =
            compile(&catalog, "SELECT * FROM t1 JOIN t2 ON t1.c1 = t2.c2").unwrap()
        else {
            panic!("expected select");
        };
        assert!(select.select_all);
        assert_eq!(
            select.select_columns,
            vec!["T1.C1", "T1.NAME", "T2.C2", "T2.SCORE"]
        );
        assert_eq!(select.select_column_indices, vec![0, 0, 0, 0]);
    }

    #[test]
    fn where_type_propagates() {
        let (_dir, catalog) = catalog_with_tables();
        let Statement::Select(select) =
            compile(&catalog, "SELECT c1 FROM t1 WHERE c1 + 1 > 2").unwrap()
        else {
            panic!("expected select");
        };
        let where_clause = select.where_clause.unwrap();
        assert_eq!(where_clause.data_type(), DataType::Bool);
        let Expression::Binary { left, .. } = &where_clause else {
            panic!();
        };
        assert_eq!(left.data_type(), DataType::Int);
    }

    #[test]
    fn arithmetic_widens_to_decimal() {
        let (_dir, catalog) = catalog_with_tables();
        let Statement::Select(select) =
            compile(&catalog, "SELECT c2 FROM t2 WHERE c2 + score > 0").unwrap()
        else {
            panic!("expected select");
        };
        let Some(Expression::Binary { left, .. }) = select.where_clause else {
            panic!();
        };
        assert_eq!(left.data_type(), DataType::Decimal);
    }

    #[test]
    fn delete_compiles_where_against_table() {
        let (_dir, catalog) = catalog_with_tables();
        let Statement::Delete(delete) =
            compile(&catalog, "DELETE FROM t1 WHERE c1 > 5").unwrap()
        else {
            panic!("expected delete");
        };
        assert_eq!(delete.table_name, "T1");
        assert!(delete.where_clause.is_some());
    }

    #[test]
    fn create_table_copies_column_definitions() {
        let (_dir, catalog) = catalog_with_tables();
        let Statement::CreateTable(create) =
            compile(&catalog, "CREATE TABLE t9 (a INT, b STRING)").unwrap()
        else {
            panic!("expected create");
        };
        assert_eq!(create.table_name, "T9");
        assert_eq!(create.schema.column_names, vec!["A", "B"]);
        assert_eq!(
            create.schema.column_types,
            vec![DataType::Int, DataType::String]
        );
    }
}
