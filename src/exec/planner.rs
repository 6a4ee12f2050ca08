//! Plan construction: typed Statement -> physical Plan.
//!
//! DDL and DML statements lower to shallow plan records. SELECT builds a
//! left-deep operator tree: scans feed joins in FROM-clause order, a filter
//! applies the WHERE clause, and a projection narrows to the select list
//! before the final-result operator.
//!
//! Scans under a join always request the full column set of their table,
//! because the join predicate and later projections may reference any
//! column; the projection prunes at the top.

use crate::error::{DbError, DbResult};
use crate::exec::operators::{
    FilterOperator, FinalResultOperator, NestedLoopJoinOperator, Operator, ProjectionOperator,
    ScanOperator,
};
use crate::exec::plan::Plan;
use crate::sql::statement::{SelectStatement, Statement};
use crate::storage::table::TableManager;
use crate::types::JoinType;

pub struct Planner<'a> {
    table_manager: &'a TableManager,
}

impl<'a> Planner<'a> {
    pub fn new(table_manager: &'a TableManager) -> Self {
        Self { table_manager }
    }

    pub fn create_plan(&self, stmt: Statement) -> DbResult<Plan> {
        match stmt {
            Statement::CreateTable(create) => Ok(Plan::CreateTable {
                table_name: create.table_name,
                schema: create.schema,
                if_not_exists: create.if_not_exists,
            }),
            Statement::DropTable(drop) => Ok(Plan::DropTable {
                table_name: drop.table_name,
                if_exists: drop.if_exists,
            }),
            Statement::Insert(insert) => Ok(Plan::Insert {
                table_name: insert.table_name,
                column_indices: insert.column_indices,
                rows: insert.rows,
            }),
            Statement::Select(select) => self.plan_select(select),
            Statement::Delete(delete) => Ok(Plan::Delete {
                table_name: delete.table_name,
                where_clause: delete.where_clause,
            }),
        }
    }

    fn plan_select(&self, select: SelectStatement) -> DbResult<Plan> {
        let root = if select.joins.is_empty() {
            self.build_single_table_tree(select)?
        } else {
            self.build_join_tree(select)?
        };
        Ok(Plan::Select {
            root: Box::new(Operator::FinalResult(FinalResultOperator::new(root))),
        })
    }

    /// `Scan -> [Filter] -> [Projection]` for one table. The scan narrows to
    /// the projected columns unless a WHERE clause may reference others.
    fn build_single_table_tree(&self, select: SelectStatement) -> DbResult<Box<Operator>> {
        let table = self.table_manager.open_table(&select.table_name)?;

        let scan_columns = if select.select_all || select.where_clause.is_some() {
            Vec::new() // all columns
        } else {
            select
                .select_columns
                .iter()
                .map(|qualified| strip_qualifier(qualified).to_string())
                .collect()
        };

        let mut current = Box::new(Operator::Scan(ScanOperator::new(
            select.table_name.clone(),
            scan_columns,
            table,
        )));

        if let Some(where_clause) = select.where_clause {
            current = Box::new(Operator::Filter(FilterOperator::new(where_clause, current)));
        }

        if !select.select_all {
            current = Box::new(Operator::Projection(ProjectionOperator::new(
                select.select_columns,
                current,
            )));
        }

        Ok(current)
    }

    /// Left-deep join tree over full-width scans, then filter and projection.
    fn build_join_tree(&self, select: SelectStatement) -> DbResult<Box<Operator>> {
        for join in &select.joins {
            if join.join_type != JoinType::Inner {
                return Err(DbError::Execution(format!(
                    "{} joins are not supported",
                    join.join_type
                )));
            }
        }

        let from_table = self.table_manager.open_table(&select.table_name)?;
        let mut current = Box::new(Operator::Scan(ScanOperator::new(
            select.table_name.clone(),
            Vec::new(),
            from_table,
        )));

        for join in select.joins {
            let right_table = self.table_manager.open_table(&join.table_name)?;
            let right = Box::new(Operator::Scan(ScanOperator::new(
                join.table_name.clone(),
                Vec::new(),
                right_table,
            )));
            current = Box::new(Operator::NestedLoopJoin(NestedLoopJoinOperator::new(
                current,
                right,
                Some(join.condition),
                join.join_type,
            )));
        }

        if let Some(where_clause) = select.where_clause {
            current = Box::new(Operator::Filter(FilterOperator::new(where_clause, current)));
        }

        if !select.select_all {
            current = Box::new(Operator::Projection(ProjectionOperator::new(
                select.select_columns,
                current,
            )));
        }

        Ok(current)
    }
}

fn strip_qualifier(qualified: &str) -> &str {
    qualified
        .split_once('.')
        .map(|(_, column)| column)
        .unwrap_or(qualified)
}
