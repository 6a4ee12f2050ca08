//! Recursive-descent SQL parser.
//!
//! One token of lookahead. Errors carry the position of the offending token:
//! `"Parse error at line L, column C: <msg>"`.
//!
//! Precedence, low to high: OR, AND, `= !=`, `< <= > >=`, `+ -`, `* /`,
//! unary. All binary operators are left-associative.

use crate::error::{DbError, DbResult};
use crate::sql::ast::{BinaryOp, ColumnDef, Expr, FunctionKind, JoinClause, Stmt, TableRef};
use crate::sql::tokenizer::{Token, TokenKind, Tokenizer};
use crate::types::{DataType, JoinType};

pub struct SqlParser {
    tokenizer: Tokenizer,
    current: Token,
}

impl SqlParser {
    pub fn new(sql: &str) -> DbResult<Self> {
        let mut tokenizer = Tokenizer::new(sql);
        let current = tokenizer.next_token()?;
        Ok(Self { tokenizer, current })
    }

    pub fn parse(&mut self) -> DbResult<Stmt> {
        let stmt = self.parse_statement()?;
        // A trailing semicolon is allowed but nothing else may follow.
        if self.check(TokenKind::Semicolon) {
            self.advance()?;
        }
        if !self.check(TokenKind::Eof) {
            return Err(self.error("Unexpected input after statement"));
        }
        Ok(stmt)
    }

    fn advance(&mut self) -> DbResult<()> {
        self.current = self.tokenizer.next_token()?;
        Ok(())
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn expect(&mut self, kind: TokenKind, message: &str) -> DbResult<()> {
        if self.check(kind) {
            self.advance()?;
            Ok(())
        } else {
            Err(self.error(message))
        }
    }

    fn error(&self, message: &str) -> DbError {
        DbError::Parse(format!(
            "Parse error at line {}, column {}: {}",
            self.current.line, self.current.column, message
        ))
    }

    fn identifier(&mut self, message: &str) -> DbResult<String> {
        if !self.check(TokenKind::Identifier) {
            return Err(self.error(message));
        }
        let name = self.current.value.clone();
        self.advance()?;
        Ok(name)
    }

    fn parse_statement(&mut self) -> DbResult<Stmt> {
        match self.current.kind {
            TokenKind::Create => self.parse_create_table(),
            TokenKind::Drop => self.parse_drop_table(),
            TokenKind::Insert => self.parse_insert(),
            TokenKind::Select => self.parse_select(),
            TokenKind::Delete => self.parse_delete(),
            _ => Err(self.error("Expected CREATE, DROP, INSERT, SELECT, or DELETE")),
        }
    }

    fn parse_create_table(&mut self) -> DbResult<Stmt> {
        self.expect(TokenKind::Create, "Expected CREATE")?;
        self.expect(TokenKind::Table, "Expected TABLE")?;

        let mut if_not_exists = false;
        if self.check(TokenKind::If) {
            self.advance()?;
            self.expect(TokenKind::Not, "Expected NOT after IF")?;
            self.expect(TokenKind::Exists, "Expected EXISTS after IF NOT")?;
            if_not_exists = true;
        }

        let table = self.identifier("Expected table name")?;
        self.expect(TokenKind::LeftParen, "Expected '('")?;

        let mut columns = Vec::new();
        loop {
            columns.push(self.parse_column_definition()?);
            if self.check(TokenKind::Comma) {
                self.advance()?;
            } else {
                break;
            }
        }
        self.expect(TokenKind::RightParen, "Expected ')'")?;

        Ok(Stmt::CreateTable {
            table,
            columns,
            if_not_exists,
        })
    }

    fn parse_column_definition(&mut self) -> DbResult<ColumnDef> {
        let name = self.identifier("Expected column name")?;
        let data_type = self.parse_data_type()?;
        Ok(ColumnDef { name, data_type })
    }

    fn parse_data_type(&mut self) -> DbResult<DataType> {
        let data_type = match self.current.kind {
            TokenKind::IntType => DataType::Int,
            TokenKind::StringType => DataType::String,
            TokenKind::BoolType => DataType::Bool,
            TokenKind::DecimalType => DataType::Decimal,
            _ => return Err(self.error("Expected data type (INT, STRING, BOOL, DECIMAL)")),
        };
        self.advance()?;
        Ok(data_type)
    }

    fn parse_drop_table(&mut self) -> DbResult<Stmt> {
        self.expect(TokenKind::Drop, "Expected DROP")?;
        self.expect(TokenKind::Table, "Expected TABLE")?;

        let mut if_exists = false;
        if self.check(TokenKind::If) {
            self.advance()?;
            self.expect(TokenKind::Exists, "Expected EXISTS after IF")?;
            if_exists = true;
        }

        let table = self.identifier("Expected table name")?;
        Ok(Stmt::DropTable { table, if_exists })
    }

    fn parse_insert(&mut self) -> DbResult<Stmt> {
        self.expect(TokenKind::Insert, "Expected INSERT")?;
        self.expect(TokenKind::Into, "Expected INTO")?;

        let table = self.identifier("Expected table name")?;

        let mut columns = Vec::new();
        if self.check(TokenKind::LeftParen) {
            self.advance()?;
            loop {
                columns.push(self.identifier("Expected column name")?);
                if self.check(TokenKind::Comma) {
                    self.advance()?;
                } else {
                    break;
                }
            }
            self.expect(TokenKind::RightParen, "Expected ')'")?;
        }

        self.expect(TokenKind::Values, "Expected VALUES")?;

        let mut rows = Vec::new();
        loop {
            self.expect(TokenKind::LeftParen, "Expected '('")?;
            rows.push(self.parse_expression_list()?);
            self.expect(TokenKind::RightParen, "Expected ')'")?;
            if self.check(TokenKind::Comma) {
                self.advance()?;
            } else {
                break;
            }
        }

        Ok(Stmt::Insert {
            table,
            columns,
            rows,
        })
    }

    fn parse_select(&mut self) -> DbResult<Stmt> {
        self.expect(TokenKind::Select, "Expected SELECT")?;

        let mut select_list = Vec::new();
        if self.check(TokenKind::Star) {
            self.advance()?;
            select_list.push(Expr::ColumnRef {
                table: None,
                column: "*".to_string(),
            });
        } else {
            select_list = self.parse_expression_list()?;
        }

        let mut from = None;
        if self.check(TokenKind::From) {
            self.advance()?;
            from = Some(self.parse_table_reference()?);
        }

        let mut joins = Vec::new();
        while matches!(
            self.current.kind,
            TokenKind::Join
                | TokenKind::Inner
                | TokenKind::Left
                | TokenKind::Right
                | TokenKind::Full
        ) {
            joins.push(self.parse_join_clause()?);
        }

        let mut where_clause = None;
        if self.check(TokenKind::Where) {
            self.advance()?;
            where_clause = Some(self.parse_expression()?);
        }

        Ok(Stmt::Select {
            select_list,
            from,
            joins,
            where_clause,
        })
    }

    fn parse_delete(&mut self) -> DbResult<Stmt> {
        self.expect(TokenKind::Delete, "Expected DELETE")?;
        self.expect(TokenKind::From, "Expected FROM")?;

        let from = self.parse_table_reference()?;

        let mut where_clause = None;
        if self.check(TokenKind::Where) {
            self.advance()?;
            where_clause = Some(self.parse_expression()?);
        }

        Ok(Stmt::Delete { from, where_clause })
    }

    /// `table_ref := ident [[AS] ident]` — implicit alias allowed.
    fn parse_table_reference(&mut self) -> DbResult<TableRef> {
        let table = self.identifier("Expected table name")?;
        let mut alias = None;
        if self.check(TokenKind::As) {
            self.advance()?;
            alias = Some(self.identifier("Expected alias after AS")?);
        } else if self.check(TokenKind::Identifier) {
            alias = Some(self.current.value.clone());
            self.advance()?;
        }
        Ok(TableRef { table, alias })
    }

    fn parse_join_type(&mut self) -> DbResult<JoinType> {
        let join_type = match self.current.kind {
            TokenKind::Join => {
                return Ok(JoinType::Inner);
            }
            TokenKind::Inner => JoinType::Inner,
            TokenKind::Left => JoinType::LeftOuter,
            TokenKind::Right => JoinType::RightOuter,
            TokenKind::Full => JoinType::FullOuter,
            _ => return Err(self.error("Expected JOIN clause")),
        };
        self.advance()?;
        if join_type != JoinType::Inner && self.check(TokenKind::Outer) {
            self.advance()?;
        }
        Ok(join_type)
    }

    fn parse_join_clause(&mut self) -> DbResult<JoinClause> {
        let join_type = self.parse_join_type()?;
        self.expect(TokenKind::Join, "Expected JOIN")?;
        let table = self.parse_table_reference()?;
        self.expect(TokenKind::On, "Expected ON")?;
        let condition = self.parse_expression()?;
        Ok(JoinClause {
            join_type,
            table,
            condition,
        })
    }

    fn parse_expression_list(&mut self) -> DbResult<Vec<Expr>> {
        let mut exprs = vec![self.parse_expression()?];
        while self.check(TokenKind::Comma) {
            self.advance()?;
            exprs.push(self.parse_expression()?);
        }
        Ok(exprs)
    }

    pub fn parse_expression(&mut self) -> DbResult<Expr> {
        self.parse_or_expression()
    }

    fn parse_or_expression(&mut self) -> DbResult<Expr> {
        let mut left = self.parse_and_expression()?;
        while self.check(TokenKind::Or) {
            self.advance()?;
            let right = self.parse_and_expression()?;
            left = binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_and_expression(&mut self) -> DbResult<Expr> {
        let mut left = self.parse_equality_expression()?;
        while self.check(TokenKind::And) {
            self.advance()?;
            let right = self.parse_equality_expression()?;
            left = binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_equality_expression(&mut self) -> DbResult<Expr> {
        let mut left = self.parse_relational_expression()?;
        loop {
            let op = match self.current.kind {
                TokenKind::Equal => BinaryOp::Equal,
                TokenKind::NotEqual => BinaryOp::NotEqual,
                _ => break,
            };
            self.advance()?;
            let right = self.parse_relational_expression()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_relational_expression(&mut self) -> DbResult<Expr> {
        let mut left = self.parse_additive_expression()?;
        loop {
            let op = match self.current.kind {
                TokenKind::LessThan => BinaryOp::LessThan,
                TokenKind::LessEqual => BinaryOp::LessEqual,
                TokenKind::GreaterThan => BinaryOp::GreaterThan,
                TokenKind::GreaterEqual => BinaryOp::GreaterEqual,
                _ => break,
            };
            self.advance()?;
            let right = self.parse_additive_expression()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_additive_expression(&mut self) -> DbResult<Expr> {
        let mut left = self.parse_multiplicative_expression()?;
        loop {
            let op = match self.current.kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Subtract,
                _ => break,
            };
            self.advance()?;
            let right = self.parse_multiplicative_expression()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_multiplicative_expression(&mut self) -> DbResult<Expr> {
        let mut left = self.parse_primary_expression()?;
        loop {
            let op = match self.current.kind {
                TokenKind::Star => BinaryOp::Multiply,
                TokenKind::Slash => BinaryOp::Divide,
                _ => break,
            };
            self.advance()?;
            let right = self.parse_primary_expression()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_primary_expression(&mut self) -> DbResult<Expr> {
        match self.current.kind {
            // Unary minus desugars to 0 - x.
            TokenKind::Minus => {
                self.advance()?;
                let operand = self.parse_primary_expression()?;
                Ok(binary(
                    BinaryOp::Subtract,
                    Expr::Literal {
                        value: "0".to_string(),
                        data_type: DataType::Int,
                    },
                    operand,
                ))
            }
            TokenKind::Integer => {
                let value = self.current.value.clone();
                self.advance()?;
                Ok(Expr::Literal {
                    value,
                    data_type: DataType::Int,
                })
            }
            TokenKind::Decimal => {
                let value = self.current.value.clone();
                self.advance()?;
                Ok(Expr::Literal {
                    value,
                    data_type: DataType::Decimal,
                })
            }
            TokenKind::StringLit => {
                let value = self.current.value.clone();
                self.advance()?;
                Ok(Expr::Literal {
                    value,
                    data_type: DataType::String,
                })
            }
            TokenKind::Boolean => {
                let value = self.current.value.clone();
                self.advance()?;
                Ok(Expr::Literal {
                    value,
                    data_type: DataType::Bool,
                })
            }
            TokenKind::Identifier => {
                let first = self.current.value.clone();
                self.advance()?;
                if self.check(TokenKind::Dot) {
                    self.advance()?;
                    let column = self.identifier("Expected column name after '.'")?;
                    Ok(Expr::ColumnRef {
                        table: Some(first),
                        column,
                    })
                } else {
                    Ok(Expr::ColumnRef {
                        table: None,
                        column: first,
                    })
                }
            }
            TokenKind::Sin | TokenKind::Cos | TokenKind::Substr => self.parse_function_call(),
            TokenKind::LeftParen => {
                self.advance()?;
                let expr = self.parse_expression()?;
                self.expect(TokenKind::RightParen, "Expected ')'")?;
                Ok(expr)
            }
            _ => Err(self.error("Expected expression")),
        }
    }

    fn parse_function_call(&mut self) -> DbResult<Expr> {
        let func = match self.current.kind {
            TokenKind::Sin => FunctionKind::Sin,
            TokenKind::Cos => FunctionKind::Cos,
            TokenKind::Substr => FunctionKind::Substr,
            _ => return Err(self.error("Expected function name")),
        };
        self.advance()?;
        self.expect(TokenKind::LeftParen, "Expected '(' after function name")?;

        let mut args = Vec::new();
        if !self.check(TokenKind::RightParen) {
            args = self.parse_expression_list()?;
        }
        self.expect(TokenKind::RightParen, "Expected ')'")?;

        Ok(Expr::Function { func, args })
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(sql: &str) -> Stmt {
        SqlParser::new(sql)
            .and_then(|mut p| p.parse())
            .unwrap_or_else(|e| panic!("parse '{}': {}", sql, e))
    }

    fn parse_err(sql: &str) -> DbError {
        SqlParser::new(sql)
            .and_then(|mut p| p.parse())
            .expect_err("expected parse failure")
    }

    #[test]
    fn create_table_with_columns() {
        let stmt = parse("CREATE TABLE t1 (id INT, name STRING, score DECIMAL, ok BOOL)");
        match stmt {
            Stmt::CreateTable {
                table,
                columns,
                if_not_exists,
            } => {
                assert_eq!(table, "T1");
                assert!(!if_not_exists);
                assert_eq!(columns.len(), 4);
                assert_eq!(columns[0].name, "ID");
                assert_eq!(columns[0].data_type, DataType::Int);
                assert_eq!(columns[2].data_type, DataType::Decimal);
            }
            other => panic!("expected CreateTable, got {:?}", other),
        }
    }

    #[test]
    fn create_table_if_not_exists() {
        let stmt = parse("CREATE TABLE IF NOT EXISTS t (c INT)");
        assert!(matches!(
            stmt,
            Stmt::CreateTable {
                if_not_exists: true,
                ..
            }
        ));
    }

    #[test]
    fn drop_table_if_exists() {
        let stmt = parse("DROP TABLE IF EXISTS old_data;");
        match stmt {
            Stmt::DropTable { table, if_exists } => {
                assert_eq!(table, "OLD_DATA");
                assert!(if_exists);
            }
            other => panic!("expected DropTable, got {:?}", other),
        }
    }

    #[test]
    fn insert_multiple_tuples() {
        let stmt = parse("INSERT INTO t2 VALUES (1, 'Alice', 95.5), (2, 'Bob', 87.3)");
        match stmt {
            Stmt::Insert {
                table,
                columns,
                rows,
            } => {
                assert_eq!(table, "T2");
                assert!(columns.is_empty());
                assert_eq!(rows.len(), 2);
                assert_eq!(rows[0].len(), 3);
                assert_eq!(
                    rows[0][1],
                    Expr::Literal {
                        value: "Alice".to_string(),
                        data_type: DataType::String,
                    }
                );
            }
            other => panic!("expected Insert, got {:?}", other),
        }
    }

    #[test]
    fn insert_with_column_list() {
        let stmt = parse("INSERT INTO t3(id, name) VALUES (1, 'Alice')");
        match stmt {
            Stmt::Insert { columns, .. } => assert_eq!(columns, vec!["ID", "NAME"]),
            other => panic!("expected Insert, got {:?}", other),
        }
    }

    #[test]
    fn select_star() {
        let stmt = parse("SELECT * FROM t1");
        match stmt {
            Stmt::Select {
                select_list, from, ..
            } => {
                assert_eq!(select_list.len(), 1);
                assert_eq!(
                    select_list[0],
                    Expr::ColumnRef {
                        table: None,
                        column: "*".to_string(),
                    }
                );
                assert_eq!(from.unwrap().table, "T1");
            }
            other => panic!("expected Select, got {:?}", other),
        }
    }

    #[test]
    fn select_with_where_precedence() {
        let stmt = parse("SELECT a FROM t WHERE a + 1 * 2 > 3 AND b = 'x' OR c < 5");
        let Stmt::Select { where_clause, .. } = stmt else {
            panic!("expected Select");
        };
        // ((a + (1 * 2)) > 3 AND b = 'x') OR (c < 5)
        let Expr::Binary { op, left, .. } = where_clause.unwrap() else {
            panic!("expected binary root");
        };
        assert_eq!(op, BinaryOp::Or);
        let Expr::Binary { op: and_op, left: gt, .. } = *left else {
            panic!("expected AND under OR");
        };
        assert_eq!(and_op, BinaryOp::And);
        let Expr::Binary { op: gt_op, left: add, .. } = *gt else {
            panic!("expected > under AND");
        };
        assert_eq!(gt_op, BinaryOp::GreaterThan);
        let Expr::Binary { op: add_op, right: mul, .. } = *add else {
            panic!("expected + under >");
        };
        assert_eq!(add_op, BinaryOp::Add);
        assert!(matches!(
            *mul,
            Expr::Binary {
                op: BinaryOp::Multiply,
                ..
            }
        ));
    }

    #[test]
    fn join_clause_with_qualified_condition() {
        let stmt = parse("SELECT * FROM t1 JOIN t2 ON t1.c1 = t2.c2 + 1");
        let Stmt::Select { joins, .. } = stmt else {
            panic!("expected Select");
        };
        assert_eq!(joins.len(), 1);
        assert_eq!(joins[0].join_type, JoinType::Inner);
        assert_eq!(joins[0].table.table, "T2");
        let Expr::Binary { op, left, .. } = &joins[0].condition else {
            panic!("expected binary condition");
        };
        assert_eq!(*op, BinaryOp::Equal);
        assert_eq!(
            **left,
            Expr::ColumnRef {
                table: Some("T1".to_string()),
                column: "C1".to_string(),
            }
        );
    }

    #[test]
    fn join_type_variants() {
        for (sql, expected) in [
            ("SELECT * FROM a JOIN b ON x = y", JoinType::Inner),
            ("SELECT * FROM a INNER JOIN b ON x = y", JoinType::Inner),
            ("SELECT * FROM a LEFT JOIN b ON x = y", JoinType::LeftOuter),
            (
                "SELECT * FROM a LEFT OUTER JOIN b ON x = y",
                JoinType::LeftOuter,
            ),
            (
                "SELECT * FROM a RIGHT OUTER JOIN b ON x = y",
                JoinType::RightOuter,
            ),
            ("SELECT * FROM a FULL JOIN b ON x = y", JoinType::FullOuter),
        ] {
            let Stmt::Select { joins, .. } = parse(sql) else {
                panic!("expected Select");
            };
            assert_eq!(joins[0].join_type, expected, "for {}", sql);
        }
    }

    #[test]
    fn table_alias_forms() {
        let Stmt::Select { from, .. } = parse("SELECT * FROM t1 AS a") else {
            panic!();
        };
        assert_eq!(from.unwrap().alias.as_deref(), Some("A"));

        let Stmt::Select { from, .. } = parse("SELECT * FROM t1 a") else {
            panic!();
        };
        assert_eq!(from.unwrap().alias.as_deref(), Some("A"));
    }

    #[test]
    fn delete_with_where() {
        let stmt = parse("DELETE FROM data WHERE value > 15");
        match stmt {
            Stmt::Delete { from, where_clause } => {
                assert_eq!(from.table, "DATA");
                assert!(where_clause.is_some());
            }
            other => panic!("expected Delete, got {:?}", other),
        }
    }

    #[test]
    fn function_calls() {
        let Stmt::Select { select_list, .. } =
            parse("SELECT SUBSTR(name, 0, 3) FROM t WHERE SIN(x) > 0")
        else {
            panic!();
        };
        let Expr::Function { func, args } = &select_list[0] else {
            panic!("expected function in select list");
        };
        assert_eq!(*func, FunctionKind::Substr);
        assert_eq!(args.len(), 3);
    }

    #[test]
    fn unary_minus_desugars_to_subtraction() {
        let Stmt::Insert { rows, .. } = parse("INSERT INTO t VALUES (-5)") else {
            panic!();
        };
        let Expr::Binary { op, left, right } = &rows[0][0] else {
            panic!("expected binary expr for negative literal");
        };
        assert_eq!(*op, BinaryOp::Subtract);
        assert_eq!(
            **left,
            Expr::Literal {
                value: "0".to_string(),
                data_type: DataType::Int,
            }
        );
        assert_eq!(
            **right,
            Expr::Literal {
                value: "5".to_string(),
                data_type: DataType::Int,
            }
        );
    }

    #[test]
    fn parenthesized_expression() {
        let Stmt::Select { where_clause, .. } = parse("SELECT a FROM t WHERE (a + 1) * 2 = 4")
        else {
            panic!();
        };
        let Expr::Binary { left, .. } = where_clause.unwrap() else {
            panic!();
        };
        assert!(matches!(
            *left,
            Expr::Binary {
                op: BinaryOp::Multiply,
                ..
            }
        ));
    }

    #[test]
    fn error_carries_position() {
        let err = parse_err("SELECT FROM");
        let msg = err.to_string();
        assert!(msg.contains("line 1"), "got: {}", msg);
        assert!(msg.contains("column"), "got: {}", msg);
    }

    #[test]
    fn garbage_statement_rejected() {
        let err = parse_err("EXPLAIN t1");
        assert!(err.is_parse_error());
        assert!(err.to_string().contains("Expected CREATE"));
    }

    #[test]
    fn trailing_garbage_rejected() {
        let err = parse_err("SELECT * FROM t1; SELECT");
        assert!(err.to_string().contains("Unexpected input"));
    }
}
