//! Typed expression evaluator.
//!
//! Evaluates a compiled expression against one row of a [`DataChunk`], or
//! over a whole chunk producing one [`Value`] per row. Column references
//! resolve by qualified `table.column` name, case-insensitively; a miss is
//! logged and yields `Null` rather than an error.
//!
//! Arithmetic runs in i64 unless either operand is a DECIMAL, in which case
//! it runs in f64. Division by zero yields 0 (or 0.0); AND/OR coerce both
//! operands to bool (both sides are always evaluated).

use log::warn;

use crate::error::DbResult;
use crate::sql::ast::{BinaryOp, FunctionKind};
use crate::sql::statement::Expression;
use crate::types::{DataChunk, DataType};
use crate::value::Value;

pub struct ExpressionEvaluator<'a> {
    expression: &'a Expression,
}

impl<'a> ExpressionEvaluator<'a> {
    pub fn new(expression: &'a Expression) -> Self {
        Self { expression }
    }

    /// Evaluates the expression for every row of the chunk.
    pub fn evaluate(&self, chunk: &DataChunk) -> DbResult<Vec<Value>> {
        (0..chunk.row_count)
            .map(|row| self.evaluate_row(chunk, row))
            .collect()
    }

    /// Evaluates the expression for a single row.
    pub fn evaluate_row(&self, chunk: &DataChunk, row_index: usize) -> DbResult<Value> {
        evaluate_expression(self.expression, chunk, row_index)
    }
}

fn evaluate_expression(expr: &Expression, chunk: &DataChunk, row_index: usize) -> DbResult<Value> {
    match expr {
        Expression::Literal { value, data_type } => Ok(evaluate_literal(value, *data_type)),
        Expression::ColumnRef { table, column, .. } => {
            Ok(evaluate_column_ref(table, column, chunk, row_index))
        }
        Expression::Binary {
            op, left, right, ..
        } => {
            let left = evaluate_expression(left, chunk, row_index)?;
            let right = evaluate_expression(right, chunk, row_index)?;
            Ok(apply_binary(*op, &left, &right))
        }
        Expression::Function { func, args, .. } => {
            let args = args
                .iter()
                .map(|arg| evaluate_expression(arg, chunk, row_index))
                .collect::<DbResult<Vec<_>>>()?;
            Ok(apply_function(*func, &args))
        }
    }
}

/// Parses the literal's stored string form under its declared type.
fn evaluate_literal(value: &str, data_type: DataType) -> Value {
    match data_type {
        DataType::Int => Value::Int(crate::value::parse_leading_i64(value)),
        DataType::Decimal => Value::Decimal(crate::value::parse_leading_f64(value)),
        DataType::Bool => Value::Bool(value == "true" || value == "TRUE" || value == "1"),
        DataType::String => Value::Str(value.to_string()),
    }
}

fn evaluate_column_ref(table: &str, column: &str, chunk: &DataChunk, row_index: usize) -> Value {
    let qualified = format!("{}.{}", table, column);
    let Some(index) = chunk.find_column(&qualified) else {
        let available: Vec<&str> = chunk.columns.iter().map(|c| c.name.as_str()).collect();
        warn!(
            "column not found: '{}', available: [{}]",
            qualified,
            available.join(", ")
        );
        return Value::Null;
    };

    let column = &chunk.columns[index];
    match column.data_type {
        DataType::Int => Value::Int(column.get_int(row_index) as i64),
        DataType::String => Value::Str(column.get_string(row_index)),
        DataType::Bool => Value::Bool(column.get_bool(row_index)),
        DataType::Decimal => Value::Decimal(column.get_decimal(row_index)),
    }
}

fn apply_binary(op: BinaryOp, left: &Value, right: &Value) -> Value {
    match op {
        BinaryOp::Add | BinaryOp::Subtract | BinaryOp::Multiply | BinaryOp::Divide => {
            compute_arithmetic(op, left, right)
        }
        BinaryOp::Equal => Value::Bool(left.equals(right)),
        BinaryOp::NotEqual => Value::Bool(!left.equals(right)),
        BinaryOp::LessThan => compare_with(left, right, |o| o.is_lt()),
        BinaryOp::LessEqual => compare_with(left, right, |o| o.is_le()),
        BinaryOp::GreaterThan => compare_with(left, right, |o| o.is_gt()),
        BinaryOp::GreaterEqual => compare_with(left, right, |o| o.is_ge()),
        BinaryOp::And => Value::Bool(left.as_bool() && right.as_bool()),
        BinaryOp::Or => Value::Bool(left.as_bool() || right.as_bool()),
    }
}

fn compare_with(left: &Value, right: &Value, pred: fn(std::cmp::Ordering) -> bool) -> Value {
    match left.compare(right) {
        Some(ordering) => Value::Bool(pred(ordering)),
        None => Value::Bool(false),
    }
}

fn compute_arithmetic(op: BinaryOp, left: &Value, right: &Value) -> Value {
    let decimal = matches!(left, Value::Decimal(_)) || matches!(right, Value::Decimal(_));
    if decimal {
        let (a, b) = (left.as_double(), right.as_double());
        let result = match op {
            BinaryOp::Add => a + b,
            BinaryOp::Subtract => a - b,
            BinaryOp::Multiply => a * b,
            BinaryOp::Divide => {
                if b == 0.0 {
                    0.0
                } else {
                    a / b
                }
            }
            _ => unreachable!("non-arithmetic op"),
        };
        Value::Decimal(result)
    } else {
        let (a, b) = (left.as_int(), right.as_int());
        let result = match op {
            BinaryOp::Add => a.wrapping_add(b),
            BinaryOp::Subtract => a.wrapping_sub(b),
            BinaryOp::Multiply => a.wrapping_mul(b),
            BinaryOp::Divide => {
                if b == 0 {
                    0
                } else {
                    a / b
                }
            }
            _ => unreachable!("non-arithmetic op"),
        };
        Value::Int(result)
    }
}

fn apply_function(func: FunctionKind, args: &[Value]) -> Value {
    match func {
        FunctionKind::Sin => {
            if args.len() != 1 {
                return Value::Null;
            }
            Value::Decimal(args[0].as_double().sin())
        }
        FunctionKind::Cos => {
            if args.len() != 1 {
                return Value::Null;
            }
            Value::Decimal(args[0].as_double().cos())
        }
        FunctionKind::Substr => {
            if args.len() != 3 {
                return Value::Null;
            }
            let s = args[0].as_string();
            let start = args[1].as_int();
            let length = args[2].as_int().max(0) as usize;

            let chars: Vec<char> = s.chars().collect();
            if start < 0 || start as usize >= chars.len() {
                return Value::Str(String::new());
            }
            let start = start as usize;
            let end = (start + length).min(chars.len());
            Value::Str(chars[start..end].iter().collect())
        }
    }
}
