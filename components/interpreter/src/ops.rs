//! Guest operator semantics
//!
//! Shared by the interpreter, constant folding in the compiler and the
//! graph backend, so every tier agrees on results and type errors.

use crate::ast::{BinaryOp, UnaryOp};
use core_types::{GuestError, Value};

/// Apply a binary operator
pub fn binary(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, GuestError> {
    if op == BinaryOp::Equal {
        return Ok(Value::Bool(lhs == rhs));
    }
    let (a, b) = match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => (a, b),
        _ => {
            return Err(GuestError::type_error(format!(
                "{} expects Int operands, got {:?} and {:?}",
                op.mnemonic(),
                lhs.type_info(),
                rhs.type_info()
            )))
        }
    };
    Ok(match op {
        BinaryOp::Add => Value::Int(a.wrapping_add(b)),
        BinaryOp::Sub => Value::Int(a.wrapping_sub(b)),
        BinaryOp::Mul => Value::Int(a.wrapping_mul(b)),
        BinaryOp::LessThan => Value::Bool(a < b),
        BinaryOp::Equal => Value::Bool(a == b),
    })
}

/// Apply a unary operator
pub fn unary(op: UnaryOp, operand: Value) -> Result<Value, GuestError> {
    match (op, operand) {
        (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (UnaryOp::Negate, Value::Int(n)) => Ok(Value::Int(n.wrapping_neg())),
        _ => Err(GuestError::type_error(format!(
            "{} expects {:?}, got {:?}",
            op.mnemonic(),
            op.operand_type(),
            operand.type_info()
        ))),
    }
}

/// Interpret a value as a branch or loop condition
pub fn condition(value: Value) -> Result<bool, GuestError> {
    value
        .as_bool()
        .ok_or_else(|| GuestError::type_error(format!("condition must be Bool, got {}", value)))
}
