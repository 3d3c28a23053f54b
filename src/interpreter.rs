// Copyright 2025 The Flows Engine Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::fmt;

use float_cmp::approx_eq;
use smallvec::SmallVec;

use crate::ast::{BinaryOp, BoundExpr, UnaryOp};
use crate::builtins::FunctionError;
use crate::state::SimulationState;
use crate::value::{AtomType, ValueError, Variant};

#[derive(Clone, Debug, PartialEq)]
pub enum EvaluationError {
    Value(ValueError),
    Function(FunctionError),
}

impl fmt::Display for EvaluationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EvaluationError::Value(err) => write!(f, "value error: {}", err),
            EvaluationError::Function(err) => write!(f, "function error: {}", err),
        }
    }
}

impl std::error::Error for EvaluationError {}

impl From<ValueError> for EvaluationError {
    fn from(err: ValueError) -> Self {
        EvaluationError::Value(err)
    }
}

impl From<FunctionError> for EvaluationError {
    fn from(err: FunctionError) -> Self {
        EvaluationError::Function(err)
    }
}

/// Evaluates a bound expression against a state: values pass through,
/// variable leaves read their slot, operator and call nodes apply the
/// referenced function to recursively evaluated arguments.
pub fn eval(expr: &BoundExpr, state: &SimulationState) -> Result<Variant, EvaluationError> {
    let result = match expr {
        BoundExpr::Const(value) => value.clone(),
        BoundExpr::Var(var) => state.value(var.index).clone(),
        BoundExpr::Op1(op, operand) => {
            let operand = eval(operand, state)?;
            match op {
                UnaryOp::Negative => match operand {
                    Variant::Int(n) => Variant::Int(-n),
                    Variant::Double(n) => Variant::Double(-n),
                    other => {
                        return Err(ValueError::NotConvertible {
                            from: other.value_type(),
                            to: AtomType::Double,
                        }
                        .into())
                    }
                },
                UnaryOp::Not => Variant::Bool(!operand.as_bool()?),
            }
        }
        BoundExpr::Op2(op, l, r) => {
            let l = eval(l, state)?;
            let r = eval(r, state)?;
            apply_binary(*op, l, r)?
        }
        BoundExpr::App(func, args) => {
            let mut evaluated: SmallVec<[Variant; 4]> = SmallVec::with_capacity(args.len());
            for arg in args {
                evaluated.push(eval(arg, state)?);
            }
            func.apply(&evaluated)?
        }
    };

    Ok(result)
}

fn apply_binary(op: BinaryOp, l: Variant, r: Variant) -> Result<Variant, EvaluationError> {
    use BinaryOp::*;

    // integer arithmetic stays integral for + - *; everything else
    // promotes to double
    if let (Variant::Int(a), Variant::Int(b)) = (&l, &r) {
        match op {
            Add => return Ok(Variant::Int(a + b)),
            Sub => return Ok(Variant::Int(a - b)),
            Mul => return Ok(Variant::Int(a * b)),
            _ => {}
        }
    }

    let result = match op {
        Add => Variant::Double(l.as_double()? + r.as_double()?),
        Sub => Variant::Double(l.as_double()? - r.as_double()?),
        Mul => Variant::Double(l.as_double()? * r.as_double()?),
        Div => Variant::Double(l.as_double()? / r.as_double()?),
        Mod => Variant::Double(l.as_double()? % r.as_double()?),
        Exp => Variant::Double(l.as_double()?.powf(r.as_double()?)),
        Gt => Variant::Bool(l.as_double()? > r.as_double()?),
        Gte => Variant::Bool(l.as_double()? >= r.as_double()?),
        Lt => Variant::Bool(l.as_double()? < r.as_double()?),
        Lte => Variant::Bool(l.as_double()? <= r.as_double()?),
        Eq => Variant::Bool(values_equal(&l, &r)?),
        Neq => Variant::Bool(!values_equal(&l, &r)?),
        And => Variant::Bool(l.as_bool()? && r.as_bool()?),
        Or => Variant::Bool(l.as_bool()? || r.as_bool()?),
    };

    Ok(result)
}

fn values_equal(l: &Variant, r: &Variant) -> Result<bool, EvaluationError> {
    let equal = match (l, r) {
        (Variant::Bool(a), Variant::Bool(b)) => a == b,
        (Variant::String(a), Variant::String(b)) => a == b,
        (Variant::Int(a), Variant::Int(b)) => a == b,
        _ => approx_eq!(f64, l.as_double()?, r.as_double()?),
    };
    Ok(equal)
}
