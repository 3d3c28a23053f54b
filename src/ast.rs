// Copyright 2025 The Flows Engine Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::BTreeSet;

use crate::builtins::BuiltinFn;
use crate::common::{canonicalize, EquationResult, Ident};
use crate::eqn_err;
use crate::value::{AtomType, ValueType, Variant};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Loc {
    pub start: u16,
    pub end: u16,
}

impl Loc {
    pub fn new(start: usize, end: usize) -> Self {
        Loc {
            start: start as u16,
            end: end as u16,
        }
    }

    pub fn union(&self, other: &Loc) -> Self {
        Loc {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Negative,
    Not,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Exp,
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
    Neq,
    And,
    Or,
}

/// Unbound expression as produced by the parser: variable references
/// and function names are still strings.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Const(Variant, Loc),
    Var(Ident, Loc),
    App(Ident, Vec<Expr>, Loc),
    Op1(UnaryOp, Box<Expr>, Loc),
    Op2(BinaryOp, Box<Expr>, Box<Expr>, Loc),
}

impl Expr {
    pub fn loc(&self) -> Loc {
        match self {
            Expr::Const(_, loc)
            | Expr::Var(_, loc)
            | Expr::App(_, _, loc)
            | Expr::Op1(_, _, loc)
            | Expr::Op2(_, _, _, loc) => *loc,
        }
    }

    /// All variable names referenced by this expression, canonicalized.
    pub fn collect_vars(&self, out: &mut BTreeSet<Ident>) {
        match self {
            Expr::Const(_, _) => {}
            Expr::Var(name, _) => {
                out.insert(canonicalize(name));
            }
            Expr::App(_, args, _) => {
                for arg in args {
                    arg.collect_vars(out);
                }
            }
            Expr::Op1(_, operand, _) => operand.collect_vars(out),
            Expr::Op2(_, l, r, _) => {
                l.collect_vars(out);
                r.collect_vars(out);
            }
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BoundVariable {
    pub index: usize,
    pub value_type: ValueType,
}

/// Fully resolved expression: variables carry state-vector indices and
/// operators/calls reference concrete functions.
#[derive(Clone, Debug, PartialEq)]
pub enum BoundExpr {
    Const(Variant),
    Var(BoundVariable),
    Op1(UnaryOp, Box<BoundExpr>),
    Op2(BinaryOp, Box<BoundExpr>, Box<BoundExpr>),
    App(BuiltinFn, Vec<BoundExpr>),
}

impl BoundExpr {
    pub fn value_type(&self) -> ValueType {
        match self {
            BoundExpr::Const(value) => value.value_type(),
            BoundExpr::Var(var) => var.value_type,
            BoundExpr::Op1(op, operand) => match op {
                UnaryOp::Negative => operand.value_type(),
                UnaryOp::Not => ValueType::Atom(AtomType::Bool),
            },
            BoundExpr::Op2(op, l, r) => {
                use BinaryOp::*;
                match op {
                    Add | Sub | Mul => {
                        let int = ValueType::Atom(AtomType::Int);
                        if l.value_type() == int && r.value_type() == int {
                            int
                        } else {
                            ValueType::Atom(AtomType::Double)
                        }
                    }
                    Div | Mod | Exp => ValueType::Atom(AtomType::Double),
                    Gt | Gte | Lt | Lte | Eq | Neq | And | Or => ValueType::Atom(AtomType::Bool),
                }
            }
            BoundExpr::App(_, _) => ValueType::Atom(AtomType::Double),
        }
    }
}

/// Name resolution interface the binder works against: maps a
/// canonicalized name to the state variable it denotes.
pub trait BindingEnv {
    fn resolve(&self, name: &str) -> Option<BoundVariable>;
}

/// Rewrites an unbound expression into a bound one, resolving names
/// through `env` and checking operator/function argument types.
pub fn bind_expr(expr: &Expr, env: &dyn BindingEnv) -> EquationResult<BoundExpr> {
    let bound = match expr {
        Expr::Const(value, _) => BoundExpr::Const(value.clone()),
        Expr::Var(name, loc) => match env.resolve(&canonicalize(name)) {
            Some(var) => BoundExpr::Var(var),
            None => return eqn_err!(UnknownDependency, loc.start, loc.end),
        },
        Expr::App(name, args, loc) => {
            let func = match BuiltinFn::lookup(&canonicalize(name)) {
                Some(func) => func,
                None => return eqn_err!(UnknownFunction, loc.start, loc.end),
            };
            if !func.signature().accepts(args.len()) {
                return eqn_err!(BadArity, loc.start, loc.end);
            }
            let mut bound_args = Vec::with_capacity(args.len());
            for arg in args {
                let bound_arg = bind_expr(arg, env)?;
                if !bound_arg.value_type().is_numeric() {
                    let loc = arg.loc();
                    return eqn_err!(TypeMismatch, loc.start, loc.end);
                }
                bound_args.push(bound_arg);
            }
            BoundExpr::App(func, bound_args)
        }
        Expr::Op1(op, operand, _) => {
            let bound_operand = bind_expr(operand, env)?;
            let ok = match op {
                UnaryOp::Negative => bound_operand.value_type().is_numeric(),
                UnaryOp::Not => bound_operand.value_type() == ValueType::Atom(AtomType::Bool),
            };
            if !ok {
                let loc = operand.loc();
                return eqn_err!(TypeMismatch, loc.start, loc.end);
            }
            BoundExpr::Op1(*op, Box::new(bound_operand))
        }
        Expr::Op2(op, l, r, _) => {
            let bound_l = bind_expr(l, env)?;
            let bound_r = bind_expr(r, env)?;
            let lt = bound_l.value_type();
            let rt = bound_r.value_type();
            use BinaryOp::*;
            let ok = match op {
                Add | Sub | Mul | Div | Mod | Exp | Gt | Gte | Lt | Lte => {
                    lt.is_numeric() && rt.is_numeric()
                }
                Eq | Neq => {
                    (lt.is_numeric() && rt.is_numeric())
                        || (lt == rt && lt.is_atom())
                }
                And | Or => {
                    lt == ValueType::Atom(AtomType::Bool) && rt == ValueType::Atom(AtomType::Bool)
                }
            };
            if !ok {
                let loc = if !lt.is_numeric() && !matches!(op, Eq | Neq | And | Or) {
                    l.loc()
                } else {
                    r.loc()
                };
                return eqn_err!(TypeMismatch, loc.start, loc.end);
            }
            BoundExpr::Op2(*op, Box::new(bound_l), Box::new(bound_r))
        }
    };

    Ok(bound)
}
