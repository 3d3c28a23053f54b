// Copyright 2025 The Flows Engine Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::fmt;

use crate::value::{ValueError, Variant};

/// The callable numeric builtins reachable from formulas by name.
/// Operators (`+`, `-`, comparisons, …) are bound separately as
/// `UnaryOp`/`BinaryOp` in the AST.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BuiltinFn {
    Abs,
    Floor,
    Ceiling,
    Round,
    Exp,
    Power,
    Sum,
    Min,
    Max,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    pub min_args: usize,
    /// `None` means variadic.
    pub max_args: Option<usize>,
}

impl Signature {
    pub fn accepts(&self, n: usize) -> bool {
        n >= self.min_args && self.max_args.map(|max| n <= max).unwrap_or(true)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FunctionError {
    pub function: &'static str,
    pub details: String,
}

impl fmt::Display for FunctionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.function, self.details)
    }
}

impl std::error::Error for FunctionError {}

impl BuiltinFn {
    pub fn lookup(name: &str) -> Option<BuiltinFn> {
        use BuiltinFn::*;
        let f = match name {
            "abs" => Abs,
            "floor" => Floor,
            "ceiling" => Ceiling,
            "round" => Round,
            "exp" => Exp,
            "power" => Power,
            "sum" => Sum,
            "min" => Min,
            "max" => Max,
            _ => return None,
        };
        Some(f)
    }

    pub fn name(&self) -> &'static str {
        use BuiltinFn::*;
        match self {
            Abs => "abs",
            Floor => "floor",
            Ceiling => "ceiling",
            Round => "round",
            Exp => "exp",
            Power => "power",
            Sum => "sum",
            Min => "min",
            Max => "max",
        }
    }

    pub fn signature(&self) -> Signature {
        use BuiltinFn::*;
        match self {
            Abs | Floor | Ceiling | Round | Exp => Signature {
                min_args: 1,
                max_args: Some(1),
            },
            Power => Signature {
                min_args: 2,
                max_args: Some(2),
            },
            Sum | Min | Max => Signature {
                min_args: 1,
                max_args: None,
            },
        }
    }

    /// Applies the function to already-evaluated arguments.  All
    /// builtins compute over doubles; integer arguments promote.
    pub fn apply(&self, args: &[Variant]) -> Result<Variant, FunctionError> {
        let doubles: Result<Vec<f64>, ValueError> =
            args.iter().map(|a| a.as_double()).collect();
        let doubles = doubles.map_err(|err| FunctionError {
            function: self.name(),
            details: err.to_string(),
        })?;

        if !self.signature().accepts(doubles.len()) {
            return Err(FunctionError {
                function: self.name(),
                details: format!("expected different arity, got {} args", doubles.len()),
            });
        }

        use BuiltinFn::*;
        let result = match self {
            Abs => doubles[0].abs(),
            Floor => doubles[0].floor(),
            Ceiling => doubles[0].ceil(),
            Round => doubles[0].round(),
            Exp => doubles[0].exp(),
            Power => doubles[0].powf(doubles[1]),
            Sum => doubles.iter().sum(),
            Min => doubles.iter().copied().fold(f64::INFINITY, f64::min),
            Max => doubles.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        };

        Ok(Variant::Double(result))
    }
}
