// Copyright 2025 The Flows Engine Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::fmt;
use std::{error, result};

use lazy_static::lazy_static;
use regex::Regex;

pub type Ident = String;

/// Codes for hard errors: violated preconditions on the input frame or
/// on simulation specs.  User-visible diagnostics live in `issues`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NoError, // will never be produced
    AttributeExpectationFailure,
    FormulaCompilationFailure,
    StructureTypeMismatch,
    ObjectNotFound,
    BadSimSpecs,
    Generic,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ErrorCode::*;
        let name = match self {
            NoError => "no_error",
            AttributeExpectationFailure => "attribute_expectation_failure",
            FormulaCompilationFailure => "formula_compilation_failure",
            StructureTypeMismatch => "structure_type_mismatch",
            ObjectNotFound => "object_not_found",
            BadSimSpecs => "bad_sim_specs",
            Generic => "generic",
        };

        write!(f, "{}", name)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Compiler,
    Simulation,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Error {
    pub kind: ErrorKind,
    pub code: ErrorCode,
    pub(crate) details: Option<String>,
}

impl Error {
    pub fn new(kind: ErrorKind, code: ErrorCode, details: Option<String>) -> Self {
        Error {
            kind,
            code,
            details,
        }
    }

    pub fn get_details(&self) -> Option<String> {
        self.details.clone()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind = match self.kind {
            ErrorKind::Compiler => "CompilerError",
            ErrorKind::Simulation => "SimulationError",
        };
        match self.details {
            Some(ref details) => write!(f, "{}{{{}: {}}}", kind, self.code, details),
            None => write!(f, "{}{{{}}}", kind, self.code),
        }
    }
}

impl error::Error for Error {}

pub type Result<T> = result::Result<T, Error>;

/// Codes attached to expression-level diagnostics; each carries a byte
/// span into the offending formula.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum EquationErrorCode {
    InvalidToken,
    UnrecognizedToken,
    UnrecognizedEof,
    UnclosedParen,
    ExtraToken,
    ExpectedNumber,
    UnknownFunction,
    BadArity,
    TypeMismatch,
    UnknownDependency,
    EmptyEquation,
}

impl fmt::Display for EquationErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use EquationErrorCode::*;
        let name = match self {
            InvalidToken => "invalid_token",
            UnrecognizedToken => "unrecognized_token",
            UnrecognizedEof => "unrecognized_eof",
            UnclosedParen => "unclosed_paren",
            ExtraToken => "extra_token",
            ExpectedNumber => "expected_number",
            UnknownFunction => "unknown_function",
            BadArity => "bad_arity",
            TypeMismatch => "type_mismatch",
            UnknownDependency => "unknown_dependency",
            EmptyEquation => "empty_equation",
        };

        write!(f, "{}", name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EquationError {
    pub start: u16,
    pub end: u16,
    pub code: EquationErrorCode,
}

impl fmt::Display for EquationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}:{}", self.start, self.end, self.code)
    }
}

pub type EquationResult<T> = result::Result<T, EquationError>;

#[macro_export]
macro_rules! internal_err(
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Compiler, ErrorCode::$code, Some($str)))
    }}
);

#[macro_export]
macro_rules! sim_err {
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Simulation, ErrorCode::$code, Some($str)))
    }};
    ($code:tt) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Simulation, ErrorCode::$code, None))
    }};
}

#[macro_export]
macro_rules! eqn_err(
    ($code:tt, $start:expr, $end:expr) => {{
        use $crate::common::{EquationError, EquationErrorCode};
        Err(EquationError{ start: $start, end: $end, code: EquationErrorCode::$code})
    }}
);

/// Normalizes a design-object name for lookup: leading/trailing
/// whitespace stripped, internal whitespace runs collapsed to `_`,
/// lowercased.  Formula variable references go through the same
/// normalization so that `Birth Rate` and `birth_rate` agree.
pub fn canonicalize(name: &str) -> String {
    let name = name.trim();

    lazy_static! {
        static ref WHITESPACE_RE: Regex = Regex::new(r"(\n|\r|\t| |\x{00A0})+").unwrap();
    }

    let name = WHITESPACE_RE.replace_all(name, "_");
    name.to_lowercase()
}

#[test]
fn test_canonicalize() {
    assert_eq!("a_b", canonicalize("   a b"));
    assert_eq!("a_b", canonicalize("a \n b"));
    assert_eq!("birth_rate", canonicalize("Birth Rate"));
    assert_eq!("fish", canonicalize("fish\t"));
    assert_eq!("", canonicalize("  \n "));
    assert_eq!("already_fine", canonicalize("already_fine"));
}
