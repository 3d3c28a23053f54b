// Copyright 2025 The Flows Engine Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::BTreeMap;
use std::fmt;

use crate::common::{EquationError, Error, Ident};
use crate::frame::ObjectId;
use crate::value::{ValueType, Variant};

/// User-visible defects in a design, each attributable to one design
/// object.  Compilation accumulates these instead of failing fast.
#[derive(Clone, Debug, PartialEq)]
pub enum IssueKind {
    ExpressionSyntaxError(EquationError),
    ExpressionError(EquationError),
    UnusedInput(Ident),
    UnknownParameter(Ident),
    DuplicateName(Ident),
    EmptyName,
    MissingRequiredParameter,
    ComputationCycle,
    InvalidAttributeValue {
        attribute: &'static str,
        value: Variant,
    },
    UnsupportedDelayValueType(ValueType),
}

impl IssueKind {
    pub fn hint(&self) -> String {
        match self {
            IssueKind::ExpressionSyntaxError(err) => {
                format!("the formula could not be parsed ({})", err)
            }
            IssueKind::ExpressionError(err) => {
                format!("the formula does not type-check ({})", err)
            }
            IssueKind::UnusedInput(name) => {
                format!("remove the connection from '{}' or use it in the formula", name)
            }
            IssueKind::UnknownParameter(name) => {
                format!("add a parameter connection from '{}'", name)
            }
            IssueKind::DuplicateName(name) => {
                format!("rename this node; '{}' is already taken", name)
            }
            IssueKind::EmptyName => "give this node a non-empty name".to_string(),
            IssueKind::MissingRequiredParameter => {
                "connect exactly one parameter as the input".to_string()
            }
            IssueKind::ComputationCycle => {
                "break the dependency cycle, for example through a stock".to_string()
            }
            IssueKind::InvalidAttributeValue { attribute, value } => {
                format!("'{}' is not a valid value for {}", value, attribute)
            }
            IssueKind::UnsupportedDelayValueType(t) => {
                format!("the input must be a scalar, not {}", t)
            }
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            IssueKind::ExpressionSyntaxError(err) => write!(f, "expression_syntax_error({})", err),
            IssueKind::ExpressionError(err) => write!(f, "expression_error({})", err),
            IssueKind::UnusedInput(name) => write!(f, "unused_input({})", name),
            IssueKind::UnknownParameter(name) => write!(f, "unknown_parameter({})", name),
            IssueKind::DuplicateName(name) => write!(f, "duplicate_name({})", name),
            IssueKind::EmptyName => write!(f, "empty_name"),
            IssueKind::MissingRequiredParameter => write!(f, "missing_required_parameter"),
            IssueKind::ComputationCycle => write!(f, "computation_cycle"),
            IssueKind::InvalidAttributeValue { attribute, value } => {
                write!(f, "invalid_attribute_value({}, {})", attribute, value)
            }
            IssueKind::UnsupportedDelayValueType(t) => {
                write!(f, "unsupported_delay_value_type({})", t)
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Issue {
    pub kind: IssueKind,
    pub hint: String,
}

impl Issue {
    pub fn new(kind: IssueKind) -> Self {
        let hint = kind.hint();
        Issue { kind, hint }
    }
}

/// Issues grouped by the design object they belong to.  `is_empty`
/// gates compilation success.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IssueCollection {
    issues: BTreeMap<ObjectId, Vec<Issue>>,
}

impl IssueCollection {
    pub fn new() -> Self {
        IssueCollection::default()
    }

    pub fn push(&mut self, object_id: ObjectId, kind: IssueKind) {
        self.issues.entry(object_id).or_default().push(Issue::new(kind));
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /// Total number of issues across all objects.
    pub fn len(&self) -> usize {
        self.issues.values().map(|v| v.len()).sum()
    }

    pub fn for_object(&self, object_id: ObjectId) -> &[Issue] {
        self.issues
            .get(&object_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &Issue)> {
        self.issues
            .iter()
            .flat_map(|(&id, issues)| issues.iter().map(move |issue| (id, issue)))
    }
}

impl fmt::Display for IssueCollection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (id, issue) in self.iter() {
            writeln!(f, "{}: {}", id, issue.kind)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum CompilerError {
    /// The design has user-fixable defects.
    Issues(IssueCollection),
    /// A precondition on the validated frame was violated.
    Internal(Error),
}

impl fmt::Display for CompilerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CompilerError::Issues(issues) => {
                write!(f, "{} issue(s) in the design:\n{}", issues.len(), issues)
            }
            CompilerError::Internal(err) => write!(f, "internal: {}", err),
        }
    }
}

impl std::error::Error for CompilerError {}

impl From<Error> for CompilerError {
    fn from(err: Error) -> Self {
        CompilerError::Internal(err)
    }
}
