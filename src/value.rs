// Copyright 2025 The Flows Engine Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AtomType {
    Int,
    Double,
    Bool,
    String,
    Point,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    Atom(AtomType),
    Array(AtomType),
}

impl ValueType {
    pub fn is_atom(&self) -> bool {
        matches!(self, ValueType::Atom(_))
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ValueType::Atom(AtomType::Int) | ValueType::Atom(AtomType::Double)
        )
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = |a: &AtomType| match a {
            AtomType::Int => "int",
            AtomType::Double => "double",
            AtomType::Bool => "bool",
            AtomType::String => "string",
            AtomType::Point => "point",
        };
        match self {
            ValueType::Atom(a) => write!(f, "{}", name(a)),
            ValueType::Array(a) => write!(f, "[{}]", name(a)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Variant {
    Int(i64),
    Double(f64),
    Bool(bool),
    String(String),
    Point(Point),
    IntArray(Vec<i64>),
    DoubleArray(Vec<f64>),
    BoolArray(Vec<bool>),
    StringArray(Vec<String>),
    PointArray(Vec<Point>),
}

#[derive(Clone, Debug, PartialEq)]
pub enum ValueError {
    NotConvertible { from: ValueType, to: AtomType },
    NotAnArray(ValueType),
    MixedArrayElement { expected: AtomType, got: ValueType },
}

impl fmt::Display for ValueError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ValueError::NotConvertible { from, to } => {
                write!(f, "cannot convert {} to {:?}", from, to)
            }
            ValueError::NotAnArray(t) => write!(f, "{} is not an array", t),
            ValueError::MixedArrayElement { expected, got } => {
                write!(f, "array of {:?} cannot hold {}", expected, got)
            }
        }
    }
}

impl std::error::Error for ValueError {}

impl Variant {
    pub fn value_type(&self) -> ValueType {
        match self {
            Variant::Int(_) => ValueType::Atom(AtomType::Int),
            Variant::Double(_) => ValueType::Atom(AtomType::Double),
            Variant::Bool(_) => ValueType::Atom(AtomType::Bool),
            Variant::String(_) => ValueType::Atom(AtomType::String),
            Variant::Point(_) => ValueType::Atom(AtomType::Point),
            Variant::IntArray(_) => ValueType::Array(AtomType::Int),
            Variant::DoubleArray(_) => ValueType::Array(AtomType::Double),
            Variant::BoolArray(_) => ValueType::Array(AtomType::Bool),
            Variant::StringArray(_) => ValueType::Array(AtomType::String),
            Variant::PointArray(_) => ValueType::Array(AtomType::Point),
        }
    }

    /// The zero value used to pre-fill freshly allocated state slots.
    pub fn zero(value_type: ValueType) -> Variant {
        match value_type {
            ValueType::Atom(AtomType::Int) => Variant::Int(0),
            ValueType::Atom(AtomType::Double) => Variant::Double(0.0),
            ValueType::Atom(AtomType::Bool) => Variant::Bool(false),
            ValueType::Atom(AtomType::String) => Variant::String(String::new()),
            ValueType::Atom(AtomType::Point) => Variant::Point(Point::default()),
            ValueType::Array(atom) => Variant::empty_array(atom),
        }
    }

    pub fn empty_array(atom: AtomType) -> Variant {
        match atom {
            AtomType::Int => Variant::IntArray(vec![]),
            AtomType::Double => Variant::DoubleArray(vec![]),
            AtomType::Bool => Variant::BoolArray(vec![]),
            AtomType::String => Variant::StringArray(vec![]),
            AtomType::Point => Variant::PointArray(vec![]),
        }
    }

    pub fn as_double(&self) -> Result<f64, ValueError> {
        match self {
            Variant::Int(n) => Ok(*n as f64),
            Variant::Double(n) => Ok(*n),
            _ => Err(ValueError::NotConvertible {
                from: self.value_type(),
                to: AtomType::Double,
            }),
        }
    }

    pub fn as_int(&self) -> Result<i64, ValueError> {
        match self {
            Variant::Int(n) => Ok(*n),
            Variant::Double(n) if n.fract() == 0.0 => Ok(*n as i64),
            _ => Err(ValueError::NotConvertible {
                from: self.value_type(),
                to: AtomType::Int,
            }),
        }
    }

    pub fn as_bool(&self) -> Result<bool, ValueError> {
        match self {
            Variant::Bool(b) => Ok(*b),
            _ => Err(ValueError::NotConvertible {
                from: self.value_type(),
                to: AtomType::Bool,
            }),
        }
    }

    pub fn as_str(&self) -> Result<&str, ValueError> {
        match self {
            Variant::String(s) => Ok(s),
            _ => Err(ValueError::NotConvertible {
                from: self.value_type(),
                to: AtomType::String,
            }),
        }
    }

    pub fn as_points(&self) -> Result<&[Point], ValueError> {
        match self {
            Variant::PointArray(points) => Ok(points),
            _ => Err(ValueError::NotConvertible {
                from: self.value_type(),
                to: AtomType::Point,
            }),
        }
    }

    pub fn array_len(&self) -> Result<usize, ValueError> {
        match self {
            Variant::IntArray(items) => Ok(items.len()),
            Variant::DoubleArray(items) => Ok(items.len()),
            Variant::BoolArray(items) => Ok(items.len()),
            Variant::StringArray(items) => Ok(items.len()),
            Variant::PointArray(items) => Ok(items.len()),
            _ => Err(ValueError::NotAnArray(self.value_type())),
        }
    }

    /// Appends an atom to an array variant of the matching atom type.
    /// Delay queues are stored in the state vector as array variants and
    /// grow through this.
    pub fn push_atom(&mut self, value: Variant) -> Result<(), ValueError> {
        let mismatch = |expected: AtomType, got: &Variant| ValueError::MixedArrayElement {
            expected,
            got: got.value_type(),
        };
        match (self, value) {
            (Variant::IntArray(items), Variant::Int(n)) => items.push(n),
            (Variant::DoubleArray(items), Variant::Double(n)) => items.push(n),
            (Variant::DoubleArray(items), Variant::Int(n)) => items.push(n as f64),
            (Variant::BoolArray(items), Variant::Bool(b)) => items.push(b),
            (Variant::StringArray(items), Variant::String(s)) => items.push(s),
            (Variant::PointArray(items), Variant::Point(p)) => items.push(p),
            (Variant::IntArray(_), other) => return Err(mismatch(AtomType::Int, &other)),
            (Variant::DoubleArray(_), other) => return Err(mismatch(AtomType::Double, &other)),
            (Variant::BoolArray(_), other) => return Err(mismatch(AtomType::Bool, &other)),
            (Variant::StringArray(_), other) => return Err(mismatch(AtomType::String, &other)),
            (Variant::PointArray(_), other) => return Err(mismatch(AtomType::Point, &other)),
            (this, _) => return Err(ValueError::NotAnArray(this.value_type())),
        }
        Ok(())
    }

    /// Removes and returns the oldest element of an array variant, or
    /// `None` if it is empty.
    pub fn pop_front_atom(&mut self) -> Result<Option<Variant>, ValueError> {
        let popped = match self {
            Variant::IntArray(items) => {
                (!items.is_empty()).then(|| Variant::Int(items.remove(0)))
            }
            Variant::DoubleArray(items) => {
                (!items.is_empty()).then(|| Variant::Double(items.remove(0)))
            }
            Variant::BoolArray(items) => {
                (!items.is_empty()).then(|| Variant::Bool(items.remove(0)))
            }
            Variant::StringArray(items) => {
                (!items.is_empty()).then(|| Variant::String(items.remove(0)))
            }
            Variant::PointArray(items) => {
                (!items.is_empty()).then(|| Variant::Point(items.remove(0)))
            }
            _ => return Err(ValueError::NotAnArray(self.value_type())),
        };
        Ok(popped)
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Variant::Int(n) => write!(f, "{}", n),
            Variant::Double(n) => write!(f, "{}", n),
            Variant::Bool(b) => write!(f, "{}", b),
            Variant::String(s) => write!(f, "{}", s),
            Variant::Point(p) => write!(f, "({}, {})", p.x, p.y),
            Variant::IntArray(items) => write!(f, "{:?}", items),
            Variant::DoubleArray(items) => write!(f, "{:?}", items),
            Variant::BoolArray(items) => write!(f, "{:?}", items),
            Variant::StringArray(items) => write!(f, "{:?}", items),
            Variant::PointArray(items) => {
                let pairs: Vec<(f64, f64)> = items.iter().map(|p| (p.x, p.y)).collect();
                write!(f, "{:?}", pairs)
            }
        }
    }
}
