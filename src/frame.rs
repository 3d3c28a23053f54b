// Copyright 2025 The Flows Engine Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::common::Result;
use crate::internal_err;
use crate::value::Variant;

/// Stable identifier of a design object.  Ids are allocated densely by
/// the frame builder and never reused within a frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ObjectType {
    // nodes
    Stock,
    FlowRate,
    Auxiliary,
    GraphicalFunction,
    Delay,
    Smooth,
    Chart,
    Control,
    Simulation,
    // edges
    Parameter,
    Flow,
    ChartSeries,
    ValueBinding,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Trait {
    Formula,
    Auxiliary,
    GraphicalFunction,
    Delay,
    Smooth,
    Simulation,
}

impl ObjectType {
    pub fn is_edge(&self) -> bool {
        matches!(
            self,
            ObjectType::Parameter
                | ObjectType::Flow
                | ObjectType::ChartSeries
                | ObjectType::ValueBinding
        )
    }

    pub fn traits(&self) -> &'static [Trait] {
        match self {
            ObjectType::Stock => &[Trait::Formula],
            ObjectType::FlowRate => &[Trait::Formula],
            ObjectType::Auxiliary => &[Trait::Formula, Trait::Auxiliary],
            ObjectType::GraphicalFunction => &[Trait::GraphicalFunction, Trait::Auxiliary],
            ObjectType::Delay => &[Trait::Delay, Trait::Auxiliary],
            ObjectType::Smooth => &[Trait::Smooth, Trait::Auxiliary],
            ObjectType::Simulation => &[Trait::Simulation],
            _ => &[],
        }
    }

    pub fn has_trait(&self, t: Trait) -> bool {
        self.traits().contains(&t)
    }

    /// Attribute defaults applied by the metamodel when an object is
    /// created without them.
    fn attribute_defaults(&self) -> &'static [(&'static str, Variant)] {
        lazy_static::lazy_static! {
            static ref STOCK: Vec<(&'static str, Variant)> =
                vec![("allows_negative", Variant::Bool(false))];
            static ref FLOW_RATE: Vec<(&'static str, Variant)> =
                vec![("priority", Variant::Int(0))];
        }
        match self {
            ObjectType::Stock => &STOCK,
            ObjectType::FlowRate => &FLOW_RATE,
            _ => &[],
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Structure {
    Node,
    Edge { origin: ObjectId, target: ObjectId },
}

#[derive(Clone, Debug, PartialEq)]
pub struct DesignObject {
    pub id: ObjectId,
    pub object_type: ObjectType,
    pub structure: Structure,
    attributes: BTreeMap<String, Variant>,
}

impl DesignObject {
    pub fn attribute(&self, name: &str) -> Option<&Variant> {
        self.attributes.get(name)
    }

    pub fn origin(&self) -> Option<ObjectId> {
        match self.structure {
            Structure::Edge { origin, .. } => Some(origin),
            Structure::Node => None,
        }
    }

    pub fn target(&self) -> Option<ObjectId> {
        match self.structure {
            Structure::Edge { target, .. } => Some(target),
            Structure::Node => None,
        }
    }
}

/// Mutable design under construction.  Call `validated()` once the
/// design is complete to obtain the read interface the compiler
/// consumes.
#[derive(Clone, Debug, Default)]
pub struct Frame {
    objects: BTreeMap<ObjectId, DesignObject>,
    next_id: u64,
}

impl Frame {
    pub fn new() -> Self {
        Frame::default()
    }

    fn insert(&mut self, object_type: ObjectType, structure: Structure) -> ObjectId {
        let id = ObjectId(self.next_id);
        self.next_id += 1;
        let mut attributes = BTreeMap::new();
        for (name, value) in object_type.attribute_defaults() {
            attributes.insert((*name).to_string(), value.clone());
        }
        self.objects.insert(
            id,
            DesignObject {
                id,
                object_type,
                structure,
                attributes,
            },
        );
        id
    }

    pub fn create_node(&mut self, object_type: ObjectType, name: &str) -> ObjectId {
        debug_assert!(!object_type.is_edge());
        let id = self.insert(object_type, Structure::Node);
        self.set_attribute(id, "name", Variant::String(name.to_string()));
        id
    }

    pub fn create_edge(
        &mut self,
        object_type: ObjectType,
        origin: ObjectId,
        target: ObjectId,
    ) -> ObjectId {
        debug_assert!(object_type.is_edge());
        self.insert(object_type, Structure::Edge { origin, target })
    }

    pub fn set_attribute(&mut self, id: ObjectId, name: &str, value: Variant) {
        if let Some(object) = self.objects.get_mut(&id) {
            object.attributes.insert(name.to_string(), value);
        }
    }

    /// Seals the frame.  The metamodel validator (an external
    /// collaborator) is assumed to have passed; the compiler treats any
    /// structural surprise past this point as an internal error.
    pub fn validated(self) -> ValidatedFrame {
        ValidatedFrame { frame: self }
    }
}

/// Read-only view of a validated design.  Iteration orders are
/// deterministic: ascending `ObjectId`.
#[derive(Clone, Debug)]
pub struct ValidatedFrame {
    frame: Frame,
}

impl ValidatedFrame {
    pub fn object(&self, id: ObjectId) -> Result<&DesignObject> {
        match self.frame.objects.get(&id) {
            Some(object) => Ok(object),
            None => internal_err!(ObjectNotFound, id.to_string()),
        }
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.frame.objects.contains_key(&id)
    }

    pub fn filter(&self, object_type: ObjectType) -> impl Iterator<Item = &DesignObject> {
        self.frame
            .objects
            .values()
            .filter(move |o| o.object_type == object_type)
    }

    pub fn filter_trait(&self, t: Trait) -> impl Iterator<Item = &DesignObject> {
        self.frame
            .objects
            .values()
            .filter(move |o| o.object_type.has_trait(t))
    }

    pub fn incoming(
        &self,
        id: ObjectId,
        edge_type: ObjectType,
    ) -> impl Iterator<Item = &DesignObject> {
        self.filter(edge_type).filter(move |e| e.target() == Some(id))
    }

    pub fn outgoing(
        &self,
        id: ObjectId,
        edge_type: ObjectType,
    ) -> impl Iterator<Item = &DesignObject> {
        self.filter(edge_type).filter(move |e| e.origin() == Some(id))
    }

    pub fn attribute(&self, id: ObjectId, name: &str) -> Option<&Variant> {
        self.frame.objects.get(&id).and_then(|o| o.attribute(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_applied() {
        let mut frame = Frame::new();
        let stock = frame.create_node(ObjectType::Stock, "water");
        let flow = frame.create_node(ObjectType::FlowRate, "drain");
        let frame = frame.validated();

        assert_eq!(
            Some(&Variant::Bool(false)),
            frame.attribute(stock, "allows_negative")
        );
        assert_eq!(Some(&Variant::Int(0)), frame.attribute(flow, "priority"));
    }

    #[test]
    fn edge_iteration_ordered() {
        let mut frame = Frame::new();
        let a = frame.create_node(ObjectType::Auxiliary, "a");
        let b = frame.create_node(ObjectType::Auxiliary, "b");
        let c = frame.create_node(ObjectType::Auxiliary, "c");
        let e1 = frame.create_edge(ObjectType::Parameter, a, c);
        let e2 = frame.create_edge(ObjectType::Parameter, b, c);
        let frame = frame.validated();

        let incoming: Vec<ObjectId> = frame
            .incoming(c, ObjectType::Parameter)
            .map(|e| e.id)
            .collect();
        assert_eq!(vec![e1, e2], incoming);
        assert_eq!(0, frame.outgoing(c, ObjectType::Parameter).count());
    }

    #[test]
    fn trait_filtering() {
        let mut frame = Frame::new();
        frame.create_node(ObjectType::Stock, "s");
        frame.create_node(ObjectType::Auxiliary, "a");
        frame.create_node(ObjectType::GraphicalFunction, "g");
        frame.create_node(ObjectType::Chart, "chart");
        let frame = frame.validated();

        assert_eq!(2, frame.filter_trait(Trait::Auxiliary).count());
        assert_eq!(2, frame.filter_trait(Trait::Formula).count());
    }
}
