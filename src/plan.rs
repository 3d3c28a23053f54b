// Copyright 2025 The Flows Engine Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::HashMap;

use crate::ast::BoundExpr;
use crate::common::Ident;
use crate::frame::ObjectId;
use crate::gf::InterpolationMethod;
use crate::settings::SimulationSettings;
use crate::value::{AtomType, Point, ValueType, Variant};

pub const TIME_NAME: &str = "time";
pub const TIME_DELTA_NAME: &str = "time_delta";
pub const STEP_NAME: &str = "simulation_step";

pub const RESERVED_NAMES: &[&str] = &[TIME_NAME, TIME_DELTA_NAME, STEP_NAME];

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BuiltinKind {
    Time,
    TimeDelta,
    Step,
}

/// What a slot in the state vector holds.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StateContent {
    Builtin(BuiltinKind),
    /// Primary value of a simulation node.
    Object(ObjectId),
    /// Hidden slot: delay queue, delay initial snapshot, smoothed value.
    InternalState(ObjectId),
    /// Flow rate after non-negative-stock scaling.
    AdjustedResult(ObjectId),
}

#[derive(Clone, Debug, PartialEq)]
pub struct StateVariable {
    pub index: usize,
    pub content: StateContent,
    pub value_type: ValueType,
    pub name: Ident,
}

impl StateVariable {
    pub fn is_internal(&self) -> bool {
        matches!(
            self.content,
            StateContent::InternalState(_) | StateContent::AdjustedResult(_)
        )
    }
}

/// How a simulation node's value is produced each step.
#[derive(Clone, Debug, PartialEq)]
pub enum ComputationalRepresentation {
    Formula(BoundExpr),
    GraphicalFunction {
        points: Vec<Point>,
        method: InterpolationMethod,
        parameter_index: usize,
    },
    Delay {
        steps: u32,
        initial_value: Option<Variant>,
        value_type: AtomType,
        initial_value_index: usize,
        queue_index: usize,
        input_value_index: usize,
    },
    Smooth {
        window_time: f64,
        smooth_value_index: usize,
        input_value_index: usize,
    },
}

impl ComputationalRepresentation {
    pub fn value_type(&self) -> ValueType {
        match self {
            ComputationalRepresentation::Formula(expr) => expr.value_type(),
            ComputationalRepresentation::GraphicalFunction { .. } => {
                ValueType::Atom(AtomType::Double)
            }
            ComputationalRepresentation::Delay { value_type, .. } => ValueType::Atom(*value_type),
            ComputationalRepresentation::Smooth { .. } => ValueType::Atom(AtomType::Double),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ObjectRole {
    Stock,
    Flow,
    Auxiliary,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SimulationObject {
    pub object_id: ObjectId,
    pub role: ObjectRole,
    pub variable_index: usize,
    pub value_type: ValueType,
    pub computation: ComputationalRepresentation,
    pub name: Ident,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BoundFlow {
    pub object_id: ObjectId,
    /// Primary slot: the rate as computed by the node's expression.
    pub estimated_value_index: usize,
    /// Slot written by the integrator after flow scaling.
    pub adjusted_value_index: usize,
    pub priority: i32,
    pub drains: Option<ObjectId>,
    pub fills: Option<ObjectId>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BoundStock {
    pub object_id: ObjectId,
    pub variable_index: usize,
    pub allows_negative: bool,
    /// Indices into the plan's flow list.
    pub inflows: Vec<usize>,
    /// Indices into the plan's flow list, sorted ascending by priority.
    pub outflows: Vec<usize>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BoundBuiltins {
    pub step: usize,
    pub time: usize,
    pub time_delta: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BoundChart {
    pub chart_id: ObjectId,
    /// Variable indices of the charted series, in edge order.
    pub series: Vec<usize>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BoundBinding {
    pub binding_id: ObjectId,
    /// The control object driving the bound value.
    pub origin: ObjectId,
    pub variable_index: usize,
}

/// The immutable output of compilation: everything the simulator needs,
/// addressed by flat state-vector indices.
#[derive(Clone, Debug)]
pub struct SimulationPlan {
    pub simulation_objects: Vec<SimulationObject>,
    pub state_variables: Vec<StateVariable>,
    pub builtins: BoundBuiltins,
    pub stocks: Vec<BoundStock>,
    pub flows: Vec<BoundFlow>,
    pub charts: Vec<BoundChart>,
    pub value_bindings: Vec<BoundBinding>,
    pub simulation_settings: SimulationSettings,
    object_index: HashMap<ObjectId, usize>,
    name_index: HashMap<Ident, usize>,
}

#[allow(clippy::too_many_arguments)]
impl SimulationPlan {
    pub(crate) fn new(
        simulation_objects: Vec<SimulationObject>,
        state_variables: Vec<StateVariable>,
        builtins: BoundBuiltins,
        stocks: Vec<BoundStock>,
        flows: Vec<BoundFlow>,
        charts: Vec<BoundChart>,
        value_bindings: Vec<BoundBinding>,
        simulation_settings: SimulationSettings,
    ) -> Self {
        let object_index = simulation_objects
            .iter()
            .map(|o| (o.object_id, o.variable_index))
            .collect();
        let name_index = state_variables
            .iter()
            .map(|v| (v.name.clone(), v.index))
            .collect();
        SimulationPlan {
            simulation_objects,
            state_variables,
            builtins,
            stocks,
            flows,
            charts,
            value_bindings,
            simulation_settings,
            object_index,
            name_index,
        }
    }

    /// Variable index of an object's primary value.
    pub fn variable_index(&self, object_id: ObjectId) -> Option<usize> {
        self.object_index.get(&object_id).copied()
    }

    /// Variable index by (canonicalized) name; includes builtins.
    pub fn variable_named(&self, name: &str) -> Option<usize> {
        self.name_index.get(name).copied()
    }

    pub fn state_variable(&self, index: usize) -> Option<&StateVariable> {
        self.state_variables.get(index)
    }

    pub fn object(&self, object_id: ObjectId) -> Option<&SimulationObject> {
        self.simulation_objects
            .iter()
            .find(|o| o.object_id == object_id)
    }
}
