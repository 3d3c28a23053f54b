// Copyright 2025 The Flows Engine Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::common::Result;
use crate::frame::{ObjectId, Trait, ValidatedFrame};
use crate::internal_err;
use crate::value::Variant;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SolverType {
    #[default]
    Euler,
    RungeKutta4,
}

impl SolverType {
    pub fn parse(name: &str) -> Option<SolverType> {
        match name {
            "euler" => Some(SolverType::Euler),
            "rk4" => Some(SolverType::RungeKutta4),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Stop {
    Steps(u64),
    EndTime(f64),
}

/// Which side of a stock's balance the scaler looks at when keeping a
/// non-negative stock at or above zero.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlowScaling {
    #[default]
    OutflowFirst,
    InflowFirst,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationSettings {
    pub initial_time: f64,
    pub time_delta: f64,
    pub stop: Stop,
    pub solver: SolverType,
    pub flow_scaling: FlowScaling,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        SimulationSettings {
            initial_time: 0.0,
            time_delta: 1.0,
            stop: Stop::Steps(10),
            solver: SolverType::Euler,
            flow_scaling: FlowScaling::OutflowFirst,
        }
    }
}

impl SimulationSettings {
    /// Number of integration steps to run after the initial state.
    pub fn step_count(&self) -> u64 {
        match self.stop {
            Stop::Steps(steps) => steps,
            Stop::EndTime(end_time) => {
                if self.time_delta <= 0.0 || end_time <= self.initial_time {
                    0
                } else {
                    ((end_time - self.initial_time) / self.time_delta).floor() as u64
                }
            }
        }
    }

    /// Reads the design's `Simulation` node, falling back to defaults
    /// for anything it does not specify.
    pub fn from_frame(frame: &ValidatedFrame) -> Result<Self> {
        let mut settings = SimulationSettings::default();
        let node = match frame.filter_trait(Trait::Simulation).next() {
            Some(node) => node,
            None => return Ok(settings),
        };

        if let Some(value) = node.attribute("initial_time") {
            settings.initial_time = expect_double(value, "initial_time")?;
        }
        if let Some(value) = node.attribute("time_delta") {
            settings.time_delta = expect_double(value, "time_delta")?;
        }
        if let Some(value) = node.attribute("steps") {
            let steps = match value.as_int() {
                Ok(steps) if steps >= 0 => steps as u64,
                _ => {
                    return internal_err!(
                        AttributeExpectationFailure,
                        format!("steps: {}", value)
                    )
                }
            };
            settings.stop = Stop::Steps(steps);
        } else if let Some(value) = node.attribute("end_time") {
            settings.stop = Stop::EndTime(expect_double(value, "end_time")?);
        }
        if let Some(value) = node.attribute("solver_type") {
            let name = match value.as_str() {
                Ok(name) => name,
                Err(_) => {
                    return internal_err!(
                        AttributeExpectationFailure,
                        format!("solver_type: {}", value)
                    )
                }
            };
            match SolverType::parse(name) {
                Some(solver) => settings.solver = solver,
                None => {
                    eprintln!("warning, unknown solver '{}', using euler", name);
                }
            }
        }

        Ok(settings)
    }
}

fn expect_double(value: &Variant, attribute: &str) -> Result<f64> {
    match value.as_double() {
        Ok(n) => Ok(n),
        Err(_) => internal_err!(
            AttributeExpectationFailure,
            format!("{}: {}", attribute, value)
        ),
    }
}

/// Per-run overrides for the initial values of simulation objects.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScenarioParameters {
    pub initial_values: HashMap<ObjectId, Variant>,
}

impl ScenarioParameters {
    pub fn new() -> Self {
        ScenarioParameters::default()
    }

    pub fn set(&mut self, object_id: ObjectId, value: Variant) {
        self.initial_values.insert(object_id, value);
    }

    pub fn get(&self, object_id: ObjectId) -> Option<&Variant> {
        self.initial_values.get(&object_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Frame, ObjectType};

    #[test]
    fn defaults() {
        let settings = SimulationSettings::default();
        assert_eq!(0.0, settings.initial_time);
        assert_eq!(1.0, settings.time_delta);
        assert_eq!(Stop::Steps(10), settings.stop);
        assert_eq!(SolverType::Euler, settings.solver);
        assert_eq!(10, settings.step_count());
    }

    #[test]
    fn end_time_to_steps() {
        let settings = SimulationSettings {
            initial_time: 2.0,
            time_delta: 0.5,
            stop: Stop::EndTime(4.0),
            ..SimulationSettings::default()
        };
        assert_eq!(4, settings.step_count());
    }

    #[test]
    fn from_frame_reads_simulation_node() {
        let mut frame = Frame::new();
        let sim = frame.create_node(ObjectType::Simulation, "sim");
        frame.set_attribute(sim, "initial_time", Variant::Double(5.0));
        frame.set_attribute(sim, "time_delta", Variant::Double(0.25));
        frame.set_attribute(sim, "steps", Variant::Int(100));
        frame.set_attribute(sim, "solver_type", Variant::String("rk4".to_string()));
        let frame = frame.validated();

        let settings = SimulationSettings::from_frame(&frame).unwrap();
        assert_eq!(5.0, settings.initial_time);
        assert_eq!(0.25, settings.time_delta);
        assert_eq!(Stop::Steps(100), settings.stop);
        assert_eq!(SolverType::RungeKutta4, settings.solver);
    }

    #[test]
    fn from_frame_without_node_is_default() {
        let frame = Frame::new().validated();
        assert_eq!(
            SimulationSettings::default(),
            SimulationSettings::from_frame(&frame).unwrap()
        );
    }
}
