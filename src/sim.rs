// Copyright 2025 The Flows Engine Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::fmt;
use std::sync::Arc;

use float_cmp::approx_eq;

use crate::common::Result;
use crate::frame::ObjectId;
use crate::gf::interpolate;
use crate::integrator;
use crate::interpreter::{eval, EvaluationError};
use crate::plan::{ComputationalRepresentation, ObjectRole, SimulationObject, SimulationPlan};
use crate::results::SimulationResult;
use crate::settings::{ScenarioParameters, SimulationSettings, SolverType};
use crate::sim_err;
use crate::state::SimulationState;
use crate::value::Variant;

/// A runtime failure, attributed to the object being evaluated when
/// one is known.  The simulator does not retry; the run stops and the
/// error is handed to the caller.
#[derive(Clone, Debug, PartialEq)]
pub struct SimulationError {
    pub object_id: Option<ObjectId>,
    pub cause: EvaluationError,
}

impl SimulationError {
    pub(crate) fn at(object_id: ObjectId, err: impl Into<EvaluationError>) -> Self {
        SimulationError {
            object_id: Some(object_id),
            cause: err.into(),
        }
    }
}

impl fmt::Display for SimulationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.object_id {
            Some(id) => write!(f, "simulation error at {}: {}", id, self.cause),
            None => write!(f, "simulation error: {}", self.cause),
        }
    }
}

impl std::error::Error for SimulationError {}

pub(crate) fn write_builtins(plan: &SimulationPlan, state: &mut SimulationState) {
    state.values[plan.builtins.time] = Variant::Double(state.time);
    state.values[plan.builtins.time_delta] = Variant::Double(state.time_delta);
    state.values[plan.builtins.step] = Variant::Int(state.step as i64);
}

fn store_primary(
    state: &mut SimulationState,
    object: &SimulationObject,
    value: Variant,
) -> std::result::Result<(), SimulationError> {
    let value = match object.role {
        // stocks and flow rates are continuous quantities
        ObjectRole::Stock | ObjectRole::Flow => Variant::Double(
            value
                .as_double()
                .map_err(|err| SimulationError::at(object.object_id, err))?,
        ),
        ObjectRole::Auxiliary => value,
    };
    state.values[object.variable_index] = value;
    Ok(())
}

/// Builds the initial state: builtins first, then every simulation
/// object in plan (dependency) order, honouring scenario overrides.
pub(crate) fn initialize_state(
    plan: &SimulationPlan,
    settings: &SimulationSettings,
    overrides: Option<&ScenarioParameters>,
) -> std::result::Result<SimulationState, SimulationError> {
    let mut state = SimulationState::new(plan, settings.initial_time, settings.time_delta);
    write_builtins(plan, &mut state);

    for object in &plan.simulation_objects {
        let id = object.object_id;
        let override_value = overrides.and_then(|p| p.get(id)).cloned();

        match &object.computation {
            ComputationalRepresentation::Formula(expr) => {
                let value = match override_value {
                    Some(value) => value,
                    None => eval(expr, &state).map_err(|err| SimulationError::at(id, err))?,
                };
                store_primary(&mut state, object, value)?;
            }
            ComputationalRepresentation::GraphicalFunction {
                points,
                method,
                parameter_index,
            } => {
                let value = match override_value {
                    Some(value) => value
                        .as_double()
                        .map_err(|err| SimulationError::at(id, err))?,
                    None => {
                        let x = state
                            .double_at(*parameter_index)
                            .map_err(|err| SimulationError::at(id, err))?;
                        interpolate(points, *method, x)
                    }
                };
                state.values[object.variable_index] = Variant::Double(value);
            }
            ComputationalRepresentation::Delay {
                steps,
                initial_value,
                value_type,
                initial_value_index,
                queue_index,
                input_value_index,
            } => {
                let input = state.value(*input_value_index).clone();
                let output = override_value
                    .or_else(|| initial_value.clone())
                    .unwrap_or_else(|| input.clone());

                let mut queue = Variant::empty_array(*value_type);
                if *steps > 0 {
                    queue
                        .push_atom(input)
                        .map_err(|err| SimulationError::at(id, err))?;
                }
                state.values[*queue_index] = queue;
                state.values[*initial_value_index] = output.clone();
                state.values[object.variable_index] = output;
            }
            ComputationalRepresentation::Smooth {
                smooth_value_index,
                input_value_index,
                ..
            } => {
                let seed = match override_value {
                    Some(value) => value,
                    None => state.value(*input_value_index).clone(),
                };
                let seed = Variant::Double(
                    seed.as_double()
                        .map_err(|err| SimulationError::at(id, err))?,
                );
                state.values[*smooth_value_index] = seed.clone();
                state.values[object.variable_index] = seed;
            }
        }
    }

    Ok(state)
}

/// Re-evaluates every non-stock node in plan order against the (already
/// integrated) state: formulas and graphical functions recompute,
/// delays rotate their queues, smooths fold the new input in.
pub(crate) fn update_derived(
    plan: &SimulationPlan,
    state: &mut SimulationState,
) -> std::result::Result<(), SimulationError> {
    for object in &plan.simulation_objects {
        if object.role == ObjectRole::Stock {
            continue;
        }
        let id = object.object_id;

        match &object.computation {
            ComputationalRepresentation::Formula(expr) => {
                let value = eval(expr, state).map_err(|err| SimulationError::at(id, err))?;
                store_primary(state, object, value)?;
            }
            ComputationalRepresentation::GraphicalFunction {
                points,
                method,
                parameter_index,
            } => {
                let x = state
                    .double_at(*parameter_index)
                    .map_err(|err| SimulationError::at(id, err))?;
                state.values[object.variable_index] =
                    Variant::Double(interpolate(points, *method, x));
            }
            ComputationalRepresentation::Delay {
                steps,
                initial_value_index,
                queue_index,
                input_value_index,
                ..
            } => {
                let input = state.value(*input_value_index).clone();
                let output = if *steps == 0 {
                    input
                } else {
                    let mut queue = state.values[*queue_index].clone();
                    let filled = queue
                        .array_len()
                        .map_err(|err| SimulationError::at(id, err))?
                        >= *steps as usize;
                    let output = if filled {
                        queue
                            .pop_front_atom()
                            .map_err(|err| SimulationError::at(id, err))?
                            .unwrap_or_else(|| state.value(*initial_value_index).clone())
                    } else {
                        state.value(*initial_value_index).clone()
                    };
                    queue
                        .push_atom(input)
                        .map_err(|err| SimulationError::at(id, err))?;
                    state.values[*queue_index] = queue;
                    output
                };
                state.values[object.variable_index] = output;
            }
            ComputationalRepresentation::Smooth {
                window_time,
                smooth_value_index,
                input_value_index,
            } => {
                let alpha = state.time_delta / *window_time;
                let input = state
                    .double_at(*input_value_index)
                    .map_err(|err| SimulationError::at(id, err))?;
                let smoothed = state
                    .double_at(*smooth_value_index)
                    .map_err(|err| SimulationError::at(id, err))?;
                let next = alpha * input + (1.0 - alpha) * smoothed;
                state.values[*smooth_value_index] = Variant::Double(next);
                state.values[object.variable_index] = Variant::Double(next);
            }
        }
    }

    Ok(())
}

/// Drives a plan through time: owns the current state, advances it one
/// step per call, and accumulates a result over a whole run.  The plan
/// is shared read-only; independent simulators over one plan can run in
/// parallel.
pub struct Simulator {
    plan: Arc<SimulationPlan>,
    settings: SimulationSettings,
    current: Option<SimulationState>,
}

impl Simulator {
    /// Uses the settings compiled into the plan.
    pub fn new(plan: Arc<SimulationPlan>) -> Result<Simulator> {
        let settings = plan.simulation_settings;
        Simulator::with_settings(plan, settings)
    }

    pub fn with_settings(plan: Arc<SimulationPlan>, settings: SimulationSettings) -> Result<Simulator> {
        if approx_eq!(f64, settings.time_delta, 0.0) || settings.time_delta < 0.0 {
            return sim_err!(BadSimSpecs, "dt must be greater than 0".to_string());
        }
        if settings.solver == SolverType::RungeKutta4
            && plan.stocks.iter().any(|s| !s.allows_negative)
        {
            eprintln!(
                "warning, rk4 with non-negative stocks clamps per stage; results may undershoot"
            );
        }
        Ok(Simulator {
            plan,
            settings,
            current: None,
        })
    }

    pub fn plan(&self) -> &SimulationPlan {
        &self.plan
    }

    pub fn settings(&self) -> &SimulationSettings {
        &self.settings
    }

    pub fn current_state(&self) -> Option<&SimulationState> {
        self.current.as_ref()
    }

    /// (Re)creates the initial state, evaluating every object in plan
    /// order or taking its value from `overrides`.
    pub fn initialize(
        &mut self,
        overrides: Option<&ScenarioParameters>,
    ) -> std::result::Result<&SimulationState, SimulationError> {
        let state = initialize_state(&self.plan, &self.settings, overrides)?;
        Ok(self.current.insert(state))
    }

    /// Advances one step.  On failure the pre-step state is kept, so a
    /// caller may inspect where the run stopped.
    pub fn step(&mut self) -> std::result::Result<&SimulationState, SimulationError> {
        let current = match self.current.take() {
            Some(current) => current,
            None => initialize_state(&self.plan, &self.settings, None)?,
        };

        let mut next = current.advanced();
        write_builtins(&self.plan, &mut next);

        let stepped = self.integrate(&mut next);
        match stepped {
            Ok(()) => Ok(self.current.insert(next)),
            Err(err) => {
                self.current = Some(current);
                Err(err)
            }
        }
    }

    fn integrate(&self, next: &mut SimulationState) -> std::result::Result<(), SimulationError> {
        match self.settings.solver {
            SolverType::Euler => {
                integrator::euler(&self.plan, next, self.settings.flow_scaling)?
            }
            SolverType::RungeKutta4 => {
                integrator::rk4(&self.plan, next, self.settings.flow_scaling)?
            }
        }
        update_derived(&self.plan, next)
    }

    /// Initialises and steps to the configured stop condition,
    /// collecting every state (the initial one included).
    pub fn run(
        &mut self,
        overrides: Option<&ScenarioParameters>,
    ) -> std::result::Result<SimulationResult, SimulationError> {
        let steps = self.settings.step_count();
        let mut states = Vec::with_capacity(steps as usize + 1);
        states.push(self.initialize(overrides)?.clone());
        for _ in 0..steps {
            states.push(self.step()?.clone());
        }
        Ok(SimulationResult {
            initial_time: self.settings.initial_time,
            time_delta: self.settings.time_delta,
            states,
        })
    }

    pub fn run_to_end(&mut self) -> std::result::Result<SimulationResult, SimulationError> {
        self.run(None)
    }
}
