// Copyright 2025 The Flows Engine Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use crate::plan::SimulationPlan;
use crate::settings::FlowScaling;
use crate::sim::{update_derived, write_builtins, SimulationError};
use crate::state::SimulationState;
use crate::value::Variant;

/// One integration stage: per-stock deltas (rate x dt, clamped for
/// non-negative stocks) and per-flow scaled rates.
pub(crate) struct StageOutcome {
    /// Indexed like `plan.stocks`.
    pub deltas: Vec<f64>,
    /// Indexed like `plan.flows`.
    pub adjusted: Vec<f64>,
}

fn flow_estimates(
    plan: &SimulationPlan,
    state: &SimulationState,
) -> Result<Vec<f64>, SimulationError> {
    plan.flows
        .iter()
        .map(|flow| {
            state
                .double_at(flow.estimated_value_index)
                .map_err(|err| SimulationError::at(flow.object_id, err))
        })
        .collect()
}

/// Scales outflows down so that no non-negative stock is drained below
/// zero within one step.
fn scale_flows(
    plan: &SimulationPlan,
    state: &SimulationState,
    scaling: FlowScaling,
    rates: &mut [f64],
) -> Result<(), SimulationError> {
    for stock in &plan.stocks {
        if stock.allows_negative || stock.outflows.is_empty() {
            continue;
        }
        let current = state
            .double_at(stock.variable_index)
            .map_err(|err| SimulationError::at(stock.object_id, err))?;
        let outflow_total: f64 = stock.outflows.iter().map(|&i| rates[i]).sum();
        if outflow_total <= 0.0 {
            continue;
        }

        let scale = match scaling {
            FlowScaling::OutflowFirst => {
                if outflow_total > current {
                    (current / outflow_total).clamp(0.0, 1.0)
                } else {
                    1.0
                }
            }
            FlowScaling::InflowFirst => {
                let inflow_total: f64 = stock.inflows.iter().map(|&i| rates[i]).sum();
                if current + inflow_total < outflow_total {
                    ((current + inflow_total) / outflow_total).clamp(0.0, 1.0)
                } else {
                    1.0
                }
            }
        };

        if scale < 1.0 {
            for &i in &stock.outflows {
                rates[i] *= scale;
            }
        }
    }
    Ok(())
}

fn stock_deltas(
    plan: &SimulationPlan,
    state: &SimulationState,
    rates: &[f64],
) -> Result<Vec<f64>, SimulationError> {
    let dt = state.time_delta;
    plan.stocks
        .iter()
        .map(|stock| {
            let inflow: f64 = stock.inflows.iter().map(|&i| rates[i]).sum();
            let outflow: f64 = stock.outflows.iter().map(|&i| rates[i]).sum();
            let mut delta = (inflow - outflow) * dt;
            if !stock.allows_negative {
                let current = state
                    .double_at(stock.variable_index)
                    .map_err(|err| SimulationError::at(stock.object_id, err))?;
                delta = delta.max(-current);
            }
            Ok(delta)
        })
        .collect()
}

pub(crate) fn compute_stage(
    plan: &SimulationPlan,
    state: &SimulationState,
    scaling: FlowScaling,
) -> Result<StageOutcome, SimulationError> {
    let mut rates = flow_estimates(plan, state)?;
    scale_flows(plan, state, scaling, &mut rates)?;
    let deltas = stock_deltas(plan, state, &rates)?;
    Ok(StageOutcome {
        deltas,
        adjusted: rates,
    })
}

fn apply(
    plan: &SimulationPlan,
    state: &mut SimulationState,
    outcome: &StageOutcome,
) -> Result<(), SimulationError> {
    for (stock, delta) in plan.stocks.iter().zip(outcome.deltas.iter()) {
        let current = state
            .double_at(stock.variable_index)
            .map_err(|err| SimulationError::at(stock.object_id, err))?;
        state.values[stock.variable_index] = Variant::Double(current + delta);
    }
    for (flow, rate) in plan.flows.iter().zip(outcome.adjusted.iter()) {
        state.values[flow.adjusted_value_index] = Variant::Double(*rate);
    }
    Ok(())
}

/// Forward Euler: one stage over the flow rates carried in the state,
/// which were evaluated at the previous step's stocks.
pub(crate) fn euler(
    plan: &SimulationPlan,
    next: &mut SimulationState,
    scaling: FlowScaling,
) -> Result<(), SimulationError> {
    let outcome = compute_stage(plan, next, scaling)?;
    apply(plan, next, &outcome)
}

const RK4_WEIGHTS: [f64; 4] = [1.0, 2.0, 2.0, 1.0];

/// Classical Runge-Kutta 4.  Stage states are plain value copies of the
/// step's base state, so delay queues and smoothed values touched
/// during stage evaluation never leak back.  Non-negative clamping is
/// applied per stage; combining the stages can still undershoot, which
/// is why non-negative stocks are better simulated with Euler.
pub(crate) fn rk4(
    plan: &SimulationPlan,
    next: &mut SimulationState,
    scaling: FlowScaling,
) -> Result<(), SimulationError> {
    let dt = next.time_delta;
    let step_start = next.time - dt;
    let offsets = [0.0, 0.5 * dt, 0.5 * dt, dt];
    let factors = [0.0, 0.5, 0.5, 1.0];

    let base = next.clone();
    let mut stage_deltas: Vec<Vec<f64>> = Vec::with_capacity(4);
    let mut stage_adjusted: Vec<Vec<f64>> = Vec::with_capacity(4);

    for stage in 0..4 {
        let mut stage_state = base.clone();
        stage_state.time = step_start + offsets[stage];
        write_builtins(plan, &mut stage_state);

        if stage > 0 {
            let prev = &stage_deltas[stage - 1];
            for (stock, k) in plan.stocks.iter().zip(prev.iter()) {
                let current = stage_state
                    .double_at(stock.variable_index)
                    .map_err(|err| SimulationError::at(stock.object_id, err))?;
                stage_state.values[stock.variable_index] =
                    Variant::Double(current + factors[stage] * k);
            }
            update_derived(plan, &mut stage_state)?;
        }

        let outcome = compute_stage(plan, &stage_state, scaling)?;
        stage_deltas.push(outcome.deltas);
        stage_adjusted.push(outcome.adjusted);
    }

    let combined = StageOutcome {
        deltas: weighted_average(&stage_deltas, plan.stocks.len()),
        adjusted: weighted_average(&stage_adjusted, plan.flows.len()),
    };
    apply(plan, next, &combined)
}

fn weighted_average(stages: &[Vec<f64>], len: usize) -> Vec<f64> {
    (0..len)
        .map(|i| {
            stages
                .iter()
                .zip(RK4_WEIGHTS.iter())
                .map(|(stage, w)| w * stage[i])
                .sum::<f64>()
                / 6.0
        })
        .collect()
}
