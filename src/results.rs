// Copyright 2025 The Flows Engine Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use serde::{Deserialize, Serialize};

use crate::plan::SimulationPlan;
use crate::state::SimulationState;

/// The record of one run: every state from the initial one onward, on
/// a regular time grid.
#[derive(Clone, Debug, PartialEq)]
pub struct SimulationResult {
    pub initial_time: f64,
    pub time_delta: f64,
    pub states: Vec<SimulationState>,
}

/// A single variable's values over the run's time grid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegularTimeSeries {
    pub start_time: f64,
    pub time_delta: f64,
    pub data: Vec<f64>,
}

impl RegularTimeSeries {
    pub fn time_points(&self) -> impl Iterator<Item = f64> + '_ {
        let start = self.start_time;
        let dt = self.time_delta;
        (0..self.data.len()).map(move |i| start + i as f64 * dt)
    }
}

impl SimulationResult {
    pub fn count(&self) -> usize {
        self.states.len()
    }

    pub fn end_time(&self) -> f64 {
        let count = self.states.len();
        self.initial_time + count.saturating_sub(1) as f64 * self.time_delta
    }

    /// The variable's value at every recorded state.
    ///
    /// Precondition: the variable at `index` is coercible to a double
    /// in every state; panics otherwise.
    pub fn unsafe_time_series_at(&self, index: usize) -> Vec<f64> {
        self.states
            .iter()
            .map(|state| {
                state
                    .double_at(index)
                    .expect("time series variable coercible to double")
            })
            .collect()
    }

    pub fn regular_time_series(&self, index: usize) -> RegularTimeSeries {
        RegularTimeSeries {
            start_time: self.initial_time,
            time_delta: self.time_delta,
            data: self.unsafe_time_series_at(index),
        }
    }

    /// Debug dump, one row per state, columns in state-variable order.
    pub fn print_tsv(&self, plan: &SimulationPlan) {
        for (i, var) in plan.state_variables.iter().enumerate() {
            print!("{}", var.name);
            if i == plan.state_variables.len() - 1 {
                println!();
            } else {
                print!("\t");
            }
        }
        for state in &self.states {
            for (i, value) in state.values.iter().enumerate() {
                print!("{}", value);
                if i == state.values.len() - 1 {
                    println!();
                } else {
                    print!("\t");
                }
            }
        }
    }
}
