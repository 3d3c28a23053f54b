// Copyright 2025 The Flows Engine Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::sync::Arc;

use float_cmp::approx_eq;
use proptest::prelude::*;

use flows_engine::issues::IssueKind;
use flows_engine::plan::RESERVED_NAMES;
use flows_engine::settings::{FlowScaling, Stop};
use flows_engine::{
    compile, CompilerError, Frame, ObjectId, ObjectType, Point, ScenarioParameters,
    SimulationPlan, SimulationResult, SimulationSettings, Simulator, SolverType, Variant,
};

fn formula_node(frame: &mut Frame, object_type: ObjectType, name: &str, formula: &str) -> ObjectId {
    let id = frame.create_node(object_type, name);
    frame.set_attribute(id, "formula", Variant::String(formula.to_string()));
    id
}

fn euler_settings(steps: u64) -> SimulationSettings {
    SimulationSettings {
        stop: Stop::Steps(steps),
        ..SimulationSettings::default()
    }
}

fn run(plan: SimulationPlan, settings: SimulationSettings) -> SimulationResult {
    let mut simulator = Simulator::with_settings(Arc::new(plan), settings).unwrap();
    simulator.run(None).unwrap()
}

fn series(result: &SimulationResult, plan: &SimulationPlan, name: &str) -> Vec<f64> {
    result.unsafe_time_series_at(plan.variable_named(name).unwrap())
}

fn assert_series(expected: &[f64], actual: &[f64]) {
    assert_eq!(expected.len(), actual.len(), "series length");
    for (i, (e, a)) in expected.iter().zip(actual.iter()).enumerate() {
        assert!(
            approx_eq!(f64, *e, *a, epsilon = 1e-9),
            "at index {}: expected {}, got {}",
            i,
            e,
            a
        );
    }
}

#[test]
fn exponential_growth() {
    let mut frame = Frame::new();
    let stock = formula_node(&mut frame, ObjectType::Stock, "x", "100");
    let flow = formula_node(&mut frame, ObjectType::FlowRate, "r", "0.1 * x");
    frame.create_edge(ObjectType::Parameter, stock, flow);
    frame.create_edge(ObjectType::Flow, flow, stock);

    let plan = compile(&frame.validated()).unwrap();
    let result = run(plan.clone(), euler_settings(3));

    assert_series(&[100.0, 110.0, 121.0, 133.1], &series(&result, &plan, "x"));
    assert_eq!(3.0, result.end_time());
}

#[test]
fn two_stock_drain_with_clamping() {
    let mut frame = Frame::new();
    let a = formula_node(&mut frame, ObjectType::Stock, "a", "10");
    let b = formula_node(&mut frame, ObjectType::Stock, "b", "0");
    let f = formula_node(&mut frame, ObjectType::FlowRate, "f", "100");
    frame.create_edge(ObjectType::Flow, a, f);
    frame.create_edge(ObjectType::Flow, f, b);

    let plan = compile(&frame.validated()).unwrap();
    let result = run(plan.clone(), euler_settings(2));

    assert_series(&[10.0, 0.0, 0.0], &series(&result, &plan, "a"));
    assert_series(&[0.0, 10.0, 10.0], &series(&result, &plan, "b"));

    let adjusted_index = plan.flows[0].adjusted_value_index;
    let adjusted = result.unsafe_time_series_at(adjusted_index);
    assert_series(&[0.0, 10.0, 0.0], &adjusted);
}

fn graphical_frame(method: &str) -> (SimulationPlan, ObjectId) {
    let mut frame = Frame::new();
    let p = formula_node(&mut frame, ObjectType::Auxiliary, "p", "5");
    let gf = frame.create_node(ObjectType::GraphicalFunction, "curve");
    frame.set_attribute(
        gf,
        "graphical_function_points",
        Variant::PointArray(vec![Point::new(0.0, 0.0), Point::new(10.0, 100.0)]),
    );
    frame.set_attribute(
        gf,
        "interpolation_method",
        Variant::String(method.to_string()),
    );
    frame.create_edge(ObjectType::Parameter, p, gf);
    (compile(&frame.validated()).unwrap(), gf)
}

#[test]
fn graphical_function_methods() {
    let (plan, gf) = graphical_frame("linear");
    let result = run(plan.clone(), euler_settings(0));
    assert_eq!(
        50.0,
        result.states[0].double_at(plan.variable_index(gf).unwrap()).unwrap()
    );

    let (plan, gf) = graphical_frame("step");
    let result = run(plan.clone(), euler_settings(0));
    assert_eq!(
        0.0,
        result.states[0].double_at(plan.variable_index(gf).unwrap()).unwrap()
    );

    let (plan, gf) = graphical_frame("nearest");
    let result = run(plan.clone(), euler_settings(0));
    assert_eq!(
        0.0,
        result.states[0].double_at(plan.variable_index(gf).unwrap()).unwrap()
    );
}

#[test]
fn delay_line() {
    let mut frame = Frame::new();
    let input = formula_node(&mut frame, ObjectType::Auxiliary, "u", "simulation_step");
    let delay = frame.create_node(ObjectType::Delay, "delayed");
    frame.set_attribute(delay, "delay_duration", Variant::Int(2));
    frame.set_attribute(delay, "initial_value", Variant::Int(0));
    frame.create_edge(ObjectType::Parameter, input, delay);

    let plan = compile(&frame.validated()).unwrap();
    let result = run(plan.clone(), euler_settings(5));

    assert_series(
        &[0.0, 0.0, 0.0, 1.0, 2.0, 3.0],
        &series(&result, &plan, "delayed"),
    );
}

#[test]
fn delay_zero_is_identity() {
    let mut frame = Frame::new();
    let input = formula_node(&mut frame, ObjectType::Auxiliary, "u", "simulation_step");
    let delay = frame.create_node(ObjectType::Delay, "delayed");
    frame.set_attribute(delay, "delay_duration", Variant::Int(0));
    frame.create_edge(ObjectType::Parameter, input, delay);

    let plan = compile(&frame.validated()).unwrap();
    let result = run(plan.clone(), euler_settings(3));

    assert_series(&[0.0, 1.0, 2.0, 3.0], &series(&result, &plan, "delayed"));
}

#[test]
fn smooth_steady_state() {
    let mut frame = Frame::new();
    let input = formula_node(&mut frame, ObjectType::Auxiliary, "c", "10");
    let smooth = frame.create_node(ObjectType::Smooth, "smoothed");
    frame.set_attribute(smooth, "window_time", Variant::Double(2.0));
    frame.create_edge(ObjectType::Parameter, input, smooth);

    let plan = compile(&frame.validated()).unwrap();
    let result = run(plan.clone(), euler_settings(4));

    assert_series(
        &[10.0, 10.0, 10.0, 10.0, 10.0],
        &series(&result, &plan, "smoothed"),
    );
}

#[test]
fn smooth_tracks_step_input() {
    let mut frame = Frame::new();
    // 10 at step 0, 20 from step 1 onward
    let input = formula_node(
        &mut frame,
        ObjectType::Auxiliary,
        "c",
        "min(10 + 10 * simulation_step, 20)",
    );
    let smooth = frame.create_node(ObjectType::Smooth, "smoothed");
    frame.set_attribute(smooth, "window_time", Variant::Double(2.0));
    frame.create_edge(ObjectType::Parameter, input, smooth);

    let plan = compile(&frame.validated()).unwrap();
    let result = run(plan.clone(), euler_settings(3));

    assert_series(
        &[10.0, 15.0, 17.5, 18.75],
        &series(&result, &plan, "smoothed"),
    );
}

#[test]
fn cycle_detection_end_to_end() {
    let mut frame = Frame::new();
    let a = formula_node(&mut frame, ObjectType::Auxiliary, "a", "b + 1");
    let b = formula_node(&mut frame, ObjectType::Auxiliary, "b", "a + 1");
    let e1 = frame.create_edge(ObjectType::Parameter, a, b);
    let e2 = frame.create_edge(ObjectType::Parameter, b, a);

    match compile(&frame.validated()) {
        Err(CompilerError::Issues(issues)) => {
            for id in [a, b, e1, e2] {
                assert!(
                    issues
                        .for_object(id)
                        .iter()
                        .any(|i| i.kind == IssueKind::ComputationCycle),
                    "expected a cycle issue on {}",
                    id
                );
            }
        }
        other => panic!("expected issues, got {:?}", other.err()),
    }
}

#[test]
fn zero_steps_returns_only_the_initial_state() {
    let mut frame = Frame::new();
    formula_node(&mut frame, ObjectType::Auxiliary, "a", "42");
    let plan = compile(&frame.validated()).unwrap();

    let mut simulator =
        Simulator::with_settings(Arc::new(plan.clone()), euler_settings(0)).unwrap();
    let initial = simulator.initialize(None).unwrap().clone();
    let result = simulator.run(None).unwrap();

    assert_eq!(1, result.count());
    assert_eq!(initial, result.states[0]);
}

#[test]
fn scenario_overrides_replace_initial_values() {
    let mut frame = Frame::new();
    let stock = formula_node(&mut frame, ObjectType::Stock, "x", "100");
    let flow = formula_node(&mut frame, ObjectType::FlowRate, "r", "0.1 * x");
    frame.create_edge(ObjectType::Parameter, stock, flow);
    frame.create_edge(ObjectType::Flow, flow, stock);

    let plan = compile(&frame.validated()).unwrap();
    let mut overrides = ScenarioParameters::new();
    overrides.set(stock, Variant::Double(200.0));

    let mut simulator =
        Simulator::with_settings(Arc::new(plan.clone()), euler_settings(1)).unwrap();
    let result = simulator.run(Some(&overrides)).unwrap();

    assert_series(&[200.0, 220.0], &series(&result, &plan, "x"));
}

#[test]
fn plan_names_are_distinct_and_unreserved() {
    let mut frame = Frame::new();
    let stock = formula_node(&mut frame, ObjectType::Stock, "x", "100");
    let flow = formula_node(&mut frame, ObjectType::FlowRate, "r", "0.1 * x");
    let aux = formula_node(&mut frame, ObjectType::Auxiliary, "doubled", "2 * x");
    frame.create_edge(ObjectType::Parameter, stock, flow);
    frame.create_edge(ObjectType::Parameter, stock, aux);
    frame.create_edge(ObjectType::Flow, flow, stock);

    let plan = compile(&frame.validated()).unwrap();

    let mut names: Vec<&str> = plan
        .simulation_objects
        .iter()
        .map(|o| o.name.as_str())
        .collect();
    names.sort_unstable();
    let len_before = names.len();
    names.dedup();
    assert_eq!(len_before, names.len());
    for name in names {
        assert!(!RESERVED_NAMES.contains(&name));
    }

    // index round-trip
    for object in &plan.simulation_objects {
        assert_eq!(
            Some(object.variable_index),
            plan.variable_index(object.object_id)
        );
    }
}

#[test]
fn rk4_exponential_growth() {
    let mut frame = Frame::new();
    let stock = formula_node(&mut frame, ObjectType::Stock, "x", "100");
    frame.set_attribute(stock, "allows_negative", Variant::Bool(true));
    let flow = formula_node(&mut frame, ObjectType::FlowRate, "r", "0.1 * x");
    frame.create_edge(ObjectType::Parameter, stock, flow);
    frame.create_edge(ObjectType::Flow, flow, stock);

    let plan = compile(&frame.validated()).unwrap();
    let settings = SimulationSettings {
        stop: Stop::Steps(1),
        solver: SolverType::RungeKutta4,
        ..SimulationSettings::default()
    };
    let result = run(plan.clone(), settings);

    // one classical RK4 step of x' = 0.1 x from 100
    let x = series(&result, &plan, "x");
    assert!(approx_eq!(f64, 110.51708333333333, x[1], epsilon = 1e-9));
    // much closer to e^0.1 * 100 than Euler's 110
    assert!((x[1] - 110.51709180756477).abs() < 1e-4);
}

#[test]
fn conservation_between_stocks() {
    let mut frame = Frame::new();
    let a = formula_node(&mut frame, ObjectType::Stock, "a", "50");
    frame.set_attribute(a, "allows_negative", Variant::Bool(true));
    let b = formula_node(&mut frame, ObjectType::Stock, "b", "10");
    frame.set_attribute(b, "allows_negative", Variant::Bool(true));
    let f = formula_node(&mut frame, ObjectType::FlowRate, "f", "0.25 * a");
    frame.create_edge(ObjectType::Parameter, a, f);
    frame.create_edge(ObjectType::Flow, a, f);
    frame.create_edge(ObjectType::Flow, f, b);

    let plan = compile(&frame.validated()).unwrap();
    let result = run(plan.clone(), euler_settings(10));

    let a_series = series(&result, &plan, "a");
    let b_series = series(&result, &plan, "b");
    for (a_val, b_val) in a_series.iter().zip(b_series.iter()) {
        assert!(approx_eq!(f64, 60.0, a_val + b_val, epsilon = 1e-9));
    }
}

#[test]
fn priority_orders_competing_outflows() {
    let mut frame = Frame::new();
    let pool = formula_node(&mut frame, ObjectType::Stock, "pool", "10");
    let first = formula_node(&mut frame, ObjectType::FlowRate, "first", "8");
    frame.set_attribute(first, "priority", Variant::Int(1));
    let second = formula_node(&mut frame, ObjectType::FlowRate, "second", "8");
    frame.set_attribute(second, "priority", Variant::Int(2));
    frame.create_edge(ObjectType::Flow, pool, first);
    frame.create_edge(ObjectType::Flow, pool, second);

    let plan = compile(&frame.validated()).unwrap();
    let result = run(plan.clone(), euler_settings(1));

    // both outflows are scaled by the same factor (10 / 16)
    let first_adjusted = result.unsafe_time_series_at(plan.flows[0].adjusted_value_index);
    let second_adjusted = result.unsafe_time_series_at(plan.flows[1].adjusted_value_index);
    assert!(approx_eq!(f64, 5.0, first_adjusted[1], epsilon = 1e-9));
    assert!(approx_eq!(f64, 5.0, second_adjusted[1], epsilon = 1e-9));
    assert!(approx_eq!(
        f64,
        0.0,
        series(&result, &plan, "pool")[1],
        epsilon = 1e-9
    ));
}

#[test]
fn inflow_first_scaling_counts_inflows() {
    let mut frame = Frame::new();
    let pool = formula_node(&mut frame, ObjectType::Stock, "pool", "10");
    let refill = formula_node(&mut frame, ObjectType::FlowRate, "refill", "10");
    let drain = formula_node(&mut frame, ObjectType::FlowRate, "drain", "15");
    frame.create_edge(ObjectType::Flow, refill, pool);
    frame.create_edge(ObjectType::Flow, pool, drain);

    let plan = compile(&frame.validated()).unwrap();
    let settings = SimulationSettings {
        stop: Stop::Steps(1),
        flow_scaling: FlowScaling::InflowFirst,
        ..SimulationSettings::default()
    };
    let result = run(plan.clone(), settings);

    // current + inflow = 20 >= outflow 15, so no scaling applies
    let drain_index = plan
        .flows
        .iter()
        .find(|f| f.object_id == drain)
        .unwrap()
        .adjusted_value_index;
    assert!(approx_eq!(
        f64,
        15.0,
        result.unsafe_time_series_at(drain_index)[1],
        epsilon = 1e-9
    ));
    assert!(approx_eq!(
        f64,
        5.0,
        series(&result, &plan, "pool")[1],
        epsilon = 1e-9
    ));
}

proptest! {
    #[test]
    fn euler_keeps_non_negative_stocks_at_or_above_zero(
        initial in 0.0f64..100.0,
        rate in 0.0f64..50.0,
        steps in 1u64..8,
    ) {
        let mut frame = Frame::new();
        let stock = frame.create_node(ObjectType::Stock, "pool");
        frame.set_attribute(stock, "formula", Variant::String(format!("{}", initial)));
        let flow = frame.create_node(ObjectType::FlowRate, "drain");
        frame.set_attribute(flow, "formula", Variant::String(format!("{}", rate)));
        frame.create_edge(ObjectType::Flow, stock, flow);

        let plan = compile(&frame.validated()).unwrap();
        let result = run(plan.clone(), euler_settings(steps));

        for value in series(&result, &plan, "pool") {
            prop_assert!(value >= -1e-12, "stock went negative: {}", value);
        }
    }
}
