// Copyright 2025 The Flows Engine Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::ast::{bind_expr, BindingEnv, BoundVariable};
use crate::common::{canonicalize, EquationError, EquationErrorCode, Ident, Result};
use crate::frame::{DesignObject, ObjectId, ObjectType, Trait, ValidatedFrame};
use crate::gf::InterpolationMethod;
use crate::internal_err;
use crate::issues::{CompilerError, IssueCollection, IssueKind};
use crate::parser;
use crate::plan::{
    BoundBinding, BoundBuiltins, BoundChart, BoundFlow, BoundStock, BuiltinKind,
    ComputationalRepresentation, ObjectRole, SimulationObject, SimulationPlan, StateContent,
    StateVariable, RESERVED_NAMES, STEP_NAME, TIME_DELTA_NAME, TIME_NAME,
};
use crate::settings::SimulationSettings;
use crate::topo::{sort_by_dependency, DependencyEdge};
use crate::value::{AtomType, Point, ValueType, Variant};

/// Compiles a validated design into an immutable simulation plan,
/// accumulating user-facing issues along the way.  Compilation fails
/// with `CompilerError::Issues` iff any issue was recorded, and with
/// `CompilerError::Internal` when a precondition on the frame does not
/// hold.
pub struct Compiler<'a> {
    frame: &'a ValidatedFrame,
    state_variables: Vec<StateVariable>,
    name_index: HashMap<Ident, usize>,
    object_var: HashMap<ObjectId, usize>,
    objects: Vec<SimulationObject>,
    flows: Vec<BoundFlow>,
    stocks: Vec<BoundStock>,
    issues: IssueCollection,
    builtins: BoundBuiltins,
}

struct StateEnv<'a> {
    name_index: &'a HashMap<Ident, usize>,
    state_variables: &'a [StateVariable],
}

impl BindingEnv for StateEnv<'_> {
    fn resolve(&self, name: &str) -> Option<BoundVariable> {
        self.name_index.get(name).map(|&index| BoundVariable {
            index,
            value_type: self.state_variables[index].value_type,
        })
    }
}

pub fn compile(frame: &ValidatedFrame) -> std::result::Result<SimulationPlan, CompilerError> {
    Compiler::new(frame).compile()
}

impl<'a> Compiler<'a> {
    pub fn new(frame: &'a ValidatedFrame) -> Self {
        Compiler {
            frame,
            state_variables: vec![],
            name_index: HashMap::new(),
            object_var: HashMap::new(),
            objects: vec![],
            flows: vec![],
            stocks: vec![],
            issues: IssueCollection::new(),
            builtins: BoundBuiltins {
                step: 0,
                time: 0,
                time_delta: 0,
            },
        }
    }

    pub fn compile(mut self) -> std::result::Result<SimulationPlan, CompilerError> {
        let node_ids = self.gather_simulation_nodes();
        let dep_edges = self.gather_parameter_edges(&node_ids)?;

        let ordered = match sort_by_dependency(&node_ids, &dep_edges) {
            Ok(ordered) => ordered,
            Err(report) => {
                for &vertex in &report.vertices {
                    self.issues.push(vertex, IssueKind::ComputationCycle);
                }
                for &edge in &report.edges {
                    self.issues.push(edge, IssueKind::ComputationCycle);
                }
                return Err(CompilerError::Issues(self.issues));
            }
        };

        let names = self.resolve_names(&ordered)?;

        self.allocate_builtins();
        for &id in &ordered {
            self.compile_node(id, &names)?;
        }
        self.bind_flows(&ordered)?;
        self.bind_stocks(&ordered)?;
        let charts = self.bind_charts()?;
        let value_bindings = self.bind_value_bindings()?;
        let settings = SimulationSettings::from_frame(self.frame)?;

        if !self.issues.is_empty() {
            return Err(CompilerError::Issues(self.issues));
        }

        Ok(SimulationPlan::new(
            self.objects,
            self.state_variables,
            self.builtins,
            self.stocks,
            self.flows,
            charts,
            value_bindings,
            settings,
        ))
    }

    fn alloc(&mut self, content: StateContent, value_type: ValueType, name: Ident) -> usize {
        let index = self.state_variables.len();
        self.state_variables.push(StateVariable {
            index,
            content,
            value_type,
            name: name.clone(),
        });
        self.name_index.insert(name, index);
        index
    }

    fn gather_simulation_nodes(&self) -> Vec<ObjectId> {
        let mut ids: BTreeSet<ObjectId> = BTreeSet::new();
        ids.extend(self.frame.filter(ObjectType::Stock).map(|o| o.id));
        ids.extend(self.frame.filter(ObjectType::FlowRate).map(|o| o.id));
        ids.extend(self.frame.filter_trait(Trait::Auxiliary).map(|o| o.id));
        ids.into_iter().collect()
    }

    fn gather_parameter_edges(&self, node_ids: &[ObjectId]) -> Result<Vec<DependencyEdge>> {
        let nodes: HashSet<ObjectId> = node_ids.iter().copied().collect();
        let mut edges = vec![];
        for edge in self.frame.filter(ObjectType::Parameter) {
            let (origin, target) = match (edge.origin(), edge.target()) {
                (Some(origin), Some(target)) => (origin, target),
                _ => {
                    return internal_err!(StructureTypeMismatch, format!("{} is not an edge", edge.id))
                }
            };
            if nodes.contains(&origin) && nodes.contains(&target) {
                edges.push(DependencyEdge {
                    edge_id: edge.id,
                    origin,
                    target,
                });
            }
        }
        Ok(edges)
    }

    /// Trims and canonicalizes every node name, emitting `EmptyName`
    /// and `DuplicateName` issues.  Every node ends up with a name; a
    /// node whose name is unusable gets a synthetic one so later
    /// phases still have a slot to allocate.
    fn resolve_names(&mut self, ordered: &[ObjectId]) -> Result<HashMap<ObjectId, Ident>> {
        let mut owners: BTreeMap<Ident, Vec<ObjectId>> = BTreeMap::new();
        let mut names: HashMap<ObjectId, Ident> = HashMap::new();

        for &id in ordered {
            let object = self.frame.object(id)?;
            let raw = match object.attribute("name") {
                Some(value) => match value.as_str() {
                    Ok(raw) => raw,
                    Err(_) => {
                        return internal_err!(
                            AttributeExpectationFailure,
                            format!("name of {}", id)
                        )
                    }
                },
                None => {
                    return internal_err!(AttributeExpectationFailure, format!("name of {}", id))
                }
            };
            let name = canonicalize(raw);
            if name.is_empty() {
                self.issues.push(id, IssueKind::EmptyName);
                names.insert(id, synthetic_name(id));
                continue;
            }
            owners.entry(name).or_default().push(id);
        }

        for (name, ids) in owners {
            let reserved = RESERVED_NAMES.contains(&name.as_str());
            if ids.len() > 1 || reserved {
                for &id in &ids {
                    self.issues.push(id, IssueKind::DuplicateName(name.clone()));
                }
            }
            for (i, &id) in ids.iter().enumerate() {
                // the first owner keeps the name so dependents still
                // resolve while we keep collecting issues
                if i == 0 && !reserved {
                    names.insert(id, name.clone());
                } else {
                    names.insert(id, synthetic_name(id));
                }
            }
        }

        Ok(names)
    }

    fn allocate_builtins(&mut self) {
        let time = self.alloc(
            StateContent::Builtin(BuiltinKind::Time),
            ValueType::Atom(AtomType::Double),
            TIME_NAME.to_string(),
        );
        let time_delta = self.alloc(
            StateContent::Builtin(BuiltinKind::TimeDelta),
            ValueType::Atom(AtomType::Double),
            TIME_DELTA_NAME.to_string(),
        );
        let step = self.alloc(
            StateContent::Builtin(BuiltinKind::Step),
            ValueType::Atom(AtomType::Int),
            STEP_NAME.to_string(),
        );
        self.builtins = BoundBuiltins {
            step,
            time,
            time_delta,
        };
    }

    fn compile_node(&mut self, id: ObjectId, names: &HashMap<ObjectId, Ident>) -> Result<()> {
        let object = self.frame.object(id)?;
        let name = names
            .get(&id)
            .cloned()
            .unwrap_or_else(|| synthetic_name(id));

        let role = match object.object_type {
            ObjectType::Stock => ObjectRole::Stock,
            ObjectType::FlowRate => ObjectRole::Flow,
            _ => ObjectRole::Auxiliary,
        };

        let computation = match object.object_type {
            ObjectType::Stock | ObjectType::FlowRate | ObjectType::Auxiliary => {
                self.compile_formula(object)?
            }
            ObjectType::GraphicalFunction => self.compile_graphical(object)?,
            ObjectType::Delay => self.compile_delay(object)?,
            ObjectType::Smooth => self.compile_smooth(object)?,
            other => {
                return internal_err!(
                    StructureTypeMismatch,
                    format!("{} ({:?}) is not a simulation node", id, other)
                )
            }
        };

        // stocks integrate and flows are rates; both are continuous
        // regardless of how their formula is written
        let computation = match computation {
            Some(c)
                if matches!(role, ObjectRole::Stock | ObjectRole::Flow)
                    && !c.value_type().is_numeric() =>
            {
                self.issues.push(
                    id,
                    IssueKind::ExpressionError(EquationError {
                        start: 0,
                        end: 0,
                        code: EquationErrorCode::TypeMismatch,
                    }),
                );
                None
            }
            other => other,
        };

        match computation {
            Some(computation) => {
                let value_type = match role {
                    ObjectRole::Stock | ObjectRole::Flow => ValueType::Atom(AtomType::Double),
                    ObjectRole::Auxiliary => computation.value_type(),
                };
                let variable_index = self.alloc(StateContent::Object(id), value_type, name.clone());
                self.object_var.insert(id, variable_index);
                self.objects.push(SimulationObject {
                    object_id: id,
                    role,
                    variable_index,
                    value_type,
                    computation,
                    name,
                });
            }
            None => {
                // this object has issues; allocate a placeholder slot
                // so downstream references still bind while we keep
                // collecting diagnostics
                let variable_index = self.alloc(
                    StateContent::Object(id),
                    ValueType::Atom(AtomType::Double),
                    name,
                );
                self.object_var.insert(id, variable_index);
            }
        }

        Ok(())
    }

    fn compile_formula(
        &mut self,
        object: &DesignObject,
    ) -> Result<Option<ComputationalRepresentation>> {
        let id = object.id;
        let formula = match object.attribute("formula") {
            Some(value) => match value.as_str() {
                Ok(formula) => formula.to_string(),
                Err(_) => {
                    return internal_err!(
                        AttributeExpectationFailure,
                        format!("formula of {}", id)
                    )
                }
            },
            None => {
                return internal_err!(AttributeExpectationFailure, format!("formula of {}", id))
            }
        };

        let expr = match parser::parse(&formula) {
            Ok(expr) => expr,
            Err(err) => {
                self.issues.push(id, IssueKind::ExpressionSyntaxError(err));
                return Ok(None);
            }
        };

        // the visual graph must mirror computational dependencies:
        // every referenced name needs a parameter connection, every
        // connection must be referenced
        let mut required: BTreeSet<Ident> = BTreeSet::new();
        expr.collect_vars(&mut required);
        for reserved in RESERVED_NAMES {
            required.remove(*reserved);
        }

        let mut unused: Vec<Ident> = vec![];
        let incoming: Vec<ObjectId> = self
            .frame
            .incoming(id, ObjectType::Parameter)
            .filter_map(|e| e.origin())
            .collect();
        for origin in incoming {
            let origin_name = self.node_name(origin)?;
            if !required.remove(&origin_name) {
                unused.push(origin_name);
            }
        }

        let missing = !required.is_empty();
        for name in required {
            self.issues.push(id, IssueKind::UnknownParameter(name));
        }
        for name in unused {
            self.issues.push(id, IssueKind::UnusedInput(name));
        }
        if missing {
            return Ok(None);
        }

        let bound = {
            let env = StateEnv {
                name_index: &self.name_index,
                state_variables: &self.state_variables,
            };
            bind_expr(&expr, &env)
        };
        match bound {
            Ok(bound) => Ok(Some(ComputationalRepresentation::Formula(bound))),
            Err(err) => {
                self.issues.push(id, IssueKind::ExpressionError(err));
                Ok(None)
            }
        }
    }

    fn compile_graphical(
        &mut self,
        object: &DesignObject,
    ) -> Result<Option<ComputationalRepresentation>> {
        let id = object.id;
        let points_attr = match object.attribute("graphical_function_points") {
            Some(value) => value,
            None => {
                return internal_err!(
                    AttributeExpectationFailure,
                    format!("graphical_function_points of {}", id)
                )
            }
        };
        let mut points: Vec<Point> = match points_attr.as_points() {
            Ok(points) => points.to_vec(),
            Err(_) => {
                return internal_err!(
                    AttributeExpectationFailure,
                    format!("graphical_function_points of {}", id)
                )
            }
        };
        if points.is_empty() {
            self.issues.push(
                id,
                IssueKind::InvalidAttributeValue {
                    attribute: "graphical_function_points",
                    value: points_attr.clone(),
                },
            );
            return Ok(None);
        }

        let method = match object.attribute("interpolation_method") {
            None => InterpolationMethod::default(),
            Some(value) => {
                let name = match value.as_str() {
                    Ok(name) => name,
                    Err(_) => {
                        return internal_err!(
                            AttributeExpectationFailure,
                            format!("interpolation_method of {}", id)
                        )
                    }
                };
                match InterpolationMethod::parse(name) {
                    Some(method) => method,
                    None => {
                        self.issues.push(
                            id,
                            IssueKind::InvalidAttributeValue {
                                attribute: "interpolation_method",
                                value: value.clone(),
                            },
                        );
                        return Ok(None);
                    }
                }
            }
        };

        let parameter = match self.sole_parameter(id) {
            Some(parameter) => parameter,
            None => {
                self.issues.push(id, IssueKind::MissingRequiredParameter);
                return Ok(None);
            }
        };
        let parameter_index = self.parameter_index(parameter)?;

        points.sort_by(|a, b| a.x.partial_cmp(&b.x).unwrap_or(std::cmp::Ordering::Equal));

        Ok(Some(ComputationalRepresentation::GraphicalFunction {
            points,
            method,
            parameter_index,
        }))
    }

    fn compile_delay(
        &mut self,
        object: &DesignObject,
    ) -> Result<Option<ComputationalRepresentation>> {
        let id = object.id;
        let duration_attr = match object.attribute("delay_duration") {
            Some(value) => value.clone(),
            None => {
                return internal_err!(
                    AttributeExpectationFailure,
                    format!("delay_duration of {}", id)
                )
            }
        };
        let steps = match duration_attr.as_int() {
            Ok(steps) if (0..=u32::MAX as i64).contains(&steps) => steps as u32,
            _ => {
                self.issues.push(
                    id,
                    IssueKind::InvalidAttributeValue {
                        attribute: "delay_duration",
                        value: duration_attr,
                    },
                );
                return Ok(None);
            }
        };

        let parameter = match self.sole_parameter(id) {
            Some(parameter) => parameter,
            None => {
                self.issues.push(id, IssueKind::MissingRequiredParameter);
                return Ok(None);
            }
        };
        let input_value_index = self.parameter_index(parameter)?;
        let parameter_type = self.state_variables[input_value_index].value_type;
        let atom = match parameter_type {
            ValueType::Atom(atom) => atom,
            array => {
                self.issues
                    .push(id, IssueKind::UnsupportedDelayValueType(array));
                return Ok(None);
            }
        };

        let initial_value = match object.attribute("initial_value") {
            None => None,
            Some(value) => match coerce_atom(value, atom) {
                Some(value) => Some(value),
                None => {
                    self.issues.push(
                        id,
                        IssueKind::InvalidAttributeValue {
                            attribute: "initial_value",
                            value: value.clone(),
                        },
                    );
                    return Ok(None);
                }
            },
        };

        let queue_index = self.alloc(
            StateContent::InternalState(id),
            ValueType::Array(atom),
            format!("delay_queue_{}", id.0),
        );
        let initial_value_index = self.alloc(
            StateContent::InternalState(id),
            ValueType::Atom(atom),
            format!("delay_init_{}", id.0),
        );

        Ok(Some(ComputationalRepresentation::Delay {
            steps,
            initial_value,
            value_type: atom,
            initial_value_index,
            queue_index,
            input_value_index,
        }))
    }

    fn compile_smooth(
        &mut self,
        object: &DesignObject,
    ) -> Result<Option<ComputationalRepresentation>> {
        let id = object.id;
        let window_attr = match object.attribute("window_time") {
            Some(value) => value.clone(),
            None => {
                return internal_err!(AttributeExpectationFailure, format!("window_time of {}", id))
            }
        };
        let window_time = match window_attr.as_double() {
            Ok(window_time) if window_time > 0.0 => window_time,
            // zero would divide away the smoothing factor; reject at
            // compile time rather than let inf/nan out of the kernel
            _ => {
                self.issues.push(
                    id,
                    IssueKind::InvalidAttributeValue {
                        attribute: "window_time",
                        value: window_attr,
                    },
                );
                return Ok(None);
            }
        };

        let parameter = match self.sole_parameter(id) {
            Some(parameter) => parameter,
            None => {
                self.issues.push(id, IssueKind::MissingRequiredParameter);
                return Ok(None);
            }
        };
        let input_value_index = self.parameter_index(parameter)?;
        let parameter_type = self.state_variables[input_value_index].value_type;
        if !parameter_type.is_atom() {
            self.issues
                .push(id, IssueKind::UnsupportedDelayValueType(parameter_type));
            return Ok(None);
        }

        let smooth_value_index = self.alloc(
            StateContent::InternalState(id),
            ValueType::Atom(AtomType::Double),
            format!("smooth_value_{}", id.0),
        );

        Ok(Some(ComputationalRepresentation::Smooth {
            window_time,
            smooth_value_index,
            input_value_index,
        }))
    }

    /// The unique incoming Parameter edge's origin, or `None` when the
    /// node has zero or several.
    fn sole_parameter(&self, id: ObjectId) -> Option<ObjectId> {
        let mut incoming = self.frame.incoming(id, ObjectType::Parameter);
        let first = incoming.next()?;
        if incoming.next().is_some() {
            return None;
        }
        first.origin()
    }

    fn parameter_index(&self, origin: ObjectId) -> Result<usize> {
        match self.object_var.get(&origin) {
            Some(&index) => Ok(index),
            None => internal_err!(ObjectNotFound, format!("parameter origin {}", origin)),
        }
    }

    fn node_name(&self, id: ObjectId) -> Result<Ident> {
        match self.frame.attribute(id, "name") {
            Some(value) => match value.as_str() {
                Ok(raw) => Ok(canonicalize(raw)),
                Err(_) => {
                    internal_err!(AttributeExpectationFailure, format!("name of {}", id))
                }
            },
            None => internal_err!(AttributeExpectationFailure, format!("name of {}", id)),
        }
    }

    fn bind_flows(&mut self, ordered: &[ObjectId]) -> Result<()> {
        for &id in ordered {
            let object = self.frame.object(id)?;
            if object.object_type != ObjectType::FlowRate {
                continue;
            }

            let priority = match object.attribute("priority") {
                Some(value) => match value.as_int() {
                    Ok(priority) => priority as i32,
                    Err(_) => {
                        return internal_err!(
                            AttributeExpectationFailure,
                            format!("priority of {}", id)
                        )
                    }
                },
                None => 0,
            };

            // several Flow edges on one side would be ambiguous; the
            // lowest-id edge wins
            let drains = match self.frame.incoming(id, ObjectType::Flow).next() {
                Some(edge) => edge.origin(),
                None => None,
            };
            let fills = match self.frame.outgoing(id, ObjectType::Flow).next() {
                Some(edge) => edge.target(),
                None => None,
            };
            for stock in [drains, fills].into_iter().flatten() {
                if self.frame.object(stock)?.object_type != ObjectType::Stock {
                    return internal_err!(
                        StructureTypeMismatch,
                        format!("{} is connected to non-stock {}", id, stock)
                    );
                }
            }

            let estimated_value_index = match self.object_var.get(&id) {
                Some(&index) => index,
                None => return internal_err!(ObjectNotFound, format!("flow {}", id)),
            };
            let value_type = self.state_variables[estimated_value_index].value_type;
            let adjusted_value_index = self.alloc(
                StateContent::AdjustedResult(id),
                value_type,
                format!("adjusted_flow_{}", id.0),
            );

            self.flows.push(BoundFlow {
                object_id: id,
                estimated_value_index,
                adjusted_value_index,
                priority,
                drains,
                fills,
            });
        }
        Ok(())
    }

    fn bind_stocks(&mut self, ordered: &[ObjectId]) -> Result<()> {
        for &id in ordered {
            let object = self.frame.object(id)?;
            if object.object_type != ObjectType::Stock {
                continue;
            }

            let allows_negative = match object.attribute("allows_negative") {
                Some(value) => match value.as_bool() {
                    Ok(allows_negative) => allows_negative,
                    Err(_) => {
                        return internal_err!(
                            AttributeExpectationFailure,
                            format!("allows_negative of {}", id)
                        )
                    }
                },
                None => {
                    return internal_err!(
                        AttributeExpectationFailure,
                        format!("allows_negative of {}", id)
                    )
                }
            };

            let inflows: Vec<usize> = self
                .flows
                .iter()
                .enumerate()
                .filter(|(_, f)| f.fills == Some(id))
                .map(|(i, _)| i)
                .collect();
            let mut outflows: Vec<usize> = self
                .flows
                .iter()
                .enumerate()
                .filter(|(_, f)| f.drains == Some(id))
                .map(|(i, _)| i)
                .collect();
            // stable: equal priorities keep their insertion order
            outflows.sort_by_key(|&i| self.flows[i].priority);

            let variable_index = match self.object_var.get(&id) {
                Some(&index) => index,
                None => return internal_err!(ObjectNotFound, format!("stock {}", id)),
            };

            self.stocks.push(BoundStock {
                object_id: id,
                variable_index,
                allows_negative,
                inflows,
                outflows,
            });
        }
        Ok(())
    }

    fn bind_charts(&mut self) -> Result<Vec<BoundChart>> {
        let mut charts = vec![];
        for chart in self.frame.filter(ObjectType::Chart) {
            let mut series = vec![];
            for edge in self.frame.outgoing(chart.id, ObjectType::ChartSeries) {
                let target = match edge.target() {
                    Some(target) => target,
                    None => {
                        return internal_err!(
                            StructureTypeMismatch,
                            format!("{} is not an edge", edge.id)
                        )
                    }
                };
                match self.object_var.get(&target) {
                    Some(&index) => series.push(index),
                    None => {
                        return internal_err!(
                            ObjectNotFound,
                            format!("chart series target {}", target)
                        )
                    }
                }
            }
            charts.push(BoundChart {
                chart_id: chart.id,
                series,
            });
        }
        Ok(charts)
    }

    fn bind_value_bindings(&mut self) -> Result<Vec<BoundBinding>> {
        let mut bindings = vec![];
        for edge in self.frame.filter(ObjectType::ValueBinding) {
            let (origin, target) = match (edge.origin(), edge.target()) {
                (Some(origin), Some(target)) => (origin, target),
                _ => {
                    return internal_err!(
                        StructureTypeMismatch,
                        format!("{} is not an edge", edge.id)
                    )
                }
            };
            let variable_index = match self.object_var.get(&target) {
                Some(&index) => index,
                None => {
                    return internal_err!(ObjectNotFound, format!("binding target {}", target))
                }
            };
            bindings.push(BoundBinding {
                binding_id: edge.id,
                origin,
                variable_index,
            });
        }
        Ok(bindings)
    }
}

fn synthetic_name(id: ObjectId) -> Ident {
    format!("__invalid_{}", id.0)
}

/// Accepts an attribute value for a slot of the given atom type,
/// promoting ints to doubles.
fn coerce_atom(value: &Variant, atom: AtomType) -> Option<Variant> {
    if value.value_type() == ValueType::Atom(atom) {
        return Some(value.clone());
    }
    if atom == AtomType::Double {
        if let Variant::Int(n) = value {
            return Some(Variant::Double(*n as f64));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;

    fn formula_node(frame: &mut Frame, object_type: ObjectType, name: &str, formula: &str) -> ObjectId {
        let id = frame.create_node(object_type, name);
        frame.set_attribute(id, "formula", Variant::String(formula.to_string()));
        id
    }

    fn issues_of(frame: Frame) -> IssueCollection {
        match compile(&frame.validated()) {
            Err(CompilerError::Issues(issues)) => issues,
            Err(other) => panic!("expected issues, got {:?}", other),
            Ok(_) => panic!("expected issues, compilation succeeded"),
        }
    }

    fn kinds_for(issues: &IssueCollection, id: ObjectId) -> Vec<IssueKind> {
        issues.for_object(id).iter().map(|i| i.kind.clone()).collect()
    }

    #[test]
    fn minimal_model_compiles() {
        let mut frame = Frame::new();
        let stock = formula_node(&mut frame, ObjectType::Stock, "water", "100");
        let flow = formula_node(&mut frame, ObjectType::FlowRate, "drain", "0.1 * water");
        frame.create_edge(ObjectType::Parameter, stock, flow);
        frame.create_edge(ObjectType::Flow, stock, flow);

        let plan = compile(&frame.validated()).unwrap();

        assert_eq!(2, plan.simulation_objects.len());
        // builtins + two primaries + one adjusted flow slot
        assert_eq!(6, plan.state_variables.len());
        assert_eq!(1, plan.stocks.len());
        assert_eq!(1, plan.flows.len());

        let stock_var = plan.variable_index(stock).unwrap();
        assert_eq!(Some(stock_var), plan.variable_named("water"));

        let bound_flow = &plan.flows[0];
        assert_ne!(bound_flow.estimated_value_index, bound_flow.adjusted_value_index);
        assert_eq!(Some(stock), bound_flow.drains);
        assert_eq!(None, bound_flow.fills);

        let bound_stock = &plan.stocks[0];
        assert!(!bound_stock.allows_negative);
        assert_eq!(vec![0], bound_stock.outflows);
        assert!(bound_stock.inflows.is_empty());
    }

    #[test]
    fn state_variable_indices_are_positions() {
        let mut frame = Frame::new();
        let a = formula_node(&mut frame, ObjectType::Auxiliary, "a", "1");
        let b = formula_node(&mut frame, ObjectType::Auxiliary, "b", "a + 1");
        frame.create_edge(ObjectType::Parameter, a, b);

        let plan = compile(&frame.validated()).unwrap();
        for (i, var) in plan.state_variables.iter().enumerate() {
            assert_eq!(i, var.index);
        }
        for object in &plan.simulation_objects {
            assert_eq!(
                Some(object.variable_index),
                plan.variable_index(object.object_id)
            );
        }
    }

    #[test]
    fn parameter_order_respected() {
        let mut frame = Frame::new();
        // create consumer first so id order disagrees with dep order
        let b = formula_node(&mut frame, ObjectType::Auxiliary, "b", "a * 2");
        let a = formula_node(&mut frame, ObjectType::Auxiliary, "a", "3");
        frame.create_edge(ObjectType::Parameter, a, b);

        let plan = compile(&frame.validated()).unwrap();
        let pos = |id: ObjectId| {
            plan.simulation_objects
                .iter()
                .position(|o| o.object_id == id)
                .unwrap()
        };
        assert!(pos(a) < pos(b));
    }

    #[test]
    fn duplicate_and_empty_names() {
        let mut frame = Frame::new();
        let first = formula_node(&mut frame, ObjectType::Auxiliary, "Fish", "1");
        let second = formula_node(&mut frame, ObjectType::Auxiliary, "fish ", "2");
        let blank = formula_node(&mut frame, ObjectType::Auxiliary, "   ", "3");

        let issues = issues_of(frame);
        assert_eq!(
            vec![IssueKind::DuplicateName("fish".to_string())],
            kinds_for(&issues, first)
        );
        assert_eq!(
            vec![IssueKind::DuplicateName("fish".to_string())],
            kinds_for(&issues, second)
        );
        assert_eq!(vec![IssueKind::EmptyName], kinds_for(&issues, blank));
    }

    #[test]
    fn reserved_names_rejected() {
        let mut frame = Frame::new();
        let node = formula_node(&mut frame, ObjectType::Auxiliary, "time", "1");
        let issues = issues_of(frame);
        assert_eq!(
            vec![IssueKind::DuplicateName("time".to_string())],
            kinds_for(&issues, node)
        );
    }

    #[test]
    fn unknown_and_unused_parameters() {
        let mut frame = Frame::new();
        let used = formula_node(&mut frame, ObjectType::Auxiliary, "used", "1");
        let unused = formula_node(&mut frame, ObjectType::Auxiliary, "unused", "2");
        let target = formula_node(&mut frame, ObjectType::Auxiliary, "target", "used + missing");
        frame.create_edge(ObjectType::Parameter, used, target);
        frame.create_edge(ObjectType::Parameter, unused, target);

        let issues = issues_of(frame);
        let kinds = kinds_for(&issues, target);
        assert!(kinds.contains(&IssueKind::UnknownParameter("missing".to_string())));
        assert!(kinds.contains(&IssueKind::UnusedInput("unused".to_string())));
    }

    #[test]
    fn builtins_need_no_edges() {
        let mut frame = Frame::new();
        formula_node(&mut frame, ObjectType::Auxiliary, "clock", "time + time_delta");
        let plan = compile(&frame.validated()).unwrap();
        assert_eq!(1, plan.simulation_objects.len());
    }

    #[test]
    fn syntax_error_reported_but_compilation_continues() {
        let mut frame = Frame::new();
        let bad = formula_node(&mut frame, ObjectType::Auxiliary, "bad", "1 +");
        let also_bad = formula_node(&mut frame, ObjectType::Auxiliary, "worse", "* 2");

        let issues = issues_of(frame);
        assert!(matches!(
            kinds_for(&issues, bad)[0],
            IssueKind::ExpressionSyntaxError(_)
        ));
        assert!(matches!(
            kinds_for(&issues, also_bad)[0],
            IssueKind::ExpressionSyntaxError(_)
        ));
    }

    #[test]
    fn cycle_detection() {
        let mut frame = Frame::new();
        let a = formula_node(&mut frame, ObjectType::Auxiliary, "a", "b + 1");
        let b = formula_node(&mut frame, ObjectType::Auxiliary, "b", "a + 1");
        let e1 = frame.create_edge(ObjectType::Parameter, a, b);
        let e2 = frame.create_edge(ObjectType::Parameter, b, a);

        let issues = issues_of(frame);
        for id in [a, b, e1, e2] {
            assert_eq!(vec![IssueKind::ComputationCycle], kinds_for(&issues, id));
        }
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let mut frame = Frame::new();
        let a = formula_node(&mut frame, ObjectType::Auxiliary, "a", "a + 1");
        let e = frame.create_edge(ObjectType::Parameter, a, a);

        let issues = issues_of(frame);
        assert_eq!(vec![IssueKind::ComputationCycle], kinds_for(&issues, a));
        assert_eq!(vec![IssueKind::ComputationCycle], kinds_for(&issues, e));
    }

    #[test]
    fn graphical_function_requires_parameter() {
        let mut frame = Frame::new();
        let gf = frame.create_node(ObjectType::GraphicalFunction, "curve");
        frame.set_attribute(
            gf,
            "graphical_function_points",
            Variant::PointArray(vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)]),
        );

        let issues = issues_of(frame);
        assert_eq!(
            vec![IssueKind::MissingRequiredParameter],
            kinds_for(&issues, gf)
        );
    }

    #[test]
    fn graphical_function_two_parameters_rejected() {
        let mut frame = Frame::new();
        let p1 = formula_node(&mut frame, ObjectType::Auxiliary, "p1", "1");
        let p2 = formula_node(&mut frame, ObjectType::Auxiliary, "p2", "2");
        let gf = frame.create_node(ObjectType::GraphicalFunction, "curve");
        frame.set_attribute(
            gf,
            "graphical_function_points",
            Variant::PointArray(vec![Point::new(0.0, 0.0)]),
        );
        frame.create_edge(ObjectType::Parameter, p1, gf);
        frame.create_edge(ObjectType::Parameter, p2, gf);

        let issues = issues_of(frame);
        assert_eq!(
            vec![IssueKind::MissingRequiredParameter],
            kinds_for(&issues, gf)
        );
    }

    #[test]
    fn negative_delay_duration_rejected() {
        let mut frame = Frame::new();
        let input = formula_node(&mut frame, ObjectType::Auxiliary, "input", "1");
        let delay = frame.create_node(ObjectType::Delay, "delayed");
        frame.set_attribute(delay, "delay_duration", Variant::Int(-1));
        frame.create_edge(ObjectType::Parameter, input, delay);

        let issues = issues_of(frame);
        assert!(matches!(
            kinds_for(&issues, delay)[0],
            IssueKind::InvalidAttributeValue {
                attribute: "delay_duration",
                ..
            }
        ));
    }

    #[test]
    fn delay_allocates_internal_slots() {
        let mut frame = Frame::new();
        let input = formula_node(&mut frame, ObjectType::Auxiliary, "input", "1");
        let delay = frame.create_node(ObjectType::Delay, "delayed");
        frame.set_attribute(delay, "delay_duration", Variant::Int(3));
        frame.create_edge(ObjectType::Parameter, input, delay);

        let plan = compile(&frame.validated()).unwrap();
        let object = plan.object(delay).unwrap();
        match &object.computation {
            ComputationalRepresentation::Delay {
                steps,
                queue_index,
                initial_value_index,
                input_value_index,
                ..
            } => {
                assert_eq!(3, *steps);
                assert_eq!(Some(*input_value_index), plan.variable_index(input));
                let queue_var = plan.state_variable(*queue_index).unwrap();
                assert!(queue_var.is_internal());
                assert_eq!(format!("delay_queue_{}", delay.0), queue_var.name);
                let init_var = plan.state_variable(*initial_value_index).unwrap();
                assert_eq!(format!("delay_init_{}", delay.0), init_var.name);
            }
            other => panic!("expected delay, got {:?}", other),
        }
    }

    #[test]
    fn smooth_zero_window_rejected() {
        let mut frame = Frame::new();
        let input = formula_node(&mut frame, ObjectType::Auxiliary, "input", "1");
        let smooth = frame.create_node(ObjectType::Smooth, "smoothed");
        frame.set_attribute(smooth, "window_time", Variant::Double(0.0));
        frame.create_edge(ObjectType::Parameter, input, smooth);

        let issues = issues_of(frame);
        assert!(matches!(
            kinds_for(&issues, smooth)[0],
            IssueKind::InvalidAttributeValue {
                attribute: "window_time",
                ..
            }
        ));
    }

    #[test]
    fn outflows_sorted_by_priority() {
        let mut frame = Frame::new();
        let stock = formula_node(&mut frame, ObjectType::Stock, "pool", "10");
        let f1 = formula_node(&mut frame, ObjectType::FlowRate, "low", "1");
        frame.set_attribute(f1, "priority", Variant::Int(5));
        let f2 = formula_node(&mut frame, ObjectType::FlowRate, "high", "1");
        frame.set_attribute(f2, "priority", Variant::Int(1));
        frame.create_edge(ObjectType::Flow, stock, f1);
        frame.create_edge(ObjectType::Flow, stock, f2);

        let plan = compile(&frame.validated()).unwrap();
        let bound_stock = &plan.stocks[0];
        let priorities: Vec<i32> = bound_stock
            .outflows
            .iter()
            .map(|&i| plan.flows[i].priority)
            .collect();
        assert_eq!(vec![1, 5], priorities);
    }

    #[test]
    fn charts_and_bindings_resolve() {
        let mut frame = Frame::new();
        let a = formula_node(&mut frame, ObjectType::Auxiliary, "a", "1");
        let chart = frame.create_node(ObjectType::Chart, "chart");
        frame.create_edge(ObjectType::ChartSeries, chart, a);
        let control = frame.create_node(ObjectType::Control, "knob");
        frame.create_edge(ObjectType::ValueBinding, control, a);

        let plan = compile(&frame.validated()).unwrap();
        assert_eq!(1, plan.charts.len());
        assert_eq!(plan.variable_index(a).unwrap(), plan.charts[0].series[0]);
        assert_eq!(1, plan.value_bindings.len());
        assert_eq!(
            plan.variable_index(a).unwrap(),
            plan.value_bindings[0].variable_index
        );
        assert_eq!(control, plan.value_bindings[0].origin);
    }

    #[test]
    fn compiling_twice_is_deterministic() {
        let mut frame = Frame::new();
        let stock = formula_node(&mut frame, ObjectType::Stock, "x", "100");
        let flow = formula_node(&mut frame, ObjectType::FlowRate, "r", "0.1 * x");
        frame.create_edge(ObjectType::Parameter, stock, flow);
        frame.create_edge(ObjectType::Flow, flow, stock);
        let frame = frame.validated();

        let plan_a = compile(&frame).unwrap();
        let plan_b = compile(&frame).unwrap();
        assert_eq!(plan_a.state_variables, plan_b.state_variables);
        assert_eq!(plan_a.simulation_objects, plan_b.simulation_objects);
        assert_eq!(plan_a.stocks, plan_b.stocks);
        assert_eq!(plan_a.flows, plan_b.flows);
    }
}
