//! End-to-end reduction scenarios
//!
//! Each test builds a small graph the way the bytecode graph builder would,
//! runs the strength-reduction pass, and checks the observable contract:
//! structure of the replacement subgraph, registered dependencies, and, where
//! the result is a pure data subgraph, the concrete value it computes.

use onyx_engine::jit::builtins::{Builtin, FunctionTable};
use onyx_engine::jit::deps::{Dependency, ProtectorCell, ProtectorRegistry};
use onyx_engine::jit::feedback::{
    CallSiteFeedback, CalleeFeedback, ElementsKind, FeedbackVector, Shape, ShapeFeedback,
    ShapeTable,
};
use onyx_engine::jit::ir::graph::{Graph, NodeId};
use onyx_engine::jit::ir::op::{
    CallFrequency, CallParameters, Constant, FrameStateInfo, ObjectIs, Opcode,
};
use onyx_engine::jit::feedback::{ConvertReceiverMode, SpeculationMode};
use onyx_engine::jit::reduce::{CallReducer, Reduction, ReducerFlags, UnitContext};

/// One compilation unit under test
struct World {
    graph: Graph,
    functions: FunctionTable,
    shapes: ShapeTable,
    feedback: FeedbackVector,
    protectors: ProtectorRegistry,
    frame_state: NodeId,
    flags: ReducerFlags,
}

impl World {
    fn new() -> Self {
        let mut graph = Graph::new();
        let frame_state = graph.add(Opcode::FrameState(FrameStateInfo::Function), &[], &[], &[]);
        World {
            graph,
            functions: FunctionTable::new(),
            shapes: ShapeTable::new(),
            feedback: FeedbackVector::new(),
            protectors: ProtectorRegistry::new(),
            frame_state,
            flags: ReducerFlags::default(),
        }
    }

    fn builtin(&mut self, builtin: Builtin) -> NodeId {
        let id = self.functions.add_builtin(&format!("{:?}", builtin), builtin);
        self.graph.constant(Constant::Function(id))
    }

    fn default_params(&self) -> CallParameters {
        CallParameters {
            frequency: CallFrequency::unknown(),
            speculation: SpeculationMode::Allow,
            feedback: None,
            convert_mode: ConvertReceiverMode::Any,
        }
    }

    fn call(&mut self, target: NodeId, receiver: NodeId, args: &[NodeId]) -> NodeId {
        let params = self.default_params();
        self.call_with(target, receiver, args, params)
    }

    fn call_with(
        &mut self,
        target: NodeId,
        receiver: NodeId,
        args: &[NodeId],
        params: CallParameters,
    ) -> NodeId {
        let start = self.graph.start();
        let mut values = vec![target, receiver];
        values.extend_from_slice(args);
        let frame_state = self.frame_state;
        self.graph.add_with_frame_state(
            Opcode::Call(params),
            &values,
            &[start],
            &[start],
            frame_state,
        )
    }

    fn reduce(&mut self, node: NodeId) -> (Reduction, Vec<Dependency>) {
        let mut reducer = CallReducer::new(
            &mut self.graph,
            UnitContext {
                functions: &self.functions,
                shapes: &self.shapes,
                feedback: &self.feedback,
                protectors: &self.protectors,
            },
            self.flags,
        );
        let reduction = reducer.reduce(node).expect("no invariant violations");
        let (deps, _continuations) = reducer.into_parts();
        (reduction, deps.dependencies().to_vec())
    }
}

/// Evaluated value of a pure data subgraph
#[derive(Debug, Clone, PartialEq)]
enum Value {
    Number(f64),
    Bool(bool),
    Str(String),
    Undefined,
}

impl Value {
    fn as_number(&self) -> f64 {
        match self {
            Value::Number(n) => *n,
            other => panic!("expected number, got {:?}", other),
        }
    }
}

/// Interpret the pure slice of the graph: constants, numeric operators,
/// checks (which pass their input through when the invariant holds), selects,
/// string operators, and phis whose controlling branch is itself evaluable.
fn eval(graph: &Graph, node: NodeId) -> Value {
    match graph.op(node).clone() {
        Opcode::Constant(Constant::Number(n)) => Value::Number(n),
        Opcode::Constant(Constant::Bool(b)) => Value::Bool(b),
        Opcode::Constant(Constant::Str(s)) => Value::Str(s),
        Opcode::Constant(Constant::Undefined) => Value::Undefined,
        Opcode::NumberUnary(op) => {
            let x = eval(graph, graph.node(node).values[0]).as_number();
            Value::Number(op.eval(x))
        }
        Opcode::NumberBinary(op) => {
            let a = eval(graph, graph.node(node).values[0]).as_number();
            let b = eval(graph, graph.node(node).values[1]).as_number();
            Value::Number(op.eval(a, b))
        }
        Opcode::NumberEqual => {
            let a = eval(graph, graph.node(node).values[0]).as_number();
            let b = eval(graph, graph.node(node).values[1]).as_number();
            Value::Bool(a == b)
        }
        Opcode::NumberLessThan => {
            let a = eval(graph, graph.node(node).values[0]).as_number();
            let b = eval(graph, graph.node(node).values[1]).as_number();
            Value::Bool(a < b)
        }
        Opcode::NumberLessThanOrEqual => {
            let a = eval(graph, graph.node(node).values[0]).as_number();
            let b = eval(graph, graph.node(node).values[1]).as_number();
            Value::Bool(a <= b)
        }
        Opcode::ReferenceEqual => {
            let a = eval(graph, graph.node(node).values[0]);
            let b = eval(graph, graph.node(node).values[1]);
            Value::Bool(a == b)
        }
        Opcode::ObjectIs(ObjectIs::Receiver) => {
            let v = eval(graph, graph.node(node).values[0]);
            Value::Bool(!matches!(
                v,
                Value::Number(_) | Value::Bool(_) | Value::Str(_) | Value::Undefined
            ))
        }
        Opcode::Select(_) => {
            let inputs = graph.node(node).values.clone();
            match eval(graph, inputs[0]) {
                Value::Bool(true) => eval(graph, inputs[1]),
                Value::Bool(false) => eval(graph, inputs[2]),
                other => panic!("non-boolean select condition {:?}", other),
            }
        }
        // Passed checks and refinements forward their input unchanged.
        Opcode::CheckSmi(_)
        | Opcode::CheckNumber(_)
        | Opcode::CheckString(_)
        | Opcode::SpeculativeToNumber { .. }
        | Opcode::TypeGuard(_) => eval(graph, graph.node(node).values[0]),
        Opcode::StringLength => {
            let s = eval(graph, graph.node(node).values[0]);
            match s {
                Value::Str(s) => Value::Number(s.chars().count() as f64),
                other => panic!("expected string, got {:?}", other),
            }
        }
        Opcode::StringSubstring => {
            let inputs = graph.node(node).values.clone();
            let s = match eval(graph, inputs[0]) {
                Value::Str(s) => s,
                other => panic!("expected string, got {:?}", other),
            };
            let from = eval(graph, inputs[1]).as_number() as usize;
            let to = eval(graph, inputs[2]).as_number() as usize;
            Value::Str(s.chars().skip(from).take(to - from).collect())
        }
        // A two-input phi resolves through its merge when the controlling
        // branch condition is evaluable.
        Opcode::Phi => {
            let phi = graph.node(node).clone();
            let merge = phi.controls[0];
            let preds = graph.node(merge).controls.clone();
            assert_eq!(preds.len(), 2, "evaluator handles diamond phis only");
            for (i, &pred) in preds.iter().enumerate() {
                let pred_node = graph.node(pred);
                let taken = match pred_node.op {
                    Opcode::IfTrue => {
                        let branch = pred_node.control_input().expect("projection");
                        eval(graph, graph.node(branch).values[0]) == Value::Bool(true)
                    }
                    Opcode::IfFalse => {
                        let branch = pred_node.control_input().expect("projection");
                        eval(graph, graph.node(branch).values[0]) == Value::Bool(false)
                    }
                    _ => continue,
                };
                if taken {
                    return eval(graph, phi.values[i]);
                }
            }
            panic!("phi with no evaluable predecessor");
        }
        other => panic!("evaluator does not handle {:?}", other),
    }
}

// Scenario 1: [1,2,3].map(x => x*2) on a stable packed numeric receiver with
// no species override reduces to an allocating loop; removing the
// species-intact dependency forces NoChange.
#[test]
fn scenario_map_reduces_to_allocating_loop() {
    let mut world = World::new();
    let map = world.builtin(Builtin::ArrayMap);
    let shape = world.shapes.add(Shape::fast_array(ElementsKind::PackedSmi));
    let start = world.graph.start();
    let receiver = world.graph.add(Opcode::Parameter(1), &[], &[], &[start]);
    let callback = world.graph.add(Opcode::Parameter(2), &[], &[], &[start]);
    let source = world.feedback.add(CallSiteFeedback {
        callee: CalleeFeedback::None,
        shapes: ShapeFeedback::Reliable(vec![shape]),
    });
    let params = CallParameters {
        feedback: Some(source),
        ..world.default_params()
    };
    let node = world.call_with(map, receiver, &[callback], params);

    let (reduction, deps) = world.reduce(node);
    let Reduction::Replaced(value) = reduction else {
        panic!("expected replacement");
    };
    // The replacement allocates the output array and drives a counted loop.
    assert!(matches!(world.graph.op(value), Opcode::NewArray(_)));
    let ops: Vec<_> = world
        .graph
        .live_nodes()
        .into_iter()
        .map(|id| world.graph.op(id).clone())
        .collect();
    assert!(ops.iter().any(|op| matches!(op, Opcode::Loop)));
    assert!(ops.iter().any(|op| matches!(op, Opcode::StoreElement(_))));
    assert!(deps.contains(&Dependency::ProtectorIntact(ProtectorCell::ArraySpecies)));
    assert!(deps.contains(&Dependency::ProtectorIntact(ProtectorCell::NoElements)));
}

#[test]
fn scenario_map_without_species_protector_is_no_change() {
    let mut world = World::new();
    let map = world.builtin(Builtin::ArrayMap);
    let shape = world.shapes.add(Shape::fast_array(ElementsKind::PackedSmi));
    let start = world.graph.start();
    let receiver = world.graph.add(Opcode::Parameter(1), &[], &[], &[start]);
    let callback = world.graph.add(Opcode::Parameter(2), &[], &[], &[start]);
    let source = world.feedback.add(CallSiteFeedback {
        callee: CalleeFeedback::None,
        shapes: ShapeFeedback::Reliable(vec![shape]),
    });
    let params = CallParameters {
        feedback: Some(source),
        ..world.default_params()
    };
    let node = world.call_with(map, receiver, &[callback], params);

    world.protectors.invalidate(ProtectorCell::ArraySpecies);
    let (reduction, _) = world.reduce(node);
    assert_eq!(reduction, Reduction::NoChange);
}

// Scenario 2: String.prototype.substring.call("hello", 10, 2) clamps and
// swaps the range to [2, 5), producing "llo".
#[test]
fn scenario_substring_clamps_and_swaps() {
    let mut world = World::new();
    let substring = world.builtin(Builtin::StringPrototypeSubstring);
    let receiver = world.graph.constant(Constant::Str("hello".to_string()));
    let start = world.graph.number(10.0);
    let end = world.graph.number(2.0);
    let node = world.call(substring, receiver, &[start, end]);

    let (reduction, _) = world.reduce(node);
    let Reduction::Replaced(value) = reduction else {
        panic!("expected replacement");
    };
    assert!(matches!(world.graph.op(value), Opcode::StringSubstring));
    let from = world.graph.node(value).values[1];
    let to = world.graph.node(value).values[2];
    assert_eq!(eval(&world.graph, from).as_number(), 2.0);
    assert_eq!(eval(&world.graph, to).as_number(), 5.0);
    assert_eq!(eval(&world.graph, value), Value::Str("llo".to_string()));
}

// Scenario 3: Math.max() is constant -Infinity; Math.max(1, NaN, 3) is NaN.
#[test]
fn scenario_math_max_defaults_and_nan() {
    let mut world = World::new();
    let max = world.builtin(Builtin::MathMax);
    let receiver = world.graph.undefined();
    let empty = world.call(max, receiver, &[]);
    let (reduction, _) = world.reduce(empty);
    let Reduction::Replaced(value) = reduction else {
        panic!("expected replacement");
    };
    assert_eq!(
        world.graph.number_value(value),
        Some(f64::NEG_INFINITY)
    );

    let mut world = World::new();
    let max = world.builtin(Builtin::MathMax);
    let receiver = world.graph.undefined();
    let one = world.graph.number(1.0);
    let nan = world.graph.nan();
    let three = world.graph.number(3.0);
    let node = world.call(max, receiver, &[one, nan, three]);
    let (reduction, _) = world.reduce(node);
    let Reduction::Replaced(value) = reduction else {
        panic!("expected replacement");
    };
    assert!(eval(&world.graph, value).as_number().is_nan());
}

// Scenario 4: Reflect.get(5, "x") must throw a TypeError: the rewrite keeps
// an explicit branch whose non-object path constructs the TypeError and
// merges into the throw edge.
#[test]
fn scenario_reflect_get_on_non_object_throws() {
    let mut world = World::new();
    let reflect_get = world.builtin(Builtin::ReflectGet);
    let receiver = world.graph.undefined();
    let five = world.graph.number(5.0);
    let key = world.graph.constant(Constant::Str("x".to_string()));
    let node = world.call(reflect_get, receiver, &[five, key]);

    let (reduction, _) = world.reduce(node);
    assert!(reduction.changed());

    // Find the receiver check and confirm the TypeError path is the taken one
    // for a numeric target.
    let check = world
        .graph
        .live_nodes()
        .into_iter()
        .find(|&id| matches!(world.graph.op(id), Opcode::ObjectIs(ObjectIs::Receiver)))
        .expect("receiver check");
    assert_eq!(eval(&world.graph, check), Value::Bool(false));
    let ops: Vec<_> = world
        .graph
        .live_nodes()
        .into_iter()
        .map(|id| world.graph.op(id).clone())
        .collect();
    assert!(ops.iter().any(|op| matches!(
        op,
        Opcode::CallRuntime(onyx_engine::jit::ir::op::RuntimeFn::ThrowTypeError(
            onyx_engine::jit::ir::op::MessageTemplate::CalledOnNonObject
        ))
    )));
    assert!(ops.iter().any(|op| matches!(op, Opcode::Throw)));
}

// Scenario 5: fn.apply(thisArg) with a statically known fn and no argument
// array becomes a direct zero-argument call with receiver thisArg.
#[test]
fn scenario_apply_becomes_direct_call() {
    let mut world = World::new();
    let apply = world.builtin(Builtin::FunctionPrototypeApply);
    let fn_id = world.functions.add_function("callee", 0);
    let callee = world.graph.constant(Constant::Function(fn_id));
    let start = world.graph.start();
    let this_arg = world.graph.add(Opcode::Parameter(1), &[], &[], &[start]);
    let node = world.call(apply, callee, &[this_arg]);

    let (reduction, _) = world.reduce(node);
    assert!(matches!(reduction, Reduction::Changed(_)));
    // The node is now a direct call: target = callee, receiver = thisArg,
    // no further arguments.
    assert!(matches!(world.graph.op(node), Opcode::Call(_)));
    assert_eq!(world.graph.node(node).values, vec![callee, this_arg]);
}

// Scenario 6: a forEach whose callback shrinks the receiver mid-iteration
// must not read out of bounds: the loop bounds-checks against a length
// re-loaded after the callback's effects, every iteration.
#[test]
fn scenario_for_each_revalidates_bounds_each_iteration() {
    let mut world = World::new();
    let for_each = world.builtin(Builtin::ArrayForEach);
    let shape = world.shapes.add(Shape::fast_array(ElementsKind::Packed));
    let start = world.graph.start();
    let receiver = world.graph.add(Opcode::Parameter(1), &[], &[], &[start]);
    let callback = world.graph.add(Opcode::Parameter(2), &[], &[], &[start]);
    let source = world.feedback.add(CallSiteFeedback {
        callee: CalleeFeedback::None,
        shapes: ShapeFeedback::Reliable(vec![shape]),
    });
    let params = CallParameters {
        feedback: Some(source),
        ..world.default_params()
    };
    let node = world.call_with(for_each, receiver, &[callback], params);

    let (reduction, _) = world.reduce(node);
    assert!(reduction.changed());

    // The element access is bounds-checked against a fresh length load that
    // sits on the loop's effect chain (i.e. after the previous iteration's
    // callback), not against the pre-loop length.
    let check_bounds = world
        .graph
        .live_nodes()
        .into_iter()
        .find(|&id| matches!(world.graph.op(id), Opcode::CheckBounds(_)))
        .expect("in-loop bounds check");
    let length = world.graph.node(check_bounds).values[1];
    assert!(matches!(
        world.graph.op(length),
        Opcode::LoadField(onyx_engine::jit::ir::op::FieldAccess::ArrayLength(_))
    ));
    let mut current = world.graph.node(length).effect_input();
    let mut reaches_loop_effect_phi = false;
    while let Some(id) = current {
        if matches!(world.graph.op(id), Opcode::EffectPhi)
            && matches!(
                world
                    .graph
                    .node(id)
                    .control_input()
                    .map(|c| world.graph.op(c).clone()),
                Some(Opcode::Loop)
            )
        {
            reaches_loop_effect_phi = true;
            break;
        }
        current = world.graph.node(id).effect_input();
    }
    assert!(reaches_loop_effect_phi);

    // The per-iteration shape check keeps the element representation honest
    // even if the callback transitions the receiver.
    assert!(world.graph.live_nodes().into_iter().any(|id| {
        let n = world.graph.node(id);
        matches!(n.op, Opcode::CheckShapes { .. }) && n.values[0] == receiver
    }));
}

// Guard completeness: reducing under speculation keeps every assumption
// either guarded in the graph or registered as a dependency; committing the
// dependency set after a mid-compilation invalidation must fail.
#[test]
fn dependencies_commit_detects_invalidation() {
    let mut world = World::new();
    let for_each = world.builtin(Builtin::ArrayForEach);
    let shape = world.shapes.add(Shape::fast_array(ElementsKind::Packed));
    let start = world.graph.start();
    let receiver = world.graph.add(Opcode::Parameter(1), &[], &[], &[start]);
    let callback = world.graph.add(Opcode::Parameter(2), &[], &[], &[start]);
    let source = world.feedback.add(CallSiteFeedback {
        callee: CalleeFeedback::None,
        shapes: ShapeFeedback::Reliable(vec![shape]),
    });
    let params = CallParameters {
        feedback: Some(source),
        ..world.default_params()
    };
    let node = world.call_with(for_each, receiver, &[callback], params);

    let mut reducer = CallReducer::new(
        &mut world.graph,
        UnitContext {
            functions: &world.functions,
            shapes: &world.shapes,
            feedback: &world.feedback,
            protectors: &world.protectors,
        },
        world.flags,
    );
    assert!(reducer.reduce(node).unwrap().changed());
    let (deps, _) = reducer.into_parts();

    assert!(deps.commit(&world.shapes, &world.protectors).is_ok());
    world.protectors.invalidate(ProtectorCell::NoElements);
    assert!(deps.commit(&world.shapes, &world.protectors).is_err());
}

// A full-graph pass touches every call once and the waitlist sweep runs
// exactly once afterwards.
#[test]
fn reduce_graph_then_finalize() {
    let mut world = World::new();
    let max = world.builtin(Builtin::MathMax);
    let receiver = world.graph.undefined();
    let a = world.call(max, receiver, &[]);
    let b = world.call(max, receiver, &[]);

    let mut reducer = CallReducer::new(
        &mut world.graph,
        UnitContext {
            functions: &world.functions,
            shapes: &world.shapes,
            feedback: &world.feedback,
            protectors: &world.protectors,
        },
        world.flags,
    );
    let changed = reducer.reduce_graph().unwrap();
    assert_eq!(changed, 2);
    reducer.finalize().unwrap();
    drop(reducer);
    assert!(!world.graph.is_live(a));
    assert!(!world.graph.is_live(b));
}
