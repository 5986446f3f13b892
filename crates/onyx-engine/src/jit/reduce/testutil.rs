//! Shared fixtures for reducer tests

use crate::jit::builtins::{Builtin, FunctionId, FunctionTable};
use crate::jit::deps::ProtectorRegistry;
use crate::jit::feedback::{
    CallSiteFeedback, FeedbackSource, FeedbackVector, ShapeTable,
};
use crate::jit::ir::graph::{Graph, NodeId};
use crate::jit::ir::op::{
    CallFrequency, CallParameters, Constant, FrameStateInfo, Opcode,
};
use crate::jit::feedback::{ConvertReceiverMode, SpeculationMode};

use super::{CallReducer, ReducerFlags, UnitContext};

/// Owns one compilation unit's world: graph, tables, feedback, protectors
pub(crate) struct TestWorld {
    pub graph: Graph,
    pub functions: FunctionTable,
    pub shapes: ShapeTable,
    pub feedback: FeedbackVector,
    pub protectors: ProtectorRegistry,
    pub flags: ReducerFlags,
    pub frame_state: NodeId,
    effect: NodeId,
}

impl TestWorld {
    pub fn new() -> Self {
        let mut graph = Graph::new();
        let frame_state = graph.add(Opcode::FrameState(FrameStateInfo::Function), &[], &[], &[]);
        let effect = graph.start();
        TestWorld {
            graph,
            functions: FunctionTable::new(),
            shapes: ShapeTable::new(),
            feedback: FeedbackVector::new(),
            protectors: ProtectorRegistry::new(),
            flags: ReducerFlags::default(),
            frame_state,
            effect,
        }
    }

    pub fn reducer(&mut self) -> CallReducer<'_> {
        CallReducer::new(
            &mut self.graph,
            UnitContext {
                functions: &self.functions,
                shapes: &self.shapes,
                feedback: &self.feedback,
                protectors: &self.protectors,
            },
            self.flags,
        )
    }

    /// Register a builtin and return its function table id
    pub fn builtin_id(&mut self, builtin: Builtin) -> FunctionId {
        self.functions.add_builtin(&format!("{:?}", builtin), builtin)
    }

    /// Register a builtin and return a constant node referencing it
    pub fn builtin(&mut self, builtin: Builtin) -> NodeId {
        let id = self.builtin_id(builtin);
        self.graph.constant(Constant::Function(id))
    }

    pub fn constant_function(&mut self, id: FunctionId) -> NodeId {
        self.graph.constant(Constant::Function(id))
    }

    pub fn parameter(&mut self, index: u16) -> NodeId {
        let start = self.graph.start();
        self.graph.add(Opcode::Parameter(index), &[], &[], &[start])
    }

    pub fn feedback_slot(&mut self, site: CallSiteFeedback) -> FeedbackSource {
        self.feedback.add(site)
    }

    pub fn default_params(&self) -> CallParameters {
        CallParameters {
            frequency: CallFrequency::unknown(),
            speculation: SpeculationMode::Allow,
            feedback: None,
            convert_mode: ConvertReceiverMode::Any,
        }
    }

    /// Build a Call node threaded onto the unit's effect chain
    pub fn call_with(
        &mut self,
        target: NodeId,
        receiver: NodeId,
        args: &[NodeId],
        params: CallParameters,
    ) -> NodeId {
        let control = self.graph.start();
        let effect = self.effect;
        let mut values = vec![target, receiver];
        values.extend_from_slice(args);
        let frame_state = self.frame_state;
        let node = self.graph.add_with_frame_state(
            Opcode::Call(params),
            &values,
            &[effect],
            &[control],
            frame_state,
        );
        self.effect = node;
        node
    }

    pub fn call(&mut self, target: NodeId, receiver: NodeId, args: &[NodeId]) -> NodeId {
        let params = self.default_params();
        self.call_with(target, receiver, args, params)
    }

    pub fn call_node_no_speculation(&mut self, target: NodeId, args: &[NodeId]) -> NodeId {
        let receiver = self.graph.undefined();
        let params = CallParameters {
            speculation: SpeculationMode::Disallow,
            ..self.default_params()
        };
        self.call_with(target, receiver, args, params)
    }

    /// Attach an exception handler edge to a throwing node
    pub fn add_exception_handler(&mut self, call: NodeId) -> NodeId {
        self.graph
            .add(Opcode::IfException, &[], &[call], &[call])
    }
}

/// Call with an undefined receiver (free functions like Math.max)
pub(crate) fn call_node(world: &mut TestWorld, target: NodeId, args: &[NodeId]) -> NodeId {
    let receiver = world.graph.undefined();
    world.call(target, receiver, args)
}
