//! Graph assembler
//!
//! Helpers for building replacement subgraphs during reduction. The assembler
//! tracks a current effect and control position and threads every inserted
//! memory operation through the effect chain in execution order; dropping an
//! edge here would let a later pass reorder observable operations.

use super::graph::{Graph, NodeId};
use super::op::{
    BranchHint, Constant, DeoptReason, FieldAccess, GuardType, NumberBinop, NumberHint, NumberUnop,
    ObjectIs, Opcode,
};
use crate::jit::feedback::{ElementsKind, FeedbackSource, ShapeId};

/// Handles for an open loop under construction
#[derive(Debug, Clone, Copy)]
pub struct LoopState {
    pub header: NodeId,
    pub effect_phi: NodeId,
    /// Induction-variable phi
    pub value_phi: NodeId,
}

/// Builder that threads effect/control while emitting nodes
pub struct GraphAssembler<'a> {
    graph: &'a mut Graph,
    effect: NodeId,
    control: NodeId,
}

impl<'a> GraphAssembler<'a> {
    pub fn new(graph: &'a mut Graph, effect: NodeId, control: NodeId) -> Self {
        GraphAssembler {
            graph,
            effect,
            control,
        }
    }

    pub fn effect(&self) -> NodeId {
        self.effect
    }

    pub fn control(&self) -> NodeId {
        self.control
    }

    pub fn set_effect(&mut self, effect: NodeId) {
        self.effect = effect;
    }

    pub fn set_control(&mut self, control: NodeId) {
        self.control = control;
    }

    pub fn graph(&mut self) -> &mut Graph {
        self.graph
    }

    // ===== Constants =====

    pub fn undefined(&mut self) -> NodeId {
        self.graph.undefined()
    }

    pub fn number(&mut self, value: f64) -> NodeId {
        self.graph.number(value)
    }

    pub fn zero(&mut self) -> NodeId {
        self.graph.zero()
    }

    pub fn one(&mut self) -> NodeId {
        self.graph.one()
    }

    pub fn constant(&mut self, c: Constant) -> NodeId {
        self.graph.constant(c)
    }

    // ===== Pure nodes =====

    pub fn pure1(&mut self, op: Opcode, a: NodeId) -> NodeId {
        self.graph.add(op, &[a], &[], &[])
    }

    pub fn pure2(&mut self, op: Opcode, a: NodeId, b: NodeId) -> NodeId {
        self.graph.add(op, &[a, b], &[], &[])
    }

    pub fn number_unop(&mut self, op: NumberUnop, a: NodeId) -> NodeId {
        self.pure1(Opcode::NumberUnary(op), a)
    }

    pub fn number_binop(&mut self, op: NumberBinop, a: NodeId, b: NodeId) -> NodeId {
        self.pure2(Opcode::NumberBinary(op), a, b)
    }

    pub fn number_add(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.number_binop(NumberBinop::Add, a, b)
    }

    pub fn number_subtract(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.number_binop(NumberBinop::Subtract, a, b)
    }

    pub fn number_min(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.number_binop(NumberBinop::Min, a, b)
    }

    pub fn number_max(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.number_binop(NumberBinop::Max, a, b)
    }

    pub fn number_equal(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.pure2(Opcode::NumberEqual, a, b)
    }

    pub fn number_less_than(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.pure2(Opcode::NumberLessThan, a, b)
    }

    pub fn reference_equal(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.pure2(Opcode::ReferenceEqual, a, b)
    }

    pub fn object_is(&mut self, predicate: ObjectIs, a: NodeId) -> NodeId {
        self.pure1(Opcode::ObjectIs(predicate), a)
    }

    /// Branchless two-way choice on a boolean
    pub fn select(
        &mut self,
        hint: BranchHint,
        cond: NodeId,
        vtrue: NodeId,
        vfalse: NodeId,
    ) -> NodeId {
        self.graph
            .add(Opcode::Select(hint), &[cond, vtrue, vfalse], &[], &[])
    }

    // ===== Effectful nodes =====

    /// Emit an operation onto the effect chain at the current control
    pub fn effectful(&mut self, op: Opcode, values: &[NodeId]) -> NodeId {
        let effect = self.effect;
        let control = self.control;
        let node = self.graph.add(op, values, &[effect], &[control]);
        self.effect = node;
        node
    }

    /// Emit an operation that also produces control (calls)
    pub fn controlling(&mut self, op: Opcode, values: &[NodeId]) -> NodeId {
        let node = self.effectful(op, values);
        self.control = node;
        node
    }

    pub fn speculative_to_number(&mut self, input: NodeId, feedback: Option<FeedbackSource>) -> NodeId {
        self.effectful(
            Opcode::SpeculativeToNumber {
                hint: NumberHint::NumberOrOddball,
                feedback,
            },
            &[input],
        )
    }

    pub fn check_string(&mut self, input: NodeId, feedback: Option<FeedbackSource>) -> NodeId {
        self.effectful(Opcode::CheckString(feedback), &[input])
    }

    pub fn check_smi(&mut self, input: NodeId, feedback: Option<FeedbackSource>) -> NodeId {
        self.effectful(Opcode::CheckSmi(feedback), &[input])
    }

    pub fn check_number(&mut self, input: NodeId, feedback: Option<FeedbackSource>) -> NodeId {
        self.effectful(Opcode::CheckNumber(feedback), &[input])
    }

    /// Deoptimize unless `index < length`; returns the checked index
    pub fn check_bounds(
        &mut self,
        index: NodeId,
        length: NodeId,
        feedback: Option<FeedbackSource>,
    ) -> NodeId {
        self.effectful(Opcode::CheckBounds(feedback), &[index, length])
    }

    pub fn check_shapes(
        &mut self,
        receiver: NodeId,
        shapes: Vec<ShapeId>,
        feedback: Option<FeedbackSource>,
    ) -> NodeId {
        self.effectful(Opcode::CheckShapes { shapes, feedback }, &[receiver])
    }

    /// Deoptimize with `reason` unless `cond` holds
    pub fn check_if(
        &mut self,
        cond: NodeId,
        reason: DeoptReason,
        feedback: Option<FeedbackSource>,
    ) -> NodeId {
        self.effectful(Opcode::CheckIf { reason, feedback }, &[cond])
    }

    pub fn type_guard(&mut self, guard: GuardType, value: NodeId) -> NodeId {
        self.effectful(Opcode::TypeGuard(guard), &[value])
    }

    pub fn load_field(&mut self, access: FieldAccess, object: NodeId) -> NodeId {
        self.effectful(Opcode::LoadField(access), &[object])
    }

    pub fn store_field(&mut self, access: FieldAccess, object: NodeId, value: NodeId) -> NodeId {
        self.effectful(Opcode::StoreField(access), &[object, value])
    }

    pub fn load_element(&mut self, kind: ElementsKind, elements: NodeId, index: NodeId) -> NodeId {
        self.effectful(Opcode::LoadElement(kind), &[elements, index])
    }

    pub fn store_element(
        &mut self,
        kind: ElementsKind,
        elements: NodeId,
        index: NodeId,
        value: NodeId,
    ) -> NodeId {
        self.effectful(Opcode::StoreElement(kind), &[elements, index, value])
    }

    /// Emit a Checkpoint carrying `frame_state` at the current position
    pub fn checkpoint(&mut self, frame_state: NodeId) -> NodeId {
        let effect = self.effect;
        let control = self.control;
        let node =
            self.graph
                .add_with_frame_state(Opcode::Checkpoint, &[], &[effect], &[control], frame_state);
        self.effect = node;
        node
    }

    // ===== Control construction =====

    /// Two-way branch; returns (if_true, if_false) projections.
    /// Leaves the current control on the branch; callers pick a side with
    /// `set_control`.
    pub fn branch(&mut self, cond: NodeId, hint: BranchHint) -> (NodeId, NodeId) {
        let control = self.control;
        let branch = self.graph.add(Opcode::Branch(hint), &[cond], &[], &[control]);
        let if_true = self.graph.add(Opcode::IfTrue, &[], &[], &[branch]);
        let if_false = self.graph.add(Opcode::IfFalse, &[], &[], &[branch]);
        (if_true, if_false)
    }

    pub fn merge2(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.graph.add(Opcode::Merge, &[], &[], &[a, b])
    }

    pub fn effect_phi2(&mut self, a: NodeId, b: NodeId, merge: NodeId) -> NodeId {
        self.graph.add(Opcode::EffectPhi, &[], &[a, b], &[merge])
    }

    pub fn phi2(&mut self, a: NodeId, b: NodeId, merge: NodeId) -> NodeId {
        self.graph.add(Opcode::Phi, &[a, b], &[], &[merge])
    }

    /// Open a two-predecessor loop at the current position.
    ///
    /// Both loop inputs start as the entry edges; `loop_end` patches the
    /// back edges. A Terminate node keeps the loop reachable from End. The
    /// returned value phi carries `initial` around the loop.
    pub fn loop_start(&mut self, initial: NodeId) -> LoopState {
        let entry_control = self.control;
        let entry_effect = self.effect;
        let header = self
            .graph
            .add(Opcode::Loop, &[], &[], &[entry_control, entry_control]);
        let effect_phi = self
            .graph
            .add(Opcode::EffectPhi, &[], &[entry_effect, entry_effect], &[header]);
        let terminate = self
            .graph
            .add(Opcode::Terminate, &[], &[effect_phi], &[header]);
        self.graph.merge_control_to_end(terminate);
        let value_phi = self
            .graph
            .add(Opcode::Phi, &[initial, initial], &[], &[header]);
        self.control = header;
        self.effect = effect_phi;
        LoopState {
            header,
            effect_phi,
            value_phi,
        }
    }

    /// Close a loop: wire the back edges for control, effect, and the
    /// induction variable.
    pub fn loop_end(&mut self, state: LoopState, next: NodeId, control: NodeId, effect: NodeId) {
        self.graph.node_mut(state.header).controls[1] = control;
        self.graph.node_mut(state.value_phi).values[1] = next;
        self.graph.node_mut(state.effect_phi).effects[1] = effect;
    }

    /// Add another value phi to an open loop (accumulators, output cursors)
    pub fn loop_phi(&mut self, state: &LoopState, initial: NodeId) -> NodeId {
        self.graph
            .add(Opcode::Phi, &[initial, initial], &[], &[state.header])
    }

    /// Patch the back edge of an extra loop phi
    pub fn set_phi_back_edge(&mut self, phi: NodeId, value: NodeId) {
        self.graph.node_mut(phi).values[1] = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jit::ir::graph::Graph;

    fn fresh() -> (Graph, NodeId, NodeId) {
        let graph = Graph::new();
        let start = graph.start();
        (graph, start, start)
    }

    #[test]
    fn test_effect_chain_threading() {
        let (mut graph, effect, control) = fresh();
        let mut asm = GraphAssembler::new(&mut graph, effect, control);

        let x = asm.number(1.0);
        let a = asm.speculative_to_number(x, None);
        let b = asm.check_smi(a, None);

        // b's effect input must be a; the chain is a total order.
        assert_eq!(asm.graph().node(b).effect_input(), Some(a));
        assert_eq!(asm.effect(), b);
    }

    #[test]
    fn test_branch_projections() {
        let (mut graph, effect, control) = fresh();
        let mut asm = GraphAssembler::new(&mut graph, effect, control);

        let cond = asm.graph().bool_constant(true);
        let (if_true, if_false) = asm.branch(cond, BranchHint::True);
        let t = asm.graph().node(if_true).control_input().unwrap();
        let f = asm.graph().node(if_false).control_input().unwrap();
        assert_eq!(t, f, "both projections hang off the same branch");
        assert!(matches!(asm.graph().op(t), Opcode::Branch(BranchHint::True)));
    }

    #[test]
    fn test_loop_wiring() {
        let (mut graph, effect, control) = fresh();
        let mut asm = GraphAssembler::new(&mut graph, effect, control);

        let zero = asm.zero();
        let state = asm.loop_start(zero);
        let one = asm.one();
        let next = asm.number_add(state.value_phi, one);
        let body_control = asm.control();
        let body_effect = asm.effect();
        asm.loop_end(state, next, body_control, body_effect);

        let header = asm.graph().node(state.header);
        assert_eq!(header.controls.len(), 2);
        assert_eq!(header.controls[1], body_control);
        let phi = asm.graph().node(state.value_phi);
        assert_eq!(phi.values, vec![zero, next]);
    }
}
