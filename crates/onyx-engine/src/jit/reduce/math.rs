//! Math, Number, and global numeric builtins
//!
//! The shared shape: convert each operand through a speculative-to-number
//! node carrying the call-site feedback (so a wrong-type deopt is attributed
//! precisely), then replace the call with the direct numeric operator.
//! Missing operands follow the specification defaults; the defaults are
//! materialized as constants, not guards.

use super::{CallReducer, ObjectIsKind, Reduction, ReduceError};
use crate::jit::ir::builder::GraphAssembler;
use crate::jit::ir::op::{
    CallParameters, NumberBinop, NumberUnop, ObjectIs, Opcode, StubCall,
};

impl<'a> CallReducer<'a> {
    /// Math.abs and the other one-argument Math functions.
    /// No argument means ToNumber(undefined), which is NaN for every one of
    /// these operators, so the call folds to the NaN constant.
    pub(crate) fn reduce_math_unary(
        &mut self,
        node: crate::jit::ir::NodeId,
        params: &CallParameters,
        op: NumberUnop,
    ) -> Result<Reduction, ReduceError> {
        if self.speculation_disallowed(params) {
            return Ok(Reduction::NoChange);
        }
        if self.argument_count(node) < 1 {
            let value = self.graph.nan();
            self.graph.replace_with_value(node, value, None, None);
            return Ok(Reduction::Replaced(value));
        }

        let input = self.argument(node, 0).expect("checked arity");
        let effect = self.effect_of(node);
        let control = self.control_of(node);
        let mut asm = GraphAssembler::new(self.graph, effect, control);
        let converted = asm.speculative_to_number(input, params.feedback);
        let value = asm.number_unop(op, converted);
        let effect = asm.effect();
        self.graph.replace_with_value(node, value, Some(effect), None);
        Ok(Reduction::Replaced(value))
    }

    /// Math.atan2 / Math.pow. A missing operand converts from undefined and
    /// poisons the result to NaN, same as the unary case.
    pub(crate) fn reduce_math_binary(
        &mut self,
        node: crate::jit::ir::NodeId,
        params: &CallParameters,
        op: NumberBinop,
    ) -> Result<Reduction, ReduceError> {
        if self.speculation_disallowed(params) {
            return Ok(Reduction::NoChange);
        }
        if self.argument_count(node) < 1 {
            let value = self.graph.nan();
            self.graph.replace_with_value(node, value, None, None);
            return Ok(Reduction::Replaced(value));
        }

        let left = self.argument(node, 0).expect("checked arity");
        let right = self.argument_or_undefined(node, 1);
        let effect = self.effect_of(node);
        let control = self.control_of(node);
        let mut asm = GraphAssembler::new(self.graph, effect, control);
        let left = asm.speculative_to_number(left, params.feedback);
        let right = asm.speculative_to_number(right, params.feedback);
        let value = asm.number_binop(op, left, right);
        let effect = asm.effect();
        self.graph.replace_with_value(node, value, Some(effect), None);
        Ok(Reduction::Replaced(value))
    }

    /// Math.imul: both operands through ToUint32, missing second operand
    /// defaults to 0, no arguments at all folds to 0.
    pub(crate) fn reduce_math_imul(
        &mut self,
        node: crate::jit::ir::NodeId,
        params: &CallParameters,
    ) -> Result<Reduction, ReduceError> {
        if self.speculation_disallowed(params) {
            return Ok(Reduction::NoChange);
        }
        if self.argument_count(node) < 1 {
            let value = self.graph.zero();
            self.graph.replace_with_value(node, value, None, None);
            return Ok(Reduction::Replaced(value));
        }

        let left = self.argument(node, 0).expect("checked arity");
        let right = match self.argument(node, 1) {
            Some(arg) => arg,
            None => self.graph.zero(),
        };
        let effect = self.effect_of(node);
        let control = self.control_of(node);
        let mut asm = GraphAssembler::new(self.graph, effect, control);
        let left = asm.speculative_to_number(left, params.feedback);
        let right = asm.speculative_to_number(right, params.feedback);
        let left = asm.number_unop(NumberUnop::ToUint32, left);
        let right = asm.number_unop(NumberUnop::ToUint32, right);
        let value = asm.number_binop(NumberBinop::Imul, left, right);
        let effect = asm.effect();
        self.graph.replace_with_value(node, value, Some(effect), None);
        Ok(Reduction::Replaced(value))
    }

    /// Math.clz32: ToUint32(undefined) is 0, which has 32 leading zeros.
    pub(crate) fn reduce_math_clz32(
        &mut self,
        node: crate::jit::ir::NodeId,
        params: &CallParameters,
    ) -> Result<Reduction, ReduceError> {
        if self.speculation_disallowed(params) {
            return Ok(Reduction::NoChange);
        }
        if self.argument_count(node) < 1 {
            let value = self.graph.number(32.0);
            self.graph.replace_with_value(node, value, None, None);
            return Ok(Reduction::Replaced(value));
        }

        let input = self.argument(node, 0).expect("checked arity");
        let effect = self.effect_of(node);
        let control = self.control_of(node);
        let mut asm = GraphAssembler::new(self.graph, effect, control);
        let converted = asm.speculative_to_number(input, params.feedback);
        let converted = asm.number_unop(NumberUnop::ToUint32, converted);
        let value = asm.number_unop(NumberUnop::Clz32, converted);
        let effect = asm.effect();
        self.graph.replace_with_value(node, value, Some(effect), None);
        Ok(Reduction::Replaced(value))
    }

    /// Math.min / Math.max over any arity. The empty call folds to the
    /// specification identity element (+Infinity for min, -Infinity for max);
    /// otherwise the operands chain pairwise left to right, which preserves
    /// NaN propagation.
    pub(crate) fn reduce_math_min_max(
        &mut self,
        node: crate::jit::ir::NodeId,
        params: &CallParameters,
        op: NumberBinop,
        empty_value: f64,
    ) -> Result<Reduction, ReduceError> {
        if self.speculation_disallowed(params) {
            return Ok(Reduction::NoChange);
        }
        let argc = self.argument_count(node);
        if argc == 0 {
            let value = self.graph.number(empty_value);
            self.graph.replace_with_value(node, value, None, None);
            return Ok(Reduction::Replaced(value));
        }

        let effect = self.effect_of(node);
        let control = self.control_of(node);
        let args: Vec<_> = (0..argc)
            .map(|i| self.argument(node, i).expect("in range"))
            .collect();
        let mut asm = GraphAssembler::new(self.graph, effect, control);
        let mut value = asm.speculative_to_number(args[0], params.feedback);
        for &arg in &args[1..] {
            let next = asm.speculative_to_number(arg, params.feedback);
            value = asm.number_binop(op, value, next);
        }
        let effect = asm.effect();
        self.graph.replace_with_value(node, value, Some(effect), None);
        Ok(Reduction::Replaced(value))
    }

    /// Number.isFinite / isInteger / isSafeInteger / isNaN: pure predicates.
    /// With no argument the result is false, unconditionally.
    pub(crate) fn reduce_number_predicate(
        &mut self,
        node: crate::jit::ir::NodeId,
        kind: ObjectIsKind,
    ) -> Result<Reduction, ReduceError> {
        if self.argument_count(node) < 1 {
            let value = self.graph.bool_constant(false);
            self.graph.replace_with_value(node, value, None, None);
            return Ok(Reduction::Replaced(value));
        }
        let input = self.argument(node, 0).expect("checked arity");
        let predicate = match kind {
            ObjectIsKind::Finite => ObjectIs::FiniteNumber,
            ObjectIsKind::Integer => ObjectIs::Integer,
            ObjectIsKind::SafeInteger => ObjectIs::SafeInteger,
            ObjectIsKind::NaN => ObjectIs::NaN,
        };
        let value = self
            .graph
            .add(Opcode::ObjectIs(predicate), &[input], &[], &[]);
        self.graph.replace_with_value(node, value, None, None);
        Ok(Reduction::Replaced(value))
    }

    /// Number.parseInt: morph into the dedicated parse stub with an explicit
    /// radix operand. No argument parses undefined, which is NaN.
    pub(crate) fn reduce_number_parse_int(
        &mut self,
        node: crate::jit::ir::NodeId,
    ) -> Result<Reduction, ReduceError> {
        if self.argument_count(node) < 1 {
            let value = self.graph.nan();
            self.graph.replace_with_value(node, value, None, None);
            return Ok(Reduction::Replaced(value));
        }
        let object = self.argument(node, 0).expect("checked arity");
        let radix = self.argument_or_undefined(node, 1);
        let node_mut = self.graph.node_mut(node);
        node_mut.values = vec![object, radix];
        node_mut.op = Opcode::CallStub(StubCall::ParseInt);
        Ok(Reduction::Changed(node))
    }

    /// Global isFinite: ToNumber then the numeric predicate.
    /// isFinite() is isFinite(NaN), which is false.
    pub(crate) fn reduce_global_is_finite(
        &mut self,
        node: crate::jit::ir::NodeId,
        params: &CallParameters,
    ) -> Result<Reduction, ReduceError> {
        if self.speculation_disallowed(params) {
            return Ok(Reduction::NoChange);
        }
        if self.argument_count(node) < 1 {
            let value = self.graph.bool_constant(false);
            self.graph.replace_with_value(node, value, None, None);
            return Ok(Reduction::Replaced(value));
        }
        let input = self.argument(node, 0).expect("checked arity");
        let effect = self.effect_of(node);
        let control = self.control_of(node);
        let mut asm = GraphAssembler::new(self.graph, effect, control);
        let converted = asm.speculative_to_number(input, params.feedback);
        let value = asm.object_is(ObjectIs::FiniteNumber, converted);
        let effect = asm.effect();
        self.graph.replace_with_value(node, value, Some(effect), None);
        Ok(Reduction::Replaced(value))
    }

    /// Global isNaN. isNaN() is isNaN(NaN), which is true.
    pub(crate) fn reduce_global_is_nan(
        &mut self,
        node: crate::jit::ir::NodeId,
        params: &CallParameters,
    ) -> Result<Reduction, ReduceError> {
        if self.speculation_disallowed(params) {
            return Ok(Reduction::NoChange);
        }
        if self.argument_count(node) < 1 {
            let value = self.graph.bool_constant(true);
            self.graph.replace_with_value(node, value, None, None);
            return Ok(Reduction::Replaced(value));
        }
        let input = self.argument(node, 0).expect("checked arity");
        let effect = self.effect_of(node);
        let control = self.control_of(node);
        let mut asm = GraphAssembler::new(self.graph, effect, control);
        let converted = asm.speculative_to_number(input, params.feedback);
        let value = asm.object_is(ObjectIs::NaN, converted);
        let effect = asm.effect();
        self.graph.replace_with_value(node, value, Some(effect), None);
        Ok(Reduction::Replaced(value))
    }
}
