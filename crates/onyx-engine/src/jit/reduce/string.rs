//! String builtins
//!
//! Receiver and argument checks carry the call-site feedback so a wrong-type
//! deopt is attributed to this site. Each method applies its own
//! specification clamping rule: substring swaps inverted start/end after
//! clamping both into [0, length]; slice and substr treat negative offsets as
//! length-relative.

use super::{CallReducer, ReduceError, Reduction, StringAtVariant, StringCaseVariant};
use crate::jit::ir::builder::GraphAssembler;
use crate::jit::ir::graph::NodeId;
use crate::jit::ir::op::{BranchHint, CallParameters, Constant, GuardType, Opcode};

impl<'a> CallReducer<'a> {
    /// String.prototype.indexOf(search[, position]): lower to the direct
    /// search operator once receiver and search are known strings and the
    /// position is a small integer.
    pub(crate) fn reduce_string_index_of(
        &mut self,
        node: NodeId,
        params: &CallParameters,
    ) -> Result<Reduction, ReduceError> {
        if self.speculation_disallowed(params) {
            return Ok(Reduction::NoChange);
        }
        if self.argument_count(node) < 1 {
            return Ok(Reduction::NoChange);
        }
        let receiver = self.receiver(node);
        let search = self.argument(node, 0).expect("checked arity");
        let position = self.argument(node, 1);
        let feedback = params.feedback;
        let effect = self.effect_of(node);
        let control = self.control_of(node);
        let mut asm = GraphAssembler::new(self.graph, effect, control);

        let receiver = asm.check_string(receiver, feedback);
        let search = asm.check_string(search, feedback);
        let position = match position {
            Some(position) => asm.check_smi(position, feedback),
            None => asm.zero(),
        };
        let value = asm
            .graph()
            .add(Opcode::StringIndexOf, &[receiver, search, position], &[], &[]);
        let final_effect = asm.effect();
        self.graph
            .replace_with_value(node, value, Some(final_effect), None);
        Ok(Reduction::Replaced(value))
    }

    /// String.prototype.substring(start[, end]): both offsets clamp into
    /// [0, length]; an inverted pair swaps.
    pub(crate) fn reduce_string_substring(
        &mut self,
        node: NodeId,
        params: &CallParameters,
    ) -> Result<Reduction, ReduceError> {
        if self.speculation_disallowed(params) {
            return Ok(Reduction::NoChange);
        }
        if self.argument_count(node) < 1 {
            return Ok(Reduction::NoChange);
        }
        let receiver = self.receiver(node);
        let start = self.argument(node, 0).expect("checked arity");
        let end = self.argument_or_undefined(node, 1);
        let feedback = params.feedback;
        let effect = self.effect_of(node);
        let control = self.control_of(node);
        let mut asm = GraphAssembler::new(self.graph, effect, control);

        let receiver = asm.check_string(receiver, feedback);
        let start = asm.check_smi(start, feedback);
        let length = asm.pure1(Opcode::StringLength, receiver);
        let end = end_or_length(&mut asm, end, length, feedback);

        let zero = asm.zero();
        let start_clamped = asm.number_max(start, zero);
        let final_start = asm.number_min(start_clamped, length);
        let end_clamped = asm.number_max(end, zero);
        let final_end = asm.number_min(end_clamped, length);

        let from = asm.number_min(final_start, final_end);
        let to = asm.number_max(final_start, final_end);

        let value = asm.effectful(Opcode::StringSubstring, &[receiver, from, to]);
        let final_effect = asm.effect();
        let final_control = asm.control();
        self.graph
            .replace_with_value(node, value, Some(final_effect), Some(final_control));
        Ok(Reduction::Replaced(value))
    }

    /// String.prototype.slice(start[, end]): negative offsets count from the
    /// end; an empty range yields the empty string without touching memory.
    pub(crate) fn reduce_string_slice(
        &mut self,
        node: NodeId,
        params: &CallParameters,
    ) -> Result<Reduction, ReduceError> {
        if self.speculation_disallowed(params) {
            return Ok(Reduction::NoChange);
        }
        if self.argument_count(node) < 1 {
            return Ok(Reduction::NoChange);
        }
        let receiver = self.receiver(node);
        let start = self.argument(node, 0).expect("checked arity");
        let end = self.argument_or_undefined(node, 1);
        let feedback = params.feedback;
        let effect = self.effect_of(node);
        let control = self.control_of(node);
        let mut asm = GraphAssembler::new(self.graph, effect, control);

        let receiver = asm.check_string(receiver, feedback);
        let start = asm.check_smi(start, feedback);
        let length = asm.pure1(Opcode::StringLength, receiver);
        let end = end_or_length(&mut asm, end, length, feedback);

        let zero = asm.zero();
        let from = {
            let negative = asm.number_less_than(start, zero);
            let relative = asm.number_add(length, start);
            let clamped = asm.number_max(relative, zero);
            let positive = asm.number_min(start, length);
            let selected = asm.select(BranchHint::False, negative, clamped, positive);
            asm.type_guard(GuardType::UnsignedSmall, selected)
        };
        let to = {
            let negative = asm.number_less_than(end, zero);
            let relative = asm.number_add(length, end);
            let clamped = asm.number_max(relative, zero);
            let positive = asm.number_min(end, length);
            let selected = asm.select(BranchHint::False, negative, clamped, positive);
            asm.type_guard(GuardType::UnsignedSmall, selected)
        };

        let in_order = asm.number_less_than(from, to);
        let (if_nonempty, if_empty) = asm.branch(in_order, BranchHint::True);
        let effect_at_branch = asm.effect();

        asm.set_control(if_nonempty);
        let substring = asm.effectful(Opcode::StringSubstring, &[receiver, from, to]);
        let nonempty_effect = asm.effect();
        let nonempty_control = asm.control();

        let empty = asm.graph().empty_string();
        let merge = asm.merge2(nonempty_control, if_empty);
        let ephi = asm.effect_phi2(nonempty_effect, effect_at_branch, merge);
        let value = asm.phi2(substring, empty, merge);

        self.graph
            .replace_with_value(node, value, Some(ephi), Some(merge));
        Ok(Reduction::Replaced(value))
    }

    /// String.prototype.substr(start[, length]): a negative start counts
    /// from the end; the result length clamps to what remains.
    pub(crate) fn reduce_string_substr(
        &mut self,
        node: NodeId,
        params: &CallParameters,
    ) -> Result<Reduction, ReduceError> {
        if self.speculation_disallowed(params) {
            return Ok(Reduction::NoChange);
        }
        if self.argument_count(node) < 1 {
            return Ok(Reduction::NoChange);
        }
        let receiver = self.receiver(node);
        let start = self.argument(node, 0).expect("checked arity");
        let end = self.argument_or_undefined(node, 1);
        let feedback = params.feedback;
        let effect = self.effect_of(node);
        let control = self.control_of(node);
        let mut asm = GraphAssembler::new(self.graph, effect, control);

        let receiver = asm.check_string(receiver, feedback);
        let start = asm.check_smi(start, feedback);
        let length = asm.pure1(Opcode::StringLength, receiver);
        // A missing length argument takes everything to the end.
        let end = end_or_length(&mut asm, end, length, feedback);

        let zero = asm.zero();
        let init_start = {
            let negative = asm.number_less_than(start, zero);
            let relative = asm.number_add(length, start);
            let clamped = asm.number_max(relative, zero);
            let selected = asm.select(BranchHint::False, negative, clamped, start);
            asm.type_guard(GuardType::UnsignedSmall, selected)
        };
        let end_clamped = asm.number_max(end, zero);
        let remaining = asm.number_subtract(length, init_start);
        let result_length = asm.number_min(end_clamped, remaining);
        let to_raw = asm.number_add(init_start, result_length);
        let to = asm.type_guard(GuardType::UnsignedSmall, to_raw);

        let nonempty = asm.number_less_than(zero, result_length);
        let (if_nonempty, if_empty) = asm.branch(nonempty, BranchHint::True);
        let effect_at_branch = asm.effect();

        asm.set_control(if_nonempty);
        let substring = asm.effectful(Opcode::StringSubstring, &[receiver, init_start, to]);
        let nonempty_effect = asm.effect();
        let nonempty_control = asm.control();

        let empty = asm.graph().empty_string();
        let merge = asm.merge2(nonempty_control, if_empty);
        let ephi = asm.effect_phi2(nonempty_effect, effect_at_branch, merge);
        let value = asm.phi2(substring, empty, merge);

        self.graph
            .replace_with_value(node, value, Some(ephi), Some(merge));
        Ok(Reduction::Replaced(value))
    }

    /// charAt / charCodeAt / codePointAt: known-string receiver, small
    /// integer position checked against the current length.
    pub(crate) fn reduce_string_string_at(
        &mut self,
        node: NodeId,
        params: &CallParameters,
        variant: StringAtVariant,
    ) -> Result<Reduction, ReduceError> {
        if self.speculation_disallowed(params) {
            return Ok(Reduction::NoChange);
        }
        let receiver = self.receiver(node);
        let index = self.argument(node, 0);
        let feedback = params.feedback;
        let effect = self.effect_of(node);
        let control = self.control_of(node);
        let mut asm = GraphAssembler::new(self.graph, effect, control);

        let receiver = asm.check_string(receiver, feedback);
        let index = match index {
            Some(index) => asm.check_smi(index, feedback),
            None => asm.zero(),
        };
        let length = asm.pure1(Opcode::StringLength, receiver);
        let checked_index = asm.check_bounds(index, length, feedback);
        let op = match variant {
            StringAtVariant::CharAt => Opcode::StringCharAt,
            StringAtVariant::CharCodeAt => Opcode::StringCharCodeAt,
            StringAtVariant::CodePointAt => Opcode::StringCodePointAt,
        };
        let value = asm.effectful(op, &[receiver, checked_index]);
        let final_effect = asm.effect();
        self.graph
            .replace_with_value(node, value, Some(final_effect), None);
        Ok(Reduction::Replaced(value))
    }

    /// String.prototype.concat with zero or one argument
    pub(crate) fn reduce_string_concat(
        &mut self,
        node: NodeId,
        params: &CallParameters,
    ) -> Result<Reduction, ReduceError> {
        if self.speculation_disallowed(params) {
            return Ok(Reduction::NoChange);
        }
        let argc = self.argument_count(node);
        if argc > 1 {
            return Ok(Reduction::NoChange);
        }
        let receiver = self.receiver(node);
        let argument = self.argument(node, 0);
        let feedback = params.feedback;
        let effect = self.effect_of(node);
        let control = self.control_of(node);
        let mut asm = GraphAssembler::new(self.graph, effect, control);

        let receiver = asm.check_string(receiver, feedback);
        let value = match argument {
            None => receiver,
            Some(argument) => {
                let argument = asm.check_string(argument, feedback);
                asm.effectful(Opcode::StringConcat, &[receiver, argument])
            }
        };
        let final_effect = asm.effect();
        self.graph
            .replace_with_value(node, value, Some(final_effect), None);
        Ok(Reduction::Replaced(value))
    }

    /// toLowerCase / toUpperCase over a known-string receiver
    pub(crate) fn reduce_string_case(
        &mut self,
        node: NodeId,
        params: &CallParameters,
        variant: StringCaseVariant,
    ) -> Result<Reduction, ReduceError> {
        if self.speculation_disallowed(params) {
            return Ok(Reduction::NoChange);
        }
        let receiver = self.receiver(node);
        let feedback = params.feedback;
        let effect = self.effect_of(node);
        let control = self.control_of(node);
        let mut asm = GraphAssembler::new(self.graph, effect, control);

        let receiver = asm.check_string(receiver, feedback);
        let op = match variant {
            StringCaseVariant::Lower => Opcode::StringToLowerCase,
            StringCaseVariant::Upper => Opcode::StringToUpperCase,
        };
        let value = asm.effectful(op, &[receiver]);
        let final_effect = asm.effect();
        self.graph
            .replace_with_value(node, value, Some(final_effect), None);
        Ok(Reduction::Replaced(value))
    }

    /// String.prototype[Symbol.iterator]: allocate the iterator directly
    pub(crate) fn reduce_string_iterator(
        &mut self,
        node: NodeId,
        params: &CallParameters,
    ) -> Result<Reduction, ReduceError> {
        if self.speculation_disallowed(params) {
            return Ok(Reduction::NoChange);
        }
        let receiver = self.receiver(node);
        let feedback = params.feedback;
        let effect = self.effect_of(node);
        let control = self.control_of(node);
        let mut asm = GraphAssembler::new(self.graph, effect, control);

        let receiver = asm.check_string(receiver, feedback);
        let value = asm.effectful(Opcode::NewStringIterator, &[receiver]);
        let final_effect = asm.effect();
        self.graph
            .replace_with_value(node, value, Some(final_effect), None);
        Ok(Reduction::Replaced(value))
    }

    /// String.fromCharCode with a single code unit
    pub(crate) fn reduce_string_from_char_code(
        &mut self,
        node: NodeId,
        params: &CallParameters,
    ) -> Result<Reduction, ReduceError> {
        if self.speculation_disallowed(params) {
            return Ok(Reduction::NoChange);
        }
        let argc = self.argument_count(node);
        if argc == 0 {
            let value = self.graph.empty_string();
            self.graph.replace_with_value(node, value, None, None);
            return Ok(Reduction::Replaced(value));
        }
        if argc > 1 {
            return Ok(Reduction::NoChange);
        }
        let input = self.argument(node, 0).expect("checked arity");
        let feedback = params.feedback;
        let effect = self.effect_of(node);
        let control = self.control_of(node);
        let mut asm = GraphAssembler::new(self.graph, effect, control);

        let converted = asm.speculative_to_number(input, feedback);
        let value = asm.pure1(Opcode::StringFromSingleCharCode, converted);
        let final_effect = asm.effect();
        self.graph
            .replace_with_value(node, value, Some(final_effect), None);
        Ok(Reduction::Replaced(value))
    }

}

/// Replace an undefined end argument with the string length, via an explicit
/// two-way branch so a real end value still gets its Smi check.
fn end_or_length(
    asm: &mut GraphAssembler<'_>,
    end: NodeId,
    length: NodeId,
    feedback: Option<crate::jit::feedback::FeedbackSource>,
) -> NodeId {
    if matches!(asm.graph().op(end), Opcode::Constant(Constant::Undefined)) {
        return length;
    }
    let undefined = asm.undefined();
    let is_undefined = asm.reference_equal(end, undefined);
    let (if_undefined, if_defined) = asm.branch(is_undefined, BranchHint::False);
    let effect_at_branch = asm.effect();

    asm.set_control(if_defined);
    let checked = asm.check_smi(end, feedback);
    let defined_effect = asm.effect();

    let merge = asm.merge2(if_undefined, if_defined);
    let ephi = asm.effect_phi2(effect_at_branch, defined_effect, merge);
    let value = asm.phi2(length, checked, merge);
    asm.set_control(merge);
    asm.set_effect(ephi);
    value
}
