//! Array resize builtins (push/pop/shift) and the array classifiers
//!
//! Resizing is only legal under the resizability witness: fast elements, an
//! extensible non-dictionary receiver on the initial Array prototype, a
//! writable length, and the intact no-elements protector. pop and shift take
//! the empty-receiver path (return undefined, no mutation) before the general
//! resize path; removed slots become holes in the backing store and are
//! canonicalized to undefined only at the returned value.

use super::{CallReducer, ReduceError, Reduction, SearchVariant};
use crate::jit::deps::ProtectorCell;
use crate::jit::feedback::{ElementsKind, InstanceType, PrototypeRef, ShapeId};
use crate::jit::ir::builder::GraphAssembler;
use crate::jit::ir::graph::NodeId;
use crate::jit::ir::op::{
    BranchHint, CallParameters, FieldAccess, GrowMode, NumberUnop, Opcode, StubCall,
};

/// Largest receiver shift moves inline; longer receivers go through the
/// generic implementation.
const MAX_INLINE_SHIFT_ELEMENTS: f64 = 100.0;

/// Union policy for the observed shape set
#[derive(Clone, Copy, PartialEq)]
enum KindUnion {
    UptoPackedness,
    UptoSize,
}

struct ResizeInfo {
    receiver: NodeId,
    shapes: Vec<ShapeId>,
    kind: ElementsKind,
    reliable: bool,
    effect: NodeId,
    control: NodeId,
}

impl<'a> CallReducer<'a> {
    /// Shared preconditions for push/pop/shift
    fn array_resize_prologue(
        &mut self,
        node: NodeId,
        params: &CallParameters,
        union: KindUnion,
        exclude_holey_double: bool,
    ) -> Option<ResizeInfo> {
        if self.speculation_disallowed(params) {
            return None;
        }
        if !self
            .unit
            .protectors
            .is_intact(ProtectorCell::NoElements)
        {
            return None;
        }
        let receiver = self.receiver(node);
        let feedback = self.receiver_shapes_for_call(node, params);
        let shapes = feedback.shapes().to_vec();
        if shapes.is_empty() {
            return None;
        }

        let mut kind = self.unit.shapes.get(shapes[0]).elements_kind;
        for &id in &shapes {
            let shape = self.unit.shapes.get(id);
            if shape.instance_type != InstanceType::Array
                || shape.prototype != PrototypeRef::InitialArrayPrototype
                || shape.dictionary_mode
                || !shape.extensible
                || shape.readonly_length
            {
                return None;
            }
            if exclude_holey_double && shape.elements_kind == ElementsKind::HoleyDouble {
                return None;
            }
            let merged = match union {
                KindUnion::UptoPackedness => kind.union_upto_packedness(shape.elements_kind),
                KindUnion::UptoSize => kind.union_upto_size(shape.elements_kind),
            };
            if !merged {
                return None;
            }
        }
        if !self
            .deps
            .assume_protector(self.unit.protectors, ProtectorCell::NoElements)
        {
            return None;
        }

        Some(ResizeInfo {
            receiver,
            shapes,
            kind,
            reliable: feedback.is_reliable(),
            effect: self.effect_of(node),
            control: self.control_of(node),
        })
    }

    /// Array.prototype.push(...values): grow the backing store once, bump
    /// the observable length, then append. Returns the new length.
    pub(crate) fn reduce_array_push(
        &mut self,
        node: NodeId,
        params: &CallParameters,
    ) -> Result<Reduction, ReduceError> {
        let Some(info) =
            self.array_resize_prologue(node, params, KindUnion::UptoPackedness, false)
        else {
            return Ok(Reduction::NoChange);
        };
        let feedback = params.feedback;
        let num_values = self.argument_count(node);
        let args: Vec<NodeId> = (0..num_values)
            .map(|i| self.argument(node, i).expect("in range"))
            .collect();
        let mut asm = GraphAssembler::new(self.graph, info.effect, info.control);

        if !info.reliable {
            asm.check_shapes(info.receiver, info.shapes.clone(), feedback);
        }

        // Pushed values must fit the backing representation.
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            let value = if info.kind.is_smi() {
                asm.check_smi(arg, feedback)
            } else if info.kind.is_double() {
                let checked = asm.check_number(arg, feedback);
                asm.number_unop(NumberUnop::SilenceNaN, checked)
            } else {
                arg
            };
            values.push(value);
        }

        let length = asm.load_field(FieldAccess::ArrayLength(info.kind), info.receiver);
        let mut value = length;

        if !values.is_empty() {
            let count = asm.number(values.len() as f64);
            let new_length = asm.number_add(length, count);
            value = new_length;

            let elements = asm.load_field(FieldAccess::Elements, info.receiver);
            let elements_length = asm.load_field(FieldAccess::FixedArrayLength, elements);
            let mode = if info.kind.is_double() {
                GrowMode::Double
            } else {
                GrowMode::SmiOrObject
            };
            let last_index = asm.number((values.len() - 1) as f64);
            let grow_until = asm.number_add(length, last_index);
            let elements = asm.effectful(
                Opcode::MaybeGrowFastElements { mode, feedback },
                &[info.receiver, elements, grow_until, elements_length],
            );

            // The length store is observable; no check may come after it.
            asm.store_field(FieldAccess::ArrayLength(info.kind), info.receiver, new_length);

            for (i, &pushed) in values.iter().enumerate() {
                let offset = asm.number(i as f64);
                let index = asm.number_add(length, offset);
                asm.store_element(info.kind, elements, index, pushed);
            }
        }

        let final_effect = asm.effect();
        self.graph
            .replace_with_value(node, value, Some(final_effect), None);
        Ok(Reduction::Replaced(value))
    }

    /// Array.prototype.pop(): empty receiver returns undefined untouched;
    /// otherwise shrink by one, load the removed slot, store a hole in its
    /// place, and canonicalize the result at the boundary.
    pub(crate) fn reduce_array_pop(
        &mut self,
        node: NodeId,
        params: &CallParameters,
    ) -> Result<Reduction, ReduceError> {
        let Some(info) = self.array_resize_prologue(node, params, KindUnion::UptoSize, true)
        else {
            return Ok(Reduction::NoChange);
        };
        let feedback = params.feedback;
        let mut asm = GraphAssembler::new(self.graph, info.effect, info.control);

        if !info.reliable {
            asm.check_shapes(info.receiver, info.shapes.clone(), feedback);
        }

        let length = asm.load_field(FieldAccess::ArrayLength(info.kind), info.receiver);
        let zero = asm.zero();
        let is_empty = asm.number_equal(length, zero);
        let (if_empty, if_nonempty) = asm.branch(is_empty, BranchHint::False);
        let effect_at_branch = asm.effect();
        let undefined = asm.undefined();

        asm.set_control(if_nonempty);
        let elements = asm.load_field(FieldAccess::Elements, info.receiver);
        let elements = if !info.kind.is_double() {
            asm.effectful(
                Opcode::EnsureWritableFastElements,
                &[info.receiver, elements],
            )
        } else {
            elements
        };
        let one = asm.one();
        let new_length = asm.number_subtract(length, one);
        asm.store_field(FieldAccess::ArrayLength(info.kind), info.receiver, new_length);
        let popped = asm.load_element(info.kind, elements, new_length);
        // The vacated slot becomes a hole in the backing store; it is never
        // replaced by a fabricated value.
        let hole = asm.graph().the_hole();
        asm.store_element(info.kind.to_holey(), elements, new_length, hole);
        let nonempty_control = asm.control();
        let nonempty_effect = asm.effect();

        let merge = asm.merge2(if_empty, nonempty_control);
        let ephi = asm.effect_phi2(effect_at_branch, nonempty_effect, merge);
        let mut value = asm.phi2(undefined, popped, merge);
        if info.kind.is_holey() {
            value = asm.pure1(Opcode::ConvertHoleToUndefined, value);
        }

        self.graph
            .replace_with_value(node, value, Some(ephi), Some(merge));
        Ok(Reduction::Replaced(value))
    }

    /// Array.prototype.shift(): empty receiver short-circuits; short
    /// receivers move the elements down inline, long receivers defer to the
    /// generic implementation through the runtime escape hatch.
    pub(crate) fn reduce_array_shift(
        &mut self,
        node: NodeId,
        params: &CallParameters,
    ) -> Result<Reduction, ReduceError> {
        let Some(info) = self.array_resize_prologue(node, params, KindUnion::UptoSize, true)
        else {
            return Ok(Reduction::NoChange);
        };
        let feedback = params.feedback;
        let frame_state = self.frame_state_of(node);
        let mut asm = GraphAssembler::new(self.graph, info.effect, info.control);

        if !info.reliable {
            asm.check_shapes(info.receiver, info.shapes.clone(), feedback);
        }

        let length = asm.load_field(FieldAccess::ArrayLength(info.kind), info.receiver);
        let zero = asm.zero();
        let one = asm.one();
        let is_empty = asm.number_equal(length, zero);
        let (if_empty, if_nonempty) = asm.branch(is_empty, BranchHint::False);
        let effect_at_branch = asm.effect();
        let undefined = asm.undefined();

        asm.set_control(if_nonempty);

        // Fast path: move the elements down with an unrolled-by-loop copy.
        let limit = asm.number(MAX_INLINE_SHIFT_ELEMENTS);
        let is_short = asm.pure2(Opcode::NumberLessThanOrEqual, length, limit);
        let (if_short, if_long) = asm.branch(is_short, BranchHint::True);
        let effect_before_split = asm.effect();

        asm.set_control(if_short);
        let elements = asm.load_field(FieldAccess::Elements, info.receiver);
        let shifted = asm.load_element(info.kind, elements, zero);
        let elements = if !info.kind.is_double() {
            asm.effectful(
                Opcode::EnsureWritableFastElements,
                &[info.receiver, elements],
            )
        } else {
            elements
        };

        // Copy loop: element at `index` moves to `index - 1`.
        let loop_state = asm.loop_start(one);
        let index = loop_state.value_phi;
        let in_range = asm.number_less_than(index, length);
        let (move_more, move_done) = asm.branch(in_range, BranchHint::None);
        asm.set_control(move_more);
        let value = asm.load_element(info.kind, elements, index);
        let dst = asm.number_subtract(index, one);
        asm.store_element(info.kind, elements, dst, value);
        let next_index = asm.number_add(index, one);
        let body_control = asm.control();
        let body_effect = asm.effect();
        asm.loop_end(loop_state, next_index, body_control, body_effect);

        asm.set_control(move_done);
        asm.set_effect(loop_state.effect_phi);
        let new_length = asm.number_subtract(length, one);
        asm.store_field(FieldAccess::ArrayLength(info.kind), info.receiver, new_length);
        let hole = asm.graph().the_hole();
        asm.store_element(info.kind.to_holey(), elements, new_length, hole);
        let short_control = asm.control();
        let short_effect = asm.effect();

        // Slow path: the always-correct generic implementation.
        asm.set_control(if_long);
        asm.set_effect(effect_before_split);
        let slow_call = asm.controlling(Opcode::CallStub(StubCall::ArrayShift), &[info.receiver]);
        asm.graph().node_mut(slow_call).frame_state = Some(frame_state);
        let long_control = asm.control();
        let long_effect = asm.effect();

        let nonempty_merge = asm.merge2(short_control, long_control);
        let nonempty_ephi = asm.effect_phi2(short_effect, long_effect, nonempty_merge);
        let nonempty_value = asm.phi2(shifted, slow_call, nonempty_merge);

        let merge = asm.merge2(if_empty, nonempty_merge);
        let ephi = asm.effect_phi2(effect_at_branch, nonempty_ephi, merge);
        let mut value = asm.phi2(undefined, nonempty_value, merge);
        if info.kind.is_holey() {
            value = asm.pure1(Opcode::ConvertHoleToUndefined, value);
        }

        self.graph
            .replace_with_value(node, value, Some(ephi), Some(merge));
        Ok(Reduction::Replaced(value))
    }

    /// Array.isArray: undefined is certainly not an array; otherwise the
    /// proxy-aware classification operator.
    pub(crate) fn reduce_array_is_array(
        &mut self,
        node: NodeId,
    ) -> Result<Reduction, ReduceError> {
        if self.argument_count(node) < 1 {
            let value = self.graph.bool_constant(false);
            self.graph.replace_with_value(node, value, None, None);
            return Ok(Reduction::Replaced(value));
        }
        let object = self.argument(node, 0).expect("checked arity");
        let value = self.graph.add(
            Opcode::ObjectIs(crate::jit::ir::op::ObjectIs::Array),
            &[object],
            &[],
            &[],
        );
        self.graph.replace_with_value(node, value, None, None);
        Ok(Reduction::Replaced(value))
    }

    /// Array.prototype.indexOf / includes: with an exact single-shape
    /// witness, lower to the elements-kind-specialized search stub. A
    /// negative fromIndex is length-relative, clamped to 0.
    pub(crate) fn reduce_array_index_of_includes(
        &mut self,
        node: NodeId,
        params: &CallParameters,
        variant: SearchVariant,
    ) -> Result<Reduction, ReduceError> {
        if self.speculation_disallowed(params) {
            return Ok(Reduction::NoChange);
        }
        let receiver = self.receiver(node);
        let feedback = self.receiver_shapes_for_call(node, params);
        let shapes = feedback.shapes();
        if !feedback.is_reliable() || shapes.len() != 1 {
            return Ok(Reduction::NoChange);
        }
        let shape = self.unit.shapes.get(shapes[0]);
        if shape.instance_type != InstanceType::Array {
            return Ok(Reduction::NoChange);
        }
        let kind = shape.elements_kind;
        let stub = match variant {
            SearchVariant::IndexOf => StubCall::ArrayIndexOf(kind),
            SearchVariant::Includes => StubCall::ArrayIncludes(kind),
        };

        let search_element = self.argument_or_undefined(node, 0);
        let from_index = self.argument(node, 1);
        let source = params.feedback;
        let effect = self.effect_of(node);
        let control = self.control_of(node);
        let mut asm = GraphAssembler::new(self.graph, effect, control);

        let elements = asm.load_field(FieldAccess::Elements, receiver);
        let length = asm.load_field(FieldAccess::ArrayLength(kind), receiver);
        let from = match from_index {
            None => asm.zero(),
            Some(raw) => {
                let checked = asm.check_smi(raw, source);
                let zero = asm.zero();
                let negative = asm.number_less_than(checked, zero);
                let relative = asm.number_add(length, checked);
                let clamped = asm.number_max(relative, zero);
                asm.select(BranchHint::False, negative, clamped, checked)
            }
        };
        let result = asm.effectful(
            Opcode::CallStub(stub),
            &[elements, search_element, length, from],
        );
        let final_effect = asm.effect();
        self.graph
            .replace_with_value(node, result, Some(final_effect), None);
        Ok(Reduction::Replaced(result))
    }
}
