//! Array iteration builtins compiled to explicit counted loops
//!
//! forEach/map/filter/reduce/reduceRight/every/some/find/findIndex. The loop
//! re-validates receiver shape and bounds on every iteration because the
//! callback may mutate the receiver mid-iteration; each iteration gets one
//! eager continuation (before the callback) and one lazy continuation (after
//! it returns), and any exception the callback raises is merged into the
//! node's existing exception edge.

use super::{
    connect_throw_to_end, continuation_frame_state, rewire_exception_edges, wire_callable_check,
    ArrayFindVariant, CallReducer, EverySomeVariant, ReduceDirection, ReduceError, Reduction,
};
use crate::jit::continuation::{ContinuationMode, ResumePoint};
use crate::jit::deps::ProtectorCell;
use crate::jit::feedback::{ElementsKind, FeedbackSource, InstanceType, PrototypeRef, ShapeId};
use crate::jit::ir::builder::GraphAssembler;
use crate::jit::ir::graph::NodeId;
use crate::jit::ir::op::{
    BranchHint, CallParameters, FieldAccess, GrowMode, GuardType, MessageTemplate, ObjectIs,
    Opcode, RuntimeFn,
};

/// Everything the loop builders need, gathered before any graph mutation
struct IterInfo {
    receiver: NodeId,
    callback: NodeId,
    this_arg: NodeId,
    shapes: Vec<ShapeId>,
    kind: ElementsKind,
    reliable: bool,
    outer_frame_state: NodeId,
    effect: NodeId,
    control: NodeId,
    on_exception: Option<NodeId>,
}

/// Bounds re-check and element load against the receiver's *current* state.
/// The callback may have shrunk the array or reallocated the backing store,
/// so both length and elements pointer are re-read here every iteration.
fn safe_load_element(
    asm: &mut GraphAssembler<'_>,
    kind: ElementsKind,
    receiver: NodeId,
    k: NodeId,
    feedback: Option<FeedbackSource>,
) -> (NodeId, NodeId) {
    let length = asm.load_field(FieldAccess::ArrayLength(kind), receiver);
    let checked_k = asm.check_bounds(k, length, feedback);
    let elements = asm.load_field(FieldAccess::Elements, receiver);
    let element = asm.load_element(kind, elements, checked_k);
    (element, checked_k)
}

/// Hole test for the loaded element, by representation
fn hole_check(asm: &mut GraphAssembler<'_>, kind: ElementsKind, element: NodeId) -> NodeId {
    if kind.is_double() {
        asm.object_is(ObjectIs::Float64Hole, element)
    } else {
        let hole = asm.graph().the_hole();
        asm.reference_equal(element, hole)
    }
}

impl<'a> CallReducer<'a> {
    /// Shared preconditions for the iterating array builtins: speculation
    /// allowed, every observed shape is a fast array on the initial Array
    /// prototype with a compatible elements representation, and the
    /// no-elements protector is intact (registered as a dependency).
    fn array_iter_prologue(
        &mut self,
        node: NodeId,
        params: &CallParameters,
        exclude_holey_double: bool,
    ) -> Option<IterInfo> {
        if self.speculation_disallowed(params) {
            return None;
        }
        let receiver = self.receiver(node);
        let feedback = self.receiver_shapes_for_call(node, params);
        let shapes = feedback.shapes().to_vec();
        if shapes.is_empty() {
            return None;
        }

        let mut kind = self
            .unit
            .shapes
            .get(shapes[0])
            .elements_kind
            .smi_to_object();
        for &id in &shapes {
            let shape = self.unit.shapes.get(id);
            if shape.instance_type != InstanceType::Array
                || shape.prototype != PrototypeRef::InitialArrayPrototype
                || shape.dictionary_mode
            {
                return None;
            }
            let next = shape.elements_kind;
            if kind.is_double() != next.is_double() {
                return None;
            }
            if next.is_holey() {
                kind = kind.to_holey();
            }
        }
        if exclude_holey_double && kind == ElementsKind::HoleyDouble {
            return None;
        }
        if !self
            .deps
            .assume_protector(self.unit.protectors, ProtectorCell::NoElements)
        {
            return None;
        }

        let callback = self.argument_or_undefined(node, 0);
        let this_arg = self.argument_or_undefined(node, 1);
        Some(IterInfo {
            receiver,
            callback,
            this_arg,
            shapes,
            kind,
            reliable: feedback.is_reliable(),
            outer_frame_state: self.frame_state_of(node),
            effect: self.effect_of(node),
            control: self.control_of(node),
            on_exception: self.graph.exception_projection(node),
        })
    }

    pub(crate) fn reduce_array_for_each(
        &mut self,
        node: NodeId,
        params: &CallParameters,
    ) -> Result<Reduction, ReduceError> {
        let Some(info) = self.array_iter_prologue(node, params, false) else {
            return Ok(Reduction::NoChange);
        };
        let feedback = params.feedback;
        let mut asm = GraphAssembler::new(self.graph, info.effect, info.control);

        if !info.reliable {
            asm.check_shapes(info.receiver, info.shapes.clone(), feedback);
        }

        let k = asm.zero();
        let original_length = asm.load_field(FieldAccess::ArrayLength(info.kind), info.receiver);

        // The callable check sits outside the loop so an empty receiver
        // still throws.
        let checkpoint_params = [info.receiver, info.callback, info.this_arg, k, original_length];
        let check_frame_state = continuation_frame_state(
            asm.graph(),
            &mut self.continuations,
            info.outer_frame_state,
            ResumePoint::ForEachLoopLazy,
            ContinuationMode::Lazy,
            &checkpoint_params,
        );
        let check_throw = wire_callable_check(&mut asm, info.callback, check_frame_state);

        let loop_state = asm.loop_start(k);
        let k = loop_state.value_phi;

        let continue_test = asm.number_less_than(k, original_length);
        let (if_true, if_false) = asm.branch(continue_test, BranchHint::True);
        asm.set_control(if_true);

        let eager_params = [info.receiver, info.callback, info.this_arg, k, original_length];
        let eager_frame_state = continuation_frame_state(
            asm.graph(),
            &mut self.continuations,
            info.outer_frame_state,
            ResumePoint::ForEachLoopEager,
            ContinuationMode::Eager,
            &eager_params,
        );
        asm.checkpoint(eager_frame_state);

        // The callback may have transitioned the receiver.
        asm.check_shapes(info.receiver, info.shapes.clone(), feedback);

        let (mut element, checked_k) =
            safe_load_element(&mut asm, info.kind, info.receiver, k, feedback);
        let one = asm.one();
        let next_k = asm.number_add(k, one);

        let mut hole_skip = None;
        if info.kind.is_holey() {
            let is_hole = hole_check(&mut asm, info.kind, element);
            let (hole_true, hole_false) = asm.branch(is_hole, BranchHint::False);
            hole_skip = Some((hole_true, asm.effect()));
            asm.set_control(hole_false);
            // The hole must not leak into user JavaScript.
            element = asm.type_guard(GuardType::NonInternal, element);
        }

        let lazy_params = [info.receiver, info.callback, info.this_arg, next_k, original_length];
        let lazy_frame_state = continuation_frame_state(
            asm.graph(),
            &mut self.continuations,
            info.outer_frame_state,
            ResumePoint::ForEachLoopLazy,
            ContinuationMode::Lazy,
            &lazy_params,
        );
        let callback_call = asm.controlling(
            Opcode::Call(CallParameters::synthetic(
                params.frequency,
                crate::jit::feedback::ConvertReceiverMode::Any,
            )),
            &[info.callback, info.this_arg, element, checked_k, info.receiver],
        );
        asm.graph().node_mut(callback_call).frame_state = Some(lazy_frame_state);

        let check_fail = match info.on_exception {
            Some(on_exception) => {
                rewire_exception_edges(&mut asm, on_exception, check_throw, callback_call)
            }
            None => check_throw,
        };

        if let Some((hole_true, hole_effect)) = hole_skip {
            let after_control = asm.control();
            let after_effect = asm.effect();
            let merge = asm.merge2(hole_true, after_control);
            let ephi = asm.effect_phi2(hole_effect, after_effect, merge);
            asm.set_control(merge);
            asm.set_effect(ephi);
        }

        let body_control = asm.control();
        let body_effect = asm.effect();
        asm.loop_end(loop_state, next_k, body_control, body_effect);

        asm.set_control(if_false);
        asm.set_effect(loop_state.effect_phi);
        let final_effect = asm.effect();
        let final_control = asm.control();

        connect_throw_to_end(self.graph, check_throw, check_fail);

        let value = self.graph.undefined();
        self.graph
            .replace_with_value(node, value, Some(final_effect), Some(final_control));
        Ok(Reduction::Replaced(value))
    }

    pub(crate) fn reduce_array_map(
        &mut self,
        node: NodeId,
        params: &CallParameters,
    ) -> Result<Reduction, ReduceError> {
        let Some(info) = self.array_iter_prologue(node, params, false) else {
            return Ok(Reduction::NoChange);
        };
        // The output array is allocated with the intrinsic Array constructor,
        // which is only valid while nobody overrode Array[Symbol.species].
        if !self
            .deps
            .assume_protector(self.unit.protectors, ProtectorCell::ArraySpecies)
        {
            return Ok(Reduction::NoChange);
        }
        let feedback = params.feedback;
        // Callback results are arbitrary values, so the output is tagged.
        let out_kind = if info.kind.is_holey() {
            ElementsKind::Holey
        } else {
            ElementsKind::Packed
        };
        let mut asm = GraphAssembler::new(self.graph, info.effect, info.control);

        if !info.reliable {
            asm.check_shapes(info.receiver, info.shapes.clone(), feedback);
        }

        let k = asm.zero();
        let original_length = asm.load_field(FieldAccess::ArrayLength(info.kind), info.receiver);
        let output = asm.effectful(Opcode::NewArray(out_kind), &[original_length]);

        let checkpoint_params = [
            info.receiver,
            info.callback,
            info.this_arg,
            output,
            k,
            original_length,
        ];
        let check_frame_state = continuation_frame_state(
            asm.graph(),
            &mut self.continuations,
            info.outer_frame_state,
            ResumePoint::MapLoopLazy,
            ContinuationMode::Lazy,
            &checkpoint_params,
        );
        let check_throw = wire_callable_check(&mut asm, info.callback, check_frame_state);

        let loop_state = asm.loop_start(k);
        let k = loop_state.value_phi;

        let continue_test = asm.number_less_than(k, original_length);
        let (if_true, if_false) = asm.branch(continue_test, BranchHint::True);
        asm.set_control(if_true);

        let eager_params = [
            info.receiver,
            info.callback,
            info.this_arg,
            output,
            k,
            original_length,
        ];
        let eager_frame_state = continuation_frame_state(
            asm.graph(),
            &mut self.continuations,
            info.outer_frame_state,
            ResumePoint::MapLoopEager,
            ContinuationMode::Eager,
            &eager_params,
        );
        asm.checkpoint(eager_frame_state);
        asm.check_shapes(info.receiver, info.shapes.clone(), feedback);

        let (mut element, checked_k) =
            safe_load_element(&mut asm, info.kind, info.receiver, k, feedback);
        let one = asm.one();
        let next_k = asm.number_add(k, one);

        let mut hole_skip = None;
        if info.kind.is_holey() {
            let is_hole = hole_check(&mut asm, info.kind, element);
            let (hole_true, hole_false) = asm.branch(is_hole, BranchHint::False);
            hole_skip = Some((hole_true, asm.effect()));
            asm.set_control(hole_false);
            element = asm.type_guard(GuardType::NonInternal, element);
        }

        let lazy_params = [
            info.receiver,
            info.callback,
            info.this_arg,
            output,
            next_k,
            original_length,
        ];
        let lazy_frame_state = continuation_frame_state(
            asm.graph(),
            &mut self.continuations,
            info.outer_frame_state,
            ResumePoint::MapLoopLazy,
            ContinuationMode::Lazy,
            &lazy_params,
        );
        let callback_call = asm.controlling(
            Opcode::Call(CallParameters::synthetic(
                params.frequency,
                crate::jit::feedback::ConvertReceiverMode::Any,
            )),
            &[info.callback, info.this_arg, element, checked_k, info.receiver],
        );
        asm.graph().node_mut(callback_call).frame_state = Some(lazy_frame_state);

        let check_fail = match info.on_exception {
            Some(on_exception) => {
                rewire_exception_edges(&mut asm, on_exception, check_throw, callback_call)
            }
            None => check_throw,
        };

        // Store the callback result into the output array. Hole positions
        // skip both the callback and the store, leaving a hole in the output.
        let out_elements = asm.load_field(FieldAccess::Elements, output);
        asm.store_element(out_kind, out_elements, checked_k, callback_call);

        if let Some((hole_true, hole_effect)) = hole_skip {
            let after_control = asm.control();
            let after_effect = asm.effect();
            let merge = asm.merge2(hole_true, after_control);
            let ephi = asm.effect_phi2(hole_effect, after_effect, merge);
            asm.set_control(merge);
            asm.set_effect(ephi);
        }

        let body_control = asm.control();
        let body_effect = asm.effect();
        asm.loop_end(loop_state, next_k, body_control, body_effect);

        asm.set_control(if_false);
        asm.set_effect(loop_state.effect_phi);
        let final_effect = asm.effect();
        let final_control = asm.control();

        connect_throw_to_end(self.graph, check_throw, check_fail);

        self.graph
            .replace_with_value(node, output, Some(final_effect), Some(final_control));
        Ok(Reduction::Replaced(output))
    }

    pub(crate) fn reduce_array_filter(
        &mut self,
        node: NodeId,
        params: &CallParameters,
    ) -> Result<Reduction, ReduceError> {
        let Some(info) = self.array_iter_prologue(node, params, false) else {
            return Ok(Reduction::NoChange);
        };
        if !self
            .deps
            .assume_protector(self.unit.protectors, ProtectorCell::ArraySpecies)
        {
            return Ok(Reduction::NoChange);
        }
        let feedback = params.feedback;
        let out_kind = ElementsKind::Packed;
        let mut asm = GraphAssembler::new(self.graph, info.effect, info.control);

        if !info.reliable {
            asm.check_shapes(info.receiver, info.shapes.clone(), feedback);
        }

        let k = asm.zero();
        let to_init = asm.zero();
        let original_length = asm.load_field(FieldAccess::ArrayLength(info.kind), info.receiver);
        let zero = asm.zero();
        let output = asm.effectful(Opcode::NewArray(out_kind), &[zero]);

        let checkpoint_params = [
            info.receiver,
            info.callback,
            info.this_arg,
            output,
            k,
            original_length,
            to_init,
        ];
        let check_frame_state = continuation_frame_state(
            asm.graph(),
            &mut self.continuations,
            info.outer_frame_state,
            ResumePoint::FilterLoopLazy,
            ContinuationMode::Lazy,
            &checkpoint_params,
        );
        let check_throw = wire_callable_check(&mut asm, info.callback, check_frame_state);

        let loop_state = asm.loop_start(k);
        let k = loop_state.value_phi;
        let to = asm.loop_phi(&loop_state, to_init);

        let continue_test = asm.number_less_than(k, original_length);
        let (if_true, if_false) = asm.branch(continue_test, BranchHint::True);
        asm.set_control(if_true);

        let eager_params = [
            info.receiver,
            info.callback,
            info.this_arg,
            output,
            k,
            original_length,
            to,
        ];
        let eager_frame_state = continuation_frame_state(
            asm.graph(),
            &mut self.continuations,
            info.outer_frame_state,
            ResumePoint::FilterLoopEager,
            ContinuationMode::Eager,
            &eager_params,
        );
        asm.checkpoint(eager_frame_state);
        asm.check_shapes(info.receiver, info.shapes.clone(), feedback);

        let (mut element, checked_k) =
            safe_load_element(&mut asm, info.kind, info.receiver, k, feedback);
        let one = asm.one();
        let next_k = asm.number_add(k, one);

        let mut hole_skip = None;
        if info.kind.is_holey() {
            let is_hole = hole_check(&mut asm, info.kind, element);
            let (hole_true, hole_false) = asm.branch(is_hole, BranchHint::False);
            hole_skip = Some((hole_true, asm.effect()));
            asm.set_control(hole_false);
            element = asm.type_guard(GuardType::NonInternal, element);
        }

        let lazy_params = [
            info.receiver,
            info.callback,
            info.this_arg,
            output,
            next_k,
            original_length,
            to,
        ];
        let lazy_frame_state = continuation_frame_state(
            asm.graph(),
            &mut self.continuations,
            info.outer_frame_state,
            ResumePoint::FilterLoopLazy,
            ContinuationMode::Lazy,
            &lazy_params,
        );
        let callback_call = asm.controlling(
            Opcode::Call(CallParameters::synthetic(
                params.frequency,
                crate::jit::feedback::ConvertReceiverMode::Any,
            )),
            &[info.callback, info.this_arg, element, checked_k, info.receiver],
        );
        asm.graph().node_mut(callback_call).frame_state = Some(lazy_frame_state);

        let check_fail = match info.on_exception {
            Some(on_exception) => {
                rewire_exception_edges(&mut asm, on_exception, check_throw, callback_call)
            }
            None => check_throw,
        };

        // Keep the element when the callback result is truthy: grow the
        // output backing store, bump its length, and store at `to`.
        let keep = asm.pure1(Opcode::ToBoolean, callback_call);
        let (keep_true, keep_false) = asm.branch(keep, BranchHint::True);
        let effect_before_keep = asm.effect();

        asm.set_control(keep_true);
        let out_elements = asm.load_field(FieldAccess::Elements, output);
        let out_elements_length = asm.load_field(FieldAccess::FixedArrayLength, out_elements);
        let grown = asm.effectful(
            Opcode::MaybeGrowFastElements {
                mode: GrowMode::SmiOrObject,
                feedback,
            },
            &[output, out_elements, to, out_elements_length],
        );
        let to_plus_one = asm.number_add(to, one);
        asm.store_field(FieldAccess::ArrayLength(out_kind), output, to_plus_one);
        asm.store_element(out_kind, grown, to, element);
        let keep_control = asm.control();
        let keep_effect = asm.effect();

        let merge = asm.merge2(keep_control, keep_false);
        let ephi = asm.effect_phi2(keep_effect, effect_before_keep, merge);
        let next_to = asm.phi2(to_plus_one, to, merge);
        asm.set_control(merge);
        asm.set_effect(ephi);

        if let Some((hole_true, hole_effect)) = hole_skip {
            let after_control = asm.control();
            let after_effect = asm.effect();
            let merge = asm.merge2(hole_true, after_control);
            let ephi = asm.effect_phi2(hole_effect, after_effect, merge);
            let merged_to = asm.phi2(to, next_to, merge);
            asm.set_control(merge);
            asm.set_effect(ephi);
            asm.set_phi_back_edge(to, merged_to);
        } else {
            asm.set_phi_back_edge(to, next_to);
        }

        let body_control = asm.control();
        let body_effect = asm.effect();
        asm.loop_end(loop_state, next_k, body_control, body_effect);

        asm.set_control(if_false);
        asm.set_effect(loop_state.effect_phi);
        let final_effect = asm.effect();
        let final_control = asm.control();

        connect_throw_to_end(self.graph, check_throw, check_fail);

        self.graph
            .replace_with_value(node, output, Some(final_effect), Some(final_control));
        Ok(Reduction::Replaced(output))
    }

    /// reduce / reduceRight. The accumulator rides a loop phi; the callback
    /// receives (accumulator, element, index, receiver) with an undefined
    /// receiver of its own. Without an initial value the first element seeds
    /// the accumulator and an empty receiver throws the specified TypeError;
    /// that seeding is only attempted for packed kinds, holey receivers
    /// without an initial value stay on the generic path.
    pub(crate) fn reduce_array_reduce(
        &mut self,
        node: NodeId,
        params: &CallParameters,
        direction: ReduceDirection,
    ) -> Result<Reduction, ReduceError> {
        let Some(info) = self.array_iter_prologue(node, params, false) else {
            return Ok(Reduction::NoChange);
        };
        let has_initial = self.argument_count(node) >= 2;
        if !has_initial && info.kind.is_holey() {
            return Ok(Reduction::NoChange);
        }
        let initial = self.argument(node, 1);
        let feedback = params.feedback;
        let left = direction == ReduceDirection::Left;
        let (eager_resume, lazy_resume, pre_resume) = if left {
            (
                ResumePoint::ReduceLoopEager,
                ResumePoint::ReduceLoopLazy,
                ResumePoint::ReducePreLoopEager,
            )
        } else {
            (
                ResumePoint::ReduceRightLoopEager,
                ResumePoint::ReduceRightLoopLazy,
                ResumePoint::ReduceRightPreLoopEager,
            )
        };
        let mut asm = GraphAssembler::new(self.graph, info.effect, info.control);

        if !info.reliable {
            asm.check_shapes(info.receiver, info.shapes.clone(), feedback);
        }

        let original_length = asm.load_field(FieldAccess::ArrayLength(info.kind), info.receiver);
        let one = asm.one();
        let last = asm.number_subtract(original_length, one);
        let k_init = if left { asm.zero() } else { last };

        let checkpoint_params = [info.receiver, info.callback, k_init, original_length];
        let check_frame_state = continuation_frame_state(
            asm.graph(),
            &mut self.continuations,
            info.outer_frame_state,
            pre_resume,
            ContinuationMode::Eager,
            &checkpoint_params,
        );
        let check_throw = wire_callable_check(&mut asm, info.callback, check_frame_state);

        // Seed the accumulator: the explicit initial value, or element 0
        // (length-1 for reduceRight) of a provably packed receiver. The
        // empty-receiver TypeError has to fire before the loop.
        let (acc_init, k_start) = if has_initial {
            (initial.expect("checked arity"), k_init)
        } else {
            let zero = asm.zero();
            let is_empty = asm.number_equal(original_length, zero);
            let (empty_true, empty_false) = asm.branch(is_empty, BranchHint::False);
            let effect_at_branch = asm.effect();
            let empty_throw = asm.graph().add_with_frame_state(
                Opcode::CallRuntime(RuntimeFn::ThrowTypeError(
                    MessageTemplate::ReduceNoInitialValue,
                )),
                &[info.callback],
                &[effect_at_branch],
                &[empty_true],
                check_frame_state,
            );
            connect_throw_to_end(asm.graph(), empty_throw, empty_throw);
            asm.set_control(empty_false);
            let (element, checked) =
                safe_load_element(&mut asm, info.kind, info.receiver, k_init, feedback);
            let step = if left {
                asm.number_add(checked, one)
            } else {
                asm.number_subtract(checked, one)
            };
            (element, step)
        };

        let loop_state = asm.loop_start(k_start);
        let k = loop_state.value_phi;
        let acc = asm.loop_phi(&loop_state, acc_init);

        let continue_test = if left {
            asm.number_less_than(k, original_length)
        } else {
            let zero = asm.zero();
            let minus_one = asm.number_subtract(zero, one);
            asm.number_less_than(minus_one, k)
        };
        let (if_true, if_false) = asm.branch(continue_test, BranchHint::True);
        asm.set_control(if_true);

        let eager_params = [info.receiver, info.callback, k, original_length, acc];
        let eager_frame_state = continuation_frame_state(
            asm.graph(),
            &mut self.continuations,
            info.outer_frame_state,
            eager_resume,
            ContinuationMode::Eager,
            &eager_params,
        );
        asm.checkpoint(eager_frame_state);
        asm.check_shapes(info.receiver, info.shapes.clone(), feedback);

        let (mut element, checked_k) =
            safe_load_element(&mut asm, info.kind, info.receiver, k, feedback);
        let next_k = if left {
            asm.number_add(k, one)
        } else {
            asm.number_subtract(k, one)
        };

        let mut hole_skip = None;
        if info.kind.is_holey() {
            let is_hole = hole_check(&mut asm, info.kind, element);
            let (hole_true, hole_false) = asm.branch(is_hole, BranchHint::False);
            hole_skip = Some((hole_true, asm.effect()));
            asm.set_control(hole_false);
            element = asm.type_guard(GuardType::NonInternal, element);
        }

        let lazy_params = [info.receiver, info.callback, next_k, original_length];
        let lazy_frame_state = continuation_frame_state(
            asm.graph(),
            &mut self.continuations,
            info.outer_frame_state,
            lazy_resume,
            ContinuationMode::Lazy,
            &lazy_params,
        );
        let undefined = asm.undefined();
        let callback_call = asm.controlling(
            Opcode::Call(CallParameters::synthetic(
                params.frequency,
                crate::jit::feedback::ConvertReceiverMode::Any,
            )),
            &[
                info.callback,
                undefined,
                acc,
                element,
                checked_k,
                info.receiver,
            ],
        );
        asm.graph().node_mut(callback_call).frame_state = Some(lazy_frame_state);

        let check_fail = match info.on_exception {
            Some(on_exception) => {
                rewire_exception_edges(&mut asm, on_exception, check_throw, callback_call)
            }
            None => check_throw,
        };

        let next_acc = if let Some((hole_true, hole_effect)) = hole_skip {
            let after_control = asm.control();
            let after_effect = asm.effect();
            let merge = asm.merge2(hole_true, after_control);
            let ephi = asm.effect_phi2(hole_effect, after_effect, merge);
            // A skipped hole leaves the accumulator untouched.
            let merged = asm.phi2(acc, callback_call, merge);
            asm.set_control(merge);
            asm.set_effect(ephi);
            merged
        } else {
            callback_call
        };
        asm.set_phi_back_edge(acc, next_acc);

        let body_control = asm.control();
        let body_effect = asm.effect();
        asm.loop_end(loop_state, next_k, body_control, body_effect);

        asm.set_control(if_false);
        asm.set_effect(loop_state.effect_phi);
        let final_effect = asm.effect();
        let final_control = asm.control();

        connect_throw_to_end(self.graph, check_throw, check_fail);

        self.graph
            .replace_with_value(node, acc, Some(final_effect), Some(final_control));
        Ok(Reduction::Replaced(acc))
    }

    /// every / some: the loop exits early the first time the callback result
    /// decides the answer; the final value merges the early exit with the
    /// ran-to-completion path.
    pub(crate) fn reduce_array_every_some(
        &mut self,
        node: NodeId,
        params: &CallParameters,
        variant: EverySomeVariant,
    ) -> Result<Reduction, ReduceError> {
        let Some(info) = self.array_iter_prologue(node, params, false) else {
            return Ok(Reduction::NoChange);
        };
        let feedback = params.feedback;
        let every = variant == EverySomeVariant::Every;
        let (eager_resume, lazy_resume) = if every {
            (ResumePoint::EveryLoopEager, ResumePoint::EveryLoopLazy)
        } else {
            (ResumePoint::SomeLoopEager, ResumePoint::SomeLoopLazy)
        };
        let mut asm = GraphAssembler::new(self.graph, info.effect, info.control);

        if !info.reliable {
            asm.check_shapes(info.receiver, info.shapes.clone(), feedback);
        }

        let k = asm.zero();
        let original_length = asm.load_field(FieldAccess::ArrayLength(info.kind), info.receiver);

        let checkpoint_params = [info.receiver, info.callback, info.this_arg, k, original_length];
        let check_frame_state = continuation_frame_state(
            asm.graph(),
            &mut self.continuations,
            info.outer_frame_state,
            lazy_resume,
            ContinuationMode::Lazy,
            &checkpoint_params,
        );
        let check_throw = wire_callable_check(&mut asm, info.callback, check_frame_state);

        let loop_state = asm.loop_start(k);
        let k = loop_state.value_phi;

        let continue_test = asm.number_less_than(k, original_length);
        let (if_true, if_false) = asm.branch(continue_test, BranchHint::True);
        asm.set_control(if_true);

        let eager_params = [info.receiver, info.callback, info.this_arg, k, original_length];
        let eager_frame_state = continuation_frame_state(
            asm.graph(),
            &mut self.continuations,
            info.outer_frame_state,
            eager_resume,
            ContinuationMode::Eager,
            &eager_params,
        );
        asm.checkpoint(eager_frame_state);
        asm.check_shapes(info.receiver, info.shapes.clone(), feedback);

        let (mut element, checked_k) =
            safe_load_element(&mut asm, info.kind, info.receiver, k, feedback);
        let one = asm.one();
        let next_k = asm.number_add(k, one);

        let mut hole_skip = None;
        if info.kind.is_holey() {
            let is_hole = hole_check(&mut asm, info.kind, element);
            let (hole_true, hole_false) = asm.branch(is_hole, BranchHint::False);
            hole_skip = Some((hole_true, asm.effect()));
            asm.set_control(hole_false);
            element = asm.type_guard(GuardType::NonInternal, element);
        }

        let lazy_params = [info.receiver, info.callback, info.this_arg, next_k, original_length];
        let lazy_frame_state = continuation_frame_state(
            asm.graph(),
            &mut self.continuations,
            info.outer_frame_state,
            lazy_resume,
            ContinuationMode::Lazy,
            &lazy_params,
        );
        let callback_call = asm.controlling(
            Opcode::Call(CallParameters::synthetic(
                params.frequency,
                crate::jit::feedback::ConvertReceiverMode::Any,
            )),
            &[info.callback, info.this_arg, element, checked_k, info.receiver],
        );
        asm.graph().node_mut(callback_call).frame_state = Some(lazy_frame_state);

        let check_fail = match info.on_exception {
            Some(on_exception) => {
                rewire_exception_edges(&mut asm, on_exception, check_throw, callback_call)
            }
            None => check_throw,
        };

        // every exits with false on the first falsy result; some exits with
        // true on the first truthy one.
        let decided = asm.pure1(Opcode::ToBoolean, callback_call);
        let hint = if every { BranchHint::True } else { BranchHint::False };
        let (decision_true, decision_false) = asm.branch(decided, hint);
        let effect_at_decision = asm.effect();
        let (continue_control, exit_control) = if every {
            (decision_true, decision_false)
        } else {
            (decision_false, decision_true)
        };
        asm.set_control(continue_control);

        if let Some((hole_true, hole_effect)) = hole_skip {
            let after_control = asm.control();
            let after_effect = asm.effect();
            let merge = asm.merge2(hole_true, after_control);
            let ephi = asm.effect_phi2(hole_effect, after_effect, merge);
            asm.set_control(merge);
            asm.set_effect(ephi);
        }

        let body_control = asm.control();
        let body_effect = asm.effect();
        asm.loop_end(loop_state, next_k, body_control, body_effect);

        // Completed loop yields the default answer, the early exit the
        // opposite one.
        let completed_value = asm.graph().bool_constant(every);
        let exited_value = asm.graph().bool_constant(!every);
        let merge = asm.merge2(if_false, exit_control);
        let ephi = asm.effect_phi2(loop_state.effect_phi, effect_at_decision, merge);
        let value = asm.phi2(completed_value, exited_value, merge);

        connect_throw_to_end(self.graph, check_throw, check_fail);

        self.graph
            .replace_with_value(node, value, Some(ephi), Some(merge));
        Ok(Reduction::Replaced(value))
    }

    /// find / findIndex. Unlike the skipping iterators, the callback runs for
    /// holes too, with the hole converted to undefined at the loaded-value
    /// boundary. Holey-double receivers are excluded here (and only here);
    /// the double-hole representation cannot flow into the after-callback
    /// resume state yet.
    pub(crate) fn reduce_array_find(
        &mut self,
        node: NodeId,
        params: &CallParameters,
        variant: ArrayFindVariant,
    ) -> Result<Reduction, ReduceError> {
        let Some(info) = self.array_iter_prologue(node, params, true) else {
            return Ok(Reduction::NoChange);
        };
        let feedback = params.feedback;
        let find = variant == ArrayFindVariant::Find;
        let (eager_resume, lazy_resume, after_resume) = if find {
            (
                ResumePoint::FindLoopEager,
                ResumePoint::FindLoopLazy,
                ResumePoint::FindLoopAfterCallbackLazy,
            )
        } else {
            (
                ResumePoint::FindIndexLoopEager,
                ResumePoint::FindIndexLoopLazy,
                ResumePoint::FindIndexLoopAfterCallbackLazy,
            )
        };
        let mut asm = GraphAssembler::new(self.graph, info.effect, info.control);

        if !info.reliable {
            asm.check_shapes(info.receiver, info.shapes.clone(), feedback);
        }

        let k = asm.zero();
        let original_length = asm.load_field(FieldAccess::ArrayLength(info.kind), info.receiver);

        let checkpoint_params = [info.receiver, info.callback, info.this_arg, k, original_length];
        let check_frame_state = continuation_frame_state(
            asm.graph(),
            &mut self.continuations,
            info.outer_frame_state,
            lazy_resume,
            ContinuationMode::Lazy,
            &checkpoint_params,
        );
        let check_throw = wire_callable_check(&mut asm, info.callback, check_frame_state);

        let loop_state = asm.loop_start(k);
        let k = loop_state.value_phi;

        let continue_test = asm.number_less_than(k, original_length);
        let (if_true, if_false) = asm.branch(continue_test, BranchHint::True);
        asm.set_control(if_true);

        let eager_params = [info.receiver, info.callback, info.this_arg, k, original_length];
        let eager_frame_state = continuation_frame_state(
            asm.graph(),
            &mut self.continuations,
            info.outer_frame_state,
            eager_resume,
            ContinuationMode::Eager,
            &eager_params,
        );
        asm.checkpoint(eager_frame_state);
        asm.check_shapes(info.receiver, info.shapes.clone(), feedback);

        let (mut element, checked_k) =
            safe_load_element(&mut asm, info.kind, info.receiver, k, feedback);
        let one = asm.one();
        let next_k = asm.number_add(k, one);

        // Holes are observable here: the callback sees undefined, not a skip.
        if info.kind.is_holey() {
            element = asm.pure1(Opcode::ConvertHoleToUndefined, element);
        }

        // The after-callback continuation resumes with the element still
        // needed to produce the result of find.
        let lazy_params = [
            info.receiver,
            info.callback,
            info.this_arg,
            next_k,
            original_length,
            element,
        ];
        let lazy_frame_state = continuation_frame_state(
            asm.graph(),
            &mut self.continuations,
            info.outer_frame_state,
            after_resume,
            ContinuationMode::Lazy,
            &lazy_params,
        );
        let callback_call = asm.controlling(
            Opcode::Call(CallParameters::synthetic(
                params.frequency,
                crate::jit::feedback::ConvertReceiverMode::Any,
            )),
            &[info.callback, info.this_arg, element, checked_k, info.receiver],
        );
        asm.graph().node_mut(callback_call).frame_state = Some(lazy_frame_state);

        let check_fail = match info.on_exception {
            Some(on_exception) => {
                rewire_exception_edges(&mut asm, on_exception, check_throw, callback_call)
            }
            None => check_throw,
        };

        let found = asm.pure1(Opcode::ToBoolean, callback_call);
        let (found_true, found_false) = asm.branch(found, BranchHint::False);
        let effect_at_decision = asm.effect();
        asm.set_control(found_false);

        let body_control = asm.control();
        let body_effect = asm.effect();
        asm.loop_end(loop_state, next_k, body_control, body_effect);

        let undefined = asm.undefined();
        let minus_one = asm.graph().number(-1.0);
        let (found_value, missed_value) = if find {
            (element, undefined)
        } else {
            (checked_k, minus_one)
        };
        let merge = asm.merge2(found_true, if_false);
        let ephi = asm.effect_phi2(effect_at_decision, loop_state.effect_phi, merge);
        let value = asm.phi2(found_value, missed_value, merge);

        connect_throw_to_end(self.graph, check_throw, check_fail);

        self.graph
            .replace_with_value(node, value, Some(ephi), Some(merge));
        Ok(Reduction::Replaced(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jit::builtins::Builtin;
    use crate::jit::deps::Dependency;
    use crate::jit::feedback::{CallSiteFeedback, CalleeFeedback, Shape, ShapeFeedback};
    use crate::jit::ir::op::Constant;
    use crate::jit::reduce::testutil::TestWorld;

    fn fast_array_receiver(world: &mut TestWorld, kind: ElementsKind) -> (NodeId, ShapeId) {
        let shape = world.shapes.add(Shape::fast_array(kind));
        let receiver = world.parameter(1);
        (receiver, shape)
    }

    fn iter_call(
        world: &mut TestWorld,
        builtin: Builtin,
        kind: ElementsKind,
    ) -> (NodeId, NodeId, ShapeId) {
        let target = world.builtin(builtin);
        let (receiver, shape) = fast_array_receiver(world, kind);
        let callback = world.parameter(2);
        let source = world.feedback_slot(CallSiteFeedback {
            callee: CalleeFeedback::None,
            shapes: ShapeFeedback::Reliable(vec![shape]),
        });
        let params = crate::jit::ir::op::CallParameters {
            feedback: Some(source),
            ..world.default_params()
        };
        let node = world.call_with(target, receiver, &[callback], params);
        (node, receiver, shape)
    }

    #[test]
    fn test_for_each_builds_counted_loop() {
        let mut world = TestWorld::new();
        let (node, receiver, _) = iter_call(&mut world, Builtin::ArrayForEach, ElementsKind::PackedSmi);
        let mut reducer = world.reducer();
        let Reduction::Replaced(value) = reducer.reduce(node).unwrap() else {
            panic!("expected replacement");
        };
        // forEach yields undefined.
        assert!(matches!(
            reducer.graph.op(value),
            Opcode::Constant(Constant::Undefined)
        ));
        let ops: Vec<_> = reducer
            .graph
            .live_nodes()
            .into_iter()
            .map(|id| reducer.graph.op(id).clone())
            .collect();
        assert!(ops.iter().any(|op| matches!(op, Opcode::Loop)));
        assert!(ops.iter().any(|op| matches!(op, Opcode::CheckBounds(_))));
        assert!(ops.iter().any(|op| matches!(op, Opcode::Terminate)));
        // Per-iteration shape re-validation: at least one CheckShapes on the
        // receiver inside the loop (reliable entry feedback needs no check
        // before the loop, so any check present is the per-iteration one).
        assert!(reducer.graph.live_nodes().into_iter().any(|id| {
            let n = reducer.graph.node(id);
            matches!(n.op, Opcode::CheckShapes { .. }) && n.values[0] == receiver
        }));
        // The no-elements protector is a registered dependency.
        assert!(reducer
            .dependencies()
            .contains(Dependency::ProtectorIntact(ProtectorCell::NoElements)));
    }

    #[test]
    fn test_for_each_rechecks_bounds_against_fresh_length() {
        let mut world = TestWorld::new();
        let (node, receiver, _) = iter_call(&mut world, Builtin::ArrayForEach, ElementsKind::PackedSmi);
        let mut reducer = world.reducer();
        reducer.reduce(node).unwrap();
        // The CheckBounds length operand must be a length load that happens
        // inside the loop (its effect chain passes through the loop's effect
        // phi), not the pre-loop load.
        let check_bounds = reducer
            .graph
            .live_nodes()
            .into_iter()
            .find(|&id| matches!(reducer.graph.op(id), Opcode::CheckBounds(_)))
            .expect("bounds check in loop");
        let length = reducer.graph.node(check_bounds).values[1];
        assert!(matches!(
            reducer.graph.op(length),
            Opcode::LoadField(FieldAccess::ArrayLength(_))
        ));
        assert_eq!(reducer.graph.node(length).values[0], receiver);
        // Walk the length load's effect chain backwards; it must reach the
        // loop's effect phi before reaching Start, proving it re-runs every
        // iteration.
        let mut current = reducer.graph.node(length).effect_input();
        let mut saw_loop_phi = false;
        while let Some(id) = current {
            if matches!(reducer.graph.op(id), Opcode::EffectPhi) {
                saw_loop_phi = true;
                break;
            }
            current = reducer.graph.node(id).effect_input();
        }
        assert!(saw_loop_phi, "length is re-read under the loop effect phi");
    }

    #[test]
    fn test_map_requires_species_protector() {
        let mut world = TestWorld::new();
        let (node, _, _) = iter_call(&mut world, Builtin::ArrayMap, ElementsKind::PackedSmi);
        world.protectors.invalidate(ProtectorCell::ArraySpecies);
        let mut reducer = world.reducer();
        assert_eq!(reducer.reduce(node).unwrap(), Reduction::NoChange);
    }

    #[test]
    fn test_map_allocates_output_array() {
        let mut world = TestWorld::new();
        let (node, _, _) = iter_call(&mut world, Builtin::ArrayMap, ElementsKind::PackedSmi);
        let mut reducer = world.reducer();
        let Reduction::Replaced(value) = reducer.reduce(node).unwrap() else {
            panic!("expected replacement");
        };
        assert!(matches!(reducer.graph.op(value), Opcode::NewArray(_)));
        assert!(reducer
            .dependencies()
            .contains(Dependency::ProtectorIntact(ProtectorCell::ArraySpecies)));
    }

    #[test]
    fn test_find_rejects_holey_double() {
        let mut world = TestWorld::new();
        let (node, _, _) = iter_call(&mut world, Builtin::ArrayFind, ElementsKind::HoleyDouble);
        let mut reducer = world.reducer();
        assert_eq!(reducer.reduce(node).unwrap(), Reduction::NoChange);
    }

    #[test]
    fn test_every_accepts_holey_double() {
        let mut world = TestWorld::new();
        let (node, _, _) = iter_call(&mut world, Builtin::ArrayEvery, ElementsKind::HoleyDouble);
        let mut reducer = world.reducer();
        assert!(reducer.reduce(node).unwrap().changed());
    }

    #[test]
    fn test_find_converts_hole_instead_of_skipping() {
        let mut world = TestWorld::new();
        let (node, _, _) = iter_call(&mut world, Builtin::ArrayFind, ElementsKind::HoleySmi);
        let mut reducer = world.reducer();
        assert!(reducer.reduce(node).unwrap().changed());
        let ops: Vec<_> = reducer
            .graph
            .live_nodes()
            .into_iter()
            .map(|id| reducer.graph.op(id).clone())
            .collect();
        assert!(ops
            .iter()
            .any(|op| matches!(op, Opcode::ConvertHoleToUndefined)));
    }

    #[test]
    fn test_for_each_hole_semantics_skip_via_branch() {
        let mut world = TestWorld::new();
        let (node, _, _) = iter_call(&mut world, Builtin::ArrayForEach, ElementsKind::HoleySmi);
        let mut reducer = world.reducer();
        assert!(reducer.reduce(node).unwrap().changed());
        // Skipping iterators never convert the hole; they branch around the
        // callback and pin the non-hole type instead.
        let ops: Vec<_> = reducer
            .graph
            .live_nodes()
            .into_iter()
            .map(|id| reducer.graph.op(id).clone())
            .collect();
        assert!(!ops
            .iter()
            .any(|op| matches!(op, Opcode::ConvertHoleToUndefined)));
        assert!(ops
            .iter()
            .any(|op| matches!(op, Opcode::TypeGuard(GuardType::NonInternal))));
    }

    #[test]
    fn test_reduce_without_initial_value_on_holey_is_no_change() {
        let mut world = TestWorld::new();
        let (node, _, _) = iter_call(&mut world, Builtin::ArrayReduce, ElementsKind::HoleySmi);
        let mut reducer = world.reducer();
        assert_eq!(reducer.reduce(node).unwrap(), Reduction::NoChange);
    }

    #[test]
    fn test_reduce_with_initial_value_builds_loop() {
        let mut world = TestWorld::new();
        let target = world.builtin(Builtin::ArrayReduce);
        let shape = world.shapes.add(Shape::fast_array(ElementsKind::PackedSmi));
        let receiver = world.parameter(1);
        let callback = world.parameter(2);
        let init = world.graph.number(0.0);
        let source = world.feedback_slot(CallSiteFeedback {
            callee: CalleeFeedback::None,
            shapes: ShapeFeedback::Reliable(vec![shape]),
        });
        let params = crate::jit::ir::op::CallParameters {
            feedback: Some(source),
            ..world.default_params()
        };
        let node = world.call_with(target, receiver, &[callback, init], params);
        let mut reducer = world.reducer();
        let Reduction::Replaced(value) = reducer.reduce(node).unwrap() else {
            panic!("expected replacement");
        };
        // Result is the accumulator phi.
        assert!(matches!(reducer.graph.op(value), Opcode::Phi));
    }

    #[test]
    fn test_unreliable_shapes_get_entry_check() {
        let mut world = TestWorld::new();
        let target = world.builtin(Builtin::ArrayForEach);
        let shape = world.shapes.add(Shape::fast_array(ElementsKind::PackedSmi));
        let receiver = world.parameter(1);
        let callback = world.parameter(2);
        let source = world.feedback_slot(CallSiteFeedback {
            callee: CalleeFeedback::None,
            shapes: ShapeFeedback::Unreliable(vec![shape]),
        });
        let params = crate::jit::ir::op::CallParameters {
            feedback: Some(source),
            ..world.default_params()
        };
        let node = world.call_with(target, receiver, &[callback], params);
        let mut reducer = world.reducer();
        assert!(reducer.reduce(node).unwrap().changed());
        // Unreliable feedback demands a shape check wired before the length
        // load that feeds the loop bound.
        let first_check = reducer
            .graph
            .live_nodes()
            .into_iter()
            .filter(|&id| {
                let n = reducer.graph.node(id);
                matches!(n.op, Opcode::CheckShapes { .. }) && n.values[0] == receiver
            })
            .count();
        assert!(first_check >= 2, "entry check plus per-iteration check");
    }

    #[test]
    fn test_exception_edge_is_rewired() {
        let mut world = TestWorld::new();
        let (node, _, _) = iter_call(&mut world, Builtin::ArrayForEach, ElementsKind::PackedSmi);
        let handler = world.add_exception_handler(node);
        let mut reducer = world.reducer();
        assert!(reducer.reduce(node).unwrap().changed());
        // The original handler projection is gone, replaced by a merge of the
        // callable-check throw and the callback's exception edge.
        assert!(!reducer.graph.is_live(handler));
        let merged_exceptions = reducer
            .graph
            .live_nodes()
            .into_iter()
            .filter(|&id| matches!(reducer.graph.op(id), Opcode::IfException))
            .count();
        assert_eq!(merged_exceptions, 2);
    }

    #[test]
    fn test_no_shape_feedback_is_no_change() {
        let mut world = TestWorld::new();
        let target = world.builtin(Builtin::ArrayForEach);
        let receiver = world.parameter(1);
        let callback = world.parameter(2);
        let node = world.call(target, receiver, &[callback]);
        let mut reducer = world.reducer();
        assert_eq!(reducer.reduce(node).unwrap(), Reduction::NoChange);
    }
}
