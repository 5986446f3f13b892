//! Promise, Map/Set, typed-array, Date, and Boolean builtins
//!
//! These all follow the same discipline: an exact receiver-shape witness
//! (reliable provenance only) plus, where the rewrite elides a property
//! lookup the specification would mandate, a "nobody patched this builtin"
//! protector dependency. Without both, the generic path stays.

use super::{CallReducer, CollectionKind, ReduceError, Reduction, ViewField};
use crate::jit::deps::ProtectorCell;
use crate::jit::feedback::{InstanceType, PrototypeRef};
use crate::jit::ir::graph::NodeId;
use crate::jit::ir::op::{
    CallParameters, Constant, FieldAccess, ObjectIs, Opcode, StubCall,
};

impl<'a> CallReducer<'a> {
    /// Reliable witness that every observed receiver shape has the given
    /// instance type
    fn instance_type_witness(
        &self,
        node: NodeId,
        params: &CallParameters,
        instance_type: InstanceType,
    ) -> bool {
        let feedback = self.receiver_shapes_for_call(node, params);
        feedback.is_reliable()
            && !feedback.shapes().is_empty()
            && feedback
                .shapes()
                .iter()
                .all(|&id| self.unit.shapes.get(id).instance_type == instance_type)
    }

    /// Boolean(x) called as a function: exactly ToBoolean
    pub(crate) fn reduce_boolean_constructor(
        &mut self,
        node: NodeId,
    ) -> Result<Reduction, ReduceError> {
        let input = self.argument_or_undefined(node, 0);
        let value = self.graph.add(Opcode::ToBoolean, &[input], &[], &[]);
        self.graph.replace_with_value(node, value, None, None);
        Ok(Reduction::Replaced(value))
    }

    /// Promise.prototype.then(onFulfilled[, onRejected])
    pub(crate) fn reduce_promise_then(
        &mut self,
        node: NodeId,
        params: &CallParameters,
    ) -> Result<Reduction, ReduceError> {
        if self.speculation_disallowed(params) {
            return Ok(Reduction::NoChange);
        }
        if !self.promise_receiver_witness(node, params) {
            return Ok(Reduction::NoChange);
        }
        let receiver = self.receiver(node);
        let on_fulfilled = self.argument_or_undefined(node, 0);
        let on_rejected = self.argument_or_undefined(node, 1);
        self.lower_promise_then(node, receiver, on_fulfilled, on_rejected)
    }

    /// Promise.prototype.catch(onRejected) is then(undefined, onRejected)
    pub(crate) fn reduce_promise_catch(
        &mut self,
        node: NodeId,
        params: &CallParameters,
    ) -> Result<Reduction, ReduceError> {
        if self.speculation_disallowed(params) {
            return Ok(Reduction::NoChange);
        }
        if !self.promise_receiver_witness(node, params) {
            return Ok(Reduction::NoChange);
        }
        let receiver = self.receiver(node);
        let on_rejected = self.argument_or_undefined(node, 0);
        let undefined = self.graph.undefined();
        self.lower_promise_then(node, receiver, undefined, on_rejected)
    }

    /// Promise.prototype.finally(onFinally). The wrapper closures the
    /// specification describes are created by the reaction stub; the rewrite
    /// here only elides the then lookup, so it additionally insists on a
    /// statically known callback.
    pub(crate) fn reduce_promise_finally(
        &mut self,
        node: NodeId,
        params: &CallParameters,
    ) -> Result<Reduction, ReduceError> {
        if self.speculation_disallowed(params) {
            return Ok(Reduction::NoChange);
        }
        if !self.promise_receiver_witness(node, params) {
            return Ok(Reduction::NoChange);
        }
        let on_finally = self.argument_or_undefined(node, 0);
        if !matches!(
            self.graph.op(on_finally),
            Opcode::Constant(_) | Opcode::CreateClosure(_)
        ) {
            return Ok(Reduction::NoChange);
        }
        let receiver = self.receiver(node);
        self.lower_promise_then(node, receiver, on_finally, on_finally)
    }

    fn promise_receiver_witness(&mut self, node: NodeId, params: &CallParameters) -> bool {
        let feedback = self.receiver_shapes_for_call(node, params);
        if !feedback.is_reliable() || feedback.shapes().is_empty() {
            return false;
        }
        for &id in feedback.shapes() {
            let shape = self.unit.shapes.get(id);
            if shape.instance_type != InstanceType::Promise
                || shape.prototype != PrototypeRef::InitialPromisePrototype
            {
                return false;
            }
            if !self.deps.assume_shape_stable(self.unit.shapes, id) {
                return false;
            }
        }
        self.deps
            .assume_protector(self.unit.protectors, ProtectorCell::PromiseThenLookup)
    }

    fn lower_promise_then(
        &mut self,
        node: NodeId,
        receiver: NodeId,
        on_fulfilled: NodeId,
        on_rejected: NodeId,
    ) -> Result<Reduction, ReduceError> {
        let effect = self.effect_of(node);
        let control = self.control_of(node);
        let mut asm = crate::jit::ir::builder::GraphAssembler::new(self.graph, effect, control);
        let result = asm.effectful(Opcode::CallStub(StubCall::NewPromise), &[]);
        let value = asm.effectful(
            Opcode::CallStub(StubCall::PerformPromiseThen),
            &[receiver, on_fulfilled, on_rejected, result],
        );
        let final_effect = asm.effect();
        self.graph
            .replace_with_value(node, value, Some(final_effect), None);
        Ok(Reduction::Replaced(value))
    }

    /// Promise.resolve(x): a native promise resolves to itself
    pub(crate) fn reduce_promise_resolve(
        &mut self,
        node: NodeId,
        params: &CallParameters,
    ) -> Result<Reduction, ReduceError> {
        if self.speculation_disallowed(params) {
            return Ok(Reduction::NoChange);
        }
        let Some(value) = self.argument(node, 0) else {
            return Ok(Reduction::NoChange);
        };
        let effect = self.effect_of(node);
        let shapes = self.infer_receiver_shapes(value, effect);
        if !shapes.is_reliable() || shapes.shapes().is_empty() {
            return Ok(Reduction::NoChange);
        }
        for &id in shapes.shapes() {
            let shape = self.unit.shapes.get(id);
            if shape.instance_type != InstanceType::Promise {
                return Ok(Reduction::NoChange);
            }
            if !self.deps.assume_shape_stable(self.unit.shapes, id) {
                return Ok(Reduction::NoChange);
            }
        }
        if !self
            .deps
            .assume_protector(self.unit.protectors, ProtectorCell::PromiseThenLookup)
        {
            return Ok(Reduction::NoChange);
        }
        self.graph.replace_with_value(node, value, None, None);
        Ok(Reduction::Replaced(value))
    }

    /// Map.prototype.get(key) via the ordered-hash-table stub
    pub(crate) fn reduce_map_get(
        &mut self,
        node: NodeId,
        params: &CallParameters,
    ) -> Result<Reduction, ReduceError> {
        if !self.instance_type_witness(node, params, InstanceType::Map) {
            return Ok(Reduction::NoChange);
        }
        let receiver = self.receiver(node);
        let key = self.argument_or_undefined(node, 0);
        let effect = self.effect_of(node);
        let control = self.control_of(node);
        let value = self.graph.add(
            Opcode::CallStub(StubCall::MapGet),
            &[receiver, key],
            &[effect],
            &[control],
        );
        self.graph.replace_with_value(node, value, Some(value), None);
        Ok(Reduction::Replaced(value))
    }

    pub(crate) fn reduce_map_has(
        &mut self,
        node: NodeId,
        params: &CallParameters,
    ) -> Result<Reduction, ReduceError> {
        if !self.instance_type_witness(node, params, InstanceType::Map) {
            return Ok(Reduction::NoChange);
        }
        let receiver = self.receiver(node);
        let key = self.argument_or_undefined(node, 0);
        let effect = self.effect_of(node);
        let control = self.control_of(node);
        let value = self.graph.add(
            Opcode::CallStub(StubCall::MapHas),
            &[receiver, key],
            &[effect],
            &[control],
        );
        self.graph.replace_with_value(node, value, Some(value), None);
        Ok(Reduction::Replaced(value))
    }

    pub(crate) fn reduce_set_has(
        &mut self,
        node: NodeId,
        params: &CallParameters,
    ) -> Result<Reduction, ReduceError> {
        if !self.instance_type_witness(node, params, InstanceType::Set) {
            return Ok(Reduction::NoChange);
        }
        let receiver = self.receiver(node);
        let key = self.argument_or_undefined(node, 0);
        let effect = self.effect_of(node);
        let control = self.control_of(node);
        let value = self.graph.add(
            Opcode::CallStub(StubCall::SetHas),
            &[receiver, key],
            &[effect],
            &[control],
        );
        self.graph.replace_with_value(node, value, Some(value), None);
        Ok(Reduction::Replaced(value))
    }

    /// Map/Set size getter: a plain field load under the witness
    pub(crate) fn reduce_collection_size(
        &mut self,
        node: NodeId,
        params: &CallParameters,
        kind: CollectionKind,
    ) -> Result<Reduction, ReduceError> {
        let instance_type = match kind {
            CollectionKind::Map => InstanceType::Map,
            CollectionKind::Set => InstanceType::Set,
        };
        if !self.instance_type_witness(node, params, instance_type) {
            return Ok(Reduction::NoChange);
        }
        let receiver = self.receiver(node);
        let effect = self.effect_of(node);
        let control = self.control_of(node);
        let value = self.graph.add(
            Opcode::LoadField(FieldAccess::CollectionSize),
            &[receiver],
            &[effect],
            &[control],
        );
        self.graph.replace_with_value(node, value, Some(value), None);
        Ok(Reduction::Replaced(value))
    }

    /// TypedArray / DataView accessor properties: field loads under the
    /// instance-type witness
    pub(crate) fn reduce_array_buffer_view_accessor(
        &mut self,
        node: NodeId,
        params: &CallParameters,
        field: ViewField,
    ) -> Result<Reduction, ReduceError> {
        let (instance_type, access) = match field {
            ViewField::TypedArrayByteLength => {
                (InstanceType::TypedArray, FieldAccess::TypedArrayByteLength)
            }
            ViewField::TypedArrayByteOffset => {
                (InstanceType::TypedArray, FieldAccess::TypedArrayByteOffset)
            }
            ViewField::TypedArrayLength => (InstanceType::TypedArray, FieldAccess::TypedArrayLength),
            ViewField::DataViewByteLength => {
                (InstanceType::DataView, FieldAccess::DataViewByteLength)
            }
            ViewField::DataViewByteOffset => {
                (InstanceType::DataView, FieldAccess::DataViewByteOffset)
            }
        };
        if !self.instance_type_witness(node, params, instance_type) {
            return Ok(Reduction::NoChange);
        }
        let receiver = self.receiver(node);
        let effect = self.effect_of(node);
        let control = self.control_of(node);
        let value = self
            .graph
            .add(Opcode::LoadField(access), &[receiver], &[effect], &[control]);
        self.graph.replace_with_value(node, value, Some(value), None);
        Ok(Reduction::Replaced(value))
    }

    /// ArrayBuffer.isView(x): undefined is certainly not a view
    pub(crate) fn reduce_array_buffer_is_view(
        &mut self,
        node: NodeId,
    ) -> Result<Reduction, ReduceError> {
        if self.argument_count(node) < 1 {
            let value = self.graph.bool_constant(false);
            self.graph.replace_with_value(node, value, None, None);
            return Ok(Reduction::Replaced(value));
        }
        let input = self.argument(node, 0).expect("checked arity");
        let value = self.graph.add(
            Opcode::ObjectIs(ObjectIs::ArrayBufferView),
            &[input],
            &[],
            &[],
        );
        self.graph.replace_with_value(node, value, None, None);
        Ok(Reduction::Replaced(value))
    }

    /// Date.prototype.getTime under a Date witness: the stored time value
    pub(crate) fn reduce_date_get_time(
        &mut self,
        node: NodeId,
        params: &CallParameters,
    ) -> Result<Reduction, ReduceError> {
        if !self.instance_type_witness(node, params, InstanceType::Date) {
            return Ok(Reduction::NoChange);
        }
        let receiver = self.receiver(node);
        let effect = self.effect_of(node);
        let control = self.control_of(node);
        let value = self.graph.add(
            Opcode::LoadField(FieldAccess::DateValue),
            &[receiver],
            &[effect],
            &[control],
        );
        self.graph.replace_with_value(node, value, Some(value), None);
        Ok(Reduction::Replaced(value))
    }

    /// Date.now(): the clock read, still ordered on the effect chain
    pub(crate) fn reduce_date_now(&mut self, node: NodeId) -> Result<Reduction, ReduceError> {
        let effect = self.effect_of(node);
        let control = self.control_of(node);
        let value = self.graph.add(
            Opcode::CallStub(StubCall::DateNow),
            &[],
            &[effect],
            &[control],
        );
        self.graph.replace_with_value(node, value, Some(value), None);
        Ok(Reduction::Replaced(value))
    }
}
