//! Object.* and Reflect.* builtins
//!
//! Where the operation maps onto a lower-level operator (SameValue,
//! GetPrototypeOf, HasInPrototypeChain) the call is re-expressed directly.
//! Where the specification mandates an observable TypeError (Reflect.get,
//! Reflect.has on a non-object target) the rewrite is an explicit two-way
//! branch whose false path constructs the TypeError at runtime and merges
//! unconditionally into the throw/exception edge.

use super::{CallReducer, ReduceError, Reduction};
use crate::jit::builtins::Builtin;
use crate::jit::feedback::InstanceType;
use crate::jit::ir::graph::NodeId;
use crate::jit::ir::op::{
    BranchHint, CallParameters, Constant, DeoptReason, FieldAccess, ForInMode, MessageTemplate,
    ObjectIs, Opcode, RuntimeFn, StubCall,
};

impl<'a> CallReducer<'a> {
    /// Object.is: SameValue on the (defaulted) operands.
    /// Object.is() compares undefined with undefined, which is true.
    pub(crate) fn reduce_object_is(&mut self, node: NodeId) -> Result<Reduction, ReduceError> {
        if self.argument_count(node) == 0 {
            let value = self.graph.bool_constant(true);
            self.graph.replace_with_value(node, value, None, None);
            return Ok(Reduction::Replaced(value));
        }
        let lhs = self.argument_or_undefined(node, 0);
        let rhs = self.argument_or_undefined(node, 1);
        let value = self.graph.add(Opcode::SameValue, &[lhs, rhs], &[], &[]);
        self.graph.replace_with_value(node, value, None, None);
        Ok(Reduction::Replaced(value))
    }

    /// Object.create(null) with no property descriptors: a direct allocation.
    /// Anything else keeps the generic path.
    pub(crate) fn reduce_object_create(&mut self, node: NodeId) -> Result<Reduction, ReduceError> {
        let Some(prototype) = self.argument(node, 0) else {
            return Ok(Reduction::NoChange);
        };
        if !matches!(self.graph.op(prototype), Opcode::Constant(Constant::Null)) {
            return Ok(Reduction::NoChange);
        }
        if let Some(properties) = self.argument(node, 1) {
            if !matches!(
                self.graph.op(properties),
                Opcode::Constant(Constant::Undefined)
            ) {
                return Ok(Reduction::NoChange);
            }
        }
        let effect = self.effect_of(node);
        let control = self.control_of(node);
        let value = self
            .graph
            .add(Opcode::CreateObject, &[prototype], &[effect], &[control]);
        self.graph.replace_with_value(node, value, Some(value), None);
        Ok(Reduction::Replaced(value))
    }

    /// Object.getPrototypeOf / __proto__ getter / Reflect.getPrototypeOf:
    /// re-expressed as the prototype-load operator.
    pub(crate) fn reduce_object_get_prototype_of(
        &mut self,
        node: NodeId,
        builtin: Builtin,
    ) -> Result<Reduction, ReduceError> {
        let object = match builtin {
            // The __proto__ getter reads from the receiver itself.
            Builtin::ObjectPrototypeGetProto => self.receiver(node),
            _ => match self.argument(node, 0) {
                Some(object) => object,
                None => return Ok(Reduction::NoChange),
            },
        };
        let effect = self.effect_of(node);
        let control = self.control_of(node);
        let value = self
            .graph
            .add(Opcode::GetPrototypeOf, &[object], &[effect], &[control]);
        self.graph.replace_with_value(node, value, Some(value), None);
        Ok(Reduction::Replaced(value))
    }

    /// Object.prototype.hasOwnProperty inside a fast for..in body:
    ///
    ///   for (name in receiver) {
    ///     if (receiver.hasOwnProperty(name)) { ... }
    ///   }
    ///
    /// When `name` comes from the enum-cache ForInNext over the same
    /// receiver, the enumeration already proved ownership, so the call
    /// folds to true guarded by a shape identity check against the cached
    /// enumeration type.
    pub(crate) fn reduce_object_has_own_property(
        &mut self,
        node: NodeId,
        params: &CallParameters,
    ) -> Result<Reduction, ReduceError> {
        let receiver = self.receiver(node);
        let Some(name) = self.argument(node, 0) else {
            return Ok(Reduction::NoChange);
        };
        let Opcode::ForInNext(mode) = *self.graph.op(name) else {
            return Ok(Reduction::NoChange);
        };
        if mode == ForInMode::Generic {
            return Ok(Reduction::NoChange);
        }
        let name_node = self.graph.node(name);
        let object = name_node.values[0];
        let cache_type = name_node.values[1];
        if object != receiver {
            return Ok(Reduction::NoChange);
        }

        // The shape may have changed between the ForInNext and this call;
        // re-load and compare against the cached enumeration type.
        let effect = self.effect_of(node);
        let control = self.control_of(node);
        let mut asm = crate::jit::ir::builder::GraphAssembler::new(self.graph, effect, control);
        let shape = asm.load_field(FieldAccess::Shape, receiver);
        let same = asm.reference_equal(shape, cache_type);
        asm.check_if(same, DeoptReason::WrongShape, params.feedback);
        let final_effect = asm.effect();

        let value = self.graph.bool_constant(true);
        self.graph
            .replace_with_value(node, value, Some(final_effect), None);
        Ok(Reduction::Replaced(value))
    }

    /// Object.prototype.isPrototypeOf: with a witness that the receiver is
    /// an ordinary object, lower to the prototype-chain walk.
    pub(crate) fn reduce_object_is_prototype_of(
        &mut self,
        node: NodeId,
    ) -> Result<Reduction, ReduceError> {
        let receiver = self.receiver(node);
        let Some(object) = self.argument(node, 0) else {
            return Ok(Reduction::NoChange);
        };
        let effect = self.effect_of(node);
        let shapes = self.infer_receiver_shapes(receiver, effect);
        let shape_ids = shapes.shapes();
        if shape_ids.is_empty() {
            return Ok(Reduction::NoChange);
        }
        for &id in shape_ids {
            let shape = self.unit.shapes.get(id);
            if matches!(shape.instance_type, InstanceType::Proxy | InstanceType::Other) {
                return Ok(Reduction::NoChange);
            }
        }
        let control = self.control_of(node);
        let value = self.graph.add(
            Opcode::HasInPrototypeChain,
            &[object, receiver],
            &[effect],
            &[control],
        );
        self.graph.replace_with_value(node, value, Some(value), None);
        Ok(Reduction::Replaced(value))
    }

    /// Reflect.apply(target, thisArgument, argumentsList): morph into a
    /// call-with-array-like and re-attempt reduction.
    pub(crate) fn reduce_reflect_apply(
        &mut self,
        node: NodeId,
        params: &CallParameters,
    ) -> Result<Reduction, ReduceError> {
        if self.argument_count(node) != 3 {
            return Ok(Reduction::NoChange);
        }
        let target = self.argument(node, 0).expect("checked arity");
        let this_argument = self.argument(node, 1).expect("checked arity");
        let arguments_list = self.argument(node, 2).expect("checked arity");
        let new_params = CallParameters {
            feedback: None,
            ..params.clone()
        };
        let node_mut = self.graph.node_mut(node);
        node_mut.values = vec![target, this_argument, arguments_list];
        node_mut.op = Opcode::CallWithArrayLike(new_params);
        let reduction = self.reduce(node)?;
        Ok(if reduction.changed() {
            reduction
        } else {
            Reduction::Changed(node)
        })
    }

    /// Reflect.construct(target, argumentsList[, newTarget])
    pub(crate) fn reduce_reflect_construct(
        &mut self,
        node: NodeId,
        params: &CallParameters,
    ) -> Result<Reduction, ReduceError> {
        let argc = self.argument_count(node);
        if argc != 2 && argc != 3 {
            return Ok(Reduction::NoChange);
        }
        let target = self.argument(node, 0).expect("checked arity");
        let arguments_list = self.argument(node, 1).expect("checked arity");
        let new_target = self.argument(node, 2).unwrap_or(target);
        let node_mut = self.graph.node_mut(node);
        node_mut.values = vec![target, new_target, arguments_list];
        node_mut.op = Opcode::ConstructWithArrayLike(crate::jit::ir::op::ConstructParameters {
            frequency: params.frequency,
            speculation: params.speculation,
            feedback: None,
        });
        let reduction = self.reduce(node)?;
        Ok(if reduction.changed() {
            reduction
        } else {
            Reduction::Changed(node)
        })
    }

    /// Reflect.get(target, key): fast property load on the object path, an
    /// observable TypeError on the non-object path.
    pub(crate) fn reduce_reflect_get(&mut self, node: NodeId) -> Result<Reduction, ReduceError> {
        if self.argument_count(node) != 2 {
            return Ok(Reduction::NoChange);
        }
        let target = self.argument(node, 0).expect("checked arity");
        let key = self.argument(node, 1).expect("checked arity");
        self.reduce_reflect_receiver_check(
            node,
            target,
            &[target, key],
            Opcode::CallStub(StubCall::GetProperty),
            "Reflect.get",
        )
    }

    /// Reflect.has(target, key)
    pub(crate) fn reduce_reflect_has(&mut self, node: NodeId) -> Result<Reduction, ReduceError> {
        let target = self.argument_or_undefined(node, 0);
        let key = self.argument_or_undefined(node, 1);
        self.reduce_reflect_receiver_check(
            node,
            target,
            &[target, key],
            Opcode::HasProperty,
            "Reflect.has",
        )
    }

    /// Shared Reflect.get/has shape: branch on ObjectIsReceiver(target); the
    /// true path performs the fast operation, the false path constructs the
    /// TypeError and is merged unconditionally into the throw edge.
    fn reduce_reflect_receiver_check(
        &mut self,
        node: NodeId,
        target: NodeId,
        stub_args: &[NodeId],
        fast_op: Opcode,
        name: &str,
    ) -> Result<Reduction, ReduceError> {
        let frame_state = self.frame_state_of(node);
        let on_exception = self.graph.exception_projection(node);
        let effect = self.effect_of(node);
        let control = self.control_of(node);

        let check = self
            .graph
            .add(Opcode::ObjectIs(ObjectIs::Receiver), &[target], &[], &[]);
        let branch = self
            .graph
            .add(Opcode::Branch(BranchHint::True), &[check], &[], &[control]);
        let if_true = self.graph.add(Opcode::IfTrue, &[], &[], &[branch]);
        let if_false = self.graph.add(Opcode::IfFalse, &[], &[], &[branch]);

        // False path: the specified TypeError, observable to handlers.
        let message = self.graph.constant(Constant::Str(name.to_string()));
        let throw_call = self.graph.add_with_frame_state(
            Opcode::CallRuntime(RuntimeFn::ThrowTypeError(MessageTemplate::CalledOnNonObject)),
            &[message],
            &[effect],
            &[if_false],
            frame_state,
        );

        // True path: the fast operation. Property loads can still throw
        // (getters), so the stub keeps the frame state.
        let fast = self
            .graph
            .add_with_frame_state(fast_op, stub_args, &[effect], &[if_true], frame_state);

        let (fast_control, throw_control) = match on_exception {
            Some(on_exception) => {
                let ex_fast = self
                    .graph
                    .add(Opcode::IfException, &[], &[fast], &[fast]);
                let ok_fast = self.graph.add(Opcode::IfSuccess, &[], &[], &[fast]);
                let ex_throw = self
                    .graph
                    .add(Opcode::IfException, &[], &[throw_call], &[throw_call]);
                let ok_throw = self.graph.add(Opcode::IfSuccess, &[], &[], &[throw_call]);
                let merge = self.graph.add(Opcode::Merge, &[], &[], &[ex_fast, ex_throw]);
                let ephi = self
                    .graph
                    .add(Opcode::EffectPhi, &[], &[ex_fast, ex_throw], &[merge]);
                let phi = self
                    .graph
                    .add(Opcode::Phi, &[ex_fast, ex_throw], &[], &[merge]);
                self.graph
                    .replace_with_value(on_exception, phi, Some(ephi), Some(merge));
                (ok_fast, ok_throw)
            }
            None => (fast, throw_call),
        };

        // The throwing path cannot complete normally.
        let throw = self
            .graph
            .add(Opcode::Throw, &[], &[throw_call], &[throw_control]);
        self.graph.merge_control_to_end(throw);

        self.graph
            .replace_with_value(node, fast, Some(fast), Some(fast_control));
        Ok(Reduction::Replaced(fast))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jit::builtins::Builtin;
    use crate::jit::reduce::testutil::{call_node, TestWorld};

    #[test]
    fn test_object_is_lowers_to_same_value() {
        let mut world = TestWorld::new();
        let target = world.builtin(Builtin::ObjectIs);
        let a = world.parameter(1);
        let b = world.parameter(2);
        let node = call_node(&mut world, target, &[a, b]);
        let mut reducer = world.reducer();
        let Reduction::Replaced(value) = reducer.reduce(node).unwrap() else {
            panic!("expected replacement");
        };
        assert!(matches!(reducer.graph.op(value), Opcode::SameValue));
        assert_eq!(reducer.graph.node(value).values, vec![a, b]);
    }

    #[test]
    fn test_object_is_no_args_is_true() {
        let mut world = TestWorld::new();
        let target = world.builtin(Builtin::ObjectIs);
        let node = call_node(&mut world, target, &[]);
        let mut reducer = world.reducer();
        let Reduction::Replaced(value) = reducer.reduce(node).unwrap() else {
            panic!("expected replacement");
        };
        assert!(matches!(
            reducer.graph.op(value),
            Opcode::Constant(Constant::Bool(true))
        ));
    }

    #[test]
    fn test_object_create_requires_null_prototype() {
        let mut world = TestWorld::new();
        let target = world.builtin(Builtin::ObjectCreate);
        let proto = world.parameter(1);
        let node = call_node(&mut world, target, &[proto]);
        let mut reducer = world.reducer();
        assert_eq!(reducer.reduce(node).unwrap(), Reduction::NoChange);
    }

    #[test]
    fn test_object_create_null_allocates_directly() {
        let mut world = TestWorld::new();
        let target = world.builtin(Builtin::ObjectCreate);
        let null = world.graph.null();
        let node = call_node(&mut world, target, &[null]);
        let mut reducer = world.reducer();
        let Reduction::Replaced(value) = reducer.reduce(node).unwrap() else {
            panic!("expected replacement");
        };
        assert!(matches!(reducer.graph.op(value), Opcode::CreateObject));
    }

    #[test]
    fn test_reflect_get_builds_type_error_branch() {
        let mut world = TestWorld::new();
        let reflect_get = world.builtin(Builtin::ReflectGet);
        let obj = world.parameter(1);
        let key = world.parameter(2);
        let node = call_node(&mut world, reflect_get, &[obj, key]);
        let mut reducer = world.reducer();
        let Reduction::Replaced(value) = reducer.reduce(node).unwrap() else {
            panic!("expected replacement");
        };
        assert!(matches!(
            reducer.graph.op(value),
            Opcode::CallStub(StubCall::GetProperty)
        ));
        // The non-object path raises the specified TypeError and terminates.
        let ops: Vec<_> = reducer
            .graph
            .live_nodes()
            .into_iter()
            .map(|id| reducer.graph.op(id).clone())
            .collect();
        assert!(ops.iter().any(|op| matches!(
            op,
            Opcode::CallRuntime(RuntimeFn::ThrowTypeError(MessageTemplate::CalledOnNonObject))
        )));
        assert!(ops.iter().any(|op| matches!(op, Opcode::Throw)));
        assert!(ops
            .iter()
            .any(|op| matches!(op, Opcode::ObjectIs(ObjectIs::Receiver))));
    }

    #[test]
    fn test_reflect_get_wrong_arity_is_no_change() {
        let mut world = TestWorld::new();
        let reflect_get = world.builtin(Builtin::ReflectGet);
        let obj = world.parameter(1);
        let node = call_node(&mut world, reflect_get, &[obj]);
        let mut reducer = world.reducer();
        assert_eq!(reducer.reduce(node).unwrap(), Reduction::NoChange);
    }

    #[test]
    fn test_reflect_apply_morphs_to_array_like_call() {
        let mut world = TestWorld::new();
        let reflect_apply = world.builtin(Builtin::ReflectApply);
        let f = world.parameter(1);
        let this_arg = world.parameter(2);
        let args = world.parameter(3);
        let node = call_node(&mut world, reflect_apply, &[f, this_arg, args]);
        let mut reducer = world.reducer();
        assert!(reducer.reduce(node).unwrap().changed());
        assert!(matches!(
            reducer.graph.op(node),
            Opcode::CallWithArrayLike(_)
        ));
        assert_eq!(reducer.graph.node(node).values, vec![f, this_arg, args]);
    }

    #[test]
    fn test_has_own_property_folds_inside_fast_for_in() {
        let mut world = TestWorld::new();
        let has_own = world.builtin(Builtin::ObjectPrototypeHasOwnProperty);
        let receiver = world.parameter(1);
        let enum_shape = world.shapes.add(crate::jit::feedback::Shape::plain_object());
        let cache_type = world.graph.constant(Constant::Shape(enum_shape));
        let name = world.graph.add(
            Opcode::ForInNext(ForInMode::EnumCache),
            &[receiver, cache_type],
            &[],
            &[],
        );
        let node = world.call(has_own, receiver, &[name]);
        let mut reducer = world.reducer();
        let Reduction::Replaced(value) = reducer.reduce(node).unwrap() else {
            panic!("expected replacement");
        };
        assert!(matches!(
            reducer.graph.op(value),
            Opcode::Constant(Constant::Bool(true))
        ));
        // Guarded by a shape identity check against the enum cache type.
        assert!(reducer.graph.live_nodes().into_iter().any(|id| matches!(
            reducer.graph.op(id),
            Opcode::CheckIf { reason: DeoptReason::WrongShape, .. }
        )));
    }

    #[test]
    fn test_has_own_property_generic_for_in_is_no_change() {
        let mut world = TestWorld::new();
        let has_own = world.builtin(Builtin::ObjectPrototypeHasOwnProperty);
        let receiver = world.parameter(1);
        let enum_shape = world.shapes.add(crate::jit::feedback::Shape::plain_object());
        let cache_type = world.graph.constant(Constant::Shape(enum_shape));
        let name = world.graph.add(
            Opcode::ForInNext(ForInMode::Generic),
            &[receiver, cache_type],
            &[],
            &[],
        );
        let node = world.call(has_own, receiver, &[name]);
        let mut reducer = world.reducer();
        assert_eq!(reducer.reduce(node).unwrap(), Reduction::NoChange);
    }
}
