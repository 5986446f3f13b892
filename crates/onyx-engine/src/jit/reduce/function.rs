//! Function.prototype builtins and arguments/spread elision
//!
//! call/apply/bind splice statically known bound this/arguments into the
//! call's argument list, adjust its receiver-conversion mode, and recursively
//! re-attempt reduction. The spread/arguments elision is the waitlist client:
//! an unrecognized use of the arguments object defers the node instead of
//! rejecting it, because a later rewrite may delete that use.

use super::{CallReducer, ReduceError, Reduction};
use crate::jit::deps::ProtectorCell;
use crate::jit::feedback::{ConvertReceiverMode, InstanceType};
use crate::jit::ir::graph::NodeId;
use crate::jit::ir::op::{
    BranchHint, CallParameters, Constant, ConstructParameters, Opcode,
};

impl<'a> CallReducer<'a> {
    /// Function.prototype.apply(thisArg[, argArray])
    pub(crate) fn reduce_function_apply(
        &mut self,
        node: NodeId,
        params: &CallParameters,
    ) -> Result<Reduction, ReduceError> {
        let argc = self.argument_count(node);
        let convert_mode;
        if argc == 0 {
            // Neither thisArg nor argArray: the applied function is called
            // with an undefined receiver.
            let applied = self.graph.node(node).values[1];
            let undefined = self.graph.undefined();
            self.graph.replace_value_input(node, 0, applied);
            self.graph.replace_value_input(node, 1, undefined);
            convert_mode = ConvertReceiverMode::NullOrUndefined;
        } else if argc == 1 {
            // Only thisArg: drop the apply target, the receiver slides into
            // the target slot.
            self.graph.remove_value_input(node, 0);
            convert_mode = ConvertReceiverMode::Any;
        } else {
            let applied = self.graph.node(node).values[1];
            let this_argument = self.graph.node(node).values[2];
            let arguments_list = self.graph.node(node).values[3];

            if !self.can_be_null_or_undefined(arguments_list) {
                // No control flow needed; morph straight into a
                // call-with-array-like.
                let node_mut = self.graph.node_mut(node);
                node_mut.values = vec![applied, this_argument, arguments_list];
                node_mut.op = Opcode::CallWithArrayLike(CallParameters {
                    feedback: None,
                    ..params.clone()
                });
                let reduction = self.reduce(node)?;
                return Ok(if reduction.changed() {
                    reduction
                } else {
                    Reduction::Changed(node)
                });
            }

            // argArray may be null/undefined, which means a zero-argument
            // call; both meanings must be kept apart with explicit control
            // flow.
            return self.lower_apply_with_nullable_list(
                node,
                params,
                applied,
                this_argument,
                arguments_list,
            );
        }
        let new_params = CallParameters {
            convert_mode,
            feedback: None,
            ..params.clone()
        };
        self.graph.change_op(node, Opcode::Call(new_params));
        let reduction = self.reduce(node)?;
        Ok(if reduction.changed() {
            reduction
        } else {
            Reduction::Changed(node)
        })
    }

    fn lower_apply_with_nullable_list(
        &mut self,
        node: NodeId,
        params: &CallParameters,
        applied: NodeId,
        this_argument: NodeId,
        arguments_list: NodeId,
    ) -> Result<Reduction, ReduceError> {
        let frame_state = self.frame_state_of(node);
        let on_exception = self.graph.exception_projection(node);
        let effect = self.effect_of(node);
        let control = self.control_of(node);

        let null = self.graph.null();
        let undefined = self.graph.undefined();
        let check_null = self
            .graph
            .add(Opcode::ReferenceEqual, &[arguments_list, null], &[], &[]);
        let branch_null =
            self.graph
                .add(Opcode::Branch(BranchHint::False), &[check_null], &[], &[control]);
        let if_null = self.graph.add(Opcode::IfTrue, &[], &[], &[branch_null]);
        let not_null = self.graph.add(Opcode::IfFalse, &[], &[], &[branch_null]);

        let check_undefined = self.graph.add(
            Opcode::ReferenceEqual,
            &[arguments_list, undefined],
            &[],
            &[],
        );
        let branch_undefined = self.graph.add(
            Opcode::Branch(BranchHint::False),
            &[check_undefined],
            &[],
            &[not_null],
        );
        let if_undefined = self.graph.add(Opcode::IfTrue, &[], &[], &[branch_undefined]);
        let has_list = self.graph.add(Opcode::IfFalse, &[], &[], &[branch_undefined]);

        // Path 0: a real arguments list.
        let call0 = self.graph.add_with_frame_state(
            Opcode::CallWithArrayLike(CallParameters {
                feedback: None,
                ..params.clone()
            }),
            &[applied, this_argument, arguments_list],
            &[effect],
            &[has_list],
            frame_state,
        );

        // Path 1: null/undefined argArray means zero arguments.
        let no_list = self
            .graph
            .add(Opcode::Merge, &[], &[], &[if_null, if_undefined]);
        let call1 = self.graph.add_with_frame_state(
            Opcode::Call(CallParameters {
                convert_mode: ConvertReceiverMode::Any,
                feedback: None,
                ..params.clone()
            }),
            &[applied, this_argument],
            &[effect],
            &[no_list],
            frame_state,
        );

        let (control0, control1) = match on_exception {
            Some(on_exception) => {
                let ex0 = self.graph.add(Opcode::IfException, &[], &[call0], &[call0]);
                let ok0 = self.graph.add(Opcode::IfSuccess, &[], &[], &[call0]);
                let ex1 = self.graph.add(Opcode::IfException, &[], &[call1], &[call1]);
                let ok1 = self.graph.add(Opcode::IfSuccess, &[], &[], &[call1]);
                let merge = self.graph.add(Opcode::Merge, &[], &[], &[ex0, ex1]);
                let ephi = self.graph.add(Opcode::EffectPhi, &[], &[ex0, ex1], &[merge]);
                let phi = self.graph.add(Opcode::Phi, &[ex0, ex1], &[], &[merge]);
                self.graph
                    .replace_with_value(on_exception, phi, Some(ephi), Some(merge));
                (ok0, ok1)
            }
            None => (call0, call1),
        };

        let merge = self.graph.add(Opcode::Merge, &[], &[], &[control0, control1]);
        let ephi = self
            .graph
            .add(Opcode::EffectPhi, &[], &[call0, call1], &[merge]);
        let value = self.graph.add(Opcode::Phi, &[call0, call1], &[], &[merge]);
        self.graph
            .replace_with_value(node, value, Some(ephi), Some(merge));
        Ok(Reduction::Replaced(value))
    }

    /// Function.prototype.call(thisArg, ...args): shift the receiver into
    /// the target slot and re-dispatch.
    pub(crate) fn reduce_function_call(
        &mut self,
        node: NodeId,
        params: &CallParameters,
    ) -> Result<Reduction, ReduceError> {
        let convert_mode;
        if self.argument_count(node) == 0 {
            let called = self.graph.node(node).values[1];
            let undefined = self.graph.undefined();
            self.graph.replace_value_input(node, 0, called);
            self.graph.replace_value_input(node, 1, undefined);
            convert_mode = ConvertReceiverMode::NullOrUndefined;
        } else {
            self.graph.remove_value_input(node, 0);
            convert_mode = ConvertReceiverMode::Any;
        }
        let new_params = CallParameters {
            convert_mode,
            feedback: None,
            ..params.clone()
        };
        self.graph.change_op(node, Opcode::Call(new_params));
        let reduction = self.reduce(node)?;
        Ok(if reduction.changed() {
            reduction
        } else {
            Reduction::Changed(node)
        })
    }

    /// Function.prototype.bind: allocate the bound-function wrapper directly
    /// once the receiver is witnessed to be a well-behaved function (shared
    /// prototype, consistent constructor flag, length/name still the
    /// original accessors).
    pub(crate) fn reduce_function_bind(
        &mut self,
        node: NodeId,
        params: &CallParameters,
    ) -> Result<Reduction, ReduceError> {
        let receiver = self.receiver(node);
        let feedback = self.receiver_shapes_for_call(node, params);
        let shapes = feedback.shapes().to_vec();
        if shapes.is_empty() {
            return Ok(Reduction::NoChange);
        }
        let first = self.unit.shapes.get(shapes[0]);
        let is_constructor = first.constructor;
        let prototype = first.prototype;
        for &id in &shapes {
            let shape = self.unit.shapes.get(id);
            if !matches!(
                shape.instance_type,
                InstanceType::Function | InstanceType::BoundFunction
            ) {
                return Ok(Reduction::NoChange);
            }
            if shape.prototype != prototype
                || shape.constructor != is_constructor
                || shape.dictionary_mode
                || !shape.intact_function_descriptors
            {
                return Ok(Reduction::NoChange);
            }
        }

        let bound_this = self.argument_or_undefined(node, 0);
        let bound_args: Vec<NodeId> = (1..self.argument_count(node))
            .map(|i| self.argument(node, i).expect("in range"))
            .collect();

        let effect = self.effect_of(node);
        let control = self.control_of(node);
        let mut asm = crate::jit::ir::builder::GraphAssembler::new(self.graph, effect, control);
        if !feedback.is_reliable() {
            asm.check_shapes(receiver, shapes, params.feedback);
        }
        let mut values = vec![receiver, bound_this];
        values.extend(bound_args);
        let value = asm.effectful(
            Opcode::CreateBoundFunction {
                constructor: is_constructor,
            },
            &values,
        );
        let final_effect = asm.effect();
        self.graph
            .replace_with_value(node, value, Some(final_effect), None);
        Ok(Reduction::Replaced(value))
    }

    /// Function.prototype[Symbol.hasInstance]: the ordinary instanceof walk
    pub(crate) fn reduce_function_has_instance(
        &mut self,
        node: NodeId,
    ) -> Result<Reduction, ReduceError> {
        let receiver = self.receiver(node);
        let object = self.argument_or_undefined(node, 0);
        let frame_state = self.frame_state_of(node);
        let effect = self.effect_of(node);
        let control = self.control_of(node);
        let value = self.graph.add_with_frame_state(
            Opcode::OrdinaryHasInstance,
            &[receiver, object],
            &[effect],
            &[control],
            frame_state,
        );
        self.graph.replace_with_value(node, value, Some(value), None);
        Ok(Reduction::Replaced(value))
    }

    /// Accessors compiled down to "return this"
    pub(crate) fn reduce_return_receiver(
        &mut self,
        node: NodeId,
    ) -> Result<Reduction, ReduceError> {
        let receiver = self.receiver(node);
        self.graph.replace_with_value(node, receiver, None, None);
        Ok(Reduction::Replaced(receiver))
    }

    // ===== Arguments/spread elision =====

    /// Call with an array-like or spread argument: when the list is a
    /// locally created arguments object whose every use is recognized
    /// harmless, splice the captured arguments directly into the call.
    pub(crate) fn reduce_call_with_array_like_or_spread(
        &mut self,
        node: NodeId,
        params: CallParameters,
    ) -> Result<Reduction, ReduceError> {
        let list_index = match self.graph.op(node) {
            Opcode::CallWithArrayLike(_) => 2,
            _ => self.graph.node(node).values.len() - 1,
        };
        let Some(args) = self.try_unpack_arguments_list(node, list_index)? else {
            return Ok(Reduction::NoChange);
        };
        let node_mut = self.graph.node_mut(node);
        node_mut.values.remove(list_index);
        for (i, arg) in args.into_iter().enumerate() {
            node_mut.values.insert(list_index + i, arg);
        }
        node_mut.op = Opcode::Call(CallParameters {
            feedback: None,
            ..params
        });
        let reduction = self.reduce(node)?;
        Ok(if reduction.changed() {
            reduction
        } else {
            Reduction::Changed(node)
        })
    }

    /// Construct-flavored twin of the elision above
    pub(crate) fn reduce_construct_with_array_like_or_spread(
        &mut self,
        node: NodeId,
        params: ConstructParameters,
    ) -> Result<Reduction, ReduceError> {
        let list_index = match self.graph.op(node) {
            Opcode::ConstructWithArrayLike(_) => 2,
            _ => self.graph.node(node).values.len() - 1,
        };
        let Some(args) = self.try_unpack_arguments_list(node, list_index)? else {
            return Ok(Reduction::NoChange);
        };
        let node_mut = self.graph.node_mut(node);
        node_mut.values.remove(list_index);
        for (i, arg) in args.into_iter().enumerate() {
            node_mut.values.insert(list_index + i, arg);
        }
        node_mut.op = Opcode::Construct(ConstructParameters {
            feedback: None,
            ..params
        });
        let reduction = self.reduce(node)?;
        Ok(if reduction.changed() {
            reduction
        } else {
            Reduction::Changed(node)
        })
    }

    /// Decide whether the arguments list of `node` can be elided. Returns
    /// the captured argument nodes on success; defers the node to the
    /// waitlist (and returns None) when an unrecognized use exists, since a
    /// later rewrite may delete that use.
    fn try_unpack_arguments_list(
        &mut self,
        node: NodeId,
        list_index: usize,
    ) -> Result<Option<Vec<NodeId>>, ReduceError> {
        // Spread iteration is only elidable while nobody replaced
        // Array.prototype[Symbol.iterator].
        if matches!(
            self.graph.op(node),
            Opcode::CallWithSpread(_) | Opcode::ConstructWithSpread(_)
        ) && !self
            .deps
            .assume_protector(self.unit.protectors, ProtectorCell::ArrayIteratorLookup)
        {
            return Ok(None);
        }

        let arguments_list = self.graph.node(node).values[list_index];
        let Opcode::CreateArguments(args_type) = *self.graph.op(arguments_list) else {
            return Ok(None);
        };

        // Every value use of the arguments object must be recognized
        // harmless. Frame states only keep it alive for deopt and are fine;
        // other calls consuming it as their own spread input are fine.
        for user in self.graph.value_uses(arguments_list) {
            if user == node {
                continue;
            }
            let harmless = match self.graph.op(user) {
                Opcode::ReferenceEqual | Opcode::Return => true,
                Opcode::LoadField(access) => matches!(
                    access,
                    crate::jit::ir::op::FieldAccess::ArrayLength(_)
                        | crate::jit::ir::op::FieldAccess::Elements
                ),
                Opcode::CallWithArrayLike(_) | Opcode::ConstructWithArrayLike(_) => {
                    self.graph.node(user).values[2] == arguments_list
                }
                Opcode::CallWithSpread(_) | Opcode::ConstructWithSpread(_) => {
                    *self.graph.node(user).values.last().expect("spread input") == arguments_list
                }
                _ => false,
            };
            if !harmless {
                // Maybe reducible later; retry once during finalization.
                self.defer(node);
                return Ok(None);
            }
        }

        // Sloppy-mode mapped arguments alias the parameters, so an
        // observable side effect between allocation and use could have
        // changed them behind our back.
        if args_type == crate::jit::ir::op::ArgumentsType::Mapped {
            let effect = self.effect_of(node);
            if !self.no_observable_side_effect_between(effect, arguments_list) {
                return Ok(None);
            }
        }

        Ok(Some(self.graph.node(arguments_list).values.clone()))
    }

    /// Walk the effect chain from `effect` back to `target`, succeeding only
    /// if every intervening operation is free of observable side effects.
    fn no_observable_side_effect_between(&self, effect: NodeId, target: NodeId) -> bool {
        let mut current = effect;
        for _ in 0..100 {
            if current == target {
                return true;
            }
            let Some(node) = self.graph.try_node(current) else {
                return false;
            };
            match &node.op {
                Opcode::Checkpoint
                | Opcode::TypeGuard(_)
                | Opcode::CheckIf { .. }
                | Opcode::CheckShapes { .. }
                | Opcode::CheckString(_)
                | Opcode::CheckSmi(_)
                | Opcode::CheckNumber(_)
                | Opcode::CheckBounds(_)
                | Opcode::SpeculativeToNumber { .. }
                | Opcode::LoadField(_)
                | Opcode::LoadElement(_) => match node.effect_input() {
                    Some(next) => current = next,
                    None => return false,
                },
                _ => return false,
            }
        }
        false
    }

    /// Conservative nullability: freshly allocated objects cannot be null or
    /// undefined, anything else might be.
    fn can_be_null_or_undefined(&self, value: NodeId) -> bool {
        match self.graph.op(value) {
            Opcode::CreateArguments(_)
            | Opcode::NewArray(_)
            | Opcode::CreateObject
            | Opcode::CreateClosure(_)
            | Opcode::CreateBoundFunction { .. }
            | Opcode::NewStringIterator => false,
            Opcode::Constant(Constant::Null) | Opcode::Constant(Constant::Undefined) => true,
            Opcode::Constant(_) => false,
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jit::builtins::Builtin;
    use crate::jit::feedback::{CallSiteFeedback, CalleeFeedback, Shape, ShapeFeedback};
    use crate::jit::ir::op::ArgumentsType;
    use crate::jit::reduce::testutil::TestWorld;

    #[test]
    fn test_apply_with_this_only_becomes_direct_call() {
        // fn.apply(thisArg) with a statically known fn and no second
        // argument: a direct zero-argument call with receiver thisArg.
        let mut world = TestWorld::new();
        let apply = world.builtin(Builtin::FunctionPrototypeApply);
        let max_id = world.builtin_id(Builtin::MathMax);
        let applied = world.constant_function(max_id);
        let this_arg = world.parameter(1);
        let node = world.call(apply, applied, &[this_arg]);
        let mut reducer = world.reducer();
        let reduction = reducer.reduce(node).unwrap();
        assert!(reduction.changed());
        // Math.max with zero args folds straight to -Infinity through the
        // recursive re-dispatch.
        let Reduction::Replaced(value) = reduction else {
            panic!("expected full strength reduction");
        };
        assert_eq!(reducer.graph.number_value(value), Some(f64::NEG_INFINITY));
    }

    #[test]
    fn test_call_splices_receiver() {
        let mut world = TestWorld::new();
        let call = world.builtin(Builtin::FunctionPrototypeCall);
        let sqrt_id = world.builtin_id(Builtin::MathSqrt);
        let called = world.constant_function(sqrt_id);
        let this_arg = world.graph.undefined();
        let x = world.parameter(1);
        let node = world.call(call, called, &[this_arg, x]);
        let mut reducer = world.reducer();
        let reduction = reducer.reduce(node).unwrap();
        assert!(reduction.changed());
        let Reduction::Replaced(value) = reduction else {
            panic!("expected full strength reduction");
        };
        // sqrt reduced over the spliced argument.
        assert!(matches!(
            reducer.graph.op(value),
            Opcode::NumberUnary(crate::jit::ir::op::NumberUnop::Sqrt)
        ));
    }

    #[test]
    fn test_bind_allocates_bound_function() {
        let mut world = TestWorld::new();
        let bind = world.builtin(Builtin::FunctionPrototypeBind);
        let shape = world.shapes.add(Shape::function());
        let receiver = world.parameter(1);
        let bound_this = world.parameter(2);
        let arg = world.parameter(3);
        let source = world.feedback_slot(CallSiteFeedback {
            callee: CalleeFeedback::None,
            shapes: ShapeFeedback::Reliable(vec![shape]),
        });
        let params = crate::jit::ir::op::CallParameters {
            feedback: Some(source),
            ..world.default_params()
        };
        let node = world.call_with(bind, receiver, &[bound_this, arg], params);
        let mut reducer = world.reducer();
        let Reduction::Replaced(value) = reducer.reduce(node).unwrap() else {
            panic!("expected replacement");
        };
        assert!(matches!(
            reducer.graph.op(value),
            Opcode::CreateBoundFunction { constructor: true }
        ));
        assert_eq!(
            reducer.graph.node(value).values,
            vec![receiver, bound_this, arg]
        );
    }

    #[test]
    fn test_bind_rejects_patched_descriptors() {
        let mut world = TestWorld::new();
        let bind = world.builtin(Builtin::FunctionPrototypeBind);
        let mut shape = Shape::function();
        shape.intact_function_descriptors = false;
        let shape = world.shapes.add(shape);
        let receiver = world.parameter(1);
        let source = world.feedback_slot(CallSiteFeedback {
            callee: CalleeFeedback::None,
            shapes: ShapeFeedback::Reliable(vec![shape]),
        });
        let params = crate::jit::ir::op::CallParameters {
            feedback: Some(source),
            ..world.default_params()
        };
        let node = world.call_with(bind, receiver, &[], params);
        let mut reducer = world.reducer();
        assert_eq!(reducer.reduce(node).unwrap(), Reduction::NoChange);
    }

    #[test]
    fn test_spread_of_local_arguments_is_elided() {
        let mut world = TestWorld::new();
        let max_id = world.builtin_id(Builtin::MathMax);
        let target = world.constant_function(max_id);
        let receiver = world.graph.undefined();
        let a = world.graph.number(1.0);
        let b = world.graph.number(2.0);
        let start = world.graph.start();
        let arguments = world.graph.add(
            Opcode::CreateArguments(ArgumentsType::Unmapped),
            &[a, b],
            &[start],
            &[start],
        );
        let params = world.default_params();
        let frame_state = world.frame_state;
        let node = world.graph.add_with_frame_state(
            Opcode::CallWithSpread(params),
            &[target, receiver, arguments],
            &[arguments],
            &[start],
            frame_state,
        );
        let mut reducer = world.reducer();
        let reduction = reducer.reduce(node).unwrap();
        assert!(reduction.changed());
        // Math.max(1, 2) after splicing: speculative conversions feeding a
        // max chain.
        let Reduction::Replaced(value) = reduction else {
            panic!("expected strength reduction of the spliced call");
        };
        assert!(matches!(
            reducer.graph.op(value),
            Opcode::NumberBinary(crate::jit::ir::op::NumberBinop::Max)
        ));
    }

    #[test]
    fn test_spread_with_unrecognized_use_is_deferred_then_reduced() {
        let mut world = TestWorld::new();
        let max_id = world.builtin_id(Builtin::MathMax);
        let target = world.constant_function(max_id);
        let receiver = world.graph.undefined();
        let a = world.graph.number(1.0);
        let start = world.graph.start();
        let arguments = world.graph.add(
            Opcode::CreateArguments(ArgumentsType::Unmapped),
            &[a],
            &[start],
            &[start],
        );
        // An escaping use the elision does not recognize.
        let escape = world
            .graph
            .add(Opcode::Throw, &[arguments], &[start], &[start]);
        let params = world.default_params();
        let frame_state = world.frame_state;
        let node = world.graph.add_with_frame_state(
            Opcode::CallWithSpread(params),
            &[target, receiver, arguments],
            &[arguments],
            &[start],
            frame_state,
        );
        let mut reducer = world.reducer();
        assert_eq!(reducer.reduce(node).unwrap(), Reduction::NoChange);
        assert_eq!(reducer.waitlist_len(), 1);

        // A later rewrite deletes the escaping use; the single finalize
        // sweep picks the node back up and the spliced Math.max(1) reduces
        // all the way through.
        reducer.graph.kill(escape);
        reducer.finalize().unwrap();
        assert!(!reducer.graph.is_live(node));
        assert!(reducer
            .graph
            .live_nodes()
            .into_iter()
            .any(|id| matches!(reducer.graph.op(id), Opcode::SpeculativeToNumber { .. })));
    }

    #[test]
    fn test_mapped_arguments_blocked_by_side_effect() {
        let mut world = TestWorld::new();
        let max_id = world.builtin_id(Builtin::MathMax);
        let target = world.constant_function(max_id);
        let receiver = world.graph.undefined();
        let a = world.graph.number(1.0);
        let start = world.graph.start();
        let arguments = world.graph.add(
            Opcode::CreateArguments(ArgumentsType::Mapped),
            &[a],
            &[start],
            &[start],
        );
        // A store between allocation and use may have rewritten the aliased
        // parameters.
        let store = world.graph.add(
            Opcode::StoreField(crate::jit::ir::op::FieldAccess::Elements),
            &[receiver, a],
            &[arguments],
            &[start],
        );
        let params = world.default_params();
        let frame_state = world.frame_state;
        let node = world.graph.add_with_frame_state(
            Opcode::CallWithSpread(params),
            &[target, receiver, arguments],
            &[store],
            &[start],
            frame_state,
        );
        let mut reducer = world.reducer();
        assert_eq!(reducer.reduce(node).unwrap(), Reduction::NoChange);
    }

    #[test]
    fn test_return_receiver_folds() {
        let mut world = TestWorld::new();
        let getter = world.builtin(Builtin::ReturnReceiver);
        let receiver = world.parameter(1);
        let node = world.call(getter, receiver, &[]);
        let mut reducer = world.reducer();
        let Reduction::Replaced(value) = reducer.reduce(node).unwrap() else {
            panic!("expected replacement");
        };
        assert_eq!(value, receiver);
    }
}
