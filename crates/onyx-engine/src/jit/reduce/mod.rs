//! Call/construct strength reduction
//!
//! Visits each Call/Construct node once and attempts to rewrite it into a
//! cheaper, more specific operation sequence. A rewrite must raise identical
//! exceptions to the generic implementation, deoptimize rather than
//! mis-execute on any guard failure, and never reorder a retained side
//! effect. Unmet preconditions yield NoChange, never a plausible-but-wrong
//! rewrite.

pub mod array_iter;
pub mod array_resize;
pub mod collections;
pub mod function;
pub mod math;
pub mod object;
pub mod string;

#[cfg(test)]
pub(crate) mod testutil;

use rustc_hash::FxHashSet;
use thiserror::Error;

use crate::jit::builtins::{Builtin, FunctionId, FunctionTable};
use crate::jit::continuation::{ContinuationMode, ContinuationTable, ResumePoint};
use crate::jit::deps::{DependencyRegistry, ProtectorRegistry};
use crate::jit::feedback::{
    CalleeFeedback, ConvertReceiverMode, FeedbackVector, ShapeFeedback, ShapeTable,
    SpeculationMode,
};
use crate::jit::ir::graph::{Graph, NodeId};
use crate::jit::ir::op::{
    BranchHint, CallParameters, Constant, DeoptKind, DeoptReason, FrameStateInfo, MessageTemplate,
    Opcode, RuntimeFn,
};

/// Outcome of one reduction attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduction {
    /// Precondition unmet; the node is left as a generic call
    NoChange,
    /// The node was mutated in place to a more specific operator
    Changed(NodeId),
    /// The node was replaced by a new subgraph rooted at this value
    Replaced(NodeId),
}

impl Reduction {
    pub fn changed(&self) -> bool {
        !matches!(self, Reduction::NoChange)
    }
}

/// Fatal invariant violations; these abort compilation of the whole unit
#[derive(Debug, Error)]
pub enum ReduceError {
    #[error("reducer invoked on non-call operator '{0}'")]
    NotACall(&'static str),
    #[error("stale node handle reached dispatch")]
    StaleNode,
    #[error("feedback slot {0} is malformed for a call site")]
    MalformedFeedback(u32),
}

/// Policy knobs for one reducer instance
#[derive(Debug, Clone, Copy, Default)]
pub struct ReducerFlags {
    /// Insert a one-time soft bailout when a call site has no profile yet
    pub bailout_on_uninitialized: bool,
}

/// Read-only world view shared by all reductions in one compilation unit
pub struct UnitContext<'a> {
    pub functions: &'a FunctionTable,
    pub shapes: &'a ShapeTable,
    pub feedback: &'a FeedbackVector,
    pub protectors: &'a ProtectorRegistry,
}

/// The strength-reduction engine. One instance per compilation unit; owns
/// the unit's dependency registry, continuation table, and waitlist.
pub struct CallReducer<'a> {
    pub(crate) graph: &'a mut Graph,
    pub(crate) unit: UnitContext<'a>,
    pub(crate) deps: DependencyRegistry,
    pub(crate) continuations: ContinuationTable,
    waitlist: FxHashSet<NodeId>,
    flags: ReducerFlags,
}

impl<'a> CallReducer<'a> {
    pub fn new(graph: &'a mut Graph, unit: UnitContext<'a>, flags: ReducerFlags) -> Self {
        CallReducer {
            graph,
            unit,
            deps: DependencyRegistry::new(),
            continuations: ContinuationTable::new(),
            waitlist: FxHashSet::default(),
            flags,
        }
    }

    /// Dependencies registered so far
    pub fn dependencies(&self) -> &DependencyRegistry {
        &self.deps
    }

    /// Continuations built so far
    pub fn continuations(&self) -> &ContinuationTable {
        &self.continuations
    }

    /// Tear down into the per-unit invalidation metadata
    pub fn into_parts(self) -> (DependencyRegistry, ContinuationTable) {
        (self.deps, self.continuations)
    }

    /// Visit every call/construct node once, in arena order.
    ///
    /// Returns the number of changed nodes. A successful rewrite re-attempts
    /// reduction of the same node recursively inside `reduce`, so no outer
    /// fixpoint is needed.
    pub fn reduce_graph(&mut self) -> Result<usize, ReduceError> {
        let mut changed = 0;
        for id in self.graph.live_nodes() {
            if !self.graph.is_live(id) {
                continue; // replaced by an earlier reduction
            }
            if self.graph.node(id).op.is_reducible_call() && self.reduce(id)?.changed() {
                changed += 1;
            }
        }
        #[cfg(debug_assertions)]
        if std::env::var_os("ONYX_TRACE_REDUCE").is_some() {
            eprintln!("call reduction changed {changed} nodes");
            eprintln!("{}", self.graph);
        }
        Ok(changed)
    }

    /// One sweep over the deferred set, after the main pass reached fixpoint.
    /// Dead nodes are skipped; the sweep never re-defers.
    pub fn finalize(&mut self) -> Result<(), ReduceError> {
        let waitlist = std::mem::take(&mut self.waitlist);
        for node in waitlist {
            if self.graph.is_live(node) {
                self.reduce(node)?;
            }
        }
        // Deferrals recorded during the sweep stay unreduced; a single
        // revisit keeps the pass terminating.
        self.waitlist.clear();
        Ok(())
    }

    /// Defer a node whose safety depends on later graph shape
    pub(crate) fn defer(&mut self, node: NodeId) {
        self.waitlist.insert(node);
    }

    #[cfg(test)]
    pub(crate) fn waitlist_len(&self) -> usize {
        self.waitlist.len()
    }

    /// Attempt to reduce a single call/construct node
    pub fn reduce(&mut self, node: NodeId) -> Result<Reduction, ReduceError> {
        if !self.graph.is_live(node) {
            return Err(ReduceError::StaleNode);
        }
        match self.graph.node(node).op.clone() {
            Opcode::Call(params) => self.reduce_call(node, params),
            Opcode::Construct(params) => self.reduce_construct(node, params),
            Opcode::CallWithArrayLike(params) | Opcode::CallWithSpread(params) => {
                self.reduce_call_with_array_like_or_spread(node, params)
            }
            Opcode::ConstructWithArrayLike(params) | Opcode::ConstructWithSpread(params) => {
                self.reduce_construct_with_array_like_or_spread(node, params)
            }
            other => Err(ReduceError::NotACall(other.mnemonic())),
        }
    }

    // ===== Call dispatch =====

    fn reduce_call(
        &mut self,
        node: NodeId,
        params: CallParameters,
    ) -> Result<Reduction, ReduceError> {
        let target = self.graph.node(node).values[0];

        // Case 1: compile-time constant callable.
        if let Opcode::Constant(Constant::Function(function)) = self.graph.op(target) {
            let function = *function;
            let info = self.unit.functions.get(function);
            if let Some(bound) = info.bound.clone() {
                return self.splice_bound_constant(node, params, &bound);
            }
            return self.reduce_known_call(node, params, function);
        }

        // Case 2: target created within this unit; callee identity is known
        // without any runtime check.
        match self.graph.op(target).clone() {
            Opcode::CreateClosure(function) => {
                return self.reduce_known_call(node, params, function);
            }
            Opcode::CreateBoundFunction { .. } => {
                return self.splice_bound_in_graph(node, params, target);
            }
            _ => {}
        }

        // Case 3: unknown target; consult the feedback oracle.
        let Some(source) = params.feedback else {
            return Ok(Reduction::NoChange);
        };
        let site = self
            .unit
            .feedback
            .get(source)
            .ok_or(ReduceError::MalformedFeedback(source.0))?;
        match site.callee {
            CalleeFeedback::None => {
                // Case 4: not yet profiled.
                if self.flags.bailout_on_uninitialized {
                    Ok(self.reduce_soft_deoptimize(node, DeoptReason::InsufficientFeedback))
                } else {
                    Ok(Reduction::NoChange)
                }
            }
            CalleeFeedback::Megamorphic => Ok(Reduction::NoChange),
            CalleeFeedback::Monomorphic(function) => {
                // Guard the identity, then treat the target as known.
                let expected = self.graph.constant(Constant::Function(function));
                let check = self
                    .graph
                    .add(Opcode::ReferenceEqual, &[target, expected], &[], &[]);
                let node_ref = self.graph.node(node);
                let effect = node_ref.effect_input().unwrap_or_else(|| self.graph.start());
                let control = node_ref.control_input().unwrap_or_else(|| self.graph.start());
                let guard = self.graph.add(
                    Opcode::CheckIf {
                        reason: DeoptReason::WrongCallTarget,
                        feedback: Some(source),
                    },
                    &[check],
                    &[effect],
                    &[control],
                );
                self.graph.replace_value_input(node, 0, expected);
                self.graph.replace_effect_input(node, guard);
                let reduction = self.reduce_call(node, params)?;
                Ok(if reduction.changed() {
                    reduction
                } else {
                    Reduction::Changed(node)
                })
            }
        }
    }

    /// Splice a heap-constant bound function: the wrapper's target becomes
    /// the call target, bound this/arguments slot in front of the original
    /// arguments. Repeats transitively via the recursive reduce.
    fn splice_bound_constant(
        &mut self,
        node: NodeId,
        params: CallParameters,
        bound: &crate::jit::builtins::BoundFunctionInfo,
    ) -> Result<Reduction, ReduceError> {
        let new_target = self.graph.constant(Constant::Function(bound.target));
        let bound_this = self.graph.constant(bound.bound_this.clone());
        let convert_mode = match bound.bound_this {
            Constant::Null | Constant::Undefined => ConvertReceiverMode::NullOrUndefined,
            _ => ConvertReceiverMode::NotNullOrUndefined,
        };
        self.graph.replace_value_input(node, 0, new_target);
        self.graph.replace_value_input(node, 1, bound_this);
        for (i, arg) in bound.bound_args.clone().into_iter().enumerate() {
            let arg = self.graph.constant(arg);
            self.graph.insert_value_input(node, 2 + i, arg);
        }
        let new_params = CallParameters {
            convert_mode,
            feedback: None,
            ..params
        };
        self.graph.change_op(node, Opcode::Call(new_params.clone()));
        let reduction = self.reduce_call(node, new_params)?;
        Ok(if reduction.changed() {
            reduction
        } else {
            Reduction::Changed(node)
        })
    }

    /// Splice a bound function constructed in this unit: fold the wrapper
    /// away and call the bound target directly.
    fn splice_bound_in_graph(
        &mut self,
        node: NodeId,
        params: CallParameters,
        wrapper: NodeId,
    ) -> Result<Reduction, ReduceError> {
        let wrapper_node = self.graph.node(wrapper);
        let bound_target = wrapper_node.values[0];
        let bound_this = wrapper_node.values[1];
        let bound_args: Vec<NodeId> = wrapper_node.values[2..].to_vec();

        self.graph.replace_value_input(node, 0, bound_target);
        self.graph.replace_value_input(node, 1, bound_this);
        for (i, arg) in bound_args.into_iter().enumerate() {
            self.graph.insert_value_input(node, 2 + i, arg);
        }
        let convert_mode = match self.graph.op(bound_this) {
            Opcode::Constant(Constant::Null) | Opcode::Constant(Constant::Undefined) => {
                ConvertReceiverMode::NullOrUndefined
            }
            Opcode::Constant(_) => ConvertReceiverMode::NotNullOrUndefined,
            _ => ConvertReceiverMode::Any,
        };
        let new_params = CallParameters {
            convert_mode,
            feedback: None,
            ..params
        };
        self.graph.change_op(node, Opcode::Call(new_params.clone()));
        let reduction = self.reduce_call(node, new_params)?;
        Ok(if reduction.changed() {
            reduction
        } else {
            Reduction::Changed(node)
        })
    }

    /// Dispatch a call whose callee identity is certain
    fn reduce_known_call(
        &mut self,
        node: NodeId,
        params: CallParameters,
        function: FunctionId,
    ) -> Result<Reduction, ReduceError> {
        let info = self.unit.functions.get(function);

        // Class constructors raise a TypeError when called without `new`;
        // the rewrite must be unconditional, not speculative.
        if info.class_constructor {
            let target = self.graph.node(node).values[0];
            let node_mut = self.graph.node_mut(node);
            node_mut.values = vec![target];
            node_mut.op = Opcode::CallRuntime(RuntimeFn::ThrowTypeError(
                MessageTemplate::ConstructorNonCallable,
            ));
            return Ok(Reduction::Changed(node));
        }

        let Some(builtin) = info.builtin else {
            return Ok(Reduction::NoChange);
        };
        self.dispatch_builtin(node, params, builtin)
    }

    fn dispatch_builtin(
        &mut self,
        node: NodeId,
        params: CallParameters,
        builtin: Builtin,
    ) -> Result<Reduction, ReduceError> {
        use crate::jit::ir::op::{NumberBinop, NumberUnop};
        let reduction = match builtin {
            // Math unary
            Builtin::MathAbs => self.reduce_math_unary(node, &params, NumberUnop::Abs),
            Builtin::MathAcos => self.reduce_math_unary(node, &params, NumberUnop::Acos),
            Builtin::MathAcosh => self.reduce_math_unary(node, &params, NumberUnop::Acosh),
            Builtin::MathAsin => self.reduce_math_unary(node, &params, NumberUnop::Asin),
            Builtin::MathAsinh => self.reduce_math_unary(node, &params, NumberUnop::Asinh),
            Builtin::MathAtan => self.reduce_math_unary(node, &params, NumberUnop::Atan),
            Builtin::MathAtanh => self.reduce_math_unary(node, &params, NumberUnop::Atanh),
            Builtin::MathCbrt => self.reduce_math_unary(node, &params, NumberUnop::Cbrt),
            Builtin::MathCeil => self.reduce_math_unary(node, &params, NumberUnop::Ceil),
            Builtin::MathCos => self.reduce_math_unary(node, &params, NumberUnop::Cos),
            Builtin::MathCosh => self.reduce_math_unary(node, &params, NumberUnop::Cosh),
            Builtin::MathExp => self.reduce_math_unary(node, &params, NumberUnop::Exp),
            Builtin::MathExpm1 => self.reduce_math_unary(node, &params, NumberUnop::Expm1),
            Builtin::MathFloor => self.reduce_math_unary(node, &params, NumberUnop::Floor),
            Builtin::MathFround => self.reduce_math_unary(node, &params, NumberUnop::Fround),
            Builtin::MathLog => self.reduce_math_unary(node, &params, NumberUnop::Log),
            Builtin::MathLog1p => self.reduce_math_unary(node, &params, NumberUnop::Log1p),
            Builtin::MathLog2 => self.reduce_math_unary(node, &params, NumberUnop::Log2),
            Builtin::MathLog10 => self.reduce_math_unary(node, &params, NumberUnop::Log10),
            Builtin::MathRound => self.reduce_math_unary(node, &params, NumberUnop::Round),
            Builtin::MathSign => self.reduce_math_unary(node, &params, NumberUnop::Sign),
            Builtin::MathSin => self.reduce_math_unary(node, &params, NumberUnop::Sin),
            Builtin::MathSinh => self.reduce_math_unary(node, &params, NumberUnop::Sinh),
            Builtin::MathSqrt => self.reduce_math_unary(node, &params, NumberUnop::Sqrt),
            Builtin::MathTan => self.reduce_math_unary(node, &params, NumberUnop::Tan),
            Builtin::MathTanh => self.reduce_math_unary(node, &params, NumberUnop::Tanh),
            Builtin::MathTrunc => self.reduce_math_unary(node, &params, NumberUnop::Trunc),
            // Math binary & friends
            Builtin::MathAtan2 => self.reduce_math_binary(node, &params, NumberBinop::Atan2),
            Builtin::MathPow => self.reduce_math_binary(node, &params, NumberBinop::Pow),
            Builtin::MathImul => self.reduce_math_imul(node, &params),
            Builtin::MathClz32 => self.reduce_math_clz32(node, &params),
            Builtin::MathMin => {
                self.reduce_math_min_max(node, &params, NumberBinop::Min, f64::INFINITY)
            }
            Builtin::MathMax => {
                self.reduce_math_min_max(node, &params, NumberBinop::Max, f64::NEG_INFINITY)
            }
            // Number & globals
            Builtin::NumberIsFinite => self.reduce_number_predicate(node, ObjectIsKind::Finite),
            Builtin::NumberIsInteger => self.reduce_number_predicate(node, ObjectIsKind::Integer),
            Builtin::NumberIsSafeInteger => {
                self.reduce_number_predicate(node, ObjectIsKind::SafeInteger)
            }
            Builtin::NumberIsNaN => self.reduce_number_predicate(node, ObjectIsKind::NaN),
            Builtin::NumberParseInt => self.reduce_number_parse_int(node),
            Builtin::GlobalIsFinite => self.reduce_global_is_finite(node, &params),
            Builtin::GlobalIsNaN => self.reduce_global_is_nan(node, &params),
            // Array
            Builtin::ArrayIsArray => self.reduce_array_is_array(node),
            Builtin::ArrayForEach => self.reduce_array_for_each(node, &params),
            Builtin::ArrayMap => self.reduce_array_map(node, &params),
            Builtin::ArrayFilter => self.reduce_array_filter(node, &params),
            Builtin::ArrayReduce => self.reduce_array_reduce(node, &params, ReduceDirection::Left),
            Builtin::ArrayReduceRight => {
                self.reduce_array_reduce(node, &params, ReduceDirection::Right)
            }
            Builtin::ArrayEvery => self.reduce_array_every_some(node, &params, EverySomeVariant::Every),
            Builtin::ArraySome => self.reduce_array_every_some(node, &params, EverySomeVariant::Some),
            Builtin::ArrayFind => self.reduce_array_find(node, &params, ArrayFindVariant::Find),
            Builtin::ArrayFindIndex => {
                self.reduce_array_find(node, &params, ArrayFindVariant::FindIndex)
            }
            Builtin::ArrayIndexOf => {
                self.reduce_array_index_of_includes(node, &params, SearchVariant::IndexOf)
            }
            Builtin::ArrayIncludes => {
                self.reduce_array_index_of_includes(node, &params, SearchVariant::Includes)
            }
            Builtin::ArrayPush => self.reduce_array_push(node, &params),
            Builtin::ArrayPop => self.reduce_array_pop(node, &params),
            Builtin::ArrayShift => self.reduce_array_shift(node, &params),
            // String
            Builtin::StringPrototypeIndexOf => self.reduce_string_index_of(node, &params),
            Builtin::StringPrototypeSubstring => self.reduce_string_substring(node, &params),
            Builtin::StringPrototypeSlice => self.reduce_string_slice(node, &params),
            Builtin::StringPrototypeSubstr => self.reduce_string_substr(node, &params),
            Builtin::StringPrototypeCharAt => {
                self.reduce_string_string_at(node, &params, StringAtVariant::CharAt)
            }
            Builtin::StringPrototypeCharCodeAt => {
                self.reduce_string_string_at(node, &params, StringAtVariant::CharCodeAt)
            }
            Builtin::StringPrototypeCodePointAt => {
                self.reduce_string_string_at(node, &params, StringAtVariant::CodePointAt)
            }
            Builtin::StringPrototypeConcat => self.reduce_string_concat(node, &params),
            Builtin::StringPrototypeToLowerCase => {
                self.reduce_string_case(node, &params, StringCaseVariant::Lower)
            }
            Builtin::StringPrototypeToUpperCase => {
                self.reduce_string_case(node, &params, StringCaseVariant::Upper)
            }
            Builtin::StringPrototypeIterator => self.reduce_string_iterator(node, &params),
            Builtin::StringFromCharCode => self.reduce_string_from_char_code(node, &params),
            // Object
            Builtin::ObjectIs => self.reduce_object_is(node),
            Builtin::ObjectCreate => self.reduce_object_create(node),
            Builtin::ObjectGetPrototypeOf | Builtin::ObjectPrototypeGetProto => {
                self.reduce_object_get_prototype_of(node, builtin)
            }
            Builtin::ObjectPrototypeHasOwnProperty => {
                self.reduce_object_has_own_property(node, &params)
            }
            Builtin::ObjectPrototypeIsPrototypeOf => self.reduce_object_is_prototype_of(node),
            // Reflect
            Builtin::ReflectApply => self.reduce_reflect_apply(node, &params),
            Builtin::ReflectConstruct => self.reduce_reflect_construct(node, &params),
            Builtin::ReflectGet => self.reduce_reflect_get(node),
            Builtin::ReflectHas => self.reduce_reflect_has(node),
            Builtin::ReflectGetPrototypeOf => {
                self.reduce_object_get_prototype_of(node, builtin)
            }
            // Function.prototype
            Builtin::FunctionPrototypeApply => self.reduce_function_apply(node, &params),
            Builtin::FunctionPrototypeCall => self.reduce_function_call(node, &params),
            Builtin::FunctionPrototypeBind => self.reduce_function_bind(node, &params),
            Builtin::FunctionPrototypeHasInstance => self.reduce_function_has_instance(node),
            Builtin::ReturnReceiver => self.reduce_return_receiver(node),
            // Constructors
            Builtin::BooleanConstructor => self.reduce_boolean_constructor(node),
            // Promise / collections / typed arrays / dates
            Builtin::PromisePrototypeThen => self.reduce_promise_then(node, &params),
            Builtin::PromisePrototypeCatch => self.reduce_promise_catch(node, &params),
            Builtin::PromisePrototypeFinally => self.reduce_promise_finally(node, &params),
            Builtin::PromiseResolve => self.reduce_promise_resolve(node, &params),
            Builtin::MapPrototypeGet => self.reduce_map_get(node, &params),
            Builtin::MapPrototypeHas => self.reduce_map_has(node, &params),
            Builtin::MapPrototypeGetSize => {
                self.reduce_collection_size(node, &params, CollectionKind::Map)
            }
            Builtin::SetPrototypeHas => self.reduce_set_has(node, &params),
            Builtin::SetPrototypeGetSize => {
                self.reduce_collection_size(node, &params, CollectionKind::Set)
            }
            Builtin::TypedArrayPrototypeByteLength => {
                self.reduce_array_buffer_view_accessor(node, &params, ViewField::TypedArrayByteLength)
            }
            Builtin::TypedArrayPrototypeByteOffset => {
                self.reduce_array_buffer_view_accessor(node, &params, ViewField::TypedArrayByteOffset)
            }
            Builtin::TypedArrayPrototypeLength => {
                self.reduce_array_buffer_view_accessor(node, &params, ViewField::TypedArrayLength)
            }
            Builtin::DataViewPrototypeGetByteLength => {
                self.reduce_array_buffer_view_accessor(node, &params, ViewField::DataViewByteLength)
            }
            Builtin::DataViewPrototypeGetByteOffset => {
                self.reduce_array_buffer_view_accessor(node, &params, ViewField::DataViewByteOffset)
            }
            Builtin::ArrayBufferIsView => self.reduce_array_buffer_is_view(node),
            Builtin::DatePrototypeGetTime => self.reduce_date_get_time(node, &params),
            Builtin::DateNow => self.reduce_date_now(node),
        };
        reduction
    }

    // ===== Construct dispatch =====

    fn reduce_construct(
        &mut self,
        node: NodeId,
        params: crate::jit::ir::op::ConstructParameters,
    ) -> Result<Reduction, ReduceError> {
        let target = self.graph.node(node).values[0];

        // Constant bound-function target: construct the bound target with
        // the bound arguments spliced in. new.target follows the wrapper.
        if let Opcode::Constant(Constant::Function(function)) = self.graph.op(target) {
            let function = *function;
            let info = self.unit.functions.get(function);
            if let Some(bound) = info.bound.clone() {
                let new_target_input = self.graph.node(node).values[1];
                let unwrapped = self.graph.constant(Constant::Function(bound.target));
                self.graph.replace_value_input(node, 0, unwrapped);
                if new_target_input == target {
                    self.graph.replace_value_input(node, 1, unwrapped);
                }
                for (i, arg) in bound.bound_args.clone().into_iter().enumerate() {
                    let arg = self.graph.constant(arg);
                    self.graph.insert_value_input(node, 2 + i, arg);
                }
                let reduction = self.reduce_construct(node, params)?;
                return Ok(if reduction.changed() {
                    reduction
                } else {
                    Reduction::Changed(node)
                });
            }
            // Known non-bound construct targets keep their generic path.
            return Ok(Reduction::NoChange);
        }

        // Unknown target with monomorphic feedback: identity guard, then
        // retry with the constant target.
        let Some(source) = params.feedback else {
            return Ok(Reduction::NoChange);
        };
        let site = self
            .unit
            .feedback
            .get(source)
            .ok_or(ReduceError::MalformedFeedback(source.0))?;
        if let CalleeFeedback::Monomorphic(function) = site.callee {
            let expected = self.graph.constant(Constant::Function(function));
            let check = self
                .graph
                .add(Opcode::ReferenceEqual, &[target, expected], &[], &[]);
            let node_ref = self.graph.node(node);
            let effect = node_ref.effect_input().unwrap_or_else(|| self.graph.start());
            let control = node_ref.control_input().unwrap_or_else(|| self.graph.start());
            let guard = self.graph.add(
                Opcode::CheckIf {
                    reason: DeoptReason::WrongCallTarget,
                    feedback: Some(source),
                },
                &[check],
                &[effect],
                &[control],
            );
            self.graph.replace_value_input(node, 0, expected);
            self.graph.replace_effect_input(node, guard);
            let reduction = self.reduce_construct(node, params)?;
            return Ok(if reduction.changed() {
                reduction
            } else {
                Reduction::Changed(node)
            });
        }
        Ok(Reduction::NoChange)
    }

    // ===== Shared helpers =====

    pub(crate) fn speculation_disallowed(&self, params: &CallParameters) -> bool {
        params.speculation == SpeculationMode::Disallow
    }

    /// Number of explicit arguments (target and receiver excluded)
    pub(crate) fn argument_count(&self, node: NodeId) -> usize {
        self.graph.node(node).values.len().saturating_sub(2)
    }

    pub(crate) fn argument(&self, node: NodeId, index: usize) -> Option<NodeId> {
        self.graph.node(node).values.get(2 + index).copied()
    }

    pub(crate) fn argument_or_undefined(&mut self, node: NodeId, index: usize) -> NodeId {
        match self.argument(node, index) {
            Some(arg) => arg,
            None => self.graph.undefined(),
        }
    }

    pub(crate) fn receiver(&self, node: NodeId) -> NodeId {
        self.graph.node(node).values[1]
    }

    pub(crate) fn effect_of(&self, node: NodeId) -> NodeId {
        self.graph
            .node(node)
            .effect_input()
            .unwrap_or_else(|| self.graph.start())
    }

    pub(crate) fn control_of(&self, node: NodeId) -> NodeId {
        self.graph
            .node(node)
            .control_input()
            .unwrap_or_else(|| self.graph.start())
    }

    pub(crate) fn frame_state_of(&self, node: NodeId) -> NodeId {
        self.graph
            .node(node)
            .frame_state
            .unwrap_or_else(|| self.graph.start())
    }

    /// Determine what is known about the receiver's shapes at this position.
    ///
    /// A dominating shape check on the effect chain yields a reliable set;
    /// otherwise the oracle's tagged set is returned as-is. Reliable sets may
    /// be consumed via dependencies; unreliable sets need a runtime check.
    pub(crate) fn infer_receiver_shapes(&self, receiver: NodeId, effect: NodeId) -> ShapeFeedback {
        let mut current = effect;
        for _ in 0..100 {
            let Some(node) = self.graph.try_node(current) else {
                break;
            };
            match &node.op {
                Opcode::CheckShapes { shapes, .. } if node.values[0] == receiver => {
                    return ShapeFeedback::Reliable(shapes.clone());
                }
                // Operations that cannot change any object's shape are
                // transparent to the walk.
                Opcode::Checkpoint
                | Opcode::TypeGuard(_)
                | Opcode::CheckShapes { .. }
                | Opcode::CheckIf { .. }
                | Opcode::CheckString(_)
                | Opcode::CheckSmi(_)
                | Opcode::CheckNumber(_)
                | Opcode::CheckBounds(_)
                | Opcode::SpeculativeToNumber { .. }
                | Opcode::LoadField(_)
                | Opcode::LoadElement(_) => {
                    let Some(next) = node.effect_input() else { break };
                    current = next;
                }
                _ => break,
            }
        }
        ShapeFeedback::NoInfo
    }

    /// Receiver shape information for a call: a dominating witness wins,
    /// otherwise the feedback slot's tagged set.
    pub(crate) fn receiver_shapes_for_call(
        &self,
        node: NodeId,
        params: &CallParameters,
    ) -> ShapeFeedback {
        let receiver = self.receiver(node);
        let effect = self.effect_of(node);
        let inferred = self.infer_receiver_shapes(receiver, effect);
        if !matches!(inferred, ShapeFeedback::NoInfo) {
            return inferred;
        }
        let Some(source) = params.feedback else {
            return ShapeFeedback::NoInfo;
        };
        match self.unit.feedback.get(source) {
            Some(site) => site.shapes.clone(),
            None => ShapeFeedback::NoInfo,
        }
    }

    /// Replace the node with a soft deoptimize: the call site has no usable
    /// profile, so transfer to the unoptimized tier to gather one. Soft
    /// bailouts never block future optimization attempts at the site.
    pub(crate) fn reduce_soft_deoptimize(&mut self, node: NodeId, reason: DeoptReason) -> Reduction {
        let effect = self.effect_of(node);
        let control = self.control_of(node);
        let frame_state = self.frame_state_of(node);
        let deopt = self.graph.add_with_frame_state(
            Opcode::Deoptimize {
                kind: DeoptKind::Soft,
                reason,
            },
            &[],
            &[effect],
            &[control],
            frame_state,
        );
        self.graph.merge_control_to_end(deopt);
        let dead = self.graph.add(Opcode::Dead, &[], &[], &[]);
        self.graph.replace_with_value(node, dead, Some(dead), Some(dead));
        Reduction::Replaced(dead)
    }

}

/// Build a continuation frame state: interns the descriptor and creates the
/// FrameState node capturing `params` (receiver, callback, index, length,
/// ... — exactly what the generic loop needs to resume). Free function so
/// callers can hold a graph assembler and the continuation table at once.
pub(crate) fn continuation_frame_state(
    graph: &mut Graph,
    continuations: &mut ContinuationTable,
    outer_frame_state: NodeId,
    resume: ResumePoint,
    mode: ContinuationMode,
    params: &[NodeId],
) -> NodeId {
    let id = continuations.create(resume, mode, params.len());
    let fs = graph.add(
        Opcode::FrameState(FrameStateInfo::Continuation(id)),
        params,
        &[],
        &[],
    );
    graph.node_mut(fs).frame_state = Some(outer_frame_state);
    fs
}

/// Check that a callback is callable, throwing the specified TypeError
/// otherwise. Leaves the assembler on the callable path and returns the
/// throwing runtime call; the caller merges it into the graph end after
/// wiring exception edges. This runs before the loop so an empty receiver
/// still throws.
pub(crate) fn wire_callable_check(
    asm: &mut crate::jit::ir::builder::GraphAssembler<'_>,
    callback: NodeId,
    check_frame_state: NodeId,
) -> NodeId {
    let check = asm.object_is(crate::jit::ir::op::ObjectIs::Callable, callback);
    let (if_true, if_false) = asm.branch(check, BranchHint::True);
    let effect = asm.effect();
    let throw_call = asm.graph().add_with_frame_state(
        Opcode::CallRuntime(RuntimeFn::ThrowTypeError(MessageTemplate::CalledNonCallable)),
        &[callback],
        &[effect],
        &[if_false],
        check_frame_state,
    );
    asm.set_control(if_true);
    throw_call
}

/// Merge the exception edges of the callable-check throw and the callback
/// invocation into the original node's exception handler, so downstream
/// handlers observe both identically to the unoptimized path. Returns the
/// (impossible) non-throwing continuation of the throw call.
pub(crate) fn rewire_exception_edges(
    asm: &mut crate::jit::ir::builder::GraphAssembler<'_>,
    on_exception: NodeId,
    check_throw: NodeId,
    callback_call: NodeId,
) -> NodeId {
    let call_control = asm.control();
    let graph = asm.graph();
    let ex0 = graph.add(Opcode::IfException, &[], &[check_throw], &[check_throw]);
    let check_fail = graph.add(Opcode::IfSuccess, &[], &[], &[check_throw]);
    let ex1 = graph.add(Opcode::IfException, &[], &[callback_call], &[call_control]);
    let ok1 = graph.add(Opcode::IfSuccess, &[], &[], &[call_control]);
    let merge = graph.add(Opcode::Merge, &[], &[], &[ex0, ex1]);
    let ephi = graph.add(Opcode::EffectPhi, &[], &[ex0, ex1], &[merge]);
    let phi = graph.add(Opcode::Phi, &[ex0, ex1], &[], &[merge]);
    graph.replace_with_value(on_exception, phi, Some(ephi), Some(merge));
    asm.set_control(ok1);
    check_fail
}

/// Terminate the impossible success path of an unconditional throw
pub(crate) fn connect_throw_to_end(graph: &mut Graph, check_throw_effect: NodeId, check_fail: NodeId) {
    let throw = graph.add(Opcode::Throw, &[], &[check_throw_effect], &[check_fail]);
    graph.merge_control_to_end(throw);
}


/// Number predicate selector shared with math.rs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ObjectIsKind {
    Finite,
    Integer,
    SafeInteger,
    NaN,
}

/// Direction selector for reduce/reduceRight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReduceDirection {
    Left,
    Right,
}

/// Variant selector for every/some
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EverySomeVariant {
    Every,
    Some,
}

/// Variant selector for find/findIndex
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ArrayFindVariant {
    Find,
    FindIndex,
}

/// Variant selector for indexOf/includes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SearchVariant {
    IndexOf,
    Includes,
}

/// Variant selector for charAt/charCodeAt/codePointAt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StringAtVariant {
    CharAt,
    CharCodeAt,
    CodePointAt,
}

/// Variant selector for case conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StringCaseVariant {
    Lower,
    Upper,
}

/// Collection selector for size getters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CollectionKind {
    Map,
    Set,
}

/// Field selector for array-buffer-view accessors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ViewField {
    TypedArrayByteLength,
    TypedArrayByteOffset,
    TypedArrayLength,
    DataViewByteLength,
    DataViewByteOffset,
}
