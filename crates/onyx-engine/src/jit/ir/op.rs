//! Mid-tier IR operators
//!
//! Operators for the effect/control-edged graph. Call operators carry the
//! call-site parameters recorded by graph construction; check operators carry
//! the feedback source used for deopt attribution.

use crate::jit::builtins::FunctionId;
use crate::jit::continuation::ContinuationId;
use crate::jit::feedback::{
    ConvertReceiverMode, ElementsKind, FeedbackSource, ShapeId, SpeculationMode,
};

/// Compile-time constant value
#[derive(Debug, Clone)]
pub enum Constant {
    Undefined,
    Null,
    /// The elements-backing-store hole marker. Never user-visible.
    TheHole,
    Bool(bool),
    Number(f64),
    Str(String),
    Function(FunctionId),
    Shape(ShapeId),
}

impl PartialEq for Constant {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Constant::Undefined, Constant::Undefined) => true,
            (Constant::Null, Constant::Null) => true,
            (Constant::TheHole, Constant::TheHole) => true,
            (Constant::Bool(a), Constant::Bool(b)) => a == b,
            // Bit equality so that NaN constants dedup and -0.0 != 0.0.
            (Constant::Number(a), Constant::Number(b)) => a.to_bits() == b.to_bits(),
            (Constant::Str(a), Constant::Str(b)) => a == b,
            (Constant::Function(a), Constant::Function(b)) => a == b,
            (Constant::Shape(a), Constant::Shape(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Constant {}

impl std::hash::Hash for Constant {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        core::mem::discriminant(self).hash(state);
        match self {
            Constant::Bool(b) => b.hash(state),
            Constant::Number(n) => n.to_bits().hash(state),
            Constant::Str(s) => s.hash(state),
            Constant::Function(f) => f.hash(state),
            Constant::Shape(s) => s.hash(state),
            _ => {}
        }
    }
}

/// Hint attached to a branch, used by the scheduler downstream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchHint {
    None,
    True,
    False,
}

/// Why a deoptimizing check transfers to the unoptimized tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeoptReason {
    /// Call target differs from the feedback-predicted callable
    WrongCallTarget,
    /// Receiver shape differs from the witnessed shape set
    WrongShape,
    /// Value was not a small integer
    NotASmi,
    /// Value was not a number (or oddball, per hint)
    NotANumber,
    /// Value was not a string
    NotAString,
    /// Index check against current bounds failed
    OutOfBounds,
    /// Call site has no usable profile yet (soft bailout)
    InsufficientFeedback,
}

/// Which tier-transition flavor a Deoptimize node requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeoptKind {
    /// State valid immediately before the deopt point
    Eager,
    /// State valid after a pending call returns
    Lazy,
    /// Not a correctness failure; never blocks future optimization
    Soft,
}

/// Hint for speculative number conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberHint {
    Number,
    /// Number, undefined, null, or boolean
    NumberOrOddball,
}

/// Type refinement asserted by a TypeGuard node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardType {
    /// Not the hole (element loads after a hole check)
    NonInternal,
    /// Non-negative small integer (clamped string indices)
    UnsignedSmall,
}

/// Message selector for specification-mandated TypeErrors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageTemplate {
    CalledNonCallable,
    CalledOnNonObject,
    ConstructorNonCallable,
    ReduceNoInitialValue,
}

/// Runtime functions reachable from reduced code (always-correct escape hatch)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeFn {
    /// Throws a TypeError built from a message template plus one value
    ThrowTypeError(MessageTemplate),
}

/// Code stubs the reducer is allowed to call directly
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StubCall {
    /// Generic keyed property load (target, key)
    GetProperty,
    /// Ordered-hash-table lookup returning the value or undefined
    MapGet,
    /// Ordered-hash-table membership test
    MapHas,
    SetHas,
    /// Elements-kind-specialized linear search (elements, length, value, from)
    ArrayIndexOf(ElementsKind),
    ArrayIncludes(ElementsKind),
    /// Full generic shift implementation; slow path for receivers longer
    /// than the inline copy limit
    ArrayShift,
    /// Promise reaction wiring for then/catch/finally
    PerformPromiseThen,
    NewPromise,
    /// Generic string-to-number parse with explicit radix
    ParseInt,
    /// Millisecond clock read
    DateNow,
}

/// Object-layout field read/written by the reduced code.
///
/// Offsets are resolved by the lowering phase; the reducer only names the
/// field and, where the representation matters, the elements kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldAccess {
    ArrayLength(ElementsKind),
    Elements,
    FixedArrayLength,
    Shape,
    TypedArrayByteLength,
    TypedArrayByteOffset,
    TypedArrayLength,
    DataViewByteLength,
    DataViewByteOffset,
    DateValue,
    CollectionSize,
}

/// How MaybeGrowFastElements may reallocate the backing store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrowMode {
    SmiOrObject,
    Double,
}

/// Pure unary numeric operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberUnop {
    Abs,
    Acos,
    Acosh,
    Asin,
    Asinh,
    Atan,
    Atanh,
    Cbrt,
    Ceil,
    Cos,
    Cosh,
    Exp,
    Expm1,
    Floor,
    Fround,
    Log,
    Log1p,
    Log2,
    Log10,
    Round,
    Sign,
    Sin,
    Sinh,
    Sqrt,
    Tan,
    Tanh,
    Trunc,
    ToUint32,
    Clz32,
    /// Quiet any signaling NaN before it reaches a double backing store
    SilenceNaN,
}

impl NumberUnop {
    /// Constant-fold the operator (also used by tests)
    pub fn eval(self, x: f64) -> f64 {
        match self {
            NumberUnop::Abs => x.abs(),
            NumberUnop::Acos => x.acos(),
            NumberUnop::Acosh => x.acosh(),
            NumberUnop::Asin => x.asin(),
            NumberUnop::Asinh => x.asinh(),
            NumberUnop::Atan => x.atan(),
            NumberUnop::Atanh => x.atanh(),
            NumberUnop::Cbrt => x.cbrt(),
            NumberUnop::Ceil => x.ceil(),
            NumberUnop::Cos => x.cos(),
            NumberUnop::Cosh => x.cosh(),
            NumberUnop::Exp => x.exp(),
            NumberUnop::Expm1 => x.exp_m1(),
            NumberUnop::Floor => x.floor(),
            NumberUnop::Fround => x as f32 as f64,
            NumberUnop::Log => x.ln(),
            NumberUnop::Log1p => x.ln_1p(),
            NumberUnop::Log2 => x.log2(),
            NumberUnop::Log10 => x.log10(),
            // Math.round halfway cases go toward +Infinity, unlike f64::round.
            NumberUnop::Round => {
                if x.is_nan() || x.is_infinite() || x == 0.0 {
                    x
                } else {
                    (x + 0.5).floor()
                }
            }
            NumberUnop::Sign => {
                if x.is_nan() || x == 0.0 {
                    x
                } else if x > 0.0 {
                    1.0
                } else {
                    -1.0
                }
            }
            NumberUnop::Sin => x.sin(),
            NumberUnop::Sinh => x.sinh(),
            NumberUnop::Sqrt => x.sqrt(),
            NumberUnop::Tan => x.tan(),
            NumberUnop::Tanh => x.tanh(),
            NumberUnop::Trunc => x.trunc(),
            NumberUnop::ToUint32 => {
                if x.is_nan() || x.is_infinite() {
                    0.0
                } else {
                    (x.trunc() as i64 as u32) as f64
                }
            }
            NumberUnop::Clz32 => {
                let u = NumberUnop::ToUint32.eval(x) as u32;
                u.leading_zeros() as f64
            }
            NumberUnop::SilenceNaN => {
                if x.is_nan() {
                    f64::NAN
                } else {
                    x
                }
            }
        }
    }
}

/// Pure binary numeric operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberBinop {
    Add,
    Subtract,
    Multiply,
    Min,
    Max,
    Atan2,
    Pow,
    /// 32-bit integer multiply over ToUint32-converted operands
    Imul,
}

impl NumberBinop {
    /// Constant-fold the operator (also used by tests)
    pub fn eval(self, a: f64, b: f64) -> f64 {
        match self {
            NumberBinop::Add => a + b,
            NumberBinop::Subtract => a - b,
            NumberBinop::Multiply => a * b,
            // JS Math.min/max propagate NaN, unlike f64::min/max.
            NumberBinop::Min => {
                if a.is_nan() || b.is_nan() {
                    f64::NAN
                } else if a == b {
                    if a.is_sign_negative() || b.is_sign_negative() {
                        a.min(b)
                    } else {
                        a
                    }
                } else {
                    a.min(b)
                }
            }
            NumberBinop::Max => {
                if a.is_nan() || b.is_nan() {
                    f64::NAN
                } else {
                    a.max(b)
                }
            }
            NumberBinop::Atan2 => a.atan2(b),
            NumberBinop::Pow => a.powf(b),
            NumberBinop::Imul => {
                let x = NumberUnop::ToUint32.eval(a) as u32;
                let y = NumberUnop::ToUint32.eval(b) as u32;
                x.wrapping_mul(y) as i32 as f64
            }
        }
    }
}

/// Pure unary type predicate producing a boolean
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectIs {
    Receiver,
    Callable,
    Array,
    ArrayBufferView,
    FiniteNumber,
    Integer,
    SafeInteger,
    NaN,
    /// Double-representation hole marker test (holey double elements)
    Float64Hole,
}

/// Estimated invocation frequency of a call site
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CallFrequency(pub f32);

impl CallFrequency {
    pub fn unknown() -> Self {
        CallFrequency(0.0)
    }
}

/// Parameters attached to Call-family operators
#[derive(Debug, Clone, PartialEq)]
pub struct CallParameters {
    pub frequency: CallFrequency,
    pub speculation: SpeculationMode,
    pub feedback: Option<FeedbackSource>,
    pub convert_mode: ConvertReceiverMode,
}

impl CallParameters {
    /// Parameters for a synthesized call that carries no feedback
    pub fn synthetic(frequency: CallFrequency, convert_mode: ConvertReceiverMode) -> Self {
        CallParameters {
            frequency,
            speculation: SpeculationMode::Allow,
            feedback: None,
            convert_mode,
        }
    }
}

/// Parameters attached to Construct-family operators
#[derive(Debug, Clone, PartialEq)]
pub struct ConstructParameters {
    pub frequency: CallFrequency,
    pub speculation: SpeculationMode,
    pub feedback: Option<FeedbackSource>,
}

/// Which arguments-object flavor a CreateArguments node allocates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentsType {
    /// Sloppy-mode, parameter-aliased
    Mapped,
    /// Strict-mode
    Unmapped,
    /// Rest parameter array
    Rest,
}

/// How a for..in loop's property enumeration is compiled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForInMode {
    /// Enumerating over the receiver's own enum cache
    EnumCache,
    /// Generic enumeration (proxies, dictionary receivers)
    Generic,
}

/// What a FrameState node snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStateInfo {
    /// The enclosing function's own entry state (built by graph construction)
    Function,
    /// A builtin-continuation resumption state built by this pass
    Continuation(ContinuationId),
}

/// An IR operator.
///
/// Value inputs per operator follow the conventions documented on the call
/// variants; effect/control inputs are threaded by the assembler.
#[derive(Debug, Clone, PartialEq)]
pub enum Opcode {
    // ===== Graph skeleton =====
    Start,
    End,
    /// Function parameter by index (0 = receiver)
    Parameter(u16),
    Constant(Constant),

    // ===== Control =====
    Branch(BranchHint),
    IfTrue,
    IfFalse,
    /// Non-exceptional continuation of a throwing operation
    IfSuccess,
    /// Exceptional continuation; acts as value (the thrown value), effect, and control
    IfException,
    Merge,
    Loop,
    /// Keeps an otherwise endless loop reachable from End
    Terminate,
    Return,
    Throw,
    Deoptimize { kind: DeoptKind, reason: DeoptReason },
    Dead,

    // ===== Value/effect joins =====
    Phi,
    EffectPhi,
    Select(BranchHint),
    /// Pure type refinement; pins a value to a control position
    TypeGuard(GuardType),
    /// Deopt point carrying a frame state
    Checkpoint,
    FrameState(FrameStateInfo),

    // ===== Calls =====
    /// values: [target, receiver, args...]
    Call(CallParameters),
    /// values: [target, new_target, args...]
    Construct(ConstructParameters),
    /// values: [target, receiver, arguments_list]
    CallWithArrayLike(CallParameters),
    /// values: [target, receiver, args..., spread]
    CallWithSpread(CallParameters),
    /// values: [target, new_target, arguments_list]
    ConstructWithArrayLike(ConstructParameters),
    /// values: [target, new_target, args..., spread]
    ConstructWithSpread(ConstructParameters),
    CallRuntime(RuntimeFn),
    CallStub(StubCall),

    // ===== Allocation =====
    CreateClosure(FunctionId),
    /// values: [target, bound_this, bound_args...]; `constructor` records
    /// whether the result is usable as a construct target
    CreateBoundFunction { constructor: bool },
    CreateArguments(ArgumentsType),
    /// values: [length]; allocates a fast array of the given kind
    NewArray(ElementsKind),
    /// values: [prototype]
    CreateObject,
    NewStringIterator,

    // ===== Speculative checks (deopt on failure) =====
    CheckIf { reason: DeoptReason, feedback: Option<FeedbackSource> },
    CheckShapes { shapes: Vec<ShapeId>, feedback: Option<FeedbackSource> },
    CheckString(Option<FeedbackSource>),
    CheckSmi(Option<FeedbackSource>),
    CheckNumber(Option<FeedbackSource>),
    /// values: [index, length]; returns the checked index
    CheckBounds(Option<FeedbackSource>),
    SpeculativeToNumber { hint: NumberHint, feedback: Option<FeedbackSource> },

    // ===== Numeric =====
    NumberUnary(NumberUnop),
    NumberBinary(NumberBinop),
    NumberEqual,
    NumberLessThan,
    NumberLessThanOrEqual,

    // ===== Predicates & conversions =====
    ReferenceEqual,
    SameValue,
    ObjectIs(ObjectIs),
    ToBoolean,
    ConvertHoleToUndefined,

    // ===== Strings =====
    StringLength,
    /// values: [string, from, to]
    StringSubstring,
    /// values: [string, search, position]
    StringIndexOf,
    StringCharAt,
    StringCharCodeAt,
    StringCodePointAt,
    StringConcat,
    StringFromSingleCharCode,
    StringToLowerCase,
    StringToUpperCase,

    // ===== Fields & elements =====
    LoadField(FieldAccess),
    /// values: [object, new_value]
    StoreField(FieldAccess),
    /// values: [elements, index]
    LoadElement(ElementsKind),
    /// values: [elements, index, value]
    StoreElement(ElementsKind),
    /// values: [object, elements, index, elements_length]; returns (possibly new) elements
    MaybeGrowFastElements { mode: GrowMode, feedback: Option<FeedbackSource> },
    /// values: [object, elements]; returns writable elements
    EnsureWritableFastElements,

    // ===== Object protocol =====
    /// values: [object, cache_type]; produced by for..in graph construction
    ForInNext(ForInMode),
    GetPrototypeOf,
    /// values: [object, key]
    HasProperty,
    /// values: [object, prototype]
    HasInPrototypeChain,
    /// values: [constructor, object]
    OrdinaryHasInstance,
}

impl Opcode {
    /// Whether this operator never appears on the effect chain
    pub fn is_pure(&self) -> bool {
        matches!(
            self,
            Opcode::Parameter(_)
                | Opcode::Constant(_)
                | Opcode::Phi
                | Opcode::Select(_)
                | Opcode::NumberUnary(_)
                | Opcode::NumberBinary(_)
                | Opcode::NumberEqual
                | Opcode::NumberLessThan
                | Opcode::NumberLessThanOrEqual
                | Opcode::ReferenceEqual
                | Opcode::SameValue
                | Opcode::ObjectIs(_)
                | Opcode::ToBoolean
                | Opcode::ConvertHoleToUndefined
                | Opcode::StringLength
                | Opcode::StringIndexOf
                | Opcode::StringFromSingleCharCode
                | Opcode::FrameState(_)
        )
    }

    /// Whether this is one of the call/construct operators this pass reduces
    pub fn is_reducible_call(&self) -> bool {
        matches!(
            self,
            Opcode::Call(_)
                | Opcode::Construct(_)
                | Opcode::CallWithArrayLike(_)
                | Opcode::CallWithSpread(_)
                | Opcode::ConstructWithArrayLike(_)
                | Opcode::ConstructWithSpread(_)
        )
    }

    /// Whether this operator may transfer to the exception edge
    pub fn can_throw(&self) -> bool {
        matches!(
            self,
            Opcode::Call(_)
                | Opcode::Construct(_)
                | Opcode::CallWithArrayLike(_)
                | Opcode::CallWithSpread(_)
                | Opcode::ConstructWithArrayLike(_)
                | Opcode::ConstructWithSpread(_)
                | Opcode::CallRuntime(_)
                | Opcode::CallStub(_)
                | Opcode::HasProperty
                | Opcode::OrdinaryHasInstance
                | Opcode::GetPrototypeOf
        )
    }

    /// Short operator name for graph dumps
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Opcode::Start => "start",
            Opcode::End => "end",
            Opcode::Parameter(_) => "parameter",
            Opcode::Constant(_) => "constant",
            Opcode::Branch(_) => "branch",
            Opcode::IfTrue => "if_true",
            Opcode::IfFalse => "if_false",
            Opcode::IfSuccess => "if_success",
            Opcode::IfException => "if_exception",
            Opcode::Merge => "merge",
            Opcode::Loop => "loop",
            Opcode::Terminate => "terminate",
            Opcode::Return => "return",
            Opcode::Throw => "throw",
            Opcode::Deoptimize { .. } => "deoptimize",
            Opcode::Dead => "dead",
            Opcode::Phi => "phi",
            Opcode::EffectPhi => "effect_phi",
            Opcode::Select(_) => "select",
            Opcode::TypeGuard(_) => "type_guard",
            Opcode::Checkpoint => "checkpoint",
            Opcode::FrameState(_) => "frame_state",
            Opcode::Call(_) => "call",
            Opcode::Construct(_) => "construct",
            Opcode::CallWithArrayLike(_) => "call_with_array_like",
            Opcode::CallWithSpread(_) => "call_with_spread",
            Opcode::ConstructWithArrayLike(_) => "construct_with_array_like",
            Opcode::ConstructWithSpread(_) => "construct_with_spread",
            Opcode::CallRuntime(_) => "call_runtime",
            Opcode::CallStub(_) => "call_stub",
            Opcode::CreateClosure(_) => "create_closure",
            Opcode::CreateBoundFunction { .. } => "create_bound_function",
            Opcode::CreateArguments(_) => "create_arguments",
            Opcode::NewArray(_) => "new_array",
            Opcode::CreateObject => "create_object",
            Opcode::NewStringIterator => "new_string_iterator",
            Opcode::CheckIf { .. } => "check_if",
            Opcode::CheckShapes { .. } => "check_shapes",
            Opcode::CheckString(_) => "check_string",
            Opcode::CheckSmi(_) => "check_smi",
            Opcode::CheckNumber(_) => "check_number",
            Opcode::CheckBounds(_) => "check_bounds",
            Opcode::SpeculativeToNumber { .. } => "speculative_to_number",
            Opcode::NumberUnary(_) => "number_unary",
            Opcode::NumberBinary(_) => "number_binary",
            Opcode::NumberEqual => "number_equal",
            Opcode::NumberLessThan => "number_less_than",
            Opcode::NumberLessThanOrEqual => "number_less_than_or_equal",
            Opcode::ReferenceEqual => "reference_equal",
            Opcode::SameValue => "same_value",
            Opcode::ObjectIs(_) => "object_is",
            Opcode::ToBoolean => "to_boolean",
            Opcode::ConvertHoleToUndefined => "convert_hole_to_undefined",
            Opcode::StringLength => "string_length",
            Opcode::StringSubstring => "string_substring",
            Opcode::StringIndexOf => "string_index_of",
            Opcode::StringCharAt => "string_char_at",
            Opcode::StringCharCodeAt => "string_char_code_at",
            Opcode::StringCodePointAt => "string_code_point_at",
            Opcode::StringConcat => "string_concat",
            Opcode::StringFromSingleCharCode => "string_from_single_char_code",
            Opcode::StringToLowerCase => "string_to_lower_case",
            Opcode::StringToUpperCase => "string_to_upper_case",
            Opcode::LoadField(_) => "load_field",
            Opcode::StoreField(_) => "store_field",
            Opcode::LoadElement(_) => "load_element",
            Opcode::StoreElement(_) => "store_element",
            Opcode::MaybeGrowFastElements { .. } => "maybe_grow_fast_elements",
            Opcode::EnsureWritableFastElements => "ensure_writable_fast_elements",
            Opcode::ForInNext(_) => "for_in_next",
            Opcode::GetPrototypeOf => "get_prototype_of",
            Opcode::HasProperty => "has_property",
            Opcode::HasInPrototypeChain => "has_in_prototype_chain",
            Opcode::OrdinaryHasInstance => "ordinary_has_instance",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_goes_toward_positive_infinity_on_ties() {
        assert_eq!(NumberUnop::Round.eval(0.5), 1.0);
        assert_eq!(NumberUnop::Round.eval(-0.5), 0.0);
        assert_eq!(NumberUnop::Round.eval(2.5), 3.0);
        assert!(NumberUnop::Round.eval(f64::NAN).is_nan());
    }

    #[test]
    fn test_min_max_propagate_nan() {
        assert!(NumberBinop::Min.eval(1.0, f64::NAN).is_nan());
        assert!(NumberBinop::Max.eval(f64::NAN, 2.0).is_nan());
        assert_eq!(NumberBinop::Max.eval(1.0, 3.0), 3.0);
    }

    #[test]
    fn test_imul_wraps_through_uint32() {
        assert_eq!(NumberBinop::Imul.eval(3.0, 4.0), 12.0);
        assert_eq!(NumberBinop::Imul.eval(-5.0, 12.0), -60.0);
        // 2^31 * 2 wraps to 0 in 32-bit arithmetic.
        assert_eq!(NumberBinop::Imul.eval(2147483648.0, 2.0), 0.0);
    }

    #[test]
    fn test_clz32_of_zero_is_32() {
        assert_eq!(NumberUnop::Clz32.eval(0.0), 32.0);
        assert_eq!(NumberUnop::Clz32.eval(1.0), 31.0);
        assert_eq!(NumberUnop::Clz32.eval(f64::NAN), 32.0);
    }

    #[test]
    fn test_sign_keeps_nan_and_zero() {
        assert!(NumberUnop::Sign.eval(f64::NAN).is_nan());
        assert_eq!(NumberUnop::Sign.eval(0.0), 0.0);
        assert_eq!(NumberUnop::Sign.eval(-7.0), -1.0);
    }

    #[test]
    fn test_operator_classification() {
        assert!(Opcode::NumberEqual.is_pure());
        assert!(!Opcode::Checkpoint.is_pure());
        assert!(Opcode::CallRuntime(RuntimeFn::ThrowTypeError(
            MessageTemplate::CalledNonCallable
        ))
        .can_throw());
        assert!(!Opcode::NumberEqual.can_throw());
        assert!(Opcode::CallWithSpread(CallParameters::synthetic(
            CallFrequency::unknown(),
            ConvertReceiverMode::Any
        ))
        .is_reducible_call());
    }

    #[test]
    fn test_constant_interning_semantics() {
        // NaN constants compare equal bit-for-bit, so they intern.
        assert_eq!(Constant::Number(f64::NAN), Constant::Number(f64::NAN));
        // Negative zero stays distinct from positive zero.
        assert_ne!(Constant::Number(0.0), Constant::Number(-0.0));
    }
}
