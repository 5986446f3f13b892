//! Well-known builtin table
//!
//! Maps standard-library functions to identifiers the reducer can dispatch
//! on. The machine-code implementations live in the codegen layer; this table
//! is a pure lookup.

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;

use crate::jit::ir::op::Constant;

/// Handle into the function table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionId(pub u32);

impl std::fmt::Display for FunctionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "f{}", self.0)
    }
}

/// Identifiers for the standard functions the reducer recognizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    // Math, unary
    MathAbs,
    MathAcos,
    MathAcosh,
    MathAsin,
    MathAsinh,
    MathAtan,
    MathAtanh,
    MathCbrt,
    MathCeil,
    MathCos,
    MathCosh,
    MathExp,
    MathExpm1,
    MathFloor,
    MathFround,
    MathLog,
    MathLog1p,
    MathLog2,
    MathLog10,
    MathRound,
    MathSign,
    MathSin,
    MathSinh,
    MathSqrt,
    MathTan,
    MathTanh,
    MathTrunc,
    // Math, other
    MathAtan2,
    MathPow,
    MathImul,
    MathClz32,
    MathMin,
    MathMax,
    // Number & globals
    NumberIsFinite,
    NumberIsInteger,
    NumberIsSafeInteger,
    NumberIsNaN,
    NumberParseInt,
    GlobalIsFinite,
    GlobalIsNaN,
    // Array
    ArrayIsArray,
    ArrayForEach,
    ArrayMap,
    ArrayFilter,
    ArrayReduce,
    ArrayReduceRight,
    ArrayEvery,
    ArraySome,
    ArrayFind,
    ArrayFindIndex,
    ArrayIndexOf,
    ArrayIncludes,
    ArrayPush,
    ArrayPop,
    ArrayShift,
    // String
    StringPrototypeIndexOf,
    StringPrototypeSubstring,
    StringPrototypeSlice,
    StringPrototypeSubstr,
    StringPrototypeCharAt,
    StringPrototypeCharCodeAt,
    StringPrototypeCodePointAt,
    StringPrototypeConcat,
    StringPrototypeToLowerCase,
    StringPrototypeToUpperCase,
    StringPrototypeIterator,
    StringFromCharCode,
    // Object
    ObjectIs,
    ObjectCreate,
    ObjectGetPrototypeOf,
    ObjectPrototypeGetProto,
    ObjectPrototypeHasOwnProperty,
    ObjectPrototypeIsPrototypeOf,
    // Reflect
    ReflectApply,
    ReflectConstruct,
    ReflectGet,
    ReflectHas,
    ReflectGetPrototypeOf,
    // Function.prototype
    FunctionPrototypeApply,
    FunctionPrototypeCall,
    FunctionPrototypeBind,
    FunctionPrototypeHasInstance,
    /// Accessors compiled to "return this"
    ReturnReceiver,
    // Constructors
    BooleanConstructor,
    // Promise
    PromisePrototypeThen,
    PromisePrototypeCatch,
    PromisePrototypeFinally,
    PromiseResolve,
    // Collections
    MapPrototypeGet,
    MapPrototypeHas,
    MapPrototypeGetSize,
    SetPrototypeHas,
    SetPrototypeGetSize,
    // Typed arrays & buffers
    TypedArrayPrototypeByteLength,
    TypedArrayPrototypeByteOffset,
    TypedArrayPrototypeLength,
    DataViewPrototypeGetByteLength,
    DataViewPrototypeGetByteOffset,
    ArrayBufferIsView,
    // Date
    DatePrototypeGetTime,
    DateNow,
}

static BUILTIN_NAMES: Lazy<FxHashMap<&'static str, Builtin>> = Lazy::new(|| {
    let mut table = FxHashMap::default();
    table.insert("Math.abs", Builtin::MathAbs);
    table.insert("Math.acos", Builtin::MathAcos);
    table.insert("Math.acosh", Builtin::MathAcosh);
    table.insert("Math.asin", Builtin::MathAsin);
    table.insert("Math.asinh", Builtin::MathAsinh);
    table.insert("Math.atan", Builtin::MathAtan);
    table.insert("Math.atanh", Builtin::MathAtanh);
    table.insert("Math.cbrt", Builtin::MathCbrt);
    table.insert("Math.ceil", Builtin::MathCeil);
    table.insert("Math.cos", Builtin::MathCos);
    table.insert("Math.cosh", Builtin::MathCosh);
    table.insert("Math.exp", Builtin::MathExp);
    table.insert("Math.expm1", Builtin::MathExpm1);
    table.insert("Math.floor", Builtin::MathFloor);
    table.insert("Math.fround", Builtin::MathFround);
    table.insert("Math.log", Builtin::MathLog);
    table.insert("Math.log1p", Builtin::MathLog1p);
    table.insert("Math.log2", Builtin::MathLog2);
    table.insert("Math.log10", Builtin::MathLog10);
    table.insert("Math.round", Builtin::MathRound);
    table.insert("Math.sign", Builtin::MathSign);
    table.insert("Math.sin", Builtin::MathSin);
    table.insert("Math.sinh", Builtin::MathSinh);
    table.insert("Math.sqrt", Builtin::MathSqrt);
    table.insert("Math.tan", Builtin::MathTan);
    table.insert("Math.tanh", Builtin::MathTanh);
    table.insert("Math.trunc", Builtin::MathTrunc);
    table.insert("Math.atan2", Builtin::MathAtan2);
    table.insert("Math.pow", Builtin::MathPow);
    table.insert("Math.imul", Builtin::MathImul);
    table.insert("Math.clz32", Builtin::MathClz32);
    table.insert("Math.min", Builtin::MathMin);
    table.insert("Math.max", Builtin::MathMax);
    table.insert("Number.isFinite", Builtin::NumberIsFinite);
    table.insert("Number.isInteger", Builtin::NumberIsInteger);
    table.insert("Number.isSafeInteger", Builtin::NumberIsSafeInteger);
    table.insert("Number.isNaN", Builtin::NumberIsNaN);
    table.insert("Number.parseInt", Builtin::NumberParseInt);
    table.insert("isFinite", Builtin::GlobalIsFinite);
    table.insert("isNaN", Builtin::GlobalIsNaN);
    table.insert("Array.isArray", Builtin::ArrayIsArray);
    table.insert("Array.prototype.forEach", Builtin::ArrayForEach);
    table.insert("Array.prototype.map", Builtin::ArrayMap);
    table.insert("Array.prototype.filter", Builtin::ArrayFilter);
    table.insert("Array.prototype.reduce", Builtin::ArrayReduce);
    table.insert("Array.prototype.reduceRight", Builtin::ArrayReduceRight);
    table.insert("Array.prototype.every", Builtin::ArrayEvery);
    table.insert("Array.prototype.some", Builtin::ArraySome);
    table.insert("Array.prototype.find", Builtin::ArrayFind);
    table.insert("Array.prototype.findIndex", Builtin::ArrayFindIndex);
    table.insert("Array.prototype.indexOf", Builtin::ArrayIndexOf);
    table.insert("Array.prototype.includes", Builtin::ArrayIncludes);
    table.insert("Array.prototype.push", Builtin::ArrayPush);
    table.insert("Array.prototype.pop", Builtin::ArrayPop);
    table.insert("Array.prototype.shift", Builtin::ArrayShift);
    table.insert("String.prototype.indexOf", Builtin::StringPrototypeIndexOf);
    table.insert("String.prototype.substring", Builtin::StringPrototypeSubstring);
    table.insert("String.prototype.slice", Builtin::StringPrototypeSlice);
    table.insert("String.prototype.substr", Builtin::StringPrototypeSubstr);
    table.insert("String.prototype.charAt", Builtin::StringPrototypeCharAt);
    table.insert("String.prototype.charCodeAt", Builtin::StringPrototypeCharCodeAt);
    table.insert("String.prototype.codePointAt", Builtin::StringPrototypeCodePointAt);
    table.insert("String.prototype.concat", Builtin::StringPrototypeConcat);
    table.insert("String.prototype.toLowerCase", Builtin::StringPrototypeToLowerCase);
    table.insert("String.prototype.toUpperCase", Builtin::StringPrototypeToUpperCase);
    table.insert("String.prototype[Symbol.iterator]", Builtin::StringPrototypeIterator);
    table.insert("String.fromCharCode", Builtin::StringFromCharCode);
    table.insert("Object.is", Builtin::ObjectIs);
    table.insert("Object.create", Builtin::ObjectCreate);
    table.insert("Object.getPrototypeOf", Builtin::ObjectGetPrototypeOf);
    table.insert("Object.prototype.__proto__", Builtin::ObjectPrototypeGetProto);
    table.insert("Object.prototype.hasOwnProperty", Builtin::ObjectPrototypeHasOwnProperty);
    table.insert("Object.prototype.isPrototypeOf", Builtin::ObjectPrototypeIsPrototypeOf);
    table.insert("Reflect.apply", Builtin::ReflectApply);
    table.insert("Reflect.construct", Builtin::ReflectConstruct);
    table.insert("Reflect.get", Builtin::ReflectGet);
    table.insert("Reflect.has", Builtin::ReflectHas);
    table.insert("Reflect.getPrototypeOf", Builtin::ReflectGetPrototypeOf);
    table.insert("Function.prototype.apply", Builtin::FunctionPrototypeApply);
    table.insert("Function.prototype.call", Builtin::FunctionPrototypeCall);
    table.insert("Function.prototype.bind", Builtin::FunctionPrototypeBind);
    table.insert("Function.prototype[Symbol.hasInstance]", Builtin::FunctionPrototypeHasInstance);
    table.insert("Boolean", Builtin::BooleanConstructor);
    table.insert("Promise.prototype.then", Builtin::PromisePrototypeThen);
    table.insert("Promise.prototype.catch", Builtin::PromisePrototypeCatch);
    table.insert("Promise.prototype.finally", Builtin::PromisePrototypeFinally);
    table.insert("Promise.resolve", Builtin::PromiseResolve);
    table.insert("Map.prototype.get", Builtin::MapPrototypeGet);
    table.insert("Map.prototype.has", Builtin::MapPrototypeHas);
    table.insert("Map.prototype.size", Builtin::MapPrototypeGetSize);
    table.insert("Set.prototype.has", Builtin::SetPrototypeHas);
    table.insert("Set.prototype.size", Builtin::SetPrototypeGetSize);
    table.insert("TypedArray.prototype.byteLength", Builtin::TypedArrayPrototypeByteLength);
    table.insert("TypedArray.prototype.byteOffset", Builtin::TypedArrayPrototypeByteOffset);
    table.insert("TypedArray.prototype.length", Builtin::TypedArrayPrototypeLength);
    table.insert("DataView.prototype.byteLength", Builtin::DataViewPrototypeGetByteLength);
    table.insert("DataView.prototype.byteOffset", Builtin::DataViewPrototypeGetByteOffset);
    table.insert("ArrayBuffer.isView", Builtin::ArrayBufferIsView);
    table.insert("Date.prototype.getTime", Builtin::DatePrototypeGetTime);
    table.insert("Date.now", Builtin::DateNow);
    table
});

impl Builtin {
    /// Resolve a well-known builtin by its canonical dotted name
    pub fn from_name(name: &str) -> Option<Builtin> {
        BUILTIN_NAMES.get(name).copied()
    }
}

/// Record for a bound-function wrapper created by Function.prototype.bind
#[derive(Debug, Clone)]
pub struct BoundFunctionInfo {
    pub target: FunctionId,
    pub bound_this: Constant,
    pub bound_args: Vec<Constant>,
}

/// Compiler-visible record for a callable
#[derive(Debug, Clone)]
pub struct FunctionInfo {
    pub name: String,
    pub builtin: Option<Builtin>,
    /// Class constructors throw when called without `new`
    pub class_constructor: bool,
    pub formal_parameter_count: u16,
    pub bound: Option<BoundFunctionInfo>,
}

impl FunctionInfo {
    pub fn is_bound(&self) -> bool {
        self.bound.is_some()
    }
}

/// Function table for one compilation unit's world view
#[derive(Debug, Default)]
pub struct FunctionTable {
    functions: Vec<FunctionInfo>,
}

impl FunctionTable {
    pub fn new() -> Self {
        FunctionTable { functions: Vec::new() }
    }

    pub fn add(&mut self, info: FunctionInfo) -> FunctionId {
        let id = FunctionId(self.functions.len() as u32);
        self.functions.push(info);
        id
    }

    /// Register a builtin under its canonical name
    pub fn add_builtin(&mut self, name: &str, builtin: Builtin) -> FunctionId {
        self.add(FunctionInfo {
            name: name.to_string(),
            builtin: Some(builtin),
            class_constructor: false,
            formal_parameter_count: 0,
            bound: None,
        })
    }

    /// Register a plain user function
    pub fn add_function(&mut self, name: &str, formal_parameter_count: u16) -> FunctionId {
        self.add(FunctionInfo {
            name: name.to_string(),
            builtin: None,
            class_constructor: false,
            formal_parameter_count,
            bound: None,
        })
    }

    /// Register a bound-function wrapper
    pub fn add_bound(
        &mut self,
        target: FunctionId,
        bound_this: Constant,
        bound_args: Vec<Constant>,
    ) -> FunctionId {
        let name = format!("bound {}", self.get(target).name);
        self.add(FunctionInfo {
            name,
            builtin: None,
            class_constructor: false,
            formal_parameter_count: 0,
            bound: Some(BoundFunctionInfo {
                target,
                bound_this,
                bound_args,
            }),
        })
    }

    pub fn get(&self, id: FunctionId) -> &FunctionInfo {
        &self.functions[id.0 as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_name_lookup() {
        assert_eq!(Builtin::from_name("Math.max"), Some(Builtin::MathMax));
        assert_eq!(
            Builtin::from_name("Array.prototype.forEach"),
            Some(Builtin::ArrayForEach)
        );
        assert_eq!(Builtin::from_name("Math.nonsense"), None);
    }

    #[test]
    fn test_bound_function_record() {
        let mut table = FunctionTable::new();
        let target = table.add_builtin("Math.max", Builtin::MathMax);
        let bound = table.add_bound(target, Constant::Undefined, vec![Constant::Number(1.0)]);
        let info = table.get(bound);
        assert!(info.is_bound());
        assert_eq!(info.bound.as_ref().unwrap().target, target);
        assert!(info.name.starts_with("bound "));
    }
}
