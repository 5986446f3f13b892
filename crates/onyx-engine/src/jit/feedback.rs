//! Call-site type feedback
//!
//! Shapes (hidden classes), elements kinds, and the feedback a call site
//! accumulated while running in the unoptimized tier. Reliability is part of
//! the type: reliable shape sets may be consumed through a registered
//! dependency, unreliable ones must be re-checked at runtime. The two are
//! never conflated behind a boolean.

/// Handle into the shape table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShapeId(pub u32);

impl std::fmt::Display for ShapeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Backing-store classification of an array-like object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementsKind {
    PackedSmi,
    HoleySmi,
    PackedDouble,
    HoleyDouble,
    Packed,
    Holey,
}

impl ElementsKind {
    pub fn is_holey(&self) -> bool {
        matches!(
            self,
            ElementsKind::HoleySmi | ElementsKind::HoleyDouble | ElementsKind::Holey
        )
    }

    pub fn is_double(&self) -> bool {
        matches!(self, ElementsKind::PackedDouble | ElementsKind::HoleyDouble)
    }

    pub fn is_smi(&self) -> bool {
        matches!(self, ElementsKind::PackedSmi | ElementsKind::HoleySmi)
    }

    /// Widen a smi kind to its tagged-object counterpart
    pub fn smi_to_object(self) -> ElementsKind {
        match self {
            ElementsKind::PackedSmi => ElementsKind::Packed,
            ElementsKind::HoleySmi => ElementsKind::Holey,
            other => other,
        }
    }

    pub fn to_holey(self) -> ElementsKind {
        match self {
            ElementsKind::PackedSmi => ElementsKind::HoleySmi,
            ElementsKind::PackedDouble => ElementsKind::HoleyDouble,
            ElementsKind::Packed => ElementsKind::Holey,
            holey => holey,
        }
    }

    fn representation(&self) -> u8 {
        match self {
            ElementsKind::PackedSmi | ElementsKind::HoleySmi => 0,
            ElementsKind::PackedDouble | ElementsKind::HoleyDouble => 1,
            ElementsKind::Packed | ElementsKind::Holey => 2,
        }
    }

    /// Merge with `other` keeping the element representation; only holeyness
    /// may widen. Returns false if the representations differ.
    pub fn union_upto_packedness(&mut self, other: ElementsKind) -> bool {
        if self.representation() != other.representation() {
            return false;
        }
        if other.is_holey() {
            *self = self.to_holey();
        }
        true
    }

    /// Merge with `other` keeping the backing-store slot size: smi and tagged
    /// merge (to tagged), double only merges with double.
    pub fn union_upto_size(&mut self, other: ElementsKind) -> bool {
        if self.is_double() != other.is_double() {
            return false;
        }
        if self.is_smi() && !other.is_smi() {
            *self = self.smi_to_object();
        }
        if other.is_holey() {
            *self = self.to_holey();
        }
        true
    }
}

/// Coarse object classification carried by a shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceType {
    Array,
    Object,
    Function,
    BoundFunction,
    Promise,
    Map,
    Set,
    TypedArray,
    DataView,
    Date,
    Proxy,
    Other,
}

/// Prototype identity, as far as the compiler tracks it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrototypeRef {
    InitialArrayPrototype,
    InitialObjectPrototype,
    InitialPromisePrototype,
    InitialFunctionPrototype,
    Other(u32),
    None,
}

/// Hidden class: property layout + element representation descriptor
#[derive(Debug, Clone)]
pub struct Shape {
    pub instance_type: InstanceType,
    pub elements_kind: ElementsKind,
    pub prototype: PrototypeRef,
    /// No shape transition has been observed since recording
    pub stable: bool,
    pub extensible: bool,
    /// Properties moved to dictionary (slow) mode
    pub dictionary_mode: bool,
    /// The "length" property was redefined read-only
    pub readonly_length: bool,
    /// Usable as a construct target
    pub constructor: bool,
    /// Function length/name are still the original accessors (bind fast path)
    pub intact_function_descriptors: bool,
}

impl Shape {
    /// A stable fast array shape on the initial Array prototype
    pub fn fast_array(elements_kind: ElementsKind) -> Self {
        Shape {
            instance_type: InstanceType::Array,
            elements_kind,
            prototype: PrototypeRef::InitialArrayPrototype,
            stable: true,
            extensible: true,
            dictionary_mode: false,
            readonly_length: false,
            constructor: false,
            intact_function_descriptors: false,
        }
    }

    pub fn plain_object() -> Self {
        Shape {
            instance_type: InstanceType::Object,
            elements_kind: ElementsKind::Holey,
            prototype: PrototypeRef::InitialObjectPrototype,
            stable: true,
            extensible: true,
            dictionary_mode: false,
            readonly_length: false,
            constructor: false,
            intact_function_descriptors: false,
        }
    }

    pub fn function() -> Self {
        Shape {
            instance_type: InstanceType::Function,
            elements_kind: ElementsKind::Holey,
            prototype: PrototypeRef::InitialFunctionPrototype,
            stable: true,
            extensible: true,
            dictionary_mode: false,
            readonly_length: false,
            constructor: true,
            intact_function_descriptors: true,
        }
    }

    pub fn of_instance_type(instance_type: InstanceType, prototype: PrototypeRef) -> Self {
        Shape {
            instance_type,
            elements_kind: ElementsKind::Holey,
            prototype,
            stable: true,
            extensible: true,
            dictionary_mode: false,
            readonly_length: false,
            constructor: false,
            intact_function_descriptors: false,
        }
    }
}

/// Shape table for one isolate; the reducer only reads it
#[derive(Debug, Default)]
pub struct ShapeTable {
    shapes: Vec<Shape>,
}

impl ShapeTable {
    pub fn new() -> Self {
        ShapeTable { shapes: Vec::new() }
    }

    pub fn add(&mut self, shape: Shape) -> ShapeId {
        let id = ShapeId(self.shapes.len() as u32);
        self.shapes.push(shape);
        id
    }

    pub fn get(&self, id: ShapeId) -> &Shape {
        &self.shapes[id.0 as usize]
    }

    /// Mark a shape unstable (a transition happened); used by tests and the
    /// runtime's shape-transition hook
    pub fn mark_unstable(&mut self, id: ShapeId) {
        self.shapes[id.0 as usize].stable = false;
    }
}

/// Whether a call site may be optimized on partial/unreliable feedback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeculationMode {
    Allow,
    Disallow,
}

/// How the generic call lowering converts the receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvertReceiverMode {
    Any,
    NullOrUndefined,
    NotNullOrUndefined,
}

/// Reference to a feedback vector slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FeedbackSource(pub u32);

/// Observed receiver-shape set with its provenance.
///
/// Modeled as a sum so reliable and unreliable sets cannot be conflated:
/// reliable sets may become end-of-compilation dependencies, unreliable sets
/// require a runtime shape check at the point of use.
#[derive(Debug, Clone, PartialEq)]
pub enum ShapeFeedback {
    NoInfo,
    Reliable(Vec<ShapeId>),
    Unreliable(Vec<ShapeId>),
}

impl ShapeFeedback {
    pub fn shapes(&self) -> &[ShapeId] {
        match self {
            ShapeFeedback::NoInfo => &[],
            ShapeFeedback::Reliable(shapes) | ShapeFeedback::Unreliable(shapes) => shapes,
        }
    }

    pub fn is_reliable(&self) -> bool {
        matches!(self, ShapeFeedback::Reliable(_))
    }
}

/// Callee identity recorded for the call site
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalleeFeedback {
    None,
    /// Exactly one callable observed
    Monomorphic(crate::jit::builtins::FunctionId),
    Megamorphic,
}

/// Everything the unoptimized tier recorded about one call site
#[derive(Debug, Clone)]
pub struct CallSiteFeedback {
    pub callee: CalleeFeedback,
    pub shapes: ShapeFeedback,
}

impl CallSiteFeedback {
    pub fn uninitialized() -> Self {
        CallSiteFeedback {
            callee: CalleeFeedback::None,
            shapes: ShapeFeedback::NoInfo,
        }
    }
}

/// Per-unit feedback vector, indexed by FeedbackSource
#[derive(Debug, Default)]
pub struct FeedbackVector {
    slots: Vec<CallSiteFeedback>,
}

impl FeedbackVector {
    pub fn new() -> Self {
        FeedbackVector { slots: Vec::new() }
    }

    pub fn add(&mut self, feedback: CallSiteFeedback) -> FeedbackSource {
        let source = FeedbackSource(self.slots.len() as u32);
        self.slots.push(feedback);
        source
    }

    pub fn get(&self, source: FeedbackSource) -> Option<&CallSiteFeedback> {
        self.slots.get(source.0 as usize)
    }
}
