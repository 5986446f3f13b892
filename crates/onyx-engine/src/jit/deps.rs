//! Dependency registry and protector cells
//!
//! A dependency is a compile-time assumption ("shape S stays stable",
//! "protector cell P is intact") validated once at the end of compilation and
//! embedded into the emitted code's invalidation metadata. A protector cell
//! is a process-wide flag the runtime clears the first time someone patches
//! the builtin behavior it covers; until then every unit may assume default
//! semantics.

use parking_lot::RwLock;
use rustc_hash::FxHashSet;
use thiserror::Error;

use crate::jit::feedback::{ShapeId, ShapeTable};

/// Process-wide assumption flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtectorCell {
    /// No elements added to Array.prototype / Object.prototype
    NoElements,
    /// Array[Symbol.species] unmodified
    ArraySpecies,
    /// Array.prototype[Symbol.iterator] lookup chain unmodified
    ArrayIteratorLookup,
    /// Promise.prototype.then lookup chain unmodified
    PromiseThenLookup,
    /// TypedArray species unmodified
    TypedArraySpecies,
}

/// Process-wide registry of invalidated protector cells.
///
/// Shared by every compilation unit; the runtime invalidates cells, compile
/// threads only read them.
#[derive(Debug, Default)]
pub struct ProtectorRegistry {
    invalidated: RwLock<FxHashSet<ProtectorCell>>,
}

impl ProtectorRegistry {
    pub fn new() -> Self {
        ProtectorRegistry {
            invalidated: RwLock::new(FxHashSet::default()),
        }
    }

    pub fn is_intact(&self, cell: ProtectorCell) -> bool {
        !self.invalidated.read().contains(&cell)
    }

    /// Called by the runtime when the covered builtin behavior is patched
    pub fn invalidate(&self, cell: ProtectorCell) {
        self.invalidated.write().insert(cell);
    }
}

/// A registered, invalidatable compile-time assumption
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dependency {
    ShapeStable(ShapeId),
    ProtectorIntact(ProtectorCell),
}

/// Raised when `commit` finds an assumption already violated
#[derive(Debug, Error)]
pub enum CommitError {
    #[error("shape {0} became unstable during compilation")]
    ShapeUnstable(ShapeId),
    #[error("protector cell {0:?} was invalidated during compilation")]
    ProtectorInvalidated(ProtectorCell),
}

/// Per-unit set of assumptions accumulated during reduction
#[derive(Debug, Default)]
pub struct DependencyRegistry {
    deps: Vec<Dependency>,
    seen: FxHashSet<Dependency>,
}

impl DependencyRegistry {
    pub fn new() -> Self {
        DependencyRegistry {
            deps: Vec::new(),
            seen: FxHashSet::default(),
        }
    }

    /// Record "cell stays intact". Returns false if the cell is already
    /// invalidated, in which case the caller must not speculate on it.
    pub fn assume_protector(&mut self, registry: &ProtectorRegistry, cell: ProtectorCell) -> bool {
        if !registry.is_intact(cell) {
            return false;
        }
        self.record(Dependency::ProtectorIntact(cell));
        true
    }

    /// Record "shape stays stable". Returns false if the shape is already
    /// unstable.
    pub fn assume_shape_stable(&mut self, shapes: &ShapeTable, shape: ShapeId) -> bool {
        if !shapes.get(shape).stable {
            return false;
        }
        self.record(Dependency::ShapeStable(shape));
        true
    }

    fn record(&mut self, dep: Dependency) {
        if self.seen.insert(dep) {
            self.deps.push(dep);
        }
    }

    pub fn contains(&self, dep: Dependency) -> bool {
        self.seen.contains(&dep)
    }

    pub fn dependencies(&self) -> &[Dependency] {
        &self.deps
    }

    pub fn is_empty(&self) -> bool {
        self.deps.is_empty()
    }

    /// Re-validate every recorded assumption at the end of compilation.
    ///
    /// On success the dependency set becomes part of the emitted code's
    /// invalidation metadata; on failure the unit must be discarded and
    /// restarted from scratch.
    pub fn commit(
        &self,
        shapes: &ShapeTable,
        protectors: &ProtectorRegistry,
    ) -> Result<Vec<Dependency>, CommitError> {
        for &dep in &self.deps {
            match dep {
                Dependency::ShapeStable(shape) => {
                    if !shapes.get(shape).stable {
                        return Err(CommitError::ShapeUnstable(shape));
                    }
                }
                Dependency::ProtectorIntact(cell) => {
                    if !protectors.is_intact(cell) {
                        return Err(CommitError::ProtectorInvalidated(cell));
                    }
                }
            }
        }
        Ok(self.deps.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jit::feedback::{ElementsKind, Shape};

    #[test]
    fn test_protector_assumption() {
        let registry = ProtectorRegistry::new();
        let mut deps = DependencyRegistry::new();

        assert!(deps.assume_protector(&registry, ProtectorCell::NoElements));
        assert!(deps.contains(Dependency::ProtectorIntact(ProtectorCell::NoElements)));

        registry.invalidate(ProtectorCell::ArraySpecies);
        assert!(!deps.assume_protector(&registry, ProtectorCell::ArraySpecies));
    }

    #[test]
    fn test_commit_detects_midcompile_invalidation() {
        let registry = ProtectorRegistry::new();
        let shapes = ShapeTable::new();
        let mut deps = DependencyRegistry::new();

        assert!(deps.assume_protector(&registry, ProtectorCell::NoElements));
        assert!(deps.commit(&shapes, &registry).is_ok());

        registry.invalidate(ProtectorCell::NoElements);
        assert!(matches!(
            deps.commit(&shapes, &registry),
            Err(CommitError::ProtectorInvalidated(ProtectorCell::NoElements))
        ));
    }

    #[test]
    fn test_shape_stability_dependency() {
        let registry = ProtectorRegistry::new();
        let mut shapes = ShapeTable::new();
        let shape = shapes.add(Shape::fast_array(ElementsKind::PackedSmi));
        let mut deps = DependencyRegistry::new();

        assert!(deps.assume_shape_stable(&shapes, shape));
        assert!(deps.commit(&shapes, &registry).is_ok());

        shapes.mark_unstable(shape);
        assert!(matches!(
            deps.commit(&shapes, &registry),
            Err(CommitError::ShapeUnstable(_))
        ));
    }

    #[test]
    fn test_dependencies_deduplicate() {
        let registry = ProtectorRegistry::new();
        let mut deps = DependencyRegistry::new();
        deps.assume_protector(&registry, ProtectorCell::NoElements);
        deps.assume_protector(&registry, ProtectorCell::NoElements);
        assert_eq!(deps.dependencies().len(), 1);
    }
}
