//! Deopt continuation descriptors
//!
//! When a reducer inlines a builtin loop, a guard failure (eager) or a
//! returning callback (lazy) must resume inside the generic implementation of
//! that builtin, not at the original call. Each continuation names the
//! resumption builtin and fixes the exact parameter list the generic loop
//! needs to rebuild its state. The FrameState node built from a continuation
//! carries those parameters as value inputs so they stay live.

/// Handle into the continuation table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContinuationId(pub u32);

impl std::fmt::Display for ContinuationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// Whether the snapshot is valid before or after the pending operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinuationMode {
    /// Valid immediately before a possibly-deopting operation
    Eager,
    /// Valid only once the pending call has returned
    Lazy,
}

/// Resumption entry points in the generic builtin implementations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumePoint {
    ForEachLoopEager,
    ForEachLoopLazy,
    MapLoopEager,
    MapLoopLazy,
    FilterLoopEager,
    FilterLoopLazy,
    ReducePreLoopEager,
    ReduceLoopEager,
    ReduceLoopLazy,
    ReduceRightPreLoopEager,
    ReduceRightLoopEager,
    ReduceRightLoopLazy,
    EveryLoopEager,
    EveryLoopLazy,
    SomeLoopEager,
    SomeLoopLazy,
    FindLoopEager,
    FindLoopLazy,
    /// Resumes with the loaded element already on the operand stack
    FindLoopAfterCallbackLazy,
    FindIndexLoopEager,
    FindIndexLoopLazy,
    FindIndexLoopAfterCallbackLazy,
}

/// One resumption descriptor: entry point, mode, and recorded arity.
///
/// The parameter nodes themselves live on the FrameState node; the table
/// records the shape so the deoptimizer can re-marshal them.
#[derive(Debug, Clone)]
pub struct Continuation {
    pub resume: ResumePoint,
    pub mode: ContinuationMode,
    pub parameter_count: usize,
}

/// Per-compilation-unit continuation table
#[derive(Debug, Default)]
pub struct ContinuationTable {
    entries: Vec<Continuation>,
}

impl ContinuationTable {
    pub fn new() -> Self {
        ContinuationTable { entries: Vec::new() }
    }

    pub fn create(
        &mut self,
        resume: ResumePoint,
        mode: ContinuationMode,
        parameter_count: usize,
    ) -> ContinuationId {
        let id = ContinuationId(self.entries.len() as u32);
        self.entries.push(Continuation {
            resume,
            mode,
            parameter_count,
        });
        id
    }

    pub fn get(&self, id: ContinuationId) -> &Continuation {
        &self.entries[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_continuation_table() {
        let mut table = ContinuationTable::new();
        let eager = table.create(ResumePoint::ForEachLoopEager, ContinuationMode::Eager, 5);
        let lazy = table.create(ResumePoint::ForEachLoopLazy, ContinuationMode::Lazy, 5);
        assert_ne!(eager, lazy);
        assert_eq!(table.get(eager).mode, ContinuationMode::Eager);
        assert_eq!(table.get(lazy).resume, ResumePoint::ForEachLoopLazy);
        assert_eq!(table.len(), 2);
    }
}
