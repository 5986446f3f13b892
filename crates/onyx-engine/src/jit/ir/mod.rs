//! Mid-tier IR — effect/control-edged node graph, arena-indexed

pub mod builder;
pub mod display;
pub mod graph;
pub mod op;

pub use builder::{GraphAssembler, LoopState};
pub use graph::{Graph, Node, NodeId};
pub use op::{Constant, Opcode};
