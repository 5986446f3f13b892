//! Mid-tier JIT compilation infrastructure for the Onyx VM
//!
//! This module contains the speculative optimization tier that sits between
//! bytecode graph construction and code generation. It includes:
//! - Effect/control-edged IR graph with arena-indexed nodes
//! - Call-site feedback model (shapes, reliability, speculation mode)
//! - Well-known builtin table
//! - The call/construct strength-reduction pass
//! - Deopt continuation descriptors
//! - Dependency registry and process-wide protector cells

pub mod builtins;
pub mod continuation;
pub mod deps;
pub mod feedback;
pub mod ir;
pub mod reduce;
