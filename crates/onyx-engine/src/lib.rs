//! Onyx Engine — mid-tier optimizer
//!
//! This crate provides the speculative strength-reduction tier of the Onyx
//! JavaScript engine:
//! - **IR**: effect/control-edged node graph, mutated in place (`jit::ir`)
//! - **Feedback**: call-site type feedback and shape witnesses (`jit::feedback`)
//! - **Reducer**: call/construct strength reduction (`jit::reduce`)
//! - **Dependencies**: invalidatable compile-time assumptions (`jit::deps`)
//!
//! # Example
//!
//! ```rust,ignore
//! use onyx_engine::jit::reduce::{CallReducer, ReducerFlags};
//!
//! let mut reducer = CallReducer::new(&mut graph, &unit, ReducerFlags::default());
//! reducer.reduce_graph()?;
//! reducer.finalize()?;
//! let deps = reducer.into_dependencies();
//! ```

#![warn(rust_2018_idioms)]

pub mod jit;
