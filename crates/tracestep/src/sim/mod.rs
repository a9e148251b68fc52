//! A trace-driven stand-in for a dynamic binary-instrumentation engine.
//!
//! Instead of running real code, [`SimEngine`] replays a [`ThreadTrace`]:
//! the blocks a thread executes, in execution order. Every block is handed to
//! the thread's transformer first and then "executed" by running the
//! callouts the transformer placed in it.

mod contexts;
mod engine;
pub mod isa;
mod iterator;
mod sink;
pub mod trace;

pub use contexts::MemoryContexts;
pub use engine::{EngineStats, SimEngine};
pub use iterator::SimIterator;
pub use sink::RecordingSink;
pub use trace::{RandomTrace, ThreadTrace, TraceBlock};
