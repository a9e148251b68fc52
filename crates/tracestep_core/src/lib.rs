//! Instruction-level stepping for threads followed by a dynamic
//! binary-instrumentation engine.
//!
//! A controller asks [`StepCoordinator::stalk`] to put a thread under
//! stepping control. The coordinator hands the engine a transformer that
//! classifies every instrumented instruction, waits out the engine's own
//! entry bookkeeping and then injects callouts. Each callout decides, based
//! on the session's [`StepMode`], whether to report a step to the
//! [`StepSink`].

mod callout;
pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
mod manager;
pub mod session;
mod transform;
pub mod warmup;

pub use classify::{InsnClass, InsnRecord};
pub use config::StepperConfig;
pub use engine::{
    BlockIterator, Callout, Engine, StepEvent, StepSink, StopReason, ThreadContexts, Transformer,
};
pub use error::StepError;
pub use manager::{SessionRegistry, StepCoordinator};
pub use session::{Session, StepCallback, StepFrame, StepMode};
pub use warmup::{Gate, WarmupFilter};
