use std::sync::Arc;

use tracestep_common::{Arch, CpuContext, Instruction, ThreadId};

/// Code run with the live register context at a chosen point of the
/// instrumented stream.
pub type Callout = Arc<dyn Fn(&CpuContext) + Send + Sync>;

/// Abstraction over the dynamic binary-instrumentation engine.
///
/// The coordinator never generates or runs code itself; it follows threads
/// through this trait and reacts to the blocks the engine asks it to
/// transform.
pub trait Engine: Send + Sync {
    /// Architecture of the instrumented process.
    fn arch(&self) -> Arch;

    /// Start instrumenting `tid`. The transformer is invoked once per code
    /// block, right before the engine compiles and runs it.
    ///
    /// Implementations must not call back into the transformer from inside
    /// `follow` while holding locks that `unfollow` or `parse_instruction`
    /// also need.
    fn follow(&self, tid: ThreadId, transformer: Box<dyn Transformer>);

    /// Stop instrumenting `tid`. May be called from inside a transform pass.
    fn unfollow(&self, tid: ThreadId);

    /// Push pending instrumentation events out of the engine's buffers.
    fn flush(&self);

    /// Release instrumented code no longer reachable by any followed thread.
    fn garbage_collect(&self);

    /// Decode the instruction at `address`, which may lie inside the engine's
    /// relocated copy of the target code.
    fn parse_instruction(&self, address: u64) -> Option<Instruction>;
}

/// Per-thread rewriting routine handed to [`Engine::follow`].
pub trait Transformer: Send {
    fn transform(&mut self, iterator: &mut dyn BlockIterator);
}

/// Walks the instructions of the block being instrumented.
pub trait BlockIterator {
    /// Next original instruction of the block, `None` once exhausted.
    fn next_instruction(&mut self) -> Option<Instruction>;

    /// Emit the current instruction unchanged.
    fn keep(&mut self);

    /// Emit a callout at the current position of the output stream.
    fn put_callout(&mut self, callout: Callout);
}

/// Why the debugged thread stopped.
#[non_exhaustive]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StopReason {
    Step,
}

/// A step notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepEvent {
    pub tid: ThreadId,
    pub reason: StopReason,
    /// Program counter to show the user (corrected for relocation).
    pub pc: u64,
    pub context: CpuContext,
}

/// Breakpoint/notification subsystem.
///
/// `notify_step` runs on the debugged thread. A real subsystem parks the
/// thread inside this call until a controller resumes it.
pub trait StepSink: Send + Sync {
    fn notify_step(&self, event: StepEvent);
}

/// Storage for per-thread native contexts captured by the debugger.
pub trait ThreadContexts: Send + Sync {
    /// Live register context of `tid`, if the thread is currently stopped in
    /// a native context.
    fn context(&self, tid: ThreadId) -> Option<CpuContext>;

    /// Keep the thread from being released back to sleep/idle.
    fn prevent_sleep(&self, tid: ThreadId);
}
