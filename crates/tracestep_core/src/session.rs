use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracestep_common::{CpuContext, InsnGroups, Instruction, ThreadId};

use crate::classify::BlockRecords;
use crate::warmup::WarmupFilter;

/// How a session decides to stop.
#[derive(Clone, Debug, Default)]
pub enum StepMode {
    /// Stop at every instrumented instruction.
    #[default]
    Instruction,
    /// Run until right before the next call.
    Call,
    /// Run until right before the next jump.
    Block,
    /// Never stop on its own; hand every instruction to the callback.
    Custom(StepCallback),
}

impl StepMode {
    pub fn custom<F>(callback: F) -> Self
    where
        F: Fn(&StepFrame<'_>) + Send + Sync + 'static,
    {
        StepMode::Custom(StepCallback::new(callback))
    }

    /// Control-flow group a boundary mode waits for.
    pub(crate) fn boundary(&self) -> Option<InsnGroups> {
        match self {
            StepMode::Call => Some(InsnGroups::CALL),
            StepMode::Block => Some(InsnGroups::JUMP),
            StepMode::Instruction | StepMode::Custom(_) => None,
        }
    }
}

/// Per-instruction callback for [`StepMode::Custom`].
#[derive(Clone)]
pub struct StepCallback(Arc<dyn Fn(&StepFrame<'_>) + Send + Sync>);

impl StepCallback {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&StepFrame<'_>) + Send + Sync + 'static,
    {
        Self(Arc::new(callback))
    }

    pub(crate) fn invoke(&self, frame: &StepFrame<'_>) {
        (self.0)(frame)
    }
}

impl fmt::Debug for StepCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StepCallback(..)")
    }
}

/// What a custom callback gets to see: the live context, the instruction at
/// its program counter, and a way to end the session.
pub struct StepFrame<'a> {
    pub context: &'a CpuContext,
    pub instruction: &'a Instruction,
    terminated: &'a AtomicBool,
}

impl<'a> StepFrame<'a> {
    pub(crate) fn new(
        context: &'a CpuContext,
        instruction: &'a Instruction,
        terminated: &'a AtomicBool,
    ) -> Self {
        Self {
            context,
            instruction,
            terminated,
        }
    }

    /// Request termination. No callout of this session runs after this one
    /// and the engine drops the thread at its next transform pass.
    pub fn stop(&self) {
        self.terminated.store(true, Ordering::Release);
    }
}

/// Where the previous reported stop happened.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct LastStop {
    pub address: u64,
    pub size: u32,
}

impl LastStop {
    /// `pc` is still where sequential execution from this stop could be.
    #[inline]
    pub fn covers(&self, pc: u64) -> bool {
        pc >= self.address && pc <= self.address.wrapping_add(self.size as u64)
    }
}

/// Mutable bookkeeping of a session. Touched by the transformer once per
/// block and by callouts once per instruction, both on the debugged thread.
#[derive(Debug)]
pub(crate) struct SessionState {
    pub block: BlockRecords,
    pub warmup: WarmupFilter,
    /// Corrected program counter, valid while execution follows the
    /// relocated copy sequentially.
    pub initial_context_address: u64,
    pub last_stop: Option<LastStop>,
    pub left_sequential_flow: bool,
    pub live_context: Option<CpuContext>,
}

impl SessionState {
    /// Program counter to report for a callout observed at `live_pc`.
    pub fn resolve_pc(&mut self, live_pc: u64) -> u64 {
        if self.left_sequential_flow {
            return live_pc;
        }

        match self.last_stop {
            Some(last) if !last.covers(live_pc) => {
                self.left_sequential_flow = true;
                live_pc
            }
            _ => self.initial_context_address,
        }
    }

    /// `live_pc` sits on the last block instruction of a block that ends in
    /// a transfer carrying `kind`.
    pub fn at_boundary(&self, live_pc: u64, kind: InsnGroups) -> bool {
        if self.last_stop.is_none() {
            return false;
        }
        let Some(transfer) = self.block.last_transfer else {
            return false;
        };
        let before_transfer = self
            .block
            .last_block
            .is_some_and(|insn| insn.address == live_pc);

        before_transfer && transfer.groups.intersects(kind)
    }

    pub fn record_stop(&mut self, context: &CpuContext, size: u32) {
        self.live_context = Some(context.clone());
        self.last_stop = Some(LastStop {
            address: context.pc,
            size,
        });
    }

    pub fn advance(&mut self, size: u32) {
        if !self.left_sequential_flow {
            self.initial_context_address = self.initial_context_address.wrapping_add(size as u64);
        }
    }
}

/// Stepping state of one thread.
#[derive(Debug)]
pub struct Session {
    tid: ThreadId,
    entry_address: u64,
    mode: Mutex<StepMode>,
    terminated: AtomicBool,
    pub(crate) state: Mutex<SessionState>,
}

impl Session {
    pub(crate) fn new(tid: ThreadId, entry_address: u64, warmup: WarmupFilter) -> Self {
        Self {
            tid,
            entry_address,
            mode: Mutex::new(StepMode::default()),
            terminated: AtomicBool::new(false),
            state: Mutex::new(SessionState {
                block: BlockRecords::default(),
                warmup,
                initial_context_address: entry_address,
                last_stop: None,
                left_sequential_flow: false,
                live_context: None,
            }),
        }
    }

    pub fn tid(&self) -> ThreadId {
        self.tid
    }

    /// Program counter of the thread when stepping was requested.
    pub fn entry_address(&self) -> u64 {
        self.entry_address
    }

    pub fn mode(&self) -> StepMode {
        self.mode.lock().clone()
    }

    pub fn set_mode(&self, mode: StepMode) {
        log::debug!("[{}] step mode -> {:?}", self.tid, mode);
        *self.mode.lock() = mode;
    }

    /// Ask for the session to end. Takes effect for callouts immediately and
    /// for the engine at the next transform pass.
    pub fn stop(&self) {
        self.terminated.store(true, Ordering::Release);
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    pub(crate) fn terminated_flag(&self) -> &AtomicBool {
        &self.terminated
    }

    /// Register context of the last reported stop.
    pub fn live_context(&self) -> Option<CpuContext> {
        self.state.lock().live_context.clone()
    }

    /// Corrected program counter the next sequential callout would report.
    pub fn reported_address(&self) -> u64 {
        self.state.lock().initial_context_address
    }

    pub fn has_left_sequential_flow(&self) -> bool {
        self.state.lock().left_sequential_flow
    }

    pub fn is_armed(&self) -> bool {
        self.state.lock().warmup.is_armed()
    }
}
