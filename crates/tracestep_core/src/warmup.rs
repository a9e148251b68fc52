use tracestep_common::{Arch, Instruction};

use crate::config::StepperConfig;

/// What the transformer should do with the instruction it just kept.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Gate {
    /// Still inside engine bookkeeping (or settling the entry block): emit
    /// the instruction only.
    Hold,
    /// First real instruction of the target. No callout; it seeds the
    /// corrected program counter.
    Entry,
    /// Warm-up is over: attach a step callout.
    Callout,
}

/// Decides when step callouts start for a freshly followed thread.
///
/// The engine starts a followed thread inside its own dispatch code, which
/// executes a run of returns before the target's first real instruction.
/// The filter counts those returns over the whole instrumented stream and,
/// on arm64, additionally waits out a fixed number of whole blocks. The
/// first instruction after that is the entry instruction; the rest of its
/// block is left alone and a single callout closes the block. Every later
/// instruction gets a callout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WarmupFilter {
    ret_threshold: u32,
    extra_blocks: u32,
    ret_count: u32,
    blocks_past_threshold: u32,
    entry_handled: bool,
    armed: bool,
}

impl WarmupFilter {
    pub fn new(config: &StepperConfig, arch: Arch) -> Self {
        Self {
            ret_threshold: config.ret_threshold,
            extra_blocks: config.extra_blocks_for(arch),
            ret_count: 0,
            blocks_past_threshold: 0,
            entry_handled: false,
            armed: false,
        }
    }

    /// Feed one kept instruction.
    pub fn observe(&mut self, insn: &Instruction) -> Gate {
        if self.armed {
            return Gate::Callout;
        }

        if self.threshold_crossed() {
            if self.blocks_past_threshold < self.extra_blocks {
                return Gate::Hold;
            }
            if !self.entry_handled {
                self.entry_handled = true;
                return Gate::Entry;
            }
            return Gate::Hold;
        }

        if insn.is_return() {
            self.ret_count += 1;
        }
        Gate::Hold
    }

    /// Close the current block. Returns `true` when a single callout must be
    /// placed at the end of the block, which happens exactly once: at the
    /// end of the block holding the entry instruction.
    pub fn finish_block(&mut self) -> bool {
        let mut close_with_callout = false;
        if self.entry_handled && !self.armed {
            self.armed = true;
            close_with_callout = true;
        }

        if self.threshold_crossed() && self.blocks_past_threshold < self.extra_blocks {
            self.blocks_past_threshold += 1;
        }

        close_with_callout
    }

    #[inline]
    pub fn threshold_crossed(&self) -> bool {
        self.ret_count > self.ret_threshold
    }

    #[inline]
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    #[inline]
    pub fn entry_handled(&self) -> bool {
        self.entry_handled
    }

    #[inline]
    pub fn ret_count(&self) -> u32 {
        self.ret_count
    }
}
