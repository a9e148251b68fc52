use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use tracestep_common::{Arch, CpuContext, Instruction, ThreadId};
use tracestep_core::{Engine, Transformer};

use super::iterator::SimIterator;
use super::trace::{ThreadTrace, TraceBlock};

/// Counters describing what the engine was asked to do.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub follows: usize,
    pub unfollows: usize,
    pub flushes: usize,
    pub collections: usize,
    pub blocks_transformed: usize,
    pub blocks_executed: usize,
    pub callouts_run: usize,
}

/// Replays thread traces through followed threads' transformers.
pub struct SimEngine {
    arch: Arch,
    code: Mutex<HashMap<u64, Instruction>>,
    followed: Mutex<HashMap<ThreadId, Box<dyn Transformer>>>,
    detached: Mutex<HashSet<ThreadId>>,
    stats: Mutex<EngineStats>,
    /// Template for the registers handed to callouts.
    registers: CpuContext,
}

impl SimEngine {
    pub fn new(arch: Arch) -> Self {
        Self {
            arch,
            code: Mutex::new(HashMap::new()),
            followed: Mutex::new(HashMap::new()),
            detached: Mutex::new(HashSet::new()),
            stats: Mutex::new(EngineStats::default()),
            registers: CpuContext {
                pc: 0,
                sp: 0x7ffd_0000,
                regs: vec![0; 16],
            },
        }
    }

    pub fn stats(&self) -> EngineStats {
        *self.stats.lock()
    }

    pub fn is_following(&self, tid: ThreadId) -> bool {
        self.followed.lock().contains_key(&tid)
    }

    /// Run `trace` on `tid`. Returns the number of blocks executed; replay
    /// ends early when the thread is unfollowed.
    pub fn run(&self, tid: ThreadId, trace: &ThreadTrace) -> usize {
        let mut executed = 0;
        for block in &trace.blocks {
            if !self.run_block(tid, block) {
                log::debug!("[{}] sim: thread no longer followed, replay stops", tid);
                break;
            }
            executed += 1;
        }
        executed
    }

    /// Transform and execute a single block.
    pub fn run_block(&self, tid: ThreadId, block: &TraceBlock) -> bool {
        self.code
            .lock()
            .extend(block.runtime_instructions().map(|insn| (insn.address, insn)));

        // The transformer is taken out for the duration of the pass so that
        // it can call back into `unfollow`.
        let Some(mut transformer) = self.followed.lock().remove(&tid) else {
            return false;
        };

        let mut iterator = SimIterator::new(&block.instructions);
        transformer.transform(&mut iterator);
        self.stats.lock().blocks_transformed += 1;

        if self.detached.lock().contains(&tid) {
            return false;
        }
        self.followed.lock().insert(tid, transformer);

        for (index, callout) in iterator.into_callouts() {
            let insn = &block.instructions[index];
            // Control already left the block.
            if insn.ends_block() {
                continue;
            }
            let context = self.registers.at(block.runtime_address(insn));
            callout(&context);
            self.stats.lock().callouts_run += 1;
        }
        self.stats.lock().blocks_executed += 1;
        true
    }
}

impl Engine for SimEngine {
    fn arch(&self) -> Arch {
        self.arch
    }

    fn follow(&self, tid: ThreadId, transformer: Box<dyn Transformer>) {
        log::debug!("[{}] sim: follow", tid);
        self.detached.lock().remove(&tid);
        self.followed.lock().insert(tid, transformer);
        self.stats.lock().follows += 1;
    }

    fn unfollow(&self, tid: ThreadId) {
        log::debug!("[{}] sim: unfollow", tid);
        self.detached.lock().insert(tid);
        self.followed.lock().remove(&tid);
        self.stats.lock().unfollows += 1;
    }

    fn flush(&self) {
        self.stats.lock().flushes += 1;
    }

    fn garbage_collect(&self) {
        self.stats.lock().collections += 1;
    }

    fn parse_instruction(&self, address: u64) -> Option<Instruction> {
        self.code.lock().get(&address).cloned()
    }
}
