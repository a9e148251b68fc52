use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracestep_common::{Arch, Instruction};
use tracestep_core::StepperConfig;
use typed_builder::TypedBuilder;

use super::isa;

/// Where the engine keeps its own dispatch code.
pub const DISPATCH_BASE: u64 = 0x7e00_0000;
/// Where the engine places the relocated copy of the entry block.
pub const RELOCATION_BASE: u64 = 0x7f00_0000;

/// One executed block: original instructions, optionally run from a
/// relocated copy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceBlock {
    pub instructions: Vec<Instruction>,
    pub run_at: Option<u64>,
}

impl TraceBlock {
    pub fn new(instructions: Vec<Instruction>) -> Self {
        Self {
            instructions,
            run_at: None,
        }
    }

    pub fn relocated(instructions: Vec<Instruction>, run_at: u64) -> Self {
        Self {
            instructions,
            run_at: Some(run_at),
        }
    }

    pub fn start(&self) -> u64 {
        self.instructions
            .first()
            .map(|insn| insn.address)
            .unwrap_or_default()
    }

    /// Address `insn` has while the block runs.
    pub fn runtime_address(&self, insn: &Instruction) -> u64 {
        match self.run_at {
            Some(at) => at.wrapping_add(insn.address.wrapping_sub(self.start())),
            None => insn.address,
        }
    }

    /// The block as the engine executes it.
    pub fn runtime_instructions(&self) -> impl Iterator<Item = Instruction> + '_ {
        self.instructions.iter().map(|insn| {
            let mut copy = insn.clone();
            copy.address = self.runtime_address(insn);
            copy
        })
    }

    /// Leaves through its last instruction rather than falling through.
    pub fn ends_with_exit(&self) -> bool {
        self.instructions
            .last()
            .is_some_and(|insn| insn.ends_block())
    }
}

/// Blocks executed by one thread, in execution order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ThreadTrace {
    pub blocks: Vec<TraceBlock>,
}

impl ThreadTrace {
    pub fn push(&mut self, block: TraceBlock) -> &mut Self {
        self.blocks.push(block);
        self
    }

    pub fn extend(&mut self, blocks: impl IntoIterator<Item = TraceBlock>) -> &mut Self {
        self.blocks.extend(blocks);
        self
    }
}

/// Dispatch code the engine runs before the target's first instruction:
/// enough return-terminated blocks to cross `config.ret_threshold`, followed
/// by the extra blocks `arch` needs. The block holding the crossing return
/// already counts as one extra block.
pub fn dispatch_prologue(arch: Arch, config: &StepperConfig) -> Vec<TraceBlock> {
    let width = isa::fixed_width(arch).unwrap_or(4);
    let ret_width = isa::fixed_width(arch).unwrap_or(1);
    let (_, _, ret) = isa::terminators(arch);

    let mut blocks = Vec::new();
    let mut at = DISPATCH_BASE;
    for _ in 0..=config.ret_threshold {
        blocks.push(TraceBlock::new(vec![
            isa::synth(at, width, "mov"),
            isa::synth(at + width as u64, ret_width, ret),
        ]));
        at += 0x40;
    }

    for _ in 0..config.extra_blocks_for(arch).saturating_sub(1) {
        blocks.push(TraceBlock::new(vec![
            isa::synth(at, width, "ldr"),
            isa::synth(at + width as u64, width, "str"),
        ]));
        at += 0x40;
    }
    blocks
}

/// Seeded generator for plausible thread traces.
///
/// The trace starts with the engine prologue, then the entry block (run from
/// a relocated copy) at `entry`, then `blocks` random blocks. Blocks end in a
/// call, a jump, a return or simply fall through into the next one.
#[derive(Clone, Debug, TypedBuilder)]
pub struct RandomTrace {
    arch: Arch,
    seed: u64,
    #[builder(default = 8)]
    blocks: usize,
    #[builder(default = 6)]
    max_block_len: usize,
    #[builder(default = 0x1000_0000)]
    entry: u64,
    #[builder(default)]
    config: StepperConfig,
}

impl RandomTrace {
    pub fn generate(&self) -> ThreadTrace {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut trace = ThreadTrace::default();
        trace.extend(dispatch_prologue(self.arch, &self.config));

        let entry_block = self.random_block(&mut rng, self.entry);
        let mut next = self.successor(&mut rng, &entry_block);
        trace.push(TraceBlock::relocated(
            entry_block.instructions,
            RELOCATION_BASE,
        ));

        for _ in 0..self.blocks {
            let block = self.random_block(&mut rng, next);
            next = self.successor(&mut rng, &block);
            trace.push(block);
        }
        trace
    }

    fn random_block(&self, rng: &mut StdRng, start: u64) -> TraceBlock {
        let fillers = isa::fillers(self.arch);
        let (call, jumps, ret) = isa::terminators(self.arch);
        let len = rng.gen_range(1..=self.max_block_len.max(1));

        let mut at = start;
        let mut instructions = Vec::with_capacity(len + 1);
        for _ in 0..len {
            let size = self.random_size(rng);
            let mnemonic = fillers[rng.gen_range(0..fillers.len())];
            instructions.push(isa::synth(at, size, mnemonic));
            at += size as u64;
        }

        let terminator = match rng.gen_range(0..4) {
            0 => Some(call),
            1 => Some(jumps[rng.gen_range(0..jumps.len())]),
            2 => Some(ret),
            _ => None,
        };
        if let Some(mnemonic) = terminator {
            let size = self.random_size(rng);
            instructions.push(isa::synth(at, size, mnemonic));
        }
        TraceBlock::new(instructions)
    }

    /// Falling through continues right after the block; any exit lands on a
    /// fresh aligned address.
    fn successor(&self, rng: &mut StdRng, block: &TraceBlock) -> u64 {
        if block.ends_with_exit() {
            self.entry + rng.gen_range(1..0x1000u64) * 0x40
        } else {
            block
                .instructions
                .last()
                .map(|insn| insn.next_address())
                .unwrap_or(self.entry)
        }
    }

    fn random_size(&self, rng: &mut StdRng) -> u32 {
        isa::fixed_width(self.arch).unwrap_or_else(|| rng.gen_range(1..=7))
    }
}
