use tracestep_common::Instruction;
use tracestep_core::{BlockIterator, Callout};

/// Iterator over one block that records the callouts placed after each kept
/// instruction.
pub struct SimIterator<'a> {
    block: &'a [Instruction],
    cursor: usize,
    kept: Vec<usize>,
    callouts: Vec<(usize, Callout)>,
}

impl<'a> SimIterator<'a> {
    pub fn new(block: &'a [Instruction]) -> Self {
        Self {
            block,
            cursor: 0,
            kept: Vec::with_capacity(block.len()),
            callouts: Vec::new(),
        }
    }

    /// Callouts keyed by the index of the instruction they follow.
    pub fn into_callouts(self) -> Vec<(usize, Callout)> {
        self.callouts
    }
}

impl BlockIterator for SimIterator<'_> {
    fn next_instruction(&mut self) -> Option<Instruction> {
        let insn = self.block.get(self.cursor)?.clone();
        self.cursor += 1;
        Some(insn)
    }

    fn keep(&mut self) {
        if let Some(current) = self.cursor.checked_sub(1) {
            self.kept.push(current);
        }
    }

    fn put_callout(&mut self, callout: Callout) {
        // Before anything was kept there is no position to attach to.
        match self.kept.last() {
            Some(&after) => self.callouts.push((after, callout)),
            None => log::warn!("sim: callout placed before the first instruction, dropped"),
        }
    }
}
