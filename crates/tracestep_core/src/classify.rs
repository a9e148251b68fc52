use tracestep_common::{InsnGroups, Instruction};

/// What the classifier made of an instruction.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InsnClass {
    /// Sequential, does not transfer control.
    Block,
    /// Call or jump.
    Transfer,
}

#[inline]
pub fn classify(insn: &Instruction) -> InsnClass {
    if insn.is_transfer() {
        InsnClass::Transfer
    } else {
        InsnClass::Block
    }
}

/// Address and control-flow groups of a classified instruction.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct InsnRecord {
    pub address: u64,
    pub groups: InsnGroups,
}

impl From<&Instruction> for InsnRecord {
    fn from(insn: &Instruction) -> Self {
        Self {
            address: insn.address,
            groups: insn.groups,
        }
    }
}

/// Most recent instruction of each class inside the block being
/// instrumented. Reset whenever a new block is transformed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockRecords {
    pub last_block: Option<InsnRecord>,
    pub last_transfer: Option<InsnRecord>,
}

impl BlockRecords {
    pub fn observe(&mut self, insn: &Instruction) -> InsnClass {
        let class = classify(insn);
        match class {
            InsnClass::Block => self.last_block = Some(insn.into()),
            InsnClass::Transfer => self.last_transfer = Some(insn.into()),
        }
        class
    }

    pub fn reset(&mut self) {
        self.last_block = None;
        self.last_transfer = None;
    }
}
