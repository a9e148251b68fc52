use std::fmt;

use bitflags::bitflags;

bitflags! {
    /// Control-flow groups attached to a decoded instruction.
    ///
    /// Mirrors the group tags instrumentation engines expose from their
    /// disassembler (`"jump"`, `"call"`, `"ret"`, ...).
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct InsnGroups: u8 {
        const JUMP = 1 << 0;
        const CALL = 1 << 1;
        const RET = 1 << 2;
        const INT = 1 << 3;
        const IRET = 1 << 4;
        const PRIVILEGE = 1 << 5;
        const BRANCH_RELATIVE = 1 << 6;
    }
}

impl InsnGroups {
    /// Build a group set from disassembler tag names. Unknown tags are ignored.
    pub fn from_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        names
            .into_iter()
            .fold(InsnGroups::empty(), |groups, name| match name {
                "jump" => groups | InsnGroups::JUMP,
                "call" => groups | InsnGroups::CALL,
                "ret" => groups | InsnGroups::RET,
                "int" => groups | InsnGroups::INT,
                "iret" => groups | InsnGroups::IRET,
                "privilege" => groups | InsnGroups::PRIVILEGE,
                "branch_relative" => groups | InsnGroups::BRANCH_RELATIVE,
                _ => groups,
            })
    }

    /// Call or jump.
    #[inline]
    pub fn is_transfer(&self) -> bool {
        self.intersects(InsnGroups::JUMP | InsnGroups::CALL)
    }
}

/// A single instruction as handed out by the instrumentation engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instruction {
    pub address: u64,
    pub size: u32,
    pub mnemonic: String,
    pub op_str: String,
    pub groups: InsnGroups,
}

impl Instruction {
    pub fn new(address: u64, size: u32, mnemonic: &str, groups: InsnGroups) -> Self {
        Self {
            address,
            size,
            mnemonic: mnemonic.to_string(),
            op_str: String::new(),
            groups,
        }
    }

    pub fn with_operands(mut self, op_str: &str) -> Self {
        self.op_str = op_str.to_string();
        self
    }

    #[inline]
    pub fn is_transfer(&self) -> bool {
        self.groups.is_transfer()
    }

    /// Anything that leaves the block: call, jump or return.
    #[inline]
    pub fn ends_block(&self) -> bool {
        self.is_transfer() || self.is_return()
    }

    #[inline]
    pub fn is_return(&self) -> bool {
        self.groups.contains(InsnGroups::RET) || self.mnemonic.eq_ignore_ascii_case("ret")
    }

    /// Address of the byte following this instruction.
    #[inline]
    pub fn next_address(&self) -> u64 {
        self.address.wrapping_add(self.size as u64)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.op_str.is_empty() {
            write!(f, "{:#x} {}", self.address, self.mnemonic)
        } else {
            write!(f, "{:#x} {} {}", self.address, self.mnemonic, self.op_str)
        }
    }
}
