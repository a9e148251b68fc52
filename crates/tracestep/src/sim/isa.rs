use std::collections::HashMap;

use lazy_static::lazy_static;
use tracestep_common::{Arch, InsnGroups, Instruction};

lazy_static! {
    static ref MNEMONIC_GROUPS: HashMap<&'static str, InsnGroups> = {
        let mut table = HashMap::new();
        // x64
        table.insert("call", InsnGroups::CALL);
        table.insert("jmp", InsnGroups::JUMP);
        table.insert("je", InsnGroups::JUMP | InsnGroups::BRANCH_RELATIVE);
        table.insert("jne", InsnGroups::JUMP | InsnGroups::BRANCH_RELATIVE);
        table.insert("ret", InsnGroups::RET);
        table.insert("int3", InsnGroups::INT);
        table.insert("syscall", InsnGroups::INT);
        // arm64
        table.insert("bl", InsnGroups::CALL | InsnGroups::BRANCH_RELATIVE);
        table.insert("blr", InsnGroups::CALL);
        table.insert("b", InsnGroups::JUMP | InsnGroups::BRANCH_RELATIVE);
        table.insert("b.ne", InsnGroups::JUMP | InsnGroups::BRANCH_RELATIVE);
        table.insert("cbz", InsnGroups::JUMP | InsnGroups::BRANCH_RELATIVE);
        table.insert("br", InsnGroups::JUMP);
        table.insert("svc", InsnGroups::INT);
        table
    };
}

pub fn groups_for(mnemonic: &str) -> InsnGroups {
    MNEMONIC_GROUPS
        .get(mnemonic)
        .copied()
        .unwrap_or_default()
}

/// Build an instruction whose groups follow from its mnemonic.
pub fn synth(address: u64, size: u32, mnemonic: &str) -> Instruction {
    Instruction::new(address, size, mnemonic, groups_for(mnemonic))
}

/// Mnemonics that never leave a block.
pub fn fillers(arch: Arch) -> &'static [&'static str] {
    match arch {
        Arch::Arm64 | Arch::Arm => &["mov", "add", "sub", "ldr", "str", "cmp", "orr"],
        _ => &["mov", "add", "sub", "lea", "push", "pop", "cmp", "xor"],
    }
}

/// Call, jump and return mnemonics, in that order.
pub fn terminators(arch: Arch) -> (&'static str, &'static [&'static str], &'static str) {
    match arch {
        Arch::Arm64 | Arch::Arm => ("bl", &["b", "b.ne", "cbz"], "ret"),
        _ => ("call", &["jmp", "je", "jne"], "ret"),
    }
}

/// Fixed-width ISAs always use 4 bytes; x86 variants range from 1 to 7.
pub fn fixed_width(arch: Arch) -> Option<u32> {
    match arch {
        Arch::Arm64 | Arch::Arm | Arch::Mips => Some(4),
        _ => None,
    }
}
