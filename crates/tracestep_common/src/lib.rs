pub mod arch;
pub mod context;
pub mod insn;

pub use arch::Arch;
pub use context::CpuContext;
pub use insn::{InsnGroups, Instruction};

/// Identifier of a debugged thread, as reported by the host process.
pub type ThreadId = u64;
