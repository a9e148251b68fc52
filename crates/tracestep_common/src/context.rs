/// CPU register context captured at a callout.
///
/// The stepping core only reads `pc`; the remaining registers are carried
/// through to whoever receives the step notification.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CpuContext {
    pub pc: u64,
    pub sp: u64,
    pub regs: Vec<u64>,
}

impl CpuContext {
    #[inline]
    pub fn with_pc(pc: u64) -> Self {
        Self {
            pc,
            ..Default::default()
        }
    }

    /// Same registers, different program counter.
    pub fn at(&self, pc: u64) -> Self {
        Self {
            pc,
            sp: self.sp,
            regs: self.regs.clone(),
        }
    }
}
