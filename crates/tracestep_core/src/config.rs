use tracestep_common::Arch;
use typed_builder::TypedBuilder;

/// Tuning for the warm-up filter.
///
/// Both values were measured against one engine build: the engine enters a
/// followed thread through generated dispatch code that executes a burst of
/// returns, and on arm64 it runs two more blocks of its own before the
/// target's first real instruction. Re-measure them before pointing the
/// coordinator at a different engine.
#[derive(Clone, Debug, PartialEq, Eq, TypedBuilder)]
pub struct StepperConfig {
    /// Callouts stay off until more than this many returns were transformed.
    #[builder(default = 4)]
    pub ret_threshold: u32,
    /// Whole blocks skipped on arm64 once the return threshold is crossed.
    #[builder(default = 2)]
    pub arm64_extra_blocks: u32,
}

impl Default for StepperConfig {
    fn default() -> Self {
        StepperConfig::builder().build()
    }
}

impl StepperConfig {
    pub fn extra_blocks_for(&self, arch: Arch) -> u32 {
        match arch {
            Arch::Arm64 => self.arm64_extra_blocks,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_measured_engine() {
        let config = StepperConfig::default();
        assert_eq!(config.ret_threshold, 4);
        assert_eq!(config.arm64_extra_blocks, 2);
        assert_eq!(config.extra_blocks_for(Arch::Arm64), 2);
        assert_eq!(config.extra_blocks_for(Arch::X64), 0);
    }

    #[test]
    fn builder_overrides() {
        let config = StepperConfig::builder()
            .ret_threshold(1)
            .arm64_extra_blocks(0)
            .build();
        assert_eq!(config.ret_threshold, 1);
        assert_eq!(config.extra_blocks_for(Arch::Arm64), 0);
    }
}
