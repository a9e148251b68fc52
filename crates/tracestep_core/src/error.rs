use thiserror::Error;
use tracestep_common::{Arch, ThreadId};

/// Reasons a stepping request is refused. No session is created in either
/// case.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StepError {
    #[error("stepping is not supported on current arch: {0}")]
    UnsupportedArch(Arch),

    #[error("can't start stepping thread {0} outside a valid native context")]
    NoActiveContext(ThreadId),
}
