use std::fmt;

/// Architecture reported by the host process.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Arch {
    Ia32,
    X64,
    Arm,
    Arm64,
    Mips,
    Unknown,
}

impl Arch {
    /// Parse the architecture names used by instrumentation engines
    /// (`"x64"`, `"arm64"`, `"ia32"`, ...).
    pub fn from_name(name: &str) -> Arch {
        match name.to_ascii_lowercase().as_str() {
            "ia32" | "x86" | "i386" => Arch::Ia32,
            "x64" | "x86_64" | "amd64" => Arch::X64,
            "arm" | "arm32" => Arch::Arm,
            "arm64" | "aarch64" => Arch::Arm64,
            "mips" => Arch::Mips,
            _ => Arch::Unknown,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Arch::Ia32 => "ia32",
            Arch::X64 => "x64",
            Arch::Arm => "arm",
            Arch::Arm64 => "arm64",
            Arch::Mips => "mips",
            Arch::Unknown => "unknown",
        }
    }

    /// Only the 64-bit ARM and x86 variants can be stepped.
    pub const fn is_stepping_supported(&self) -> bool {
        matches!(self, Arch::X64 | Arch::Arm64)
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
