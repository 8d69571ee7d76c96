/// Host platform as the release archives name it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Platform {
    pub os: Os,
    pub arch: Arch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Os {
    Linux,
    Darwin,
    Windows,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    Amd64,
    Arm64,
    I386,
}

impl std::fmt::Display for Os {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Linux => write!(f, "linux"),
            Self::Darwin => write!(f, "darwin"),
            Self::Windows => write!(f, "windows"),
        }
    }
}

impl std::fmt::Display for Arch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Amd64 => write!(f, "amd64"),
            Self::Arm64 => write!(f, "arm64"),
            Self::I386 => write!(f, "386"),
        }
    }
}

impl Os {
    /// Executable file name for `stem` on this OS.
    pub fn executable_name(self, stem: &str) -> String {
        match self {
            Self::Windows => format!("{stem}.exe"),
            _ => stem.to_string(),
        }
    }
}

impl Platform {
    /// The platform this binary was compiled for.
    pub fn current() -> Self {
        Self::from_parts(std::env::consts::OS, std::env::consts::ARCH)
    }

    /// Map Rust target names (`std::env::consts`) to release names.
    ///
    /// Unknown operating systems are treated as Linux and unknown
    /// architectures as 64-bit x86, the most common release flavour.
    pub fn from_parts(os: &str, arch: &str) -> Self {
        let os = match os {
            "windows" => Os::Windows,
            "macos" => Os::Darwin,
            _ => Os::Linux,
        };
        let arch = match arch {
            "aarch64" => Arch::Arm64,
            "x86" => Arch::I386,
            _ => Arch::Amd64,
        };
        Self { os, arch }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linux_x86_64() {
        let p = Platform::from_parts("linux", "x86_64");
        assert_eq!(p.os, Os::Linux);
        assert_eq!(p.arch, Arch::Amd64);
    }

    #[test]
    fn macos_apple_silicon() {
        let p = Platform::from_parts("macos", "aarch64");
        assert_eq!(p.os, Os::Darwin);
        assert_eq!(p.arch, Arch::Arm64);
        assert_eq!(format!("{}_{}", p.os, p.arch), "darwin_arm64");
    }

    #[test]
    fn unknown_arch_defaults_to_amd64() {
        let p = Platform::from_parts("freebsd", "riscv64");
        assert_eq!(p.os, Os::Linux);
        assert_eq!(p.arch, Arch::Amd64);
    }

    #[test]
    fn windows_executable_has_exe_suffix() {
        assert_eq!(Os::Windows.executable_name("chisel"), "chisel.exe");
        assert_eq!(Os::Linux.executable_name("chisel"), "chisel");
        assert_eq!(Os::Darwin.executable_name("chisel"), "chisel");
    }
}
