//! Host platform detection and marketplace target-platform tags.
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// Detected operating system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Os {
    /// macOS.
    Darwin,
    /// Linux.
    Linux,
    /// Windows.
    Windows,
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Darwin => write!(f, "darwin"),
            Self::Linux => write!(f, "linux"),
            Self::Windows => write!(f, "windows"),
        }
    }
}

/// Detected CPU architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    /// `x86_64`.
    X64,
    /// `aarch64`.
    Arm64,
    /// Anything else.
    Other,
}

/// Marketplace `targetPlatform` values that have platform-specific packages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformTag {
    /// Apple silicon macOS.
    DarwinArm64,
    /// Intel macOS.
    DarwinX64,
    /// 64-bit ARM Linux.
    LinuxArm64,
    /// `x86_64` Linux.
    LinuxX64,
}

impl PlatformTag {
    /// All tags, in the order they are documented.
    pub const ALL: [Self; 4] = [
        Self::DarwinArm64,
        Self::DarwinX64,
        Self::LinuxArm64,
        Self::LinuxX64,
    ];

    /// Wire form used in the `targetPlatform` query parameter.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DarwinArm64 => "darwin-arm64",
            Self::DarwinX64 => "darwin-x64",
            Self::LinuxArm64 => "linux-arm64",
            Self::LinuxX64 => "linux-x64",
        }
    }
}

impl fmt::Display for PlatformTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlatformTag {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|tag| tag.as_str() == wanted)
            .ok_or_else(|| ConfigError::UnknownPlatform(s.to_string()))
    }
}

/// Platform information for the current system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Platform {
    /// Operating system.
    pub os: Os,
    /// CPU architecture.
    pub arch: Arch,
}

impl Platform {
    /// Detect the current platform.
    #[must_use]
    pub const fn detect() -> Self {
        Self {
            os: Self::detect_os(),
            arch: Self::detect_arch(),
        }
    }

    /// Create a platform with explicit values.
    #[must_use]
    pub const fn new(os: Os, arch: Arch) -> Self {
        Self { os, arch }
    }

    /// The marketplace tag for this platform, if packages are published for it.
    ///
    /// macOS on anything other than arm64 maps to `darwin-x64`, and Linux on
    /// anything other than aarch64 maps to `linux-x64`. Windows has no tag.
    #[must_use]
    pub const fn target_tag(&self) -> Option<PlatformTag> {
        match (self.os, self.arch) {
            (Os::Darwin, Arch::Arm64) => Some(PlatformTag::DarwinArm64),
            (Os::Darwin, _) => Some(PlatformTag::DarwinX64),
            (Os::Linux, Arch::Arm64) => Some(PlatformTag::LinuxArm64),
            (Os::Linux, _) => Some(PlatformTag::LinuxX64),
            (Os::Windows, _) => None,
        }
    }

    const fn detect_os() -> Os {
        if cfg!(target_os = "macos") {
            Os::Darwin
        } else if cfg!(target_os = "windows") {
            Os::Windows
        } else {
            // Default to Linux for other Unix-like systems
            Os::Linux
        }
    }

    const fn detect_arch() -> Arch {
        if cfg!(target_arch = "x86_64") {
            Arch::X64
        } else if cfg!(target_arch = "aarch64") {
            Arch::Arm64
        } else {
            Arch::Other
        }
    }
}
