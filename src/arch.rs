// src/arch.rs

//! Alpine architecture tags
//!
//! Recipes declare the architectures they build for in their `arch=""` line,
//! which may contain the wildcards `all` and `noarch` as well as negations
//! like `!armhf`. Chroots and binary indexes are always keyed by a concrete
//! [`Arch`].

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};

/// A concrete Alpine architecture
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    #[strum(serialize = "x86")]
    X86,
    #[strum(serialize = "x86_64")]
    X86_64,
    #[strum(serialize = "armhf")]
    Armhf,
    #[strum(serialize = "armv7")]
    Armv7,
    #[strum(serialize = "aarch64")]
    Aarch64,
    #[strum(serialize = "riscv64")]
    Riscv64,
}

impl Arch {
    /// Parse an Alpine architecture tag
    pub fn parse(s: &str) -> Result<Self> {
        Self::from_str(s.trim()).map_err(|_| Error::InvalidArch(s.to_string()))
    }

    /// The architecture of the host running pmstrap
    pub fn native() -> Result<Self> {
        Self::from_host(std::env::consts::ARCH)
    }

    /// Map a Rust/Linux host architecture name to the Alpine tag
    pub fn from_host(host: &str) -> Result<Self> {
        match host {
            "x86_64" => Ok(Self::X86_64),
            "x86" | "i686" | "i586" => Ok(Self::X86),
            "aarch64" => Ok(Self::Aarch64),
            "arm" | "armv7l" => Ok(Self::Armv7),
            "riscv64" => Ok(Self::Riscv64),
            other => Err(Error::InvalidArch(other.to_string())),
        }
    }

    /// The Alpine tag as a static string
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    /// Name of the matching qemu-user binary (`qemu-<name>`)
    pub fn qemu_arch(&self) -> &'static str {
        match self {
            Self::X86 => "i386",
            Self::X86_64 => "x86_64",
            Self::Armhf | Self::Armv7 => "arm",
            Self::Aarch64 => "aarch64",
            Self::Riscv64 => "riscv64",
        }
    }

    /// Whether binaries for this architecture need qemu-user on `host`
    pub fn cpu_emulation_required_on(&self, host: Arch) -> bool {
        if *self == host {
            return false;
        }
        // x86_64 CPUs execute 32-bit x86 code natively
        !(host == Self::X86_64 && *self == Self::X86)
    }

    /// Whether binaries for this architecture need qemu-user on this host
    pub fn cpu_emulation_required(&self) -> Result<bool> {
        Ok(self.cpu_emulation_required_on(Self::native()?))
    }
}

/// Check if a recipe's `arch` list allows building for `arch`
///
/// A negation (`!arch`) always wins; otherwise the concrete tag or one of the
/// wildcards `all` / `noarch` must be present.
pub fn check_arches<S: AsRef<str>>(arches: &[S], arch: Arch) -> bool {
    let negated = format!("!{}", arch);
    if arches.iter().any(|a| a.as_ref() == negated) {
        return false;
    }
    arches
        .iter()
        .any(|a| matches!(a.as_ref(), "all" | "noarch") || a.as_ref() == arch.as_str())
}
