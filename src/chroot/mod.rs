// src/chroot/mod.rs

//! Chroots and command execution
//!
//! Every chroot lives in `<work>/chroot_<suffix>`, where the suffix names its
//! purpose:
//!
//! - `native`: tools for the host architecture (apk.static, build helpers)
//! - `buildroot_<arch>`: cross-building for a foreign architecture
//! - `rootfs_<device>`: the root filesystem that becomes the device image
//! - `installer_<device>`: the on-device installer image
//!
//! Creating, mounting and removing chroots happens elsewhere; here a chroot is
//! just a path with an architecture, plus the machinery to run commands in it.

mod run;
pub mod shell;

pub use run::{
    CommandOutput, HostExecutor, Invocation, OutputMode, Privilege, RootExecutor, Target,
    CHROOT_PATH,
};

use crate::arch::Arch;
use crate::error::{Error, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use strum_macros::{Display, EnumString};

/// What a chroot is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ChrootType {
    Native,
    Buildroot,
    Rootfs,
    Installer,
}

/// An isolated root filesystem below the work directory
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Chroot {
    kind: ChrootType,
    name: String,
    arch: Arch,
    path: PathBuf,
}

impl Chroot {
    /// Create a chroot reference, validating the name for its type
    pub fn new(kind: ChrootType, name: &str, arch: Arch, work: &Path) -> Result<Self> {
        match kind {
            ChrootType::Native if !name.is_empty() => {
                return Err(Error::InvalidChroot(format!(
                    "the native chroot can't have a name, but got '{}'",
                    name
                )));
            }
            ChrootType::Buildroot => {
                let named = Arch::parse(name)
                    .map_err(|_| Error::InvalidChroot(format!("invalid buildroot suffix: '{}'", name)))?;
                if named != arch {
                    return Err(Error::InvalidChroot(format!(
                        "buildroot_{} can't have architecture {}",
                        name, arch
                    )));
                }
            }
            ChrootType::Rootfs | ChrootType::Installer if name.is_empty() => {
                return Err(Error::InvalidChroot(format!("{} chroot needs a device name", kind)));
            }
            _ => {}
        }

        let mut chroot = Self {
            kind,
            name: name.to_string(),
            arch,
            path: PathBuf::new(),
        };
        chroot.path = work.join(chroot.dirname());
        Ok(chroot)
    }

    /// The chroot for the host architecture
    pub fn native(work: &Path) -> Result<Self> {
        Self::new(ChrootType::Native, "", Arch::native()?, work)
    }

    pub fn buildroot(arch: Arch, work: &Path) -> Self {
        Self {
            kind: ChrootType::Buildroot,
            name: arch.to_string(),
            arch,
            path: work.join(format!("chroot_buildroot_{}", arch)),
        }
    }

    pub fn rootfs(device: &str, arch: Arch, work: &Path) -> Result<Self> {
        Self::new(ChrootType::Rootfs, device, arch, work)
    }

    pub fn installer(device: &str, arch: Arch, work: &Path) -> Result<Self> {
        Self::new(ChrootType::Installer, device, arch, work)
    }

    /// Parse a suffix like `native`, `buildroot_aarch64` or `rootfs_qemu-amd64`
    ///
    /// Device chroots take the architecture of the configured device.
    pub fn from_suffix(suffix: &str, device_arch: Option<Arch>, work: &Path) -> Result<Self> {
        let (kind, name) = suffix.split_once('_').unwrap_or((suffix, ""));
        let kind = ChrootType::from_str(kind)
            .map_err(|_| Error::InvalidChroot(format!("unknown chroot type in '{}'", suffix)))?;

        let arch = match kind {
            ChrootType::Native => Arch::native()?,
            ChrootType::Buildroot => Arch::parse(name)
                .map_err(|_| Error::InvalidChroot(format!("invalid buildroot suffix: '{}'", name)))?,
            ChrootType::Rootfs | ChrootType::Installer => device_arch.ok_or_else(|| {
                Error::InvalidChroot(format!(
                    "{}: no device architecture configured (set device_arch)",
                    suffix
                ))
            })?,
        };
        Self::new(kind, name, arch, work)
    }

    pub fn kind(&self) -> ChrootType {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arch(&self) -> Arch {
        self.arch
    }

    /// Host path of the chroot
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `chroot_<suffix>`
    pub fn dirname(&self) -> String {
        format!("chroot_{}", self)
    }

    /// Host path of a path inside the chroot
    pub fn join(&self, inner: impl AsRef<Path>) -> PathBuf {
        let inner = inner.as_ref();
        self.path.join(inner.strip_prefix("/").unwrap_or(inner))
    }
}

impl fmt::Display for Chroot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}_{}", self.kind, self.name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suffix_and_path() {
        let work = Path::new("/work");
        let chroot = Chroot::buildroot(Arch::Aarch64, work);
        assert_eq!(chroot.to_string(), "buildroot_aarch64");
        assert_eq!(chroot.path(), Path::new("/work/chroot_buildroot_aarch64"));

        let rootfs = Chroot::rootfs("qemu-amd64", Arch::X86_64, work).unwrap();
        assert_eq!(rootfs.dirname(), "chroot_rootfs_qemu-amd64");
        assert_eq!(
            rootfs.join("/lib/apk/db/installed"),
            Path::new("/work/chroot_rootfs_qemu-amd64/lib/apk/db/installed")
        );
        assert_eq!(rootfs.join("etc/apk"), Path::new("/work/chroot_rootfs_qemu-amd64/etc/apk"));
    }

    #[test]
    fn test_validation() {
        let work = Path::new("/work");
        assert!(Chroot::new(ChrootType::Native, "foo", Arch::X86_64, work).is_err());
        assert!(Chroot::new(ChrootType::Buildroot, "mips", Arch::X86_64, work).is_err());
        assert!(Chroot::new(ChrootType::Buildroot, "armv7", Arch::X86_64, work).is_err());
        assert!(Chroot::new(ChrootType::Rootfs, "", Arch::X86_64, work).is_err());
        let native = Chroot::new(ChrootType::Native, "", Arch::X86_64, work).unwrap();
        assert_eq!(native.to_string(), "native");
    }

    #[test]
    fn test_from_suffix() {
        let work = Path::new("/work");
        let chroot = Chroot::from_suffix("buildroot_armv7", None, work).unwrap();
        assert_eq!(chroot.kind(), ChrootType::Buildroot);
        assert_eq!(chroot.arch(), Arch::Armv7);

        let chroot = Chroot::from_suffix("installer_pine64-pinephone", Some(Arch::Aarch64), work).unwrap();
        assert_eq!(chroot.name(), "pine64-pinephone");
        assert_eq!(chroot.arch(), Arch::Aarch64);

        assert!(Chroot::from_suffix("rootfs_pine64-pinephone", None, work).is_err());
        assert!(Chroot::from_suffix("sandbox", None, work).is_err());
        assert!(Chroot::from_suffix("buildroot_sparc", None, work).is_err());
    }
}
