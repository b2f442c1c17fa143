// src/config/mod.rs

//! pmstrap configuration
//!
//! Read from `~/.config/pmstrap.toml` (or `--config`). Every key is optional:
//!
//! ```toml
//! work = "/home/user/.local/var/pmstrap"
//! aports = "$WORK/cache_git/pmaports"
//! channel = "edge"
//! alpine_version = "edge"
//! mirror_alpine = "http://dl-cdn.alpinelinux.org/alpine/"
//! mirrors_postmarketos = ["http://mirror.postmarketos.org/postmarketos/"]
//! offline = false
//! build_pkgs_on_install = true
//! device = "qemu-amd64"
//! device_arch = "x86_64"
//! sudo = "sudo"
//! command_timeout = 900
//! apk_tools_min_version = "2.14.4-r1"
//! build_command = ["pmbootstrap", "build", "--arch", "{arch}", "{pkgname}"]
//! ```
//!
//! The work directory holds everything pmstrap creates:
//!
//! ```text
//! <work>/chroot_<suffix>/              chroots
//! <work>/cache_apk_<arch>/             apk package cache and remote APKINDEX files
//! <work>/packages/<channel>/<arch>/    locally built packages and their APKINDEX
//! ```

use crate::arch::Arch;
use crate::chroot::Chroot;
use crate::error::{Error, Result};
use crate::repository::local_repo_dir;
use crate::version::ApkVersion;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the configuration file in the user's config directory
pub const CONFIG_FILE: &str = "pmstrap.toml";

/// Oldest apk-tools that is known to work with our repositories
pub const APK_TOOLS_MIN_VERSION: &str = "2.14.4-r1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Work directory
    pub work: PathBuf,
    /// pmaports checkout, `$WORK` is replaced with the work directory
    pub aports: String,
    /// postmarketOS release channel (`edge`, `v23.12`, ...)
    pub channel: String,
    /// Alpine release the channel is based on (`edge`, `v3.19`, ...)
    pub alpine_version: String,
    pub mirror_alpine: String,
    pub mirrors_postmarketos: Vec<String>,
    /// Pass `--no-network` to apk
    pub offline: bool,
    /// Build outdated or missing pmaports packages when installing
    pub build_pkgs_on_install: bool,
    /// Target device, for `rootfs_<device>` and `installer_<device>`
    pub device: Option<String>,
    pub device_arch: Option<Arch>,
    /// Privilege escalation tool (`sudo` or `doas`)
    pub sudo: String,
    /// Seconds before a logged or captured command is killed, 0 disables
    pub command_timeout: u64,
    pub apk_tools_min_version: String,
    /// Argv template used to build packages, see [`crate::build::CommandBuilder`]
    pub build_command: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        let work = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/"))
            .join(".local/var/pmstrap");
        Self {
            work,
            aports: "$WORK/cache_git/pmaports".to_string(),
            channel: "edge".to_string(),
            alpine_version: "edge".to_string(),
            mirror_alpine: "http://dl-cdn.alpinelinux.org/alpine/".to_string(),
            mirrors_postmarketos: vec!["http://mirror.postmarketos.org/postmarketos/".to_string()],
            offline: false,
            build_pkgs_on_install: true,
            device: None,
            device_arch: None,
            sudo: "sudo".to_string(),
            command_timeout: 900,
            apk_tools_min_version: APK_TOOLS_MIN_VERSION.to_string(),
            build_command: Vec::new(),
        }
    }
}

impl Config {
    /// `<config dir>/pmstrap.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_FILE))
    }

    /// Load the configuration
    ///
    /// An explicitly given file must exist; a missing default file means
    /// default settings.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) if path.exists() => path,
                _ => {
                    debug!("No configuration file, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        debug!("Loading configuration from {}", path.display());
        let content = std::fs::read_to_string(&path)
            .map_err(|e| Error::ConfigError(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&content)
    }

    /// Parse and validate TOML configuration
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that serde can't
    pub fn validate(&self) -> Result<()> {
        if self.channel.is_empty() || self.channel.contains('/') {
            return Err(Error::ConfigError(format!("invalid channel '{}'", self.channel)));
        }
        ApkVersion::parse(&self.apk_tools_min_version).map_err(|e| {
            Error::ConfigError(format!("apk_tools_min_version: {}", e))
        })?;
        if self.device.is_some() != self.device_arch.is_some() {
            return Err(Error::ConfigError(
                "device and device_arch must be set together".to_string(),
            ));
        }
        if self.sudo.is_empty() {
            return Err(Error::ConfigError("sudo must not be empty".to_string()));
        }
        Ok(())
    }

    /// pmaports checkout with `$WORK` expanded
    pub fn aports_dir(&self) -> PathBuf {
        PathBuf::from(self.aports.replace("$WORK", &self.work.to_string_lossy()))
    }

    /// `<work>/cache_apk_<arch>`
    pub fn apk_cache_dir(&self, arch: Arch) -> PathBuf {
        self.work.join(format!("cache_apk_{}", arch))
    }

    /// `<work>/packages/<channel>/<arch>`
    pub fn local_repo_dir(&self, arch: Arch) -> PathBuf {
        local_repo_dir(&self.work, &self.channel, arch)
    }

    /// Chroot for a suffix like `native` or `rootfs_<device>`
    pub fn chroot(&self, suffix: &str) -> Result<Chroot> {
        Chroot::from_suffix(suffix, self.device_arch, &self.work)
    }

    /// The native chroot, home of apk.static
    pub fn native_chroot(&self) -> Result<Chroot> {
        Chroot::native(&self.work)
    }

    /// pmaports branch and mirror folder for the channel
    pub fn pmaports_branch(&self) -> &str {
        if self.channel == "edge" {
            "master"
        } else {
            &self.channel
        }
    }
}
