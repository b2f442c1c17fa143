// src/commands/installed.rs
//! Listing the apk database of a chroot

use anyhow::{Context, Result};
use pmstrap::apk::installed;
use pmstrap::Config;

pub fn cmd_installed(config: &Config, suffix: &str) -> Result<()> {
    let chroot = config
        .chroot(suffix)
        .with_context(|| format!("Invalid chroot '{}'", suffix))?;
    let packages = installed(&chroot)
        .with_context(|| format!("Failed to read the installed packages of {}", chroot))?;

    if packages.is_empty() {
        println!("No packages installed in {}", chroot);
        return Ok(());
    }
    for (name, entry) in &packages {
        println!("{} {}", name, entry.version);
    }
    Ok(())
}
