// src/commands/install.rs
//! Installing packages into a chroot

use anyhow::{Context, Result};
use pmstrap::{Config, Installer};
use tracing::info;

/// Install (or with `!name` remove) packages in the chroot named by `suffix`
pub fn cmd_install(config: Config, suffix: &str, packages: &[String], no_build: bool) -> Result<()> {
    let chroot = config
        .chroot(suffix)
        .with_context(|| format!("Invalid chroot '{}'", suffix))?;
    if !chroot.path().is_dir() {
        return Err(anyhow::anyhow!(
            "Chroot {} does not exist at {}, create it first",
            chroot,
            chroot.path().display()
        ));
    }

    let allow_build = config.build_pkgs_on_install && !no_build;
    let mut installer = Installer::from_config(config);

    installer
        .update_repository_list(&chroot)
        .with_context(|| format!("Failed to update the repository list of {}", chroot))?;
    installer
        .install(packages, &chroot, allow_build)
        .with_context(|| format!("Failed to install packages into {}", chroot))?;

    info!("({}) done", chroot);
    Ok(())
}
