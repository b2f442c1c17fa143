// src/cli.rs
//! CLI definitions for pmstrap
//!
//! This module contains all command-line interface definitions using clap.
//! The actual command implementations are in the `commands` module.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pmstrap")]
#[command(author = "pmstrap Contributors")]
#[command(version)]
#[command(about = "Dependency-aware apk installs into postmarketOS chroots", long_about = None)]
pub struct Cli {
    /// Configuration file (default: ~/.config/pmstrap.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Work directory, overrides the configuration file
    #[arg(short, long, global = true)]
    pub work: Option<PathBuf>,

    /// Don't download anything, use cached packages only
    #[arg(long, global = true)]
    pub offline: bool,

    /// Log debug messages
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Install packages into a chroot
    ///
    /// Packages prefixed with '!' are removed instead. Packages whose
    /// pmaports recipe is newer than any binary package are built first.
    Install {
        /// Chroot suffix: native, buildroot_<arch>, rootfs_<device> or installer_<device>
        #[arg(short, long, default_value = "native")]
        chroot: String,

        /// Never build packages, install existing binary packages only
        #[arg(long)]
        no_build: bool,

        /// Packages to install, or !name to remove
        #[arg(required = true)]
        packages: Vec<String>,
    },

    /// Show what installing packages would add and remove
    Deps {
        /// Target architecture (default: native)
        #[arg(short, long)]
        arch: Option<String>,

        /// Packages to resolve, or !name to remove
        #[arg(required = true)]
        packages: Vec<String>,
    },

    /// Compare two apk versions
    Compare {
        /// First version
        a: String,

        /// Second version
        b: String,
    },

    /// List packages installed in a chroot
    Installed {
        /// Chroot suffix
        #[arg(short, long, default_value = "native")]
        chroot: String,
    },
}
