// src/lib.rs

//! pmstrap
//!
//! Dependency-aware package installs into chroots for building postmarketOS
//! images.
//!
//! # Architecture
//!
//! - Two package universes: recipes in a pmaports checkout (source) and
//!   binary packages in APKINDEX files (remote mirrors and the local build
//!   repository)
//! - Resolution: requested packages expand into what to add and what to
//!   remove, following recipe dependencies
//! - Build decision: outdated or missing packages with a recipe are built
//!   before installing
//! - Install: apk.static from the native chroot runs on the host against the
//!   target chroot in a fixed sequence of steps

pub mod apk;
pub mod arch;
pub mod build;
pub mod chroot;
pub mod config;
mod error;
pub mod index;
pub mod recipe;
pub mod repository;
pub mod resolver;
pub mod version;

pub use apk::{InstallPlan, InstallStep, Installer};
pub use arch::Arch;
pub use chroot::{Chroot, ChrootType, HostExecutor, Invocation, RootExecutor};
pub use config::Config;
pub use error::{Error, Result};
pub use index::PackageIndex;
pub use resolver::{PackageRequest, ResolvedSet, Resolver};
pub use version::ApkVersion;
