// src/apk/mod.rs

//! Installing packages into chroots with apk
//!
//! [`Installer::install`] is the one entry point used by everything that
//! needs packages in a chroot:
//!
//! 1. make sure the chroot's apk-tools is recent enough
//! 2. expand the requested packages into what has to be added and removed
//! 3. build packages whose pmaports recipe is newer than any binary package
//! 4. install, forcing the freshly built local packages, then remove
//!    conflicting packages
//!
//! apk itself always runs as the native chroot's `apk.static` on the host,
//! with `--root` pointing at the target chroot. That works for foreign
//! architectures without emulation and with a broken chroot apk.

mod transaction;

pub use transaction::{validate_names, ApkContext, InstallPlan, InstallStep, VIRTUAL_PACKAGE};

use crate::arch::Arch;
use crate::build::{ensure_buildable, BuildAction, CommandBuilder, PackageBuilder};
use crate::chroot::shell::quote;
use crate::chroot::{Chroot, HostExecutor, Invocation, RootExecutor};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::index::PackageIndex;
use crate::recipe::PmaportsIndex;
use crate::repository::{read_apkindex, ApkIndexEntry, ApkIndexRepository, Origin};
use crate::resolver::{PackageRequest, Resolver};
use crate::version::compare;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Mount point of the local package repository inside chroots
pub const LOCAL_REPO_MOUNT: &str = "/mnt/pmbootstrap/packages";

const OUTDATED_APK_HINT: &str = "Delete your http cache and zap all chroots, then try again";

/// Installs packages into chroots
///
/// Remembers which chroots already passed the apk-tools version check and
/// got their repository list written, so both happen once per chroot and run.
pub struct Installer {
    config: Config,
    index: PackageIndex,
    executor: Box<dyn RootExecutor>,
    builder: Box<dyn PackageBuilder>,
    version_checked: HashSet<PathBuf>,
    repositories_updated: HashSet<PathBuf>,
}

impl Installer {
    pub fn new(
        config: Config,
        index: PackageIndex,
        executor: Box<dyn RootExecutor>,
        builder: Box<dyn PackageBuilder>,
    ) -> Self {
        Self {
            config,
            index,
            executor,
            builder,
            version_checked: HashSet::new(),
            repositories_updated: HashSet::new(),
        }
    }

    /// Installer for real chroots: pmaports recipes, APKINDEX files from the
    /// work directory, commands spawned on the host
    pub fn from_config(config: Config) -> Self {
        let executor = HostExecutor::new(config.sudo.clone(), config.command_timeout);
        let index = PackageIndex::new(
            Box::new(PmaportsIndex::new(config.aports_dir())),
            Box::new(ApkIndexRepository::new(config.work.clone(), config.channel.clone())),
        );
        let builder = CommandBuilder::new(config.build_command.clone(), executor.clone());
        Self::new(config, index, Box::new(executor), Box::new(builder))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn index(&mut self) -> &mut PackageIndex {
        &mut self.index
    }

    /// `apk.static` of the native chroot
    pub fn apk_static(&self) -> PathBuf {
        self.config.work.join("chroot_native/sbin/apk.static")
    }

    /// Install `packages` into `chroot`
    ///
    /// Entries may be `!name` to remove a package. With `allow_build` set,
    /// packages whose recipe is newer than every binary package are built
    /// first; otherwise any existing binary package is used and a missing
    /// one is an error.
    pub fn install<S: AsRef<str>>(&mut self, packages: &[S], chroot: &Chroot, allow_build: bool) -> Result<()> {
        if packages.is_empty() {
            debug!("({}) install called with empty packages list, ignoring", chroot);
            return Ok(());
        }
        let requests = PackageRequest::parse_all(packages)?;
        let arch = chroot.arch();

        self.check_min_version(chroot)?;
        self.warn_missing_emulation(chroot);

        let resolved = Resolver::new(&mut self.index).resolve(&requests, arch)?;
        // Names may also come from recipes, check them before anything runs
        validate_names(resolved.to_add.iter().chain(&resolved.to_del).map(String::as_str))?;

        if allow_build {
            let recipes = self.plan_builds(&resolved.to_add, arch)?;
            for recipe in recipes {
                self.build(&recipe, arch)?;
            }
        } else {
            for name in &resolved.to_add {
                ensure_buildable(&mut self.index, name, arch, false)?;
            }
        }

        let local_overrides = self.locally_built_apks(&resolved.to_add, arch)?;

        let (requested_add, _) = PackageRequest::split(&requests);
        let explicit_add: Vec<String> = requested_add
            .into_iter()
            .filter(|name| {
                let conflicting = resolved.to_del.contains(name);
                if conflicting {
                    warn!("({}) {} is also marked for removal, not installing it", chroot, name);
                }
                !conflicting
            })
            .collect();

        let plan = InstallPlan::new(&explicit_add, &local_overrides, &resolved.to_del)?;
        if plan.is_empty() {
            debug!("({}) nothing to do", chroot);
            return Ok(());
        }

        info!("({}) install {}", chroot, explicit_add.join(" "));
        let ctx = ApkContext {
            apk_static: self.apk_static(),
            chroot,
            cache_dir: self.config.apk_cache_dir(arch),
            offline: self.config.offline,
        };
        plan.execute(&ctx, self.executor.as_ref())
    }

    /// Decide for every package whether it must be built
    ///
    /// All decisions are made before anything is built, and every failing
    /// package is logged before the first failure is returned. The result
    /// holds each recipe once, in discovery order.
    fn plan_builds(&mut self, names: &[String], arch: Arch) -> Result<Vec<String>> {
        let mut recipes: Vec<String> = Vec::new();
        let mut first_error = None;

        for name in names {
            match ensure_buildable(&mut self.index, name, arch, true) {
                Ok(BuildAction::UseExistingBinary) => {}
                Ok(BuildAction::TriggerBuild { recipe }) => {
                    if !recipes.contains(&recipe) {
                        recipes.push(recipe);
                    }
                }
                Err(e) => {
                    error!("{}: {}", name, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(recipes),
        }
    }

    /// Build `recipe` and make sure the local repository has its version now
    fn build(&mut self, recipe: &str, arch: Arch) -> Result<()> {
        let wanted = self
            .index
            .recipe(recipe)?
            .ok_or_else(|| Error::build_failed(recipe, "recipe disappeared before building"))?
            .full_version();

        self.builder.build(recipe, arch)?;
        self.index.invalidate_binaries(arch);

        let Some(built) = self.index.binary(recipe, arch, Origin::Local)? else {
            return Err(Error::build_failed(
                recipe,
                format!("no {} package in the local repository after building", arch),
            ));
        };
        if compare(&built.version, &wanted)? == Ordering::Less {
            return Err(Error::build_failed(
                recipe,
                format!(
                    "local repository still has {}-{} after building {}",
                    recipe, built.version, wanted
                ),
            ));
        }
        Ok(())
    }

    /// Host paths of locally built package files to force-install
    ///
    /// For each package, the newest known binary package is looked up; it is
    /// included when a file of exactly that version exists in the local
    /// repository.
    pub fn locally_built_apks(&mut self, packages: &[String], arch: Arch) -> Result<Vec<PathBuf>> {
        let repo = self.config.local_repo_dir(arch);
        let mut paths = Vec::new();

        for name in packages {
            let Some(artifact) = self.index.best_binary(name, arch)? else {
                continue;
            };
            let path = repo.join(artifact.file_name());
            if path.exists() && !paths.contains(&path) {
                paths.push(path);
            }
        }
        Ok(paths)
    }

    /// Fail when the chroot's apk-tools is older than the configured minimum
    ///
    /// Chroots without apk yet (still being set up) are skipped.
    pub fn check_min_version(&mut self, chroot: &Chroot) -> Result<()> {
        if self.version_checked.contains(chroot.path()) {
            return Ok(());
        }
        if !chroot.join("sbin/apk").exists() {
            debug!("({}) no apk installed yet, skipping version check", chroot);
            return Ok(());
        }

        let packages = installed(chroot)?;
        let apk_tools = packages.get("apk-tools").ok_or_else(|| {
            Error::ParseError(format!("({}) apk-tools is not in the installed database", chroot))
        })?;
        check_outdated(&apk_tools.version, &self.config.apk_tools_min_version, OUTDATED_APK_HINT)?;

        self.version_checked.insert(chroot.path().to_path_buf());
        Ok(())
    }

    /// Write `/etc/apk/repositories` of the chroot if it differs
    pub fn update_repository_list(&mut self, chroot: &Chroot) -> Result<()> {
        if self.repositories_updated.contains(chroot.path()) {
            return Ok(());
        }

        let path = chroot.join("etc/apk/repositories");
        let wanted = repository_urls(&self.config);
        if read_lines(&path)? != wanted {
            debug!("({}) update /etc/apk/repositories", chroot);
            self.write_repository_list(&path, &wanted)?;
            if read_lines(&path)? != wanted {
                return Err(Error::InvalidChroot(format!(
                    "failed to update {}",
                    path.display()
                )));
            }
        }

        self.repositories_updated.insert(chroot.path().to_path_buf());
        Ok(())
    }

    fn write_repository_list(&self, path: &Path, lines: &[String]) -> Result<()> {
        let path_str = path.to_string_lossy();
        if let Some(parent) = path.parent() {
            let parent = parent.to_string_lossy();
            self.executor
                .run(&Invocation::host_root(&["mkdir", "-p", &*parent]))?;
        }

        let mut script = "printf '%s\\n'".to_string();
        for line in lines {
            script.push(' ');
            script.push_str(&quote(line));
        }
        script.push_str(&format!(" > {}", quote(&path_str)));
        self.executor.run(&Invocation::host_root(&["sh", "-c", script.as_str()]))?;
        Ok(())
    }

    /// Warn when a foreign architecture chroot has no qemu binary
    fn warn_missing_emulation(&self, chroot: &Chroot) {
        let arch = chroot.arch();
        match arch.cpu_emulation_required() {
            Ok(true) => {
                let qemu = format!("usr/bin/qemu-{}-static", arch.qemu_arch());
                if !chroot.join(&qemu).exists() {
                    warn!(
                        "({}) /{} is missing, running {} binaries in this chroot will fail",
                        chroot, qemu, arch
                    );
                }
            }
            Ok(false) => {}
            Err(e) => debug!("can't tell whether {} needs emulation: {}", arch, e),
        }
    }
}

/// Packages in the chroot's apk database, by name
pub fn installed(chroot: &Chroot) -> Result<BTreeMap<String, ApkIndexEntry>> {
    let entries = read_apkindex(&chroot.join("lib/apk/db/installed"))?;
    Ok(entries.into_iter().map(|e| (e.pkgname.clone(), e)).collect())
}

/// Fail with [`Error::OutdatedPackageManager`] if `installed < required`
pub fn check_outdated(installed: &str, required: &str, hint: &str) -> Result<()> {
    if compare(installed, required)? == Ordering::Less {
        return Err(Error::OutdatedPackageManager {
            installed: installed.to_string(),
            required: required.to_string(),
            hint: hint.to_string(),
        });
    }
    Ok(())
}

/// Lines of `/etc/apk/repositories`, local repository first
pub fn repository_urls(config: &Config) -> Vec<String> {
    let mut urls = vec![LOCAL_REPO_MOUNT.to_string()];
    for mirror in &config.mirrors_postmarketos {
        urls.push(format!("{}{}", mirror, config.pmaports_branch()));
    }

    let mut dirs = vec!["main", "community"];
    if config.alpine_version == "edge" {
        dirs.push("testing");
    }
    for dir in dirs {
        urls.push(format!("{}{}/{}", config.mirror_alpine, config.alpine_version, dir));
    }
    urls
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    Ok(std::fs::read_to_string(path)?
        .lines()
        .map(|l| l.to_string())
        .collect())
}
