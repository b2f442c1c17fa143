// src/apk/transaction.rs

//! The apk install transaction
//!
//! Installing is split into up to four apk invocations that always run in
//! this order:
//!
//! 1. `add <explicitly requested packages>`
//! 2. `add --upgrade --virtual .pmbootstrap <locally built .apk files>`
//! 3. `del .pmbootstrap`
//! 4. `del <conflicting packages>`
//!
//! Steps 2 and 3 make apk pick up the exact files we just built, even if
//! their version equals an installed package, without marking them as
//! explicitly installed: after step 3 only the packages from step 1 are in
//! apk's world file. Each step relies on the package database left behind by
//! the one before it.

use crate::chroot::{Chroot, Invocation, OutputMode, RootExecutor};
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the temporary virtual package
pub const VIRTUAL_PACKAGE: &str = ".pmbootstrap";

/// One apk invocation of an [`InstallPlan`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallStep {
    /// Install and mark as explicitly installed
    Add(Vec<String>),
    /// Force-install local package files under the virtual package
    VirtualAdd(Vec<PathBuf>),
    /// Drop the virtual package again
    VirtualDel,
    /// Remove conflicting packages
    Del(Vec<String>),
}

impl InstallStep {
    /// apk subcommand and its arguments
    pub fn apk_args(&self) -> Vec<String> {
        let mut args: Vec<String> = match self {
            Self::Add(names) => std::iter::once("add".to_string()).chain(names.iter().cloned()).collect(),
            Self::VirtualAdd(paths) => ["add", "--upgrade", "--virtual", VIRTUAL_PACKAGE]
                .iter()
                .map(|s| s.to_string())
                .chain(paths.iter().map(|p| p.to_string_lossy().into_owned()))
                .collect(),
            Self::VirtualDel => vec!["del".to_string(), VIRTUAL_PACKAGE.to_string()],
            Self::Del(names) => std::iter::once("del".to_string()).chain(names.iter().cloned()).collect(),
        };
        // --no-interactive belongs to the subcommand, so it goes last
        args.push("--no-interactive".to_string());
        args
    }

    /// Whether apk should draw its progress bar for this step
    fn shows_progress(&self) -> bool {
        matches!(self, Self::Add(_))
    }
}

/// Where and how apk runs
#[derive(Debug, Clone)]
pub struct ApkContext<'a> {
    /// apk.static binary on the host
    pub apk_static: PathBuf,
    /// Root the packages are installed into
    pub chroot: &'a Chroot,
    /// `<work>/cache_apk_<arch>`
    pub cache_dir: PathBuf,
    /// Add `--no-network`
    pub offline: bool,
}

/// Ordered apk invocations for one install
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallPlan {
    steps: Vec<InstallStep>,
}

impl InstallPlan {
    /// Plan the transaction
    ///
    /// Fails with [`Error::InvalidPackageArgument`] when any name or path
    /// would be read by apk as an option.
    pub fn new(to_add: &[String], local_overrides: &[PathBuf], to_del: &[String]) -> Result<Self> {
        validate_names(to_add.iter().map(String::as_str))?;
        let override_args: Vec<String> = local_overrides.iter().map(|p| path_arg(p)).collect();
        validate_names(override_args.iter().map(String::as_str))?;
        validate_names(to_del.iter().map(String::as_str))?;

        let mut steps = Vec::new();
        if !to_add.is_empty() {
            steps.push(InstallStep::Add(to_add.to_vec()));
        }
        if !local_overrides.is_empty() {
            steps.push(InstallStep::VirtualAdd(local_overrides.to_vec()));
            steps.push(InstallStep::VirtualDel);
        }
        if !to_del.is_empty() {
            steps.push(InstallStep::Del(to_del.to_vec()));
        }
        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[InstallStep] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Full apk.static argv of every step
    pub fn commands(&self, ctx: &ApkContext) -> Vec<Vec<String>> {
        self.steps.iter().map(|step| apk_command(ctx, step)).collect()
    }

    /// Run every step in order, stopping at the first failure
    pub fn execute(&self, ctx: &ApkContext, executor: &dyn RootExecutor) -> Result<()> {
        for step in &self.steps {
            let argv = apk_command(ctx, step);
            let output = if step.shows_progress() {
                OutputMode::Interactive
            } else {
                OutputMode::Log
            };
            debug!("({}) apk step {:?}", ctx.chroot, step);
            executor.run(&Invocation::host_root(&argv).output(output))?;
        }
        Ok(())
    }
}

fn apk_command(ctx: &ApkContext, step: &InstallStep) -> Vec<String> {
    let mut argv = vec![ctx.apk_static.to_string_lossy().into_owned()];
    if !step.shows_progress() {
        argv.push("--no-progress".to_string());
    }
    if ctx.offline {
        argv.push("--no-network".to_string());
    }
    argv.extend([
        "--root".to_string(),
        path_arg(ctx.chroot.path()),
        "--arch".to_string(),
        ctx.chroot.arch().to_string(),
        "--cache-dir".to_string(),
        path_arg(&ctx.cache_dir),
    ]);
    argv.extend(step.apk_args());
    argv
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Reject anything apk would parse as an option, like `--allow-untrusted`
pub fn validate_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Result<()> {
    for name in names {
        if name.is_empty() || name.starts_with('-') {
            return Err(Error::InvalidPackageArgument(name.to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::Arch;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn kinds(plan: &InstallPlan) -> Vec<&'static str> {
        plan.steps()
            .iter()
            .map(|s| match s {
                InstallStep::Add(_) => "add",
                InstallStep::VirtualAdd(_) => "virtual-add",
                InstallStep::VirtualDel => "virtual-del",
                InstallStep::Del(_) => "del",
            })
            .collect()
    }

    #[test]
    fn test_plan_shapes() {
        let plan = InstallPlan::new(&names(&["hello-world"]), &[], &[]).unwrap();
        assert_eq!(kinds(&plan), vec!["add"]);

        let plan = InstallPlan::new(&names(&["foo"]), &[PathBuf::from("/w/foo-2-r0.apk")], &[]).unwrap();
        assert_eq!(kinds(&plan), vec!["add", "virtual-add", "virtual-del"]);

        let plan = InstallPlan::new(&names(&["wanted-pkg"]), &[], &names(&["conflict-pkg"])).unwrap();
        assert_eq!(kinds(&plan), vec!["add", "del"]);

        let plan = InstallPlan::new(&names(&["a"]), &[PathBuf::from("/w/b.apk")], &names(&["c"])).unwrap();
        assert_eq!(kinds(&plan), vec!["add", "virtual-add", "virtual-del", "del"]);

        let plan = InstallPlan::new(&[], &[], &names(&["c"])).unwrap();
        assert_eq!(kinds(&plan), vec!["del"]);
        assert!(InstallPlan::new(&[], &[], &[]).unwrap().is_empty());
    }

    #[test]
    fn test_plan_rejects_options() {
        let cases: Vec<(Vec<String>, Vec<PathBuf>, Vec<String>)> = vec![
            (names(&["--allow-untrusted"]), vec![], vec![]),
            (names(&["ok"]), vec![PathBuf::from("-evil.apk")], vec![]),
            (names(&["ok"]), vec![], names(&["-X"])),
        ];
        for (add, local, del) in cases {
            assert!(matches!(
                InstallPlan::new(&add, &local, &del),
                Err(Error::InvalidPackageArgument(_))
            ));
        }
    }

    #[test]
    fn test_non_utf8_override_paths() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let fine = PathBuf::from(OsStr::from_bytes(b"/w/caf\xe9-1-r0.apk"));
        assert!(InstallPlan::new(&names(&["cafe"]), &[fine], &[]).is_ok());

        let evil = PathBuf::from(OsStr::from_bytes(b"-evil\xff.apk"));
        match InstallPlan::new(&names(&["ok"]), &[evil], &[]) {
            Err(Error::InvalidPackageArgument(arg)) => assert!(arg.starts_with("-evil")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_command_shape() {
        let chroot = Chroot::buildroot(Arch::Aarch64, Path::new("/work"));
        let ctx = ApkContext {
            apk_static: PathBuf::from("/work/chroot_native/sbin/apk.static"),
            chroot: &chroot,
            cache_dir: PathBuf::from("/work/cache_apk_aarch64"),
            offline: true,
        };
        let plan = InstallPlan::new(&names(&["foo"]), &[PathBuf::from("/work/foo-2-r0.apk")], &[]).unwrap();
        let commands = plan.commands(&ctx);

        assert_eq!(
            commands[0],
            vec![
                "/work/chroot_native/sbin/apk.static",
                "--no-network",
                "--root",
                "/work/chroot_buildroot_aarch64",
                "--arch",
                "aarch64",
                "--cache-dir",
                "/work/cache_apk_aarch64",
                "add",
                "foo",
                "--no-interactive",
            ]
        );
        assert_eq!(
            commands[1][..3],
            ["/work/chroot_native/sbin/apk.static", "--no-progress", "--no-network"]
        );
        assert_eq!(
            commands[1][9..],
            ["add", "--upgrade", "--virtual", ".pmbootstrap", "/work/foo-2-r0.apk", "--no-interactive"]
        );
        assert_eq!(commands[2][9..], ["del", ".pmbootstrap", "--no-interactive"]);
    }
}
