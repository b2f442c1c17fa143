// src/build/mod.rs

//! Deciding whether a package has to be built before it is installed
//!
//! A package with a recipe in pmaports is rebuilt when its recipe version is
//! newer than every binary package we know of. Binary-only packages are
//! installed as they are. How a package is actually built is up to the
//! [`PackageBuilder`].

use crate::arch::Arch;
use crate::chroot::{Invocation, OutputMode, RootExecutor};
use crate::error::{Error, Result};
use crate::index::PackageIndex;
use crate::version::ApkVersion;
use tracing::{debug, info};

/// Outcome of [`ensure_buildable`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildAction {
    /// A binary package is good enough
    UseExistingBinary,
    /// Build the aport `recipe` (the main package, even when a subpackage
    /// was requested)
    TriggerBuild { recipe: String },
}

/// Decide how to get a binary package for `name`
///
/// With `allow_build == false` any known binary package is accepted and a
/// missing one is an error, never silently skipped.
pub fn ensure_buildable(index: &mut PackageIndex, name: &str, arch: Arch, allow_build: bool) -> Result<BuildAction> {
    let binary = index.best_binary(name, arch)?;

    if !allow_build {
        return match binary {
            Some(_) => Ok(BuildAction::UseExistingBinary),
            None => Err(Error::NoBinaryAvailable {
                package: name.to_string(),
                arch: arch.to_string(),
            }),
        };
    }

    let Some(recipe) = index.recipe(name)? else {
        return match binary {
            Some(_) => Ok(BuildAction::UseExistingBinary),
            None => Err(Error::PackageNotFound {
                package: name.to_string(),
                arch: arch.to_string(),
            }),
        };
    };

    let recipe_version = ApkVersion::parse(&recipe.full_version())?;
    let outdated = match &binary {
        None => true,
        Some(artifact) => recipe_version > artifact.parsed_version()?,
    };

    if outdated {
        debug!(
            "{}: recipe {} is newer than binary {}",
            name,
            recipe_version,
            binary.as_ref().map(|b| b.version.as_str()).unwrap_or("(none)")
        );
        Ok(BuildAction::TriggerBuild { recipe: recipe.name })
    } else {
        Ok(BuildAction::UseExistingBinary)
    }
}

/// Builds a package from its recipe and publishes it in the local repository
pub trait PackageBuilder {
    fn build(&mut self, pkgname: &str, arch: Arch) -> Result<()>;
}

/// [`PackageBuilder`] that runs a configured command on the host
///
/// The command is an argv template; `{pkgname}` and `{arch}` are substituted
/// in every argument, e.g. `["pmbootstrap", "build", "--arch", "{arch}",
/// "{pkgname}"]`.
pub struct CommandBuilder<E> {
    template: Vec<String>,
    executor: E,
}

impl<E: RootExecutor> CommandBuilder<E> {
    pub fn new(template: Vec<String>, executor: E) -> Self {
        Self { template, executor }
    }

    /// The argv for building `pkgname`
    pub fn command(&self, pkgname: &str, arch: Arch) -> Vec<String> {
        self.template
            .iter()
            .map(|arg| arg.replace("{pkgname}", pkgname).replace("{arch}", arch.as_str()))
            .collect()
    }
}

impl<E: RootExecutor> PackageBuilder for CommandBuilder<E> {
    fn build(&mut self, pkgname: &str, arch: Arch) -> Result<()> {
        if self.template.is_empty() {
            return Err(Error::build_failed(
                pkgname,
                "no build_command configured; build it yourself or set build_command",
            ));
        }

        info!("({}) build {}", arch, pkgname);
        let argv = self.command(pkgname, arch);
        let invocation = Invocation::host(&argv).output(OutputMode::Interactive).check(false);
        let output = self.executor.run(&invocation)?;
        if !output.success() {
            return Err(Error::build_failed(
                pkgname,
                format!("'{}' exited with status {}", argv.join(" "), output.status),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chroot::CommandOutput;
    use crate::index::testing::{artifact, index, recipe};
    use crate::repository::Origin;
    use std::cell::RefCell;

    #[test]
    fn test_binary_only_package_uses_existing_binary() {
        let mut index = index(Vec::new(), vec![artifact("hello-world", "1-r2", Origin::Remote)]);
        assert_eq!(
            ensure_buildable(&mut index, "hello-world", Arch::X86_64, true).unwrap(),
            BuildAction::UseExistingBinary
        );
    }

    #[test]
    fn test_binary_only_package_missing() {
        let mut index = index(Vec::new(), Vec::new());
        assert!(matches!(
            ensure_buildable(&mut index, "hello-world", Arch::X86_64, true),
            Err(Error::PackageNotFound { .. })
        ));
    }

    #[test]
    fn test_newer_recipe_triggers_build() {
        let mut index = index(
            vec![recipe("foo", "2-r0", &[])],
            vec![artifact("foo", "1-r0", Origin::Remote)],
        );
        assert_eq!(
            ensure_buildable(&mut index, "foo", Arch::X86_64, true).unwrap(),
            BuildAction::TriggerBuild { recipe: "foo".to_string() }
        );
    }

    #[test]
    fn test_recipe_without_binary_triggers_build() {
        let mut foo = recipe("foo", "1-r0", &[]);
        foo.subpackages = vec!["foo-dev".to_string()];
        let mut index = index(vec![foo], Vec::new());
        assert_eq!(
            ensure_buildable(&mut index, "foo-dev", Arch::X86_64, true).unwrap(),
            BuildAction::TriggerBuild { recipe: "foo".to_string() }
        );
    }

    #[test]
    fn test_up_to_date_binary_is_used() {
        let mut index = index(
            vec![recipe("foo", "2-r0", &[]), recipe("bar", "1-r3", &[])],
            vec![
                artifact("foo", "2-r0", Origin::Local),
                artifact("bar", "1-r4", Origin::Remote),
            ],
        );
        assert_eq!(
            ensure_buildable(&mut index, "foo", Arch::X86_64, true).unwrap(),
            BuildAction::UseExistingBinary
        );
        assert_eq!(
            ensure_buildable(&mut index, "bar", Arch::X86_64, true).unwrap(),
            BuildAction::UseExistingBinary
        );
    }

    #[test]
    fn test_building_disabled() {
        let mut index = index(
            vec![recipe("foo", "2-r0", &[]), recipe("bar", "1-r0", &[])],
            vec![artifact("foo", "1-r0", Origin::Remote)],
        );
        // outdated, but building is off: the old binary is accepted
        assert_eq!(
            ensure_buildable(&mut index, "foo", Arch::X86_64, false).unwrap(),
            BuildAction::UseExistingBinary
        );
        assert!(matches!(
            ensure_buildable(&mut index, "bar", Arch::X86_64, false),
            Err(Error::NoBinaryAvailable { ref package, .. }) if package == "bar"
        ));
    }

    #[test]
    fn test_malformed_recipe_version() {
        let mut index = index(vec![recipe("foo", "latest", &[])], Vec::new());
        assert!(matches!(
            ensure_buildable(&mut index, "foo", Arch::X86_64, true),
            Err(Error::MalformedVersion(_))
        ));
    }

    #[derive(Default)]
    struct Recorder {
        calls: RefCell<Vec<Vec<String>>>,
        status: i32,
    }

    impl RootExecutor for Recorder {
        fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
            self.calls.borrow_mut().push(invocation.argv.clone());
            Ok(CommandOutput {
                status: self.status,
                ..Default::default()
            })
        }
    }

    fn template() -> Vec<String> {
        ["pmbootstrap", "build", "--arch", "{arch}", "{pkgname}"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn test_command_builder_substitutes_template() {
        let mut builder = CommandBuilder::new(template(), Recorder::default());
        builder.build("hello-world", Arch::Aarch64).unwrap();
        assert_eq!(
            builder.executor.calls.borrow()[0],
            vec!["pmbootstrap", "build", "--arch", "aarch64", "hello-world"]
        );
    }

    #[test]
    fn test_command_builder_failures() {
        let mut builder = CommandBuilder::new(
            template(),
            Recorder {
                status: 1,
                ..Default::default()
            },
        );
        assert!(matches!(builder.build("foo", Arch::X86_64), Err(Error::BuildFailed { .. })));

        let mut unset = CommandBuilder::new(Vec::new(), Recorder::default());
        assert!(matches!(unset.build("foo", Arch::X86_64), Err(Error::BuildFailed { .. })));
        assert!(unset.executor.calls.borrow().is_empty());
    }
}
