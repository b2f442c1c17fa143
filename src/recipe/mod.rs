// src/recipe/mod.rs

//! Source recipes (APKBUILDs) and the recipe index
//!
//! A recipe describes how a package is built from source and which packages it
//! needs. pmstrap only looks at the declarative part of an APKBUILD:
//!
//! ```sh
//! pkgname=hello-world
//! pkgver=1
//! pkgrel=6
//! arch="all"
//! depends="musl"
//! makedepends="gcc"
//! subpackages="$pkgname-doc"
//! provides="hello=1"
//! ```
//!
//! The recipe index is consumed through the [`RecipeSource`] trait, with
//! [`PmaportsIndex`] reading a pmaports checkout from disk.

mod apkbuild;
mod pmaports;

pub use apkbuild::{parse_apkbuild, parse_apkbuild_file};
pub use pmaports::PmaportsIndex;

use crate::error::{Error, Result};
use crate::version::VersionConstraint;

/// Structured view of an APKBUILD
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Recipe {
    /// Main package name (`pkgname`)
    pub name: String,
    /// Upstream version (`pkgver`)
    pub pkgver: String,
    /// Package revision (`pkgrel`)
    pub pkgrel: String,
    /// Entries of the `arch=""` line, including `all`, `noarch` and `!arch`
    pub arches: Vec<String>,
    /// Runtime dependencies
    pub depends: Vec<String>,
    /// Build-time dependencies (`makedepends`, `makedepends_build`, `makedepends_host`)
    pub makedepends: Vec<String>,
    /// Test dependencies
    pub checkdepends: Vec<String>,
    /// Virtual names, either `name` or `name=version`
    pub provides: Vec<String>,
    /// Subpackage names, with the `:function` part already removed
    pub subpackages: Vec<String>,
}

impl Recipe {
    /// The full apk version, `pkgver-r<pkgrel>`
    pub fn full_version(&self) -> String {
        format!("{}-r{}", self.pkgver, self.pkgrel)
    }

    /// Whether this recipe produces a package called `name`
    ///
    /// Only versioned provides count: apk never picks a package for an
    /// unversioned provide on its own.
    pub fn produces(&self, name: &str) -> bool {
        self.name == name
            || self.subpackages.iter().any(|s| s == name)
            || self
                .provides
                .iter()
                .filter_map(|p| p.split_once('='))
                .any(|(provided, _)| provided == name)
    }
}

/// A declared dependency like `musl`, `so:libc.musl-x86_64.so.1`,
/// `python3>=3.11` or `!conflicting-pkg`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub name: String,
    pub constraint: VersionConstraint,
    /// `!name`: the package must not be installed
    pub conflict: bool,
}

impl Dependency {
    /// Parse a dependency string
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let (conflict, rest) = match s.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, s),
        };

        let split = rest.find(['<', '>', '=', '~']).unwrap_or(rest.len());
        let name = &rest[..split];
        if name.is_empty() {
            return Err(Error::ParseError(format!("empty dependency name in '{}'", s)));
        }

        let constraint = if split == rest.len() {
            VersionConstraint::Any
        } else {
            VersionConstraint::parse(&rest[split..])?
        };

        Ok(Self {
            name: name.to_string(),
            constraint,
            conflict,
        })
    }
}

/// Lookup of source recipes by package name
pub trait RecipeSource {
    /// Find the recipe that produces `name`, if there is one
    fn get_recipe(&self, name: &str) -> Result<Option<Recipe>>;

    /// Forget anything read from the source so far
    fn invalidate(&self) {}
}
