// src/index.rs

//! Process-run cache over the recipe and binary package universes
//!
//! Recipes and binary packages are assumed not to change during one pmstrap
//! run, so every lookup is memoized. The only exceptions are explicit:
//! [`PackageIndex::invalidate_binaries`] after a package was built, and
//! [`PackageIndex::clear`].

use crate::arch::Arch;
use crate::error::Result;
use crate::recipe::{Recipe, RecipeSource};
use crate::repository::{BinaryArtifactRef, BinaryIndex, Origin};
use std::cmp::Ordering;
use std::collections::HashMap;
use strum::IntoEnumIterator;
use tracing::trace;

pub struct PackageIndex {
    recipes: Box<dyn RecipeSource>,
    binaries: Box<dyn BinaryIndex>,
    recipe_cache: HashMap<String, Option<Recipe>>,
    binary_cache: HashMap<(String, Arch, Origin), Option<BinaryArtifactRef>>,
}

impl PackageIndex {
    pub fn new(recipes: Box<dyn RecipeSource>, binaries: Box<dyn BinaryIndex>) -> Self {
        Self {
            recipes,
            binaries,
            recipe_cache: HashMap::new(),
            binary_cache: HashMap::new(),
        }
    }

    /// Recipe that produces `name`
    pub fn recipe(&mut self, name: &str) -> Result<Option<Recipe>> {
        if let Some(cached) = self.recipe_cache.get(name) {
            return Ok(cached.clone());
        }
        let recipe = self.recipes.get_recipe(name)?;
        trace!("recipe lookup {}: {:?}", name, recipe.as_ref().map(|r| &r.name));
        self.recipe_cache.insert(name.to_string(), recipe.clone());
        Ok(recipe)
    }

    /// Binary package for `name` in one universe
    pub fn binary(&mut self, name: &str, arch: Arch, origin: Origin) -> Result<Option<BinaryArtifactRef>> {
        let key = (name.to_string(), arch, origin);
        if let Some(cached) = self.binary_cache.get(&key) {
            return Ok(cached.clone());
        }
        let artifact = self.binaries.get_binary(name, arch, origin)?;
        self.binary_cache.insert(key, artifact.clone());
        Ok(artifact)
    }

    /// Newest binary package for `name` across both universes
    ///
    /// On equal versions the local package wins.
    pub fn best_binary(&mut self, name: &str, arch: Arch) -> Result<Option<BinaryArtifactRef>> {
        let remote = self.binary(name, arch, Origin::Remote)?;
        let local = self.binary(name, arch, Origin::Local)?;

        match (remote, local) {
            (Some(remote), Some(local)) => {
                let ord = local.parsed_version()?.cmp(&remote.parsed_version()?);
                Ok(Some(if ord == Ordering::Less { remote } else { local }))
            }
            (remote, local) => Ok(local.or(remote)),
        }
    }

    /// Drop cached binary lookups for `arch`
    pub fn invalidate_binaries(&mut self, arch: Arch) {
        self.binary_cache.retain(|(_, a, _), _| *a != arch);
        self.binaries.invalidate(arch);
    }

    /// Drop every cached lookup
    pub fn clear(&mut self) {
        self.recipe_cache.clear();
        self.binary_cache.clear();
        self.recipes.invalidate();
        for arch in Arch::iter() {
            self.binaries.invalidate(arch);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct CountingRecipes {
        calls: Rc<Cell<usize>>,
    }

    impl RecipeSource for CountingRecipes {
        fn get_recipe(&self, name: &str) -> Result<Option<Recipe>> {
            self.calls.set(self.calls.get() + 1);
            Ok((name == "foo").then(|| Recipe {
                name: "foo".to_string(),
                pkgver: "2".to_string(),
                pkgrel: "0".to_string(),
                ..Default::default()
            }))
        }
    }

    struct Binaries {
        packages: Vec<(&'static str, &'static str, Origin)>,
        calls: Rc<Cell<usize>>,
    }

    impl BinaryIndex for Binaries {
        fn get_binary(&mut self, name: &str, arch: Arch, origin: Origin) -> Result<Option<BinaryArtifactRef>> {
            self.calls.set(self.calls.get() + 1);
            Ok(self
                .packages
                .iter()
                .find(|(n, _, o)| *n == name && *o == origin)
                .map(|(n, v, o)| BinaryArtifactRef {
                    name: n.to_string(),
                    version: v.to_string(),
                    arch,
                    origin: *o,
                }))
        }
    }

    fn index(packages: Vec<(&'static str, &'static str, Origin)>) -> (PackageIndex, Rc<Cell<usize>>, Rc<Cell<usize>>) {
        let recipe_calls = Rc::new(Cell::new(0));
        let binary_calls = Rc::new(Cell::new(0));
        let index = PackageIndex::new(
            Box::new(CountingRecipes { calls: recipe_calls.clone() }),
            Box::new(Binaries { packages, calls: binary_calls.clone() }),
        );
        (index, recipe_calls, binary_calls)
    }

    #[test]
    fn test_recipe_lookups_are_memoized() {
        let (mut index, recipe_calls, _) = index(Vec::new());
        assert!(index.recipe("foo").unwrap().is_some());
        assert!(index.recipe("foo").unwrap().is_some());
        assert!(index.recipe("bar").unwrap().is_none());
        assert!(index.recipe("bar").unwrap().is_none());
        assert_eq!(recipe_calls.get(), 2);

        index.clear();
        index.recipe("foo").unwrap();
        assert_eq!(recipe_calls.get(), 3);
    }

    #[test]
    fn test_best_binary_prefers_newer_then_local() {
        let (mut index, _, _) = index(vec![
            ("foo", "1-r0", Origin::Remote),
            ("foo", "2-r0", Origin::Local),
            ("bar", "3-r0", Origin::Remote),
            ("bar", "2-r9", Origin::Local),
            ("baz", "1-r0", Origin::Remote),
            ("baz", "1-r0", Origin::Local),
        ]);
        let foo = index.best_binary("foo", Arch::X86_64).unwrap().unwrap();
        assert_eq!((foo.version.as_str(), foo.origin), ("2-r0", Origin::Local));

        let bar = index.best_binary("bar", Arch::X86_64).unwrap().unwrap();
        assert_eq!((bar.version.as_str(), bar.origin), ("3-r0", Origin::Remote));

        let baz = index.best_binary("baz", Arch::X86_64).unwrap().unwrap();
        assert_eq!(baz.origin, Origin::Local);

        assert!(index.best_binary("qux", Arch::X86_64).unwrap().is_none());
    }

    #[test]
    fn test_invalidate_binaries_only_touches_one_arch() {
        let (mut index, _, binary_calls) = index(vec![("foo", "1-r0", Origin::Remote)]);
        index.binary("foo", Arch::X86_64, Origin::Remote).unwrap();
        index.binary("foo", Arch::Aarch64, Origin::Remote).unwrap();
        assert_eq!(binary_calls.get(), 2);

        index.invalidate_binaries(Arch::X86_64);
        index.binary("foo", Arch::X86_64, Origin::Remote).unwrap();
        index.binary("foo", Arch::Aarch64, Origin::Remote).unwrap();
        assert_eq!(binary_calls.get(), 3);
    }
}
