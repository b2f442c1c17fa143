// src/recipe/pmaports.rs

//! Recipe lookup in a pmaports checkout
//!
//! pmaports is laid out as `<aports>/<folder>/<pkgname>/APKBUILD`, where the
//! folder is a category like `main`, `device` or `cross`. A package name is
//! resolved in three passes:
//!
//! 1. a directory named after the package
//! 2. an APKBUILD listing it as a subpackage or as a versioned provide
//! 3. a guessed main package (`foo-dev` → `foo`, `u-boot-some-device` →
//!    `u-boot-some` → `u-boot`)

use super::{parse_apkbuild_file, Recipe, RecipeSource};
use crate::error::{Error, Result};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// [`RecipeSource`] backed by a pmaports directory
///
/// The tree is listed on first use and every APKBUILD is parsed at most once;
/// pmaports is assumed not to change until [`RecipeSource::invalidate`].
#[derive(Debug, Clone)]
pub struct PmaportsIndex {
    aports: PathBuf,
    apkbuilds: RefCell<Option<Vec<PathBuf>>>,
    parsed: RefCell<HashMap<PathBuf, Recipe>>,
}

impl PmaportsIndex {
    pub fn new(aports: impl Into<PathBuf>) -> Self {
        Self {
            aports: aports.into(),
            apkbuilds: RefCell::new(None),
            parsed: RefCell::new(HashMap::new()),
        }
    }

    /// Find the aport directory that builds `pkgname`
    pub fn find(&self, pkgname: &str) -> Result<Option<PathBuf>> {
        if pkgname.contains('*') || pkgname.is_empty() {
            return Err(Error::ParseError(format!("invalid pkgname: {}", pkgname)));
        }
        // File dependencies like /bin/sh are only ever provided by binaries
        if pkgname.contains('/') {
            return Ok(None);
        }

        let direct = self.aports_named(pkgname)?;
        if direct.len() > 1 {
            return Err(Error::ParseError(format!(
                "package {} found in multiple aports subfolders, please put it only in one folder",
                pkgname
            )));
        }
        if let Some(aport) = direct.into_iter().next() {
            return Ok(Some(aport));
        }

        for apkbuild in self.apkbuilds()? {
            let recipe = match self.load(&apkbuild) {
                Ok(recipe) => recipe,
                Err(e) => {
                    warn!("Skipping unreadable APKBUILD: {}", e);
                    continue;
                }
            };
            if recipe.produces(pkgname) {
                debug!("{}: provided by aport {}", pkgname, recipe.name);
                return Ok(apkbuild.parent().map(Path::to_path_buf));
            }
        }

        self.guess_main(pkgname)
    }

    /// Guess the main package of a subpackage by its name
    ///
    /// Used for subpackages generated by shell loops, which the line-based
    /// APKBUILD reader cannot see.
    pub fn guess_main(&self, subpkgname: &str) -> Result<Option<PathBuf>> {
        // foo-dev: only ever try foo. Cutting words could pick an unrelated
        // shorter aport when foo itself lives in Alpine.
        if let Some(pkgname) = subpkgname.strip_suffix("-dev") {
            let found = self.aports_named(pkgname)?.into_iter().next();
            match &found {
                Some(_) => debug!(
                    "{}: guessed to be a subpackage of {} (just removed '-dev')",
                    subpkgname, pkgname
                ),
                None => debug!(
                    "{}: guessed to be a subpackage of {}, which is not in pmaports",
                    subpkgname, pkgname
                ),
            }
            return Ok(found);
        }

        let mut words: Vec<&str> = subpkgname.split('-').collect();
        while words.len() > 1 {
            words.pop();
            let pkgname = words.join("-");
            if let Some(aport) = self.aports_named(&pkgname)?.into_iter().next() {
                debug!("{}: guessed to be a subpackage of {}", subpkgname, pkgname);
                return Ok(Some(aport));
            }
        }
        Ok(None)
    }

    /// Aport directories called `pkgname`, in folder order
    fn aports_named(&self, pkgname: &str) -> Result<Vec<PathBuf>> {
        Ok(self
            .apkbuilds()?
            .iter()
            .filter_map(|apkbuild| apkbuild.parent())
            .filter(|dir| dir.file_name().is_some_and(|name| name == pkgname))
            .map(Path::to_path_buf)
            .collect())
    }

    /// Parsed APKBUILD, from the cache when it was read before
    fn load(&self, apkbuild: &Path) -> Result<Recipe> {
        if let Some(recipe) = self.parsed.borrow().get(apkbuild) {
            return Ok(recipe.clone());
        }
        let recipe = parse_apkbuild_file(apkbuild)?;
        self.parsed
            .borrow_mut()
            .insert(apkbuild.to_path_buf(), recipe.clone());
        Ok(recipe)
    }

    /// Every `<aports>/*/*/APKBUILD`, sorted
    fn apkbuilds(&self) -> Result<Vec<PathBuf>> {
        if let Some(found) = self.apkbuilds.borrow().as_ref() {
            return Ok(found.clone());
        }

        let base = glob::Pattern::escape(&self.aports.to_string_lossy());
        let pattern = format!("{}/*/*/APKBUILD", base);
        let paths = glob::glob(&pattern).map_err(|e| Error::ParseError(e.to_string()))?;

        let mut found = Vec::new();
        for entry in paths {
            match entry {
                Ok(path) => found.push(path),
                Err(e) => warn!("Cannot read {}: {}", e.path().display(), e.error()),
            }
        }
        found.sort();
        debug!("{} aports in {}", found.len(), self.aports.display());
        *self.apkbuilds.borrow_mut() = Some(found.clone());
        Ok(found)
    }
}

impl RecipeSource for PmaportsIndex {
    fn get_recipe(&self, name: &str) -> Result<Option<Recipe>> {
        match self.find(name)? {
            Some(aport) => self.load(&aport.join("APKBUILD")).map(Some),
            None => Ok(None),
        }
    }

    fn invalidate(&self) {
        self.apkbuilds.borrow_mut().take();
        self.parsed.borrow_mut().clear();
    }
}
