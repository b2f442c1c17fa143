// src/resolver/mod.rs

//! Recursive dependency expansion
//!
//! Turns the packages a caller asked for into the full list of packages to
//! install and to remove. Recipes from pmaports are expanded recursively;
//! packages without a recipe are binary-only and left to apk, which resolves
//! their runtime dependencies itself at install time.
//!
//! Removal requests (`!name`) come from the caller or from conflict markers
//! in a recipe's `depends`. A removal always wins over an install of the same
//! name.

use crate::arch::{check_arches, Arch};
use crate::error::{Error, Result};
use crate::index::PackageIndex;
use crate::recipe::Dependency;
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// A package the caller wants present or absent
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PackageRequest {
    Install(String),
    Remove(String),
}

impl PackageRequest {
    /// Parse `name` or `!name`
    ///
    /// Names that apk would read as an option are rejected here, before any
    /// command is built from them.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let (remove, name) = match s.strip_prefix('!') {
            Some(name) => (true, name),
            None => (false, s),
        };
        if name.is_empty() || name.starts_with('-') {
            return Err(Error::InvalidPackageArgument(s.to_string()));
        }
        Ok(if remove {
            Self::Remove(name.to_string())
        } else {
            Self::Install(name.to_string())
        })
    }

    /// Parse a list of requests
    pub fn parse_all<S: AsRef<str>>(packages: &[S]) -> Result<Vec<Self>> {
        packages.iter().map(|p| Self::parse(p.as_ref())).collect()
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Install(name) | Self::Remove(name) => name,
        }
    }

    /// Split requests into names to install and names to remove
    pub fn split(requests: &[PackageRequest]) -> (Vec<String>, Vec<String>) {
        let mut to_add = Vec::new();
        let mut to_del = Vec::new();
        for request in requests {
            match request {
                Self::Install(name) => push_unique(&mut to_add, name),
                Self::Remove(name) => push_unique(&mut to_del, name),
            }
        }
        (to_add, to_del)
    }
}

impl FromStr for PackageRequest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for PackageRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Install(name) => write!(f, "{}", name),
            Self::Remove(name) => write!(f, "!{}", name),
        }
    }
}

fn push_unique(list: &mut Vec<String>, name: &str) {
    if !list.iter().any(|n| n == name) {
        list.push(name.to_string());
    }
}

/// Result of dependency expansion
///
/// Both lists are free of duplicates, ordered by first discovery, and never
/// share a name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedSet {
    pub to_add: Vec<String>,
    pub to_del: Vec<String>,
}

/// Dependency resolver over a [`PackageIndex`]
pub struct Resolver<'a> {
    index: &'a mut PackageIndex,
}

impl<'a> Resolver<'a> {
    pub fn new(index: &'a mut PackageIndex) -> Self {
        Self { index }
    }

    /// Expand `requested` into its transitive closure for `arch`
    pub fn resolve(&mut self, requested: &[PackageRequest], arch: Arch) -> Result<ResolvedSet> {
        let mut queue: VecDeque<(PackageRequest, bool)> = VecDeque::new();
        let mut seen: HashSet<PackageRequest> = HashSet::new();
        let mut resolved = ResolvedSet::default();

        for request in requested {
            if seen.insert(request.clone()) {
                queue.push_back((request.clone(), true));
            }
        }

        while let Some((request, top_level)) = queue.pop_front() {
            let name = match request {
                PackageRequest::Remove(name) => {
                    debug!("{}: marked for removal", name);
                    push_unique(&mut resolved.to_del, &name);
                    continue;
                }
                PackageRequest::Install(name) => name,
            };

            if let Some(recipe) = self.index.recipe(&name)? {
                if !check_arches(&recipe.arches, arch) {
                    return Err(Error::UnsupportedArchitecture {
                        package: name,
                        arch: arch.to_string(),
                    });
                }

                let mut depends: Vec<&String> = recipe.depends.iter().collect();
                // Build-time dependencies are only followed for the packages
                // that were asked for. makedepends/checkdepends of anything
                // pulled in transitively are not install targets.
                if top_level {
                    depends.extend(&recipe.makedepends);
                    depends.extend(&recipe.checkdepends);
                }

                for dep in depends {
                    let dep = Dependency::parse(dep)?;
                    if dep.name == name {
                        continue;
                    }
                    let next = if dep.conflict {
                        PackageRequest::Remove(dep.name)
                    } else {
                        PackageRequest::Install(dep.name)
                    };
                    if seen.insert(next.clone()) {
                        queue.push_back((next, false));
                    }
                }
            } else {
                debug!("{}: no recipe, expecting a binary package", name);
            }

            push_unique(&mut resolved.to_add, &name);
        }

        let to_del = &resolved.to_del;
        resolved.to_add.retain(|name| {
            let removed = to_del.contains(name);
            if removed {
                warn!("{}: requested for install and for removal, removing it", name);
            }
            !removed
        });

        debug!(
            "resolved: add [{}], del [{}]",
            resolved.to_add.join(", "),
            resolved.to_del.join(", ")
        );
        Ok(resolved)
    }
}
