// src/repository/mod.rs

//! Binary package indexes
//!
//! Two package universes hold prebuilt binaries:
//!
//! - **remote**: the Alpine and postmarketOS mirrors, whose indexes apk caches
//!   as `<work>/cache_apk_<arch>/APKINDEX.<hash>.tar.gz`
//! - **local**: packages built from pmaports on this machine, indexed in
//!   `<work>/packages/<channel>/<arch>/APKINDEX.tar.gz`
//!
//! Both are queried through the [`BinaryIndex`] trait.

mod apkindex;

pub use apkindex::{find_best, parse_apkindex, read_apkindex, ApkIndexEntry};

use crate::arch::Arch;
use crate::error::Result;
use crate::version::ApkVersion;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use strum_macros::Display;
use tracing::debug;

/// Which universe a binary package comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Origin {
    #[strum(serialize = "remote")]
    Remote,
    #[strum(serialize = "local")]
    Local,
}

/// Snapshot of a binary package known to an index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryArtifactRef {
    pub name: String,
    pub version: String,
    pub arch: Arch,
    pub origin: Origin,
}

impl BinaryArtifactRef {
    pub fn parsed_version(&self) -> Result<ApkVersion> {
        ApkVersion::parse(&self.version)
    }

    /// File name of the package in a repository folder
    pub fn file_name(&self) -> String {
        format!("{}-{}.apk", self.name, self.version)
    }
}

/// Lookup of binary packages by name, architecture and origin
pub trait BinaryIndex {
    /// Best binary package called (or providing) `name`
    fn get_binary(&mut self, name: &str, arch: Arch, origin: Origin) -> Result<Option<BinaryArtifactRef>>;

    /// Forget anything cached for `arch`, e.g. after a package was built
    fn invalidate(&mut self, _arch: Arch) {}
}

/// [`BinaryIndex`] over the APKINDEX files of a work directory
#[derive(Debug)]
pub struct ApkIndexRepository {
    work: PathBuf,
    channel: String,
    loaded: HashMap<(Arch, Origin), Vec<ApkIndexEntry>>,
}

impl ApkIndexRepository {
    pub fn new(work: impl Into<PathBuf>, channel: impl Into<String>) -> Self {
        Self {
            work: work.into(),
            channel: channel.into(),
            loaded: HashMap::new(),
        }
    }

    /// Index files that make up one namespace
    pub fn index_paths(&self, arch: Arch, origin: Origin) -> Result<Vec<PathBuf>> {
        match origin {
            Origin::Local => Ok(vec![local_index_path(&self.work, &self.channel, arch)]),
            Origin::Remote => {
                let dir = self.work.join(format!("cache_apk_{}", arch));
                let pattern = format!(
                    "{}/APKINDEX.*.tar.gz",
                    glob::Pattern::escape(&dir.to_string_lossy())
                );
                let mut paths: Vec<PathBuf> = glob::glob(&pattern)
                    .map_err(|e| crate::Error::ParseError(e.to_string()))?
                    .filter_map(|p| p.ok())
                    .collect();
                paths.sort();
                Ok(paths)
            }
        }
    }

    fn entries(&mut self, arch: Arch, origin: Origin) -> Result<&[ApkIndexEntry]> {
        if !self.loaded.contains_key(&(arch, origin)) {
            let mut entries = Vec::new();
            for path in self.index_paths(arch, origin)? {
                debug!("Reading {}", path.display());
                entries.extend(read_apkindex(&path)?);
            }
            self.loaded.insert((arch, origin), entries);
        }
        Ok(self
            .loaded
            .get(&(arch, origin))
            .map(Vec::as_slice)
            .unwrap_or_default())
    }
}

impl BinaryIndex for ApkIndexRepository {
    fn get_binary(&mut self, name: &str, arch: Arch, origin: Origin) -> Result<Option<BinaryArtifactRef>> {
        let entries = self.entries(arch, origin)?;
        Ok(find_best(entries, name).map(|entry| BinaryArtifactRef {
            name: entry.pkgname.clone(),
            version: entry.version.clone(),
            arch,
            origin,
        }))
    }

    fn invalidate(&mut self, arch: Arch) {
        self.loaded.retain(|(a, _), _| *a != arch);
    }
}

/// `<work>/packages/<channel>/<arch>/APKINDEX.tar.gz`
pub fn local_index_path(work: &Path, channel: &str, arch: Arch) -> PathBuf {
    local_repo_dir(work, channel, arch).join("APKINDEX.tar.gz")
}

/// `<work>/packages/<channel>/<arch>`, where locally built packages land
pub fn local_repo_dir(work: &Path, channel: &str, arch: Arch) -> PathBuf {
    work.join("packages").join(channel).join(arch.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_missing_indexes_are_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut repo = ApkIndexRepository::new(dir.path(), "edge");
        assert!(repo.get_binary("hello-world", Arch::X86_64, Origin::Remote).unwrap().is_none());
        assert!(repo.get_binary("hello-world", Arch::X86_64, Origin::Local).unwrap().is_none());
    }

    #[test]
    fn test_local_index_plain_path_layout() {
        let work = Path::new("/work");
        assert_eq!(
            local_index_path(work, "v23.12", Arch::Aarch64),
            PathBuf::from("/work/packages/v23.12/aarch64/APKINDEX.tar.gz")
        );
    }

    #[test]
    fn test_remote_index_paths_are_globbed() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("cache_apk_x86_64");
        fs::create_dir_all(&cache).unwrap();
        fs::write(cache.join("APKINDEX.b2.tar.gz"), b"").unwrap();
        fs::write(cache.join("APKINDEX.a1.tar.gz"), b"").unwrap();
        fs::write(cache.join("hello-world-1-r2.apk"), b"").unwrap();

        let repo = ApkIndexRepository::new(dir.path(), "edge");
        let paths = repo.index_paths(Arch::X86_64, Origin::Remote).unwrap();
        assert_eq!(paths, vec![cache.join("APKINDEX.a1.tar.gz"), cache.join("APKINDEX.b2.tar.gz")]);
    }

    #[test]
    fn test_artifact_file_name() {
        let artifact = BinaryArtifactRef {
            name: "foo".to_string(),
            version: "2-r0".to_string(),
            arch: Arch::X86_64,
            origin: Origin::Local,
        };
        assert_eq!(artifact.file_name(), "foo-2-r0.apk");
        assert_eq!(artifact.origin.to_string(), "local");
    }
}
