// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.
//!
//! A [`Workspace`] is a temporary work directory with a pmaports tree, remote
//! and local APKINDEX files and a chroot. Nothing is executed: commands go
//! to a [`RecordingExecutor`] and builds to a [`FakeBuilder`], which only
//! publishes a package in the local repository.

#![allow(dead_code)]

use flate2::write::GzEncoder;
use flate2::Compression;
use pmstrap::build::PackageBuilder;
use pmstrap::chroot::{CommandOutput, OutputMode, Privilege};
use pmstrap::index::PackageIndex;
use pmstrap::recipe::PmaportsIndex;
use pmstrap::repository::{local_index_path, read_apkindex, ApkIndexRepository};
use pmstrap::{Arch, Chroot, Config, Installer, Invocation, Result, RootExecutor};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tempfile::TempDir;

/// A binary package for an APKINDEX: (name, version)
pub type IndexEntry<'a> = (&'a str, &'a str);

/// Temporary work directory
pub struct Workspace {
    dir: TempDir,
    pub config: Config,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            work: dir.path().to_path_buf(),
            aports: "$WORK/pmaports".to_string(),
            ..Default::default()
        };
        fs::create_dir_all(config.aports_dir()).unwrap();
        Self { dir, config }
    }

    pub fn work(&self) -> &Path {
        self.dir.path()
    }

    /// Write `<aports>/<folder>/<pkgname>/APKBUILD`
    pub fn add_aport(&self, folder: &str, pkgname: &str, version: &str, depends: &[&str], extra: &str) {
        let (pkgver, pkgrel) = version.split_once("-r").unwrap();
        let dir = self.config.aports_dir().join(folder).join(pkgname);
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("APKBUILD"),
            format!(
                "# Maintainer: Test <test@example.org>\n\
                 pkgname={}\npkgver={}\npkgrel={}\npkgdesc=\"test package\"\n\
                 arch=\"all\"\nlicense=\"MIT\"\ndepends=\"{}\"\n{}\n\
                 package() {{\n\tmkdir -p \"$pkgdir\"\n}}\n",
                pkgname,
                pkgver,
                pkgrel,
                depends.join(" "),
                extra
            ),
        )
        .unwrap();
    }

    /// Remote index as downloaded by apk into the package cache
    pub fn write_remote_index(&self, arch: Arch, entries: &[IndexEntry]) {
        let path = self
            .config
            .apk_cache_dir(arch)
            .join("APKINDEX.2a4bc8ab.tar.gz");
        write_apkindex_tar_gz(&path, entries, arch);
    }

    /// Local repository index, plus an .apk file for every entry
    pub fn write_local_index(&self, arch: Arch, entries: &[IndexEntry]) {
        publish_local(&self.config.work, &self.config.channel, arch, entries);
    }

    /// An existing buildroot chroot for `arch`
    pub fn chroot(&self, arch: Arch) -> Chroot {
        let chroot = Chroot::buildroot(arch, self.work());
        fs::create_dir_all(chroot.path()).unwrap();
        chroot
    }

    /// Host path of apk.static in the native chroot
    pub fn apk_static(&self) -> String {
        self.work()
            .join("chroot_native/sbin/apk.static")
            .to_string_lossy()
            .into_owned()
    }

    pub fn package_index(&self) -> PackageIndex {
        PackageIndex::new(
            Box::new(PmaportsIndex::new(self.config.aports_dir())),
            Box::new(ApkIndexRepository::new(
                self.config.work.clone(),
                self.config.channel.clone(),
            )),
        )
    }

    /// Installer over this workspace that records instead of running
    pub fn installer(&self, executor: &Rc<RecordingExecutor>, builder: FakeBuilder) -> Installer {
        Installer::new(
            self.config.clone(),
            self.package_index(),
            Box::new(executor.clone()),
            Box::new(builder),
        )
    }

    /// Fake builder that publishes packages into this workspace
    pub fn builder(&self) -> FakeBuilder {
        FakeBuilder {
            work: self.config.work.clone(),
            channel: self.config.channel.clone(),
            versions: HashMap::new(),
            built: Rc::new(RefCell::new(Vec::new())),
        }
    }
}

/// Write an APKINDEX.tar.gz the way `apk index` does (one member `APKINDEX`)
pub fn write_apkindex_tar_gz(path: &Path, entries: &[IndexEntry], arch: Arch) {
    let mut content = String::new();
    for (name, version) in entries {
        content.push_str(&format!(
            "C:Q1dGVzdA==\nP:{}\nV:{}\nA:{}\nT:test package\no:{}\nt:1700000000\n\n",
            name, version, arch, name
        ));
    }

    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let file = fs::File::create(path).unwrap();
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    let mut header = tar::Header::new_gnu();
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append_data(&mut header, "APKINDEX", content.as_bytes()).unwrap();
    builder.into_inner().unwrap().finish().unwrap();
}

/// Add packages to the local repository, keeping what is already there
fn publish_local(work: &Path, channel: &str, arch: Arch, entries: &[IndexEntry]) {
    let index = local_index_path(work, channel, arch);
    let existing = read_apkindex(&index).unwrap();
    let mut all: Vec<IndexEntry> = existing
        .iter()
        .filter(|e| !entries.iter().any(|(name, _)| *name == e.pkgname))
        .map(|e| (e.pkgname.as_str(), e.version.as_str()))
        .collect();
    all.extend_from_slice(entries);
    write_apkindex_tar_gz(&index, &all, arch);

    let dir = index.parent().unwrap();
    for (name, version) in entries {
        fs::write(dir.join(format!("{}-{}.apk", name, version)), b"apk").unwrap();
    }
}

/// One recorded command
#[derive(Debug, Clone)]
pub struct Recorded {
    pub argv: Vec<String>,
    pub privilege: Privilege,
    pub output: OutputMode,
}

/// [`RootExecutor`] that records every invocation and succeeds
#[derive(Default)]
pub struct RecordingExecutor {
    pub calls: RefCell<Vec<Recorded>>,
}

impl RecordingExecutor {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn argvs(&self) -> Vec<Vec<String>> {
        self.calls.borrow().iter().map(|c| c.argv.clone()).collect()
    }
}

impl RootExecutor for RecordingExecutor {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        self.calls.borrow_mut().push(Recorded {
            argv: invocation.argv.clone(),
            privilege: invocation.privilege,
            output: invocation.output,
        });
        Ok(CommandOutput::default())
    }
}

/// [`PackageBuilder`] that "builds" by writing the local repository
///
/// The built version comes from `versions`; a package without an entry fails
/// to build.
pub struct FakeBuilder {
    work: PathBuf,
    channel: String,
    pub versions: HashMap<String, String>,
    pub built: Rc<RefCell<Vec<String>>>,
}

impl FakeBuilder {
    pub fn with_version(mut self, pkgname: &str, version: &str) -> Self {
        self.versions.insert(pkgname.to_string(), version.to_string());
        self
    }
}

impl PackageBuilder for FakeBuilder {
    fn build(&mut self, pkgname: &str, arch: Arch) -> Result<()> {
        let version = self
            .versions
            .get(pkgname)
            .ok_or_else(|| pmstrap::Error::build_failed(pkgname, "abuild failed"))?;
        self.built.borrow_mut().push(pkgname.to_string());
        publish_local(&self.work, &self.channel, arch, &[(pkgname, version.as_str())]);
        Ok(())
    }
}
