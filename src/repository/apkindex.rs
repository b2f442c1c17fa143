// src/repository/apkindex.rs

//! APKINDEX reader
//!
//! An APKINDEX is a plain text file of package blocks separated by blank
//! lines. Each line is `<key>:<value>` with single-letter keys:
//!
//! ```text
//! C:Q1p+7cKjJ8ZQ2mvn3xZ/1B0Ih0s6Y=
//! P:hello-world
//! V:1-r6
//! A:x86_64
//! t:1700000000
//! o:hello-world
//! D:so:libc.musl-x86_64.so.1
//! p:cmd:hello-world=1-r6
//! ```
//!
//! Repositories ship it inside `APKINDEX.tar.gz`. The installed database of
//! a root (`lib/apk/db/installed`) uses the same format with more keys.

use crate::error::{Error, Result};
use crate::version::ApkVersion;
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tar::Archive;
use tracing::{debug, warn};

/// One package block of an APKINDEX
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ApkIndexEntry {
    /// `P:`
    pub pkgname: String,
    /// `V:`
    pub version: String,
    /// `A:`
    pub arch: Option<String>,
    /// `D:`
    pub depends: Vec<String>,
    /// `p:`
    pub provides: Vec<String>,
    /// `o:` (name of the aport the package was built from)
    pub origin: Option<String>,
    /// `t:` (build time, seconds since the epoch)
    pub timestamp: Option<u64>,
}

impl ApkIndexEntry {
    /// Whether this package provides `name`, with or without a version
    pub fn provides_name(&self, name: &str) -> bool {
        self.provides
            .iter()
            .any(|p| p.split_once('=').map(|(n, _)| n).unwrap_or(p) == name)
    }
}

/// Parse APKINDEX text content
pub fn parse_apkindex(content: &str) -> Result<Vec<ApkIndexEntry>> {
    let mut entries = Vec::new();
    let mut current = ApkIndexEntry::default();
    let mut in_block = false;

    for (lineno, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            if in_block {
                entries.push(finish_block(std::mem::take(&mut current), lineno)?);
                in_block = false;
            }
            continue;
        }
        in_block = true;

        let Some((key, value)) = line.split_once(':') else {
            return Err(Error::ParseError(format!(
                "APKINDEX line {}: expected '<key>:<value>', got '{}'",
                lineno + 1,
                line
            )));
        };

        match key {
            "P" => current.pkgname = value.to_string(),
            "V" => current.version = value.to_string(),
            "A" => current.arch = Some(value.to_string()),
            "D" => current.depends = value.split_whitespace().map(str::to_string).collect(),
            "p" => current.provides = value.split_whitespace().map(str::to_string).collect(),
            "o" => current.origin = Some(value.to_string()),
            "t" => current.timestamp = value.parse().ok(),
            _ => {}
        }
    }

    if in_block {
        entries.push(finish_block(current, content.lines().count())?);
    }

    Ok(entries)
}

fn finish_block(entry: ApkIndexEntry, lineno: usize) -> Result<ApkIndexEntry> {
    if entry.pkgname.is_empty() || entry.version.is_empty() {
        return Err(Error::ParseError(format!(
            "APKINDEX block ending at line {} has no P: or V: line",
            lineno
        )));
    }
    Ok(entry)
}

/// Read a plain APKINDEX file or an `APKINDEX.tar.gz` archive
///
/// A missing file reads as an empty index.
pub fn read_apkindex(path: &Path) -> Result<Vec<ApkIndexEntry>> {
    if !path.exists() {
        debug!("{} does not exist, treating as empty index", path.display());
        return Ok(Vec::new());
    }

    let is_archive = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(".tar.gz"));

    let content = if is_archive {
        read_archive_member(path, "APKINDEX")?
    } else {
        std::fs::read_to_string(path)?
    };

    parse_apkindex(&content)
        .map_err(|e| Error::ParseError(format!("{}: {}", path.display(), e)))
}

/// Extract one text member from a (possibly multi-stream) `.tar.gz`
///
/// Signed Alpine indexes are two gzip streams glued together: the signature
/// tar segment and the index tar segment.
fn read_archive_member(path: &Path, member: &str) -> Result<String> {
    let file = File::open(path)?;
    let mut archive = Archive::new(MultiGzDecoder::new(file));
    archive.set_ignore_zeros(true);

    for entry in archive.entries()? {
        let mut entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("{}: stopped reading archive: {}", path.display(), e);
                break;
            }
        };
        if entry.path()?.to_string_lossy() == member {
            let mut content = String::new();
            entry.read_to_string(&mut content)?;
            return Ok(content);
        }
    }

    Err(Error::ParseError(format!(
        "{}: no {} member in archive",
        path.display(),
        member
    )))
}

/// Highest version among `entries` named `name`, falling back to the
/// highest version among entries that provide `name`
pub fn find_best<'a>(entries: &'a [ApkIndexEntry], name: &str) -> Option<&'a ApkIndexEntry> {
    let named = best_of(entries.iter().filter(|e| e.pkgname == name));
    named.or_else(|| best_of(entries.iter().filter(|e| e.provides_name(name))))
}

fn best_of<'a>(candidates: impl Iterator<Item = &'a ApkIndexEntry>) -> Option<&'a ApkIndexEntry> {
    let mut best: Option<(&ApkIndexEntry, ApkVersion)> = None;
    for entry in candidates {
        let version = match ApkVersion::parse(&entry.version) {
            Ok(v) => v,
            Err(e) => {
                warn!("{}: ignoring index entry: {}", entry.pkgname, e);
                continue;
            }
        };
        let newer = match &best {
            Some((_, best_version)) => version > *best_version,
            None => true,
        };
        if newer {
            best = Some((entry, version));
        }
    }
    best.map(|(entry, _)| entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    const INDEX: &str = "C:Q1abc=
P:hello-world
V:1-r2
A:x86_64
t:1700000000
o:hello-world
D:so:libc.musl-x86_64.so.1

P:hello-world
V:1-r10
A:x86_64

P:busybox-binsh
V:1.36.1-r5
A:x86_64
p:/bin/sh cmd:sh=1.36.1-r5

P:dash-binsh
V:0.5.12-r1
A:x86_64
p:/bin/sh cmd:sh=0.5.12-r1
";

    #[test]
    fn test_parse_blocks() {
        let entries = parse_apkindex(INDEX).unwrap();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].pkgname, "hello-world");
        assert_eq!(entries[0].version, "1-r2");
        assert_eq!(entries[0].arch.as_deref(), Some("x86_64"));
        assert_eq!(entries[0].timestamp, Some(1_700_000_000));
        assert_eq!(entries[0].depends, vec!["so:libc.musl-x86_64.so.1"]);
        assert_eq!(entries[2].provides, vec!["/bin/sh", "cmd:sh=1.36.1-r5"]);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_apkindex("P:foo\nthis is not a key\n").is_err());
        assert!(parse_apkindex("P:foo\nA:x86_64\n").is_err());
        assert!(parse_apkindex("").unwrap().is_empty());
    }

    #[test]
    fn test_find_best_prefers_name_then_provider() {
        let entries = parse_apkindex(INDEX).unwrap();
        assert_eq!(find_best(&entries, "hello-world").unwrap().version, "1-r10");
        assert_eq!(find_best(&entries, "cmd:sh").unwrap().pkgname, "busybox-binsh");
        assert!(find_best(&entries, "missing").is_none());
    }

    #[test]
    fn test_read_tar_gz_with_two_streams() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("APKINDEX.tar.gz");

        let mut bytes = Vec::new();
        for (name, content) in [(".SIGN.RSA.key.rsa.pub", "sig"), ("APKINDEX", INDEX)] {
            let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, content.as_bytes()).unwrap();
            bytes.extend(builder.into_inner().unwrap().finish().unwrap());
        }
        std::fs::write(&path, bytes).unwrap();

        let entries = read_apkindex(&path).unwrap();
        assert_eq!(entries.len(), 4);
    }

    #[test]
    fn test_read_missing_and_plain() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_apkindex(&dir.path().join("APKINDEX.tar.gz")).unwrap().is_empty());

        let installed = dir.path().join("installed");
        std::fs::write(&installed, "P:apk-tools\nV:2.14.4-r1\nF:sbin\nR:apk\n").unwrap();
        let entries = read_apkindex(&installed).unwrap();
        assert_eq!(entries[0].pkgname, "apk-tools");
        assert_eq!(entries[0].version, "2.14.4-r1");
    }
}
