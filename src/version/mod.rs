// src/version/mod.rs

//! Version handling for apk packages
//!
//! Alpine package versions have the form `pkgver-r<pkgrel>`, where `pkgver`
//! follows a segmented scheme:
//!
//! ```text
//! 1.2.3a_rc1_p2~4f8a9c-r4
//! │ │ │││   │   │      └─ revision (pkgrel)
//! │ │ │││   │   └──────── commit hash
//! │ │ │││   └──────────── post-release suffix
//! │ │ ││└──────────────── pre-release suffix
//! │ │ │└───────────────── letter
//! └─┴─┴────────────────── numeric segments
//! ```
//!
//! Pre-release suffixes (`_alpha`, `_beta`, `_pre`, `_rc`) sort below the
//! plain release, post-release suffixes (`_cvs`, `_svn`, `_git`, `_hg`, `_p`)
//! sort above it.

use crate::error::{Error, Result};
use std::cmp::Ordering;
use std::fmt;

/// Version suffixes in ascending order
const SUFFIXES: &[(&str, i8)] = &[
    ("alpha", -4),
    ("beta", -3),
    ("pre", -2),
    ("rc", -1),
    ("cvs", 1),
    ("svn", 2),
    ("git", 3),
    ("hg", 4),
    ("p", 5),
];

/// Rank of "no suffix at this position"
const RELEASE_RANK: i8 = 0;

/// A `_name<digits>` version suffix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suffix {
    pub name: &'static str,
    rank: i8,
    pub number: String,
}

/// A parsed apk package version
#[derive(Debug, Clone)]
pub struct ApkVersion {
    raw: String,
    numbers: Vec<String>,
    letter: Option<char>,
    suffixes: Vec<Suffix>,
    hash: Option<String>,
    revision: String,
}

impl ApkVersion {
    /// Parse an apk version string
    ///
    /// Examples:
    /// - "1.2.3" → numbers=[1,2,3], revision=0
    /// - "1.2.3-r4" → numbers=[1,2,3], revision=4
    /// - "2.0_rc1-r0" → numbers=[2,0], suffixes=[rc1]
    /// - "0.0_git20240101-r1" → numbers=[0,0], suffixes=[git20240101], revision=1
    pub fn parse(s: &str) -> Result<Self> {
        let malformed = || Error::MalformedVersion(s.to_string());

        let (rest, revision) = match s.rfind("-r") {
            Some(pos) => {
                let rev = &s[pos + 2..];
                if rev.is_empty() || !rev.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(malformed());
                }
                (&s[..pos], normalize_digits(rev))
            }
            None => (s, "0".to_string()),
        };

        let (rest, hash) = match rest.split_once('~') {
            Some((head, hash)) => {
                if hash.is_empty() || !hash.bytes().all(|b| b.is_ascii_alphanumeric()) {
                    return Err(malformed());
                }
                (head, Some(hash.to_string()))
            }
            None => (rest, None),
        };

        let bytes = rest.as_bytes();
        let mut pos = 0;
        let mut numbers = Vec::new();

        loop {
            let start = pos;
            while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                pos += 1;
            }
            if start == pos {
                return Err(malformed());
            }
            numbers.push(normalize_digits(&rest[start..pos]));

            if pos < bytes.len() && bytes[pos] == b'.' {
                pos += 1;
            } else {
                break;
            }
        }

        let mut letter = None;
        if pos < bytes.len() && bytes[pos].is_ascii_lowercase() {
            letter = Some(bytes[pos] as char);
            pos += 1;
        }

        let mut suffixes = Vec::new();
        while pos < bytes.len() {
            if bytes[pos] != b'_' {
                return Err(malformed());
            }
            pos += 1;

            let name_start = pos;
            while pos < bytes.len() && bytes[pos].is_ascii_lowercase() {
                pos += 1;
            }
            let name = &rest[name_start..pos];
            let &(name, rank) = SUFFIXES
                .iter()
                .find(|(known, _)| *known == name)
                .ok_or_else(malformed)?;

            let num_start = pos;
            while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                pos += 1;
            }
            suffixes.push(Suffix {
                name,
                rank,
                number: normalize_digits(&rest[num_start..pos]),
            });
        }

        Ok(Self {
            raw: s.to_string(),
            numbers,
            letter,
            suffixes,
            hash,
            revision,
        })
    }

    /// The version string as it was parsed
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The pkgrel part (0 when absent)
    pub fn revision(&self) -> &str {
        &self.revision
    }

    /// Compare two apk versions
    pub fn compare(&self, other: &ApkVersion) -> Ordering {
        let len = self.numbers.len().max(other.numbers.len());
        for i in 0..len {
            let ord = match (self.numbers.get(i), other.numbers.get(i)) {
                (Some(a), Some(b)) => cmp_digits(a, b),
                (Some(_), None) => Ordering::Greater,
                (None, Some(_)) => Ordering::Less,
                (None, None) => Ordering::Equal,
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }

        match self.letter.cmp(&other.letter) {
            Ordering::Equal => {}
            ord => return ord,
        }

        let len = self.suffixes.len().max(other.suffixes.len());
        for i in 0..len {
            let (rank_a, num_a) = suffix_key(self.suffixes.get(i));
            let (rank_b, num_b) = suffix_key(other.suffixes.get(i));
            let ord = rank_a.cmp(&rank_b).then_with(|| cmp_digits(num_a, num_b));
            if ord != Ordering::Equal {
                return ord;
            }
        }

        match self.hash.cmp(&other.hash) {
            Ordering::Equal => {}
            ord => return ord,
        }

        cmp_digits(&self.revision, &other.revision)
    }
}

fn suffix_key(suffix: Option<&Suffix>) -> (i8, &str) {
    match suffix {
        Some(s) => (s.rank, s.number.as_str()),
        None => (RELEASE_RANK, "0"),
    }
}

/// Strip leading zeros, keeping a single "0" for all-zero input
fn normalize_digits(digits: &str) -> String {
    let trimmed = digits.trim_start_matches('0');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Compare normalized digit strings numerically without overflow
fn cmp_digits(a: &str, b: &str) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Compare two version strings
pub fn compare(a: &str, b: &str) -> Result<Ordering> {
    Ok(ApkVersion::parse(a)?.compare(&ApkVersion::parse(b)?))
}

impl fmt::Display for ApkVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl PartialEq for ApkVersion {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

impl Eq for ApkVersion {}

impl Ord for ApkVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl PartialOrd for ApkVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Version constraint operators as they appear in apk dependencies
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionConstraint {
    /// Any version is acceptable
    Any,
    /// Exact version match (`=`)
    Exact(ApkVersion),
    /// Greater than (`>`)
    GreaterThan(ApkVersion),
    /// Greater than or equal (`>=`)
    GreaterOrEqual(ApkVersion),
    /// Less than (`<`)
    LessThan(ApkVersion),
    /// Less than or equal (`<=`)
    LessOrEqual(ApkVersion),
    /// Same version prefix (`~`)
    Fuzzy(ApkVersion),
}

impl VersionConstraint {
    /// Build a constraint from an operator and a version string
    pub fn from_parts(op: &str, version: &str) -> Result<Self> {
        let version = ApkVersion::parse(version.trim())?;
        match op {
            "=" | "==" => Ok(Self::Exact(version)),
            ">" => Ok(Self::GreaterThan(version)),
            ">=" => Ok(Self::GreaterOrEqual(version)),
            "<" => Ok(Self::LessThan(version)),
            "<=" => Ok(Self::LessOrEqual(version)),
            "~" | "~=" => Ok(Self::Fuzzy(version)),
            other => Err(Error::ParseError(format!(
                "unknown version operator '{}'",
                other
            ))),
        }
    }

    /// Parse a version constraint string
    ///
    /// Examples:
    /// - ">= 1.2.3" → GreaterOrEqual(1.2.3)
    /// - "<2.0" → LessThan(2.0)
    /// - "1.5-r0" → Exact(1.5-r0)
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() || s == "*" {
            return Ok(Self::Any);
        }

        let op_len = s
            .find(|c: char| !matches!(c, '<' | '>' | '=' | '~'))
            .unwrap_or(s.len());
        if op_len == 0 {
            return Self::from_parts("=", s);
        }
        Self::from_parts(&s[..op_len], &s[op_len..])
    }

    /// Check if a version satisfies this constraint
    pub fn satisfies(&self, version: &ApkVersion) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(v) => version == v,
            Self::GreaterThan(v) => version > v,
            Self::GreaterOrEqual(v) => version >= v,
            Self::LessThan(v) => version < v,
            Self::LessOrEqual(v) => version <= v,
            Self::Fuzzy(v) => {
                let prefix = v.as_str();
                match version.as_str().strip_prefix(prefix) {
                    Some(rest) => !rest.starts_with(|c: char| c.is_ascii_digit()),
                    None => false,
                }
            }
        }
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "*"),
            Self::Exact(v) => write!(f, "={}", v),
            Self::GreaterThan(v) => write!(f, ">{}", v),
            Self::GreaterOrEqual(v) => write!(f, ">={}", v),
            Self::LessThan(v) => write!(f, "<{}", v),
            Self::LessOrEqual(v) => write!(f, "<={}", v),
            Self::Fuzzy(v) => write!(f, "~{}", v),
        }
    }
}
