// src/recipe/apkbuild.rs

//! APKBUILD reader
//!
//! APKBUILDs are shell scripts. We do not run them; instead the top-level
//! variable assignments are extracted line by line:
//!
//! - `name=value`, `name="value"` and `name='value'`
//! - quoted values spanning several lines (common for `depends` and
//!   `subpackages`)
//! - references to variables assigned earlier in the file (`$pkgname`,
//!   `${pkgver}`, `$_flavor`, ...); unknown references are kept verbatim
//!
//! Assignments inside functions are indented and therefore ignored.

use super::Recipe;
use crate::error::{Error, Result};
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

/// Parse an APKBUILD file from disk
pub fn parse_apkbuild_file(path: &Path) -> Result<Recipe> {
    let content = std::fs::read_to_string(path)?;
    parse_apkbuild(&content).map_err(|e| match e {
        Error::ParseError(msg) => Error::ParseError(format!("{}: {}", path.display(), msg)),
        other => other,
    })
}

/// Parse APKBUILD content into a [`Recipe`]
pub fn parse_apkbuild(content: &str) -> Result<Recipe> {
    let vars = extract_variables(content)?;

    let name = vars
        .get("pkgname")
        .filter(|v| !v.is_empty())
        .cloned()
        .ok_or_else(|| Error::ParseError("missing pkgname".to_string()))?;
    let pkgver = vars
        .get("pkgver")
        .filter(|v| !v.is_empty())
        .cloned()
        .ok_or_else(|| Error::ParseError(format!("{}: missing pkgver", name)))?;
    let pkgrel = vars
        .get("pkgrel")
        .filter(|v| !v.is_empty())
        .cloned()
        .unwrap_or_else(|| "0".to_string());

    let mut makedepends = Vec::new();
    for key in ["makedepends", "makedepends_build", "makedepends_host"] {
        for dep in words(&vars, key) {
            if !makedepends.contains(&dep) {
                makedepends.push(dep);
            }
        }
    }

    let subpackages = words(&vars, "subpackages")
        .into_iter()
        .filter_map(|s| s.split(':').next().map(str::to_string))
        .filter(|s| !s.is_empty())
        .collect();

    Ok(Recipe {
        arches: words(&vars, "arch"),
        depends: words(&vars, "depends"),
        checkdepends: words(&vars, "checkdepends"),
        provides: words(&vars, "provides"),
        makedepends,
        subpackages,
        name,
        pkgver,
        pkgrel,
    })
}

fn words(vars: &HashMap<String, String>, key: &str) -> Vec<String> {
    vars.get(key)
        .map(|v| v.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

/// Extract top-level variable assignments
fn extract_variables(content: &str) -> Result<HashMap<String, String>> {
    static ASSIGNMENT_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^([a-zA-Z_][a-zA-Z0-9_]*)=(.*)$").unwrap());

    let mut vars = HashMap::new();
    let mut lines = content.lines();

    while let Some(line) = lines.next() {
        let Some(caps) = ASSIGNMENT_RE.captures(line) else {
            continue;
        };
        let name = caps[1].to_string();
        let raw = &caps[2];

        let value = match raw.chars().next() {
            Some(quote @ ('"' | '\'')) => {
                let mut value = raw[1..].to_string();
                loop {
                    if let Some(end) = value.find(quote) {
                        value.truncate(end);
                        break;
                    }
                    match lines.next() {
                        Some(next) => {
                            value.push('\n');
                            value.push_str(next);
                        }
                        None => {
                            return Err(Error::ParseError(format!(
                                "unterminated quote in value of {}",
                                name
                            )));
                        }
                    }
                }
                if quote == '\'' {
                    value
                } else {
                    expand(&value, &vars)
                }
            }
            _ => {
                let value = raw.split_whitespace().next().unwrap_or_default();
                expand(value, &vars)
            }
        };

        vars.insert(name, value);
    }

    Ok(vars)
}

/// Replace `$var` / `${var}` with previously assigned values
fn expand(value: &str, vars: &HashMap<String, String>) -> String {
    static REFERENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"\$\{([a-zA-Z_][a-zA-Z0-9_]*)\}|\$([a-zA-Z_][a-zA-Z0-9_]*)").unwrap()
    });

    REFERENCE_RE
        .replace_all(value, |caps: &Captures| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            match vars.get(name) {
                Some(v) => v.clone(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}
