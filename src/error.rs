// src/error.rs

//! Error types shared by the resolver, the install engine and their collaborators

use thiserror::Error;

/// Result type for pmstrap operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while resolving, building or installing packages
#[derive(Error, Debug)]
pub enum Error {
    /// A version string could not be split into apk version segments
    #[error("malformed version '{0}'")]
    MalformedVersion(String),

    /// The recipe does not list the requested architecture
    #[error("{package}: recipe does not support architecture {arch}")]
    UnsupportedArchitecture { package: String, arch: String },

    /// On-demand building is disabled and no binary package exists
    #[error(
        "{package}: no binary package found for {arch}, and building packages \
         during install has been disabled"
    )]
    NoBinaryAvailable { package: String, arch: String },

    /// Neither a recipe nor a binary package is known
    #[error("{package}: no recipe and no binary package found for {arch}")]
    PackageNotFound { package: String, arch: String },

    /// The apk-tools in a chroot is older than the required minimum
    #[error("apk-tools {installed} is older than required {required}. {hint}")]
    OutdatedPackageManager {
        installed: String,
        required: String,
        hint: String,
    },

    /// A package argument would be interpreted as an apk option
    #[error("invalid package name: {0}")]
    InvalidPackageArgument(String),

    /// The external build collaborator failed
    #[error("failed to build {package}: {reason}")]
    BuildFailed { package: String, reason: String },

    /// Parsing an APKBUILD, APKINDEX or dependency string failed
    #[error("parse error: {0}")]
    ParseError(String),

    /// A chroot suffix or chroot name is not valid
    #[error("invalid chroot: {0}")]
    InvalidChroot(String),

    /// An architecture tag is not known
    #[error("invalid architecture: {0}")]
    InvalidArch(String),

    /// An external command exited with a non-zero status
    #[error("command failed with exit code {code}: {command}{}", format_stderr(.stderr))]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },

    /// An external command did not finish in time and was killed
    #[error("command timed out after {seconds} seconds: {command}")]
    CommandTimeout { command: String, seconds: u64 },

    /// A required host executable could not be found
    #[error("could not find the '{0}' executable, make sure it is in your PATH")]
    ToolNotFound(String),

    /// Configuration file is invalid
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML deserialization error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

fn format_stderr(stderr: &str) -> String {
    let stderr = stderr.trim();
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {}", stderr)
    }
}

impl Error {
    /// Create a build failure for a package
    pub fn build_failed(package: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BuildFailed {
            package: package.into(),
            reason: reason.into(),
        }
    }
}
