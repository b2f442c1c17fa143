// src/commands/mod.rs
//! Command handlers for the pmstrap CLI

mod compare;
mod deps;
mod install;
mod installed;

pub use compare::cmd_compare;
pub use deps::cmd_deps;
pub use install::cmd_install;
pub use installed::cmd_installed;

use anyhow::{Context, Result};
use pmstrap::Config;
use std::path::PathBuf;

/// Global options that override the configuration file
#[derive(Debug, Default)]
pub struct Overrides {
    pub config: Option<PathBuf>,
    pub work: Option<PathBuf>,
    pub offline: bool,
}

/// Load the configuration file and apply command line overrides
pub fn load_config(overrides: &Overrides) -> Result<Config> {
    let mut config = Config::load(overrides.config.as_deref()).context("Failed to load configuration")?;
    if let Some(work) = &overrides.work {
        config.work = work.clone();
    }
    if overrides.offline {
        config.offline = true;
    }
    Ok(config)
}
