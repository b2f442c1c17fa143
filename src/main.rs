// src/main.rs

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use commands::Overrides;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over -v
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    let overrides = Overrides {
        config: cli.config,
        work: cli.work,
        offline: cli.offline,
    };

    match cli.command {
        Commands::Install {
            chroot,
            no_build,
            packages,
        } => commands::cmd_install(commands::load_config(&overrides)?, &chroot, &packages, no_build),
        Commands::Deps { arch, packages } => {
            commands::cmd_deps(&commands::load_config(&overrides)?, arch.as_deref(), &packages)
        }
        Commands::Compare { a, b } => commands::cmd_compare(&a, &b),
        Commands::Installed { chroot } => {
            commands::cmd_installed(&commands::load_config(&overrides)?, &chroot)
        }
    }
}
