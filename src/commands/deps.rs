// src/commands/deps.rs
//! Showing the result of dependency resolution

use anyhow::{Context, Result};
use pmstrap::recipe::PmaportsIndex;
use pmstrap::repository::ApkIndexRepository;
use pmstrap::{Arch, Config, PackageIndex, PackageRequest, Resolver};

/// Print what installing `packages` would add and remove
pub fn cmd_deps(config: &Config, arch: Option<&str>, packages: &[String]) -> Result<()> {
    let arch = match arch {
        Some(arch) => Arch::parse(arch)?,
        None => Arch::native()?,
    };
    let requests = PackageRequest::parse_all(packages)?;

    let mut index = PackageIndex::new(
        Box::new(PmaportsIndex::new(config.aports_dir())),
        Box::new(ApkIndexRepository::new(config.work.clone(), config.channel.clone())),
    );
    let resolved = Resolver::new(&mut index)
        .resolve(&requests, arch)
        .context("Dependency resolution failed")?;

    println!("Architecture: {}", arch);
    println!("To add ({}):", resolved.to_add.len());
    for name in &resolved.to_add {
        println!("  {}", name);
    }
    if !resolved.to_del.is_empty() {
        println!("To remove ({}):", resolved.to_del.len());
        for name in &resolved.to_del {
            println!("  {}", name);
        }
    }
    Ok(())
}
