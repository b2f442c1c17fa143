// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Common argument: chroot suffix
fn chroot_arg() -> Arg {
    Arg::new("chroot")
        .short('c')
        .long("chroot")
        .value_name("SUFFIX")
        .default_value("native")
        .help("Chroot suffix: native, buildroot_<arch>, rootfs_<device> or installer_<device>")
}

/// Common argument: package list
fn packages_arg() -> Arg {
    Arg::new("packages")
        .required(true)
        .num_args(1..)
        .help("Packages to install, or !name to remove")
}

fn build_cli() -> Command {
    Command::new("pmstrap")
        .version(env!("CARGO_PKG_VERSION"))
        .author("pmstrap Contributors")
        .about("Dependency-aware apk installs into postmarketOS chroots")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("PATH")
                .global(true)
                .help("Configuration file (default: ~/.config/pmstrap.toml)"),
        )
        .arg(
            Arg::new("work")
                .short('w')
                .long("work")
                .value_name("PATH")
                .global(true)
                .help("Work directory, overrides the configuration file"),
        )
        .arg(
            Arg::new("offline")
                .long("offline")
                .action(ArgAction::SetTrue)
                .global(true)
                .help("Don't download anything, use cached packages only"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .global(true)
                .help("Log debug messages"),
        )
        .subcommand(
            Command::new("install")
                .about("Install packages into a chroot")
                .arg(chroot_arg())
                .arg(
                    Arg::new("no_build")
                        .long("no-build")
                        .action(ArgAction::SetTrue)
                        .help("Never build packages, install existing binary packages only"),
                )
                .arg(packages_arg()),
        )
        .subcommand(
            Command::new("deps")
                .about("Show what installing packages would add and remove")
                .arg(
                    Arg::new("arch")
                        .short('a')
                        .long("arch")
                        .help("Target architecture (default: native)"),
                )
                .arg(packages_arg()),
        )
        .subcommand(
            Command::new("compare")
                .about("Compare two apk versions")
                .arg(Arg::new("a").required(true).help("First version"))
                .arg(Arg::new("b").required(true).help("Second version")),
        )
        .subcommand(
            Command::new("installed")
                .about("List packages installed in a chroot")
                .arg(chroot_arg()),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();
    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("pmstrap.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
