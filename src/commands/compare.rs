// src/commands/compare.rs
//! Version comparison

use anyhow::Result;
use pmstrap::version::compare;
use std::cmp::Ordering;

/// Print `<`, `=` or `>`
pub fn cmd_compare(a: &str, b: &str) -> Result<()> {
    let symbol = match compare(a, b)? {
        Ordering::Less => "<",
        Ordering::Equal => "=",
        Ordering::Greater => ">",
    };
    println!("{}", symbol);
    Ok(())
}
