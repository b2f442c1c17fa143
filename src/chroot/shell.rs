// src/chroot/shell.rs

//! POSIX shell quoting
//!
//! Commands that run inside a chroot pass through two `sh -c` layers, so the
//! argv has to be flattened into a single shell-safe string.

use std::collections::BTreeMap;

fn is_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '@' | '%' | '+' | '=' | ':' | ',' | '.' | '/' | '-')
}

/// Quote `s` so that `sh` reads it back as exactly one word
///
/// Words made only of safe characters are returned as-is, everything else is
/// wrapped in single quotes (with embedded single quotes spliced in as
/// `'"'"'`).
pub fn quote(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }
    if s.chars().all(is_safe) {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', r#"'"'"'"#))
}

/// Flatten a command with environment and working directory into one string
///
/// ```
/// use std::collections::BTreeMap;
/// use pmstrap::chroot::shell::flat_cmd;
///
/// let mut env = BTreeMap::new();
/// env.insert("JOBS".to_string(), "5".to_string());
/// env.insert("TEST".to_string(), "spaces string".to_string());
/// let cmd = vec!["echo".to_string(), "test".to_string()];
/// assert_eq!(flat_cmd(&cmd, None, &env), "JOBS=5 TEST='spaces string' echo test");
/// ```
pub fn flat_cmd<S: AsRef<str>>(argv: &[S], working_dir: Option<&str>, env: &BTreeMap<String, String>) -> String {
    let words: Vec<String> = env
        .iter()
        .map(|(key, value)| format!("{}={}", key, quote(value)))
        .chain(argv.iter().map(|arg| quote(arg.as_ref())))
        .collect();
    let cmd = words.join(" ");

    match working_dir {
        Some(dir) if dir != "/" => format!("cd {};{}", quote(dir), cmd),
        _ => cmd,
    }
}
