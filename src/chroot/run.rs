// src/chroot/run.rs

//! Running commands on the host and inside chroots
//!
//! Commands are described by an [`Invocation`] and handed to a
//! [`RootExecutor`]. [`HostExecutor`] turns them into real processes:
//!
//! ```text
//! host, user:     argv                      (sh -c '<env> argv' with env)
//! host, root:     sudo argv                 (sudo sh -c '<env> argv' with env)
//! chroot, root:   sudo env -i /bin/sh -c "<env> /usr/sbin/chroot <path> /bin/sh -c '<cd dir;> argv'"
//! chroot, user:   chroot, root with argv = busybox su pmos -c '<env> argv'
//! ```
//!
//! `busybox su` is used because other `su` implementations reset `PATH`.

use super::shell::flat_cmd;
use super::Chroot;
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::rc::Rc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};
use wait_timeout::ChildExt;

/// `PATH` inside chroots
pub const CHROOT_PATH: &str =
    "/usr/lib/ccache/bin:/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// Host environment variables that are passed on to commands
const PROXY_ENV_VARS: &[&str] = &[
    "FTP_PROXY",
    "ftp_proxy",
    "HTTP_PROXY",
    "http_proxy",
    "HTTPS_PROXY",
    "https_proxy",
    "HTTP_PROXY_AUTH",
];

/// Where a command runs
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    Host,
    Chroot(&'a Chroot),
}

/// Which user a command runs as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privilege {
    Root,
    /// The invoking user on the host, `pmos` inside chroots
    User,
}

/// What happens with the output of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Forward output to the log, line by line
    Log,
    /// Attach the command to the terminal (progress bars, prompts)
    Interactive,
    /// Collect stdout and return it
    Capture,
}

/// A command to run
#[derive(Debug, Clone)]
pub struct Invocation<'a> {
    pub target: Target<'a>,
    pub argv: Vec<String>,
    pub privilege: Privilege,
    /// Working directory (inside the chroot for chroot commands)
    pub working_dir: Option<String>,
    pub env: BTreeMap<String, String>,
    pub output: OutputMode,
    /// Fail with [`Error::CommandFailed`] on a non-zero exit status
    pub check: bool,
}

impl<'a> Invocation<'a> {
    fn new<S: AsRef<str>>(target: Target<'a>, argv: &[S]) -> Self {
        Self {
            target,
            argv: argv.iter().map(|a| a.as_ref().to_string()).collect(),
            privilege: Privilege::Root,
            working_dir: None,
            env: BTreeMap::new(),
            output: OutputMode::Log,
            check: true,
        }
    }

    /// Run `argv` on the host as the current user
    pub fn host<S: AsRef<str>>(argv: &[S]) -> Self {
        Self::new(Target::Host, argv).as_user()
    }

    /// Run `argv` on the host as root
    pub fn host_root<S: AsRef<str>>(argv: &[S]) -> Self {
        Self::new(Target::Host, argv)
    }

    /// Run `argv` inside `chroot` as root
    pub fn chroot<S: AsRef<str>>(chroot: &'a Chroot, argv: &[S]) -> Self {
        Self::new(Target::Chroot(chroot), argv)
    }

    pub fn as_user(mut self) -> Self {
        self.privilege = Privilege::User;
        self
    }

    pub fn working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn output(mut self, output: OutputMode) -> Self {
        self.output = output;
        self
    }

    pub fn check(mut self, check: bool) -> Self {
        self.check = check;
        self
    }

    /// Human readable form for logs, without the escaping
    pub fn display(&self) -> String {
        let mut msg = match self.target {
            Target::Host => "% ".to_string(),
            Target::Chroot(chroot) => format!("({}) % ", chroot),
        };
        for (key, value) in &self.env {
            msg.push_str(&format!("{}={} ", key, value));
        }
        if let Some(dir) = self.working_dir.as_deref().filter(|d| *d != "/") {
            msg.push_str(&format!("cd {}; ", dir));
        }
        msg.push_str(&self.argv.join(" "));
        msg
    }
}

/// Exit status and output of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: i32,
    /// Only filled in for [`OutputMode::Capture`]
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Runs commands on the host or inside a chroot
pub trait RootExecutor {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput>;
}

impl<T: RootExecutor + ?Sized> RootExecutor for Rc<T> {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        (**self).run(invocation)
    }
}

impl<T: RootExecutor + ?Sized> RootExecutor for Box<T> {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        (**self).run(invocation)
    }
}

/// [`RootExecutor`] that spawns real processes
#[derive(Debug, Clone)]
pub struct HostExecutor {
    sudo: String,
    is_root: bool,
    timeout: Option<Duration>,
    proxy_env: BTreeMap<String, String>,
    tools: Option<(PathBuf, PathBuf)>,
}

impl HostExecutor {
    /// `sudo` is the privilege escalation tool (`sudo` or `doas`),
    /// `timeout_secs == 0` disables the timeout
    pub fn new(sudo: impl Into<String>, timeout_secs: u64) -> Self {
        let proxy_env = PROXY_ENV_VARS
            .iter()
            .filter_map(|var| std::env::var(var).ok().map(|v| (var.to_string(), v)))
            .collect();
        Self {
            sudo: sudo.into(),
            is_root: nix::unistd::geteuid().is_root(),
            timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
            proxy_env,
            tools: None,
        }
    }

    /// Override the proxy variables taken from the host environment
    pub fn with_proxy_env(mut self, proxy_env: BTreeMap<String, String>) -> Self {
        self.proxy_env = proxy_env;
        self
    }

    /// Use fixed paths for `sh` and `chroot` instead of searching `PATH`
    pub fn with_tools(mut self, sh: impl Into<PathBuf>, chroot: impl Into<PathBuf>) -> Self {
        self.tools = Some((sh.into(), chroot.into()));
        self
    }

    /// Pretend to run as root (`true`) or as a regular user
    pub fn with_root(mut self, is_root: bool) -> Self {
        self.is_root = is_root;
        self
    }

    fn sudo(&self, mut argv: Vec<String>) -> Vec<String> {
        if !self.is_root {
            argv.insert(0, self.sudo.clone());
        }
        argv
    }

    /// Absolute paths of `sh` and `chroot`, searched in `$PATH:/usr/sbin`
    fn tools(&self) -> Result<(PathBuf, PathBuf)> {
        if let Some(tools) = &self.tools {
            return Ok(tools.clone());
        }
        let path = format!("{}:/usr/sbin", std::env::var("PATH").unwrap_or_default());
        let cwd = std::env::current_dir()?;
        let find = |binary: &str| {
            which::which_in(binary, Some(&path), &cwd).map_err(|_| Error::ToolNotFound(binary.to_string()))
        };
        Ok((find("sh")?, find("chroot")?))
    }

    /// The argv that is actually spawned for `invocation`
    pub fn command_line(&self, invocation: &Invocation) -> Result<Vec<String>> {
        let mut env = invocation.env.clone();

        match invocation.target {
            Target::Host => {
                for (key, value) in &self.proxy_env {
                    env.entry(key.clone()).or_insert_with(|| value.clone());
                }
                let argv = if env.is_empty() {
                    invocation.argv.clone()
                } else {
                    vec!["sh".to_string(), "-c".to_string(), flat_cmd(&invocation.argv, None, &env)]
                };
                Ok(match invocation.privilege {
                    Privilege::Root => self.sudo(argv),
                    Privilege::User => argv,
                })
            }
            Target::Chroot(chroot) => {
                let argv = match invocation.privilege {
                    Privilege::Root => {
                        for (key, value) in &self.proxy_env {
                            env.entry(key.clone()).or_insert_with(|| value.clone());
                        }
                        invocation.argv.clone()
                    }
                    Privilege::User => {
                        let mut user_env = std::mem::take(&mut env);
                        for (key, value) in &self.proxy_env {
                            user_env.entry(key.clone()).or_insert_with(|| value.clone());
                        }
                        user_env
                            .entry("HOME".to_string())
                            .or_insert_with(|| "/home/pmos".to_string());
                        vec![
                            "busybox".to_string(),
                            "su".to_string(),
                            "pmos".to_string(),
                            "-c".to_string(),
                            flat_cmd(&invocation.argv, None, &user_env),
                        ]
                    }
                };

                let mut env_all: BTreeMap<String, String> = [
                    ("CHARSET", "UTF-8"),
                    ("HISTFILE", "~/.ash_history"),
                    ("HOME", "/root"),
                    ("LANG", "UTF-8"),
                    ("PATH", CHROOT_PATH),
                    ("PYTHONUNBUFFERED", "1"),
                    ("SHELL", "/bin/ash"),
                    ("TERM", "xterm"),
                ]
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
                env_all.extend(env);

                let (sh, chroot_bin) = self.tools()?;
                let cmd_chroot = vec![
                    chroot_bin.to_string_lossy().into_owned(),
                    chroot.path().to_string_lossy().into_owned(),
                    "/bin/sh".to_string(),
                    "-c".to_string(),
                    flat_cmd(&argv, invocation.working_dir.as_deref(), &BTreeMap::new()),
                ];
                Ok(self.sudo(vec![
                    "env".to_string(),
                    "-i".to_string(),
                    sh.to_string_lossy().into_owned(),
                    "-c".to_string(),
                    flat_cmd(&cmd_chroot, None, &env_all),
                ]))
            }
        }
    }
}

impl RootExecutor for HostExecutor {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        let shown = invocation.display();
        debug!("{}", shown);

        let argv = self.command_line(invocation)?;
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| Error::ParseError("empty command".to_string()))?;

        let mut command = Command::new(program);
        command.args(args);
        if let (Target::Host, Some(dir)) = (invocation.target, &invocation.working_dir) {
            command.current_dir(dir);
        }

        let output = if invocation.output == OutputMode::Interactive {
            let status = command
                .stdin(Stdio::inherit())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit())
                .status()?;
            CommandOutput {
                status: status.code().unwrap_or(-1),
                ..Default::default()
            }
        } else {
            self.run_piped(&mut command, invocation, &shown)?
        };

        if invocation.check && !output.success() {
            return Err(Error::CommandFailed {
                command: shown,
                code: output.status,
                stderr: output.stderr,
            });
        }
        Ok(output)
    }
}

impl HostExecutor {
    fn run_piped(&self, command: &mut Command, invocation: &Invocation, shown: &str) -> Result<CommandOutput> {
        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => Error::ToolNotFound(invocation.argv.join(" ")),
                _ => Error::Io(e),
            })?;

        // Drain both pipes while waiting so a chatty command can't block on a
        // full pipe buffer
        let log_lines = invocation.output == OutputMode::Log;
        let stdout = child.stdout.take().map(|pipe| drain(pipe, log_lines));
        let stderr = child.stderr.take().map(|pipe| drain(pipe, log_lines));

        let status = match self.timeout {
            Some(timeout) => match child.wait_timeout(timeout)? {
                Some(status) => status,
                None => {
                    warn!("Command timed out, killing it: {}", shown);
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(Error::CommandTimeout {
                        command: shown.to_string(),
                        seconds: timeout.as_secs(),
                    });
                }
            },
            None => child.wait()?,
        };

        let join = |handle: Option<thread::JoinHandle<String>>| {
            handle.and_then(|h| h.join().ok()).unwrap_or_default()
        };
        let stdout = join(stdout);
        let stderr = join(stderr);

        if !status.success() {
            for line in stderr.lines() {
                warn!("{}", line);
            }
        }

        Ok(CommandOutput {
            status: status.code().unwrap_or(-1),
            stdout: if log_lines { String::new() } else { stdout },
            stderr,
        })
    }
}

fn drain(pipe: impl Read + Send + 'static, log_lines: bool) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut collected = String::new();
        for line in BufReader::new(pipe).lines() {
            let Ok(line) = line else { break };
            if log_lines {
                debug!("{}", line);
            }
            collected.push_str(&line);
            collected.push('\n');
        }
        collected
    })
}
