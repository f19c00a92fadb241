//! Describing a program and starting it on a fresh pseudo-terminal.

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::PathBuf;

#[cfg(unix)]
use crate::error::Result;
#[cfg(unix)]
use crate::process::PtyChild;
#[cfg(unix)]
use crate::unix::{UnixPtyChild, UnixPtyMaster, open_slave, spawn_child};

/// A program to run with a pseudo-terminal as its controlling terminal.
///
/// Modeled on [`std::process::Command`]: configure, then [`spawn`](Self::spawn).
///
/// ```
/// use shell_pty::PtyCommand;
///
/// let mut command = PtyCommand::new("/bin/sh");
/// command
///     .args(["-i"])
///     .env_clear()
///     .env("TERM", "dumb")
///     .current_dir("/tmp")
///     .size(80, 24);
/// assert_eq!(command.environment().len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct PtyCommand {
    pub(crate) program: OsString,
    pub(crate) args: Vec<OsString>,
    pub(crate) current_dir: Option<PathBuf>,
    inherit_env: bool,
    env_set: HashMap<OsString, OsString>,
    env_unset: Vec<OsString>,
    pub(crate) size: (u16, u16),
}

impl PtyCommand {
    /// Run `program` with no arguments, the parent's environment, and an
    /// 80x24 terminal.
    #[must_use]
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            inherit_env: true,
            env_set: HashMap::new(),
            env_unset: Vec::new(),
            size: (80, 24),
        }
    }

    /// Append arguments.
    pub fn args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set a variable in the child's environment.
    pub fn env(&mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> &mut Self {
        self.env_set.insert(key.into(), value.into());
        self
    }

    /// Remove a variable from the child's environment, whichever source it
    /// came from.
    pub fn env_remove(&mut self, key: impl Into<OsString>) -> &mut Self {
        self.env_unset.push(key.into());
        self
    }

    /// Do not inherit the parent's environment.
    pub const fn env_clear(&mut self) -> &mut Self {
        self.inherit_env = false;
        self
    }

    /// Working directory for the child.
    pub fn current_dir(&mut self, dir: impl Into<PathBuf>) -> &mut Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Terminal size in columns and rows.
    pub const fn size(&mut self, cols: u16, rows: u16) -> &mut Self {
        self.size = (cols, rows);
        self
    }

    /// The environment the child will see.
    #[must_use]
    pub fn environment(&self) -> HashMap<OsString, OsString> {
        let mut env: HashMap<OsString, OsString> = if self.inherit_env {
            std::env::vars_os().collect()
        } else {
            HashMap::new()
        };
        env.extend(self.env_set.iter().map(|(k, v)| (k.clone(), v.clone())));
        for key in &self.env_unset {
            env.remove(key);
        }
        env
    }

    /// Allocate a terminal and start the program on it.
    ///
    /// The child runs in a new session with the slave as its controlling
    /// terminal and as its stdin, stdout and stderr. The parent keeps no
    /// slave descriptor, so reads from the master end once the child and
    /// its descendants have closed the terminal.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// [`PtyError::Open`](crate::PtyError::Open) if the terminal cannot be
    /// set up, [`PtyError::Spawn`](crate::PtyError::Spawn) if the program
    /// cannot be started.
    #[cfg(unix)]
    pub fn spawn(&self) -> Result<(UnixPtyMaster, UnixPtyChild)> {
        let (master, slave_path) = UnixPtyMaster::open()?;
        master.resize(self.size.0, self.size.1)?;

        let slave = open_slave(&slave_path)?;
        let child = spawn_child(slave, self)?;

        tracing::debug!(pid = child.pid(), slave = %slave_path, "spawned child on pty");
        Ok((master, child))
    }
}
