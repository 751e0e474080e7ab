use crate::config::InstallerConfig;
use crate::RuntimeError;
use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Installer subcommand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Install,
    Uninstall,
    Run,
}

impl Action {
    pub fn verb(self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Uninstall => "uninstall",
            Self::Run => "run",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

/// Manifest section an install/uninstall is recorded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveFlag {
    Save,
    SaveDev,
}

impl SaveFlag {
    /// `dev` only has an effect together with `save`.
    pub fn from_options(save: bool, dev: bool) -> Option<Self> {
        match (save, dev) {
            (true, true) => Some(Self::SaveDev),
            (true, false) => Some(Self::Save),
            (false, _) => None,
        }
    }

    pub fn as_arg(self) -> &'static str {
        match self {
            Self::Save => "--save",
            Self::SaveDev => "--save-dev",
        }
    }

    pub fn is_dev(self) -> bool {
        matches!(self, Self::SaveDev)
    }
}

/// One installer command line, independent of how it is executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallerCommand {
    pub action: Action,
    /// Specifiers for install/uninstall, the script name for run.
    pub operands: Vec<String>,
    pub save: Option<SaveFlag>,
    pub cwd: PathBuf,
    /// Complete environment for the process. `None` inherits the caller's.
    pub env: Option<BTreeMap<String, String>>,
}

impl InstallerCommand {
    pub fn install(cwd: &Path, specifiers: &[String], save: Option<SaveFlag>) -> Self {
        Self {
            action: Action::Install,
            operands: specifiers.to_vec(),
            save,
            cwd: cwd.to_path_buf(),
            env: None,
        }
    }

    pub fn uninstall(cwd: &Path, specifiers: &[String], save: Option<SaveFlag>) -> Self {
        Self {
            action: Action::Uninstall,
            operands: specifiers.to_vec(),
            save,
            cwd: cwd.to_path_buf(),
            env: None,
        }
    }

    pub fn run(cwd: &Path, script: &str, env: BTreeMap<String, String>) -> Self {
        Self {
            action: Action::Run,
            operands: vec![script.to_owned()],
            save: None,
            cwd: cwd.to_path_buf(),
            env: Some(env),
        }
    }

    /// Arguments following the installer program.
    pub fn args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.operands.len() + 2);
        args.push(self.action.verb().to_owned());
        args.extend(self.operands.iter().cloned());
        if let Some(flag) = self.save {
            args.push(flag.as_arg().to_owned());
        }
        args
    }
}

impl fmt::Display for InstallerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.args().join(" "))
    }
}

/// How an installer process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitOutcome {
    /// `None` when terminated by a signal.
    pub code: Option<i32>,
}

impl ExitOutcome {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// A started installer process.
///
/// Output streams are piped at spawn time and can each be taken once.
pub trait ChildProcess: Send {
    fn id(&self) -> Option<u32>;

    fn take_stdout(&mut self) -> Option<Box<dyn Read + Send>>;

    fn take_stderr(&mut self) -> Option<Box<dyn Read + Send>>;

    fn wait(&mut self) -> io::Result<ExitOutcome>;

    fn kill(&mut self) -> io::Result<()>;
}

/// Starts installer processes. Implemented by the real `npm` driver and by
/// the in-process mock used in tests.
pub trait Installer: Send + Sync {
    fn name(&self) -> &str;

    fn available(&self) -> bool;

    fn config(&self) -> &InstallerConfig;

    fn spawn(&self, command: &InstallerCommand) -> Result<Box<dyn ChildProcess>, RuntimeError>;
}
