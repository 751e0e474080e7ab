use crate::config::InstallerConfig;
use crate::installer::{Action, ChildProcess, ExitOutcome, Installer, InstallerCommand};
use crate::prereq::command_exists;
use crate::RuntimeError;
use std::io::{self, Read};
use std::process::{Child, Command, Stdio};
use tracing::debug;

/// Drives the real installer binary (`npm` unless configured otherwise).
pub struct NpmInstaller {
    config: InstallerConfig,
}

impl NpmInstaller {
    pub fn new(config: InstallerConfig) -> Self {
        Self { config }
    }
}

impl Default for NpmInstaller {
    fn default() -> Self {
        Self::new(InstallerConfig::from_env())
    }
}

impl Installer for NpmInstaller {
    fn name(&self) -> &'static str {
        "npm"
    }

    fn available(&self) -> bool {
        command_exists(&self.config.program)
    }

    fn config(&self) -> &InstallerConfig {
        &self.config
    }

    fn spawn(&self, command: &InstallerCommand) -> Result<Box<dyn ChildProcess>, RuntimeError> {
        let mut cmd = Command::new(&self.config.program);
        cmd.args(command.args())
            .current_dir(&command.cwd)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // Scripts may be interactive; installer runs must never wait on stdin.
        if command.action == Action::Run {
            cmd.stdin(Stdio::inherit());
        } else {
            cmd.stdin(Stdio::null());
        }

        if let Some(env) = &command.env {
            cmd.env_clear().envs(env);
        }

        let child = cmd.spawn().map_err(|source| RuntimeError::Spawn {
            program: self.config.program.clone(),
            source,
        })?;
        debug!(
            "spawned {} {command} (pid {}) in {}",
            self.config.program,
            child.id(),
            command.cwd.display()
        );
        Ok(Box::new(SystemProcess { child }))
    }
}

struct SystemProcess {
    child: Child,
}

impl ChildProcess for SystemProcess {
    fn id(&self) -> Option<u32> {
        Some(self.child.id())
    }

    fn take_stdout(&mut self) -> Option<Box<dyn Read + Send>> {
        self.child
            .stdout
            .take()
            .map(|s| Box::new(s) as Box<dyn Read + Send>)
    }

    fn take_stderr(&mut self) -> Option<Box<dyn Read + Send>> {
        self.child
            .stderr
            .take()
            .map(|s| Box::new(s) as Box<dyn Read + Send>)
    }

    fn wait(&mut self) -> io::Result<ExitOutcome> {
        let status = self.child.wait()?;
        Ok(ExitOutcome {
            code: status.code(),
        })
    }

    fn kill(&mut self) -> io::Result<()> {
        self.child.kill()
    }
}
