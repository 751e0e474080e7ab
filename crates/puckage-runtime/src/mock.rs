use crate::config::InstallerConfig;
use crate::installer::{Action, ChildProcess, ExitOutcome, Installer, InstallerCommand};
use crate::RuntimeError;
use puckage_schema::{normalize, Manifest};
use std::collections::BTreeSet;
use std::io::{self, Cursor, Read};
use std::sync::Mutex;

/// Version the mock "resolves" every installed dependency to.
pub const MOCK_VERSION: &str = "1.0.0";

/// In-process stand-in for `npm`.
///
/// Installs create `node_modules/<key>` with a stub manifest and, when
/// saving, record `^1.0.0` in the package manifest. Every command is
/// recorded for inspection.
pub struct MockInstaller {
    config: InstallerConfig,
    unknown: BTreeSet<String>,
    invocations: Mutex<Vec<InstallerCommand>>,
}

impl Default for MockInstaller {
    fn default() -> Self {
        Self {
            config: InstallerConfig::default().with_program("mock-npm"),
            unknown: BTreeSet::new(),
            invocations: Mutex::new(Vec::new()),
        }
    }
}

impl MockInstaller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make installs of `specifier` fail as if the registry lacked it.
    #[must_use]
    pub fn with_unknown(mut self, specifier: &str) -> Self {
        self.unknown.insert(normalize(specifier).into_inner());
        self
    }

    /// Commands spawned so far, oldest first.
    pub fn invocations(&self) -> Vec<InstallerCommand> {
        self.invocations
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    /// First operand the fake registry refuses: flags, unknown names and
    /// specifiers with no usable directory name.
    fn rejected<'a>(&self, operands: &'a [String]) -> Option<&'a str> {
        operands
            .iter()
            .find(|s| {
                let key = normalize(s);
                s.starts_with('-')
                    || key.components().next().is_none()
                    || self.unknown.contains(key.as_str())
            })
            .map(String::as_str)
    }

    fn install(&self, cmd: &InstallerCommand) -> Result<MockProcess, RuntimeError> {
        if let Some(spec) = self.rejected(&cmd.operands) {
            return Ok(MockProcess::failed(format!(
                "npm ERR! 404 Not Found - '{spec}' is not in this registry.\n"
            )));
        }
        if cmd.operands.is_empty() {
            return Ok(MockProcess::succeeded("up to date\n".to_owned()));
        }

        let layout = self.config.layout(&cmd.cwd);
        let keys: Vec<_> = cmd.operands.iter().map(|s| normalize(s)).collect();
        for key in &keys {
            let child = layout.child(key);
            std::fs::create_dir_all(child.root())?;
            let stub = Manifest {
                name: Some(key.to_string()),
                version: Some(MOCK_VERSION.to_owned()),
                ..Manifest::default()
            };
            stub.save(child.manifest_path())?;
        }

        if let Some(flag) = cmd.save {
            let path = layout.manifest_path();
            let mut manifest = if path.exists() {
                Manifest::load(&path)?
            } else {
                Manifest::default()
            };
            for key in &keys {
                manifest.dependency_map_mut(!flag.is_dev()).remove(key.as_str());
                manifest
                    .dependency_map_mut(flag.is_dev())
                    .insert(key.to_string(), format!("^{MOCK_VERSION}"));
            }
            manifest.save(&path)?;
        }

        Ok(MockProcess::succeeded(format!(
            "added {} packages: {}\n",
            keys.len(),
            cmd.operands.join(" ")
        )))
    }

    fn uninstall(&self, cmd: &InstallerCommand) -> Result<MockProcess, RuntimeError> {
        if let Some(spec) = self.rejected(&cmd.operands) {
            return Ok(MockProcess::failed(format!(
                "npm ERR! invalid argument '{spec}'\n"
            )));
        }

        let layout = self.config.layout(&cmd.cwd);
        let keys: Vec<_> = cmd.operands.iter().map(|s| normalize(s)).collect();
        for key in &keys {
            let dir = layout.dependency_path(key);
            if dir.exists() {
                std::fs::remove_dir_all(&dir)?;
            }
        }

        if let Some(flag) = cmd.save {
            let path = layout.manifest_path();
            let mut manifest = Manifest::load(&path)?;
            for key in &keys {
                manifest.dependency_map_mut(flag.is_dev()).remove(key.as_str());
            }
            manifest.save(&path)?;
        }

        Ok(MockProcess::succeeded(format!(
            "removed {} packages\n",
            keys.len()
        )))
    }

    fn run(&self, cmd: &InstallerCommand) -> Result<MockProcess, RuntimeError> {
        let script = cmd.operands.first().map_or("start", String::as_str);
        let manifest = Manifest::load(self.config.layout(&cmd.cwd).manifest_path())?;
        let process = match manifest.script(script) {
            Some(line) => MockProcess::succeeded(format!(
                "\n> {}@{} {script}\n> {line}\n\n",
                manifest.name.as_deref().unwrap_or_default(),
                manifest.version.as_deref().unwrap_or_default(),
            )),
            None => MockProcess::failed(format!("npm ERR! Missing script: \"{script}\"\n")),
        };
        Ok(process)
    }
}

impl Installer for MockInstaller {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn available(&self) -> bool {
        true
    }

    fn config(&self) -> &InstallerConfig {
        &self.config
    }

    fn spawn(&self, command: &InstallerCommand) -> Result<Box<dyn ChildProcess>, RuntimeError> {
        self.invocations
            .lock()
            .map_err(|e| RuntimeError::Io(io::Error::other(format!("mutex poisoned: {e}"))))?
            .push(command.clone());

        if !command.cwd.is_dir() {
            return Err(RuntimeError::Spawn {
                program: self.config.program.clone(),
                source: io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no such directory: {}", command.cwd.display()),
                ),
            });
        }

        let process = match command.action {
            Action::Install => self.install(command)?,
            Action::Uninstall => self.uninstall(command)?,
            Action::Run => self.run(command)?,
        };
        Ok(Box::new(process))
    }
}

/// Finished-on-spawn process with canned output.
pub struct MockProcess {
    stdout: Option<Vec<u8>>,
    stderr: Option<Vec<u8>>,
    code: i32,
    killed: bool,
}

impl MockProcess {
    pub fn new(stdout: impl Into<Vec<u8>>, stderr: impl Into<Vec<u8>>, code: i32) -> Self {
        Self {
            stdout: Some(stdout.into()),
            stderr: Some(stderr.into()),
            code,
            killed: false,
        }
    }

    fn succeeded(stdout: String) -> Self {
        Self::new(stdout, Vec::new(), 0)
    }

    fn failed(stderr: String) -> Self {
        Self::new(Vec::new(), stderr, 1)
    }
}

impl ChildProcess for MockProcess {
    fn id(&self) -> Option<u32> {
        Some(99999)
    }

    fn take_stdout(&mut self) -> Option<Box<dyn Read + Send>> {
        self.stdout
            .take()
            .map(|b| Box::new(Cursor::new(b)) as Box<dyn Read + Send>)
    }

    fn take_stderr(&mut self) -> Option<Box<dyn Read + Send>> {
        self.stderr
            .take()
            .map(|b| Box::new(Cursor::new(b)) as Box<dyn Read + Send>)
    }

    fn wait(&mut self) -> io::Result<ExitOutcome> {
        Ok(ExitOutcome {
            code: if self.killed { None } else { Some(self.code) },
        })
    }

    fn kill(&mut self) -> io::Result<()> {
        self.killed = true;
        Ok(())
    }
}
