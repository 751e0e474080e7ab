use crate::installer::{Action, ChildProcess, ExitOutcome, Installer, InstallerCommand};
use crate::pipe::{CaptureBuffer, PipeConfig, Sink};
use crate::{FailureDetail, RuntimeError};
use std::fmt;
use std::io::{self, Read, Write};
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// Lifecycle of a single installer invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationState {
    Idle,
    Spawned,
    Streaming,
    Exited { success: bool },
}

impl fmt::Display for InvocationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Spawned => f.write_str("spawned"),
            Self::Streaming => f.write_str("streaming"),
            Self::Exited { success: true } => f.write_str("exited(success)"),
            Self::Exited { success: false } => f.write_str("exited(failure)"),
        }
    }
}

pub fn validate_transition(from: InvocationState, to: InvocationState) -> Result<(), RuntimeError> {
    use InvocationState::{Exited, Idle, Spawned, Streaming};

    let valid = matches!(
        (from, to),
        (Idle, Spawned | Exited { success: false })
            | (Spawned, Streaming)
            | (Spawned | Streaming, Exited { .. })
    );

    if valid {
        Ok(())
    } else {
        Err(RuntimeError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

type Forwarder = JoinHandle<io::Result<()>>;

/// One installer process from spawn to exit.
///
/// The pipe configuration is a snapshot taken when the invocation is
/// created; resetting the owner's configuration afterwards is the owner's
/// job.
pub struct Invocation {
    command: InstallerCommand,
    pipe: PipeConfig,
    state: InvocationState,
    child: Option<Box<dyn ChildProcess>>,
    forwarders: Vec<Forwarder>,
    stderr_capture: CaptureBuffer,
}

impl Invocation {
    pub fn new(command: InstallerCommand, pipe: PipeConfig) -> Self {
        Self {
            command,
            pipe,
            state: InvocationState::Idle,
            child: None,
            forwarders: Vec::new(),
            stderr_capture: CaptureBuffer::new(),
        }
    }

    pub fn state(&self) -> InvocationState {
        self.state
    }

    pub fn command(&self) -> &InstallerCommand {
        &self.command
    }

    fn transition(&mut self, to: InvocationState) -> Result<(), RuntimeError> {
        validate_transition(self.state, to)?;
        debug!("invocation '{}': {} -> {to}", self.command, self.state);
        self.state = to;
        Ok(())
    }

    pub fn spawn(&mut self, installer: &dyn Installer) -> Result<(), RuntimeError> {
        validate_transition(self.state, InvocationState::Spawned)?;
        match installer.spawn(&self.command) {
            Ok(child) => {
                self.child = Some(child);
                self.transition(InvocationState::Spawned)
            }
            Err(e) => {
                self.transition(InvocationState::Exited { success: false })?;
                Err(e)
            }
        }
    }

    /// Connect the child's output to the configured sinks.
    ///
    /// Streams are piped at spawn, so nothing written before this call is
    /// lost. Install/uninstall output without a sink is drained, and stderr is
    /// always captured for failure reports. A script run leaves unforwarded
    /// streams for the caller to take.
    pub fn attach(&mut self) -> Result<(), RuntimeError> {
        validate_transition(self.state, InvocationState::Streaming)?;
        let Some(child) = self.child.as_mut() else {
            return Err(RuntimeError::InvalidTransition {
                from: self.state.to_string(),
                to: InvocationState::Streaming.to_string(),
            });
        };

        let interactive = self.command.action == Action::Run;
        if self.pipe.stdout.is_some() || !interactive {
            if let Some(reader) = child.take_stdout() {
                self.forwarders
                    .push(forward(reader, self.pipe.stdout.clone(), None));
            }
        }
        if self.pipe.stderr.is_some() || !interactive {
            let capture = (!interactive).then(|| self.stderr_capture.clone());
            if let Some(reader) = child.take_stderr() {
                self.forwarders
                    .push(forward(reader, self.pipe.stderr.clone(), capture));
            }
        }

        self.transition(InvocationState::Streaming)
    }

    /// Wait for the process and for all forwarded output to be written.
    pub fn wait(&mut self) -> Result<ExitOutcome, RuntimeError> {
        validate_transition(self.state, InvocationState::Exited { success: true })?;
        let Some(child) = self.child.as_mut() else {
            return Err(RuntimeError::InvalidTransition {
                from: self.state.to_string(),
                to: InvocationState::Exited { success: true }.to_string(),
            });
        };

        let waited = child.wait();
        join_forwarders(&mut self.forwarders);
        match waited {
            Ok(outcome) => {
                self.transition(InvocationState::Exited {
                    success: outcome.success(),
                })?;
                Ok(outcome)
            }
            Err(e) => {
                self.transition(InvocationState::Exited { success: false })?;
                Err(e.into())
            }
        }
    }

    /// Run an install or uninstall to completion.
    ///
    /// Spawn errors and unsuccessful exits become `InstallerFailure` or
    /// `UninstallerFailure`, carrying the exit code and captured stderr.
    pub fn complete(&mut self, installer: &dyn Installer) -> Result<ExitOutcome, RuntimeError> {
        let action = self.command.action;
        match self.spawn(installer) {
            Ok(()) => {}
            Err(RuntimeError::Spawn { program, source }) => {
                return Err(failure(
                    action,
                    FailureDetail::Spawn(format!("{program}: {source}")),
                ));
            }
            Err(e) => return Err(e),
        }
        self.attach()?;

        let outcome = self.wait()?;
        if outcome.success() {
            Ok(outcome)
        } else {
            Err(failure(
                action,
                FailureDetail::Exit {
                    code: outcome.code,
                    stderr: self.stderr_capture.contents(),
                },
            ))
        }
    }

    /// Spawn and attach, then hand the live process to the caller.
    pub fn start(mut self, installer: &dyn Installer) -> Result<RunningScript, RuntimeError> {
        self.spawn(installer)?;
        self.attach()?;
        let Some(child) = self.child.take() else {
            return Err(RuntimeError::InvalidTransition {
                from: self.state.to_string(),
                to: InvocationState::Streaming.to_string(),
            });
        };
        Ok(RunningScript {
            command: self.command,
            child,
            forwarders: self.forwarders,
            state: self.state,
        })
    }
}

fn failure(action: Action, detail: FailureDetail) -> RuntimeError {
    match action {
        Action::Uninstall => RuntimeError::UninstallerFailure(detail),
        Action::Install | Action::Run => RuntimeError::InstallerFailure(detail),
    }
}

/// Copy `reader` into `sink` (and `capture`) until EOF.
///
/// The sink is flushed, never closed. A failing sink stops receiving data but
/// the stream is still drained so the child cannot block on a full pipe.
fn forward(
    mut reader: Box<dyn Read + Send>,
    sink: Option<Sink>,
    mut capture: Option<CaptureBuffer>,
) -> Forwarder {
    thread::spawn(move || {
        let mut buf = [0u8; 8192];
        let mut sink_error = None;
        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            if let Some(capture) = capture.as_mut() {
                capture.write_all(&buf[..n])?;
            }
            if sink_error.is_none() {
                if let Some(sink) = &sink {
                    sink_error = sink.write_all(&buf[..n]).err();
                }
            }
        }
        if let Some(e) = sink_error {
            return Err(e);
        }
        if let Some(sink) = &sink {
            sink.flush()?;
        }
        Ok(())
    })
}

fn join_forwarders(forwarders: &mut Vec<Forwarder>) {
    for handle in forwarders.drain(..) {
        match handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("output forwarding failed: {e}"),
            Err(_) => warn!("output forwarding thread panicked"),
        }
    }
}

/// A script started by `run`, still executing.
///
/// Streams with a configured sink are already being forwarded; the others
/// stay piped and should be taken and read, or the script may block once the
/// pipe fills.
pub struct RunningScript {
    command: InstallerCommand,
    child: Box<dyn ChildProcess>,
    forwarders: Vec<Forwarder>,
    state: InvocationState,
}

impl fmt::Debug for RunningScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunningScript")
            .field("command", &self.command)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl RunningScript {
    pub fn script(&self) -> &str {
        self.command.operands.first().map_or("", String::as_str)
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn state(&self) -> InvocationState {
        self.state
    }

    pub fn take_stdout(&mut self) -> Option<Box<dyn Read + Send>> {
        self.child.take_stdout()
    }

    pub fn take_stderr(&mut self) -> Option<Box<dyn Read + Send>> {
        self.child.take_stderr()
    }

    pub fn kill(&mut self) -> Result<(), RuntimeError> {
        debug!("killing script '{}'", self.script());
        self.child.kill().map_err(RuntimeError::from)
    }

    /// Wait for the script to exit and its forwarded output to be written.
    pub fn wait(&mut self) -> Result<ExitOutcome, RuntimeError> {
        validate_transition(self.state, InvocationState::Exited { success: true })?;
        let waited = self.child.wait();
        join_forwarders(&mut self.forwarders);
        let outcome = match waited {
            Ok(outcome) => outcome,
            Err(e) => {
                self.state = InvocationState::Exited { success: false };
                return Err(e.into());
            }
        };
        self.state = InvocationState::Exited {
            success: outcome.success(),
        };
        debug!("script '{}' {}", self.script(), self.state);
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockInstaller, MockProcess};
    use crate::InstallerConfig;
    use puckage_schema::Manifest;
    use std::collections::BTreeMap;
    use std::path::Path;

    struct CannedInstaller {
        config: InstallerConfig,
        stdout: &'static str,
        stderr: &'static str,
        code: i32,
    }

    impl CannedInstaller {
        fn new(stdout: &'static str, stderr: &'static str, code: i32) -> Self {
            Self {
                config: InstallerConfig::default(),
                stdout,
                stderr,
                code,
            }
        }
    }

    impl Installer for CannedInstaller {
        fn name(&self) -> &'static str {
            "canned"
        }

        fn available(&self) -> bool {
            true
        }

        fn config(&self) -> &InstallerConfig {
            &self.config
        }

        fn spawn(
            &self,
            _command: &InstallerCommand,
        ) -> Result<Box<dyn ChildProcess>, RuntimeError> {
            Ok(Box::new(MockProcess::new(self.stdout, self.stderr, self.code)))
        }
    }

    fn install_cmd(specs: &[&str]) -> InstallerCommand {
        let specs: Vec<String> = specs.iter().map(|s| (*s).to_owned()).collect();
        InstallerCommand::install(Path::new("."), &specs, None)
    }

    #[test]
    fn valid_transitions() {
        use InvocationState::{Exited, Idle, Spawned, Streaming};
        assert!(validate_transition(Idle, Spawned).is_ok());
        assert!(validate_transition(Idle, Exited { success: false }).is_ok());
        assert!(validate_transition(Spawned, Streaming).is_ok());
        assert!(validate_transition(Spawned, Exited { success: true }).is_ok());
        assert!(validate_transition(Streaming, Exited { success: true }).is_ok());
        assert!(validate_transition(Streaming, Exited { success: false }).is_ok());
    }

    #[test]
    fn invalid_transitions() {
        use InvocationState::{Exited, Idle, Spawned, Streaming};
        assert!(validate_transition(Idle, Streaming).is_err());
        assert!(validate_transition(Idle, Exited { success: true }).is_err());
        assert!(validate_transition(Streaming, Spawned).is_err());
        assert!(validate_transition(Exited { success: true }, Idle).is_err());
        assert!(validate_transition(Exited { success: false }, Exited { success: false }).is_err());
    }

    #[test]
    fn complete_forwards_to_sinks() {
        let out = CaptureBuffer::new();
        let err = CaptureBuffer::new();
        let pipe = PipeConfig::new(Some(out.clone().into()), Some(err.clone().into()), false);
        let installer = CannedInstaller::new("added node-foo\n", "warn deprecated\n", 0);

        let mut invocation = Invocation::new(install_cmd(&["node-foo"]), pipe);
        assert_eq!(invocation.state(), InvocationState::Idle);
        let outcome = invocation.complete(&installer).unwrap();

        assert!(outcome.success());
        assert_eq!(invocation.state(), InvocationState::Exited { success: true });
        assert_eq!(out.contents(), "added node-foo\n");
        assert_eq!(err.contents(), "warn deprecated\n");
    }

    #[test]
    fn sink_stays_usable_across_invocations() {
        let out = CaptureBuffer::new();
        let sink: Sink = out.clone().into();
        let installer = CannedInstaller::new("line\n", "", 0);

        for _ in 0..2 {
            let pipe = PipeConfig::new(Some(sink.clone()), None, true);
            Invocation::new(install_cmd(&["a"]), pipe)
                .complete(&installer)
                .unwrap();
        }
        assert_eq!(out.contents(), "line\nline\n");
    }

    #[test]
    fn failure_carries_code_and_stderr() {
        let installer = CannedInstaller::new("", "npm ERR! 404 nope\n", 1);
        let mut invocation = Invocation::new(install_cmd(&["nope"]), PipeConfig::default());
        let err = invocation.complete(&installer).unwrap_err();

        match err {
            RuntimeError::InstallerFailure(FailureDetail::Exit { code, stderr }) => {
                assert_eq!(code, Some(1));
                assert!(stderr.contains("404"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(invocation.state(), InvocationState::Exited { success: false });
    }

    #[test]
    fn uninstall_failure_kind() {
        let installer = CannedInstaller::new("", "bad\n", 2);
        let cmd = InstallerCommand::uninstall(Path::new("."), &["x".to_owned()], None);
        let err = Invocation::new(cmd, PipeConfig::default())
            .complete(&installer)
            .unwrap_err();
        assert!(matches!(err, RuntimeError::UninstallerFailure(_)));
    }

    #[test]
    fn spawn_error_becomes_installer_failure() {
        let mock = MockInstaller::new();
        let cmd = InstallerCommand::install(Path::new("/nonexistent/puckage"), &[], None);
        let mut invocation = Invocation::new(cmd, PipeConfig::default());
        let err = invocation.complete(&mock).unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::InstallerFailure(FailureDetail::Spawn(_))
        ));
        assert_eq!(invocation.state(), InvocationState::Exited { success: false });
    }

    #[test]
    fn steps_out_of_order_rejected() {
        let installer = CannedInstaller::new("", "", 0);
        let mut invocation = Invocation::new(install_cmd(&["a"]), PipeConfig::default());
        assert!(matches!(
            invocation.attach(),
            Err(RuntimeError::InvalidTransition { .. })
        ));
        invocation.spawn(&installer).unwrap();
        invocation.attach().unwrap();
        assert!(invocation.attach().is_err());
        invocation.wait().unwrap();
        assert!(invocation.wait().is_err());
    }

    #[test]
    fn run_leaves_unforwarded_streams_to_caller() {
        let dir = tempfile::tempdir().unwrap();
        Manifest {
            name: Some("foo".to_owned()),
            version: Some("1.0.0".to_owned()),
            scripts: Some(BTreeMap::from([(
                "start".to_owned(),
                "node index.js".to_owned(),
            )])),
            ..Manifest::default()
        }
        .save(dir.path().join("package.json"))
        .unwrap();

        let err = CaptureBuffer::new();
        let pipe = PipeConfig::new(None, Some(err.clone().into()), false);
        let cmd = InstallerCommand::run(dir.path(), "start", BTreeMap::new());
        let mut script = Invocation::new(cmd, pipe)
            .start(&MockInstaller::new())
            .unwrap();

        assert_eq!(script.state(), InvocationState::Streaming);
        assert_eq!(script.script(), "start");
        assert!(script.take_stderr().is_none());
        let mut out = String::new();
        script
            .take_stdout()
            .unwrap()
            .read_to_string(&mut out)
            .unwrap();
        assert!(out.contains("> node index.js"));

        assert!(script.wait().unwrap().success());
        assert!(script.wait().is_err());
    }
}
