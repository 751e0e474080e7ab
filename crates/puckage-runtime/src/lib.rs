//! Installer process orchestration for Puckage.
//!
//! This crate implements the execution layer: the pluggable `Installer` trait
//! with the real `npm` implementation and an in-process mock, the
//! per-invocation `Invocation` state machine that spawns the installer and
//! forwards its output, the `PipeConfig` output-sink contract, installer
//! configuration, and prerequisite checking.

pub mod config;
pub mod installer;
pub mod invocation;
pub mod mock;
pub mod npm;
pub mod pipe;
pub mod prereq;

pub use config::{InstallerConfig, INSTALLER_ENV};
pub use installer::{Action, ChildProcess, ExitOutcome, Installer, InstallerCommand, SaveFlag};
pub use invocation::{validate_transition, Invocation, InvocationState, RunningScript};
pub use mock::MockInstaller;
pub use npm::NpmInstaller;
pub use pipe::{CaptureBuffer, PipeConfig, Sink};
pub use prereq::{check_installer_prereqs, format_missing, MissingPrereq};

use std::fmt;
use thiserror::Error;

/// Why an installer process did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureDetail {
    /// The process ran and exited unsuccessfully. `code` is `None` when it was
    /// terminated by a signal.
    Exit { code: Option<i32>, stderr: String },
    /// The process could not be started.
    Spawn(String),
}

impl fmt::Display for FailureDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exit { code, stderr } => {
                match code {
                    Some(code) => write!(f, "exited with code {code}")?,
                    None => f.write_str("terminated by signal")?,
                }
                let stderr = stderr.trim();
                if !stderr.is_empty() {
                    write!(f, ": {stderr}")?;
                }
                Ok(())
            }
            Self::Spawn(msg) => write!(f, "failed to start: {msg}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("installer failed: {0}")]
    InstallerFailure(FailureDetail),
    #[error("uninstaller failed: {0}")]
    UninstallerFailure(FailureDetail),
    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("invalid invocation transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("installer config error: {0}")]
    Config(String),
    #[error("manifest error: {0}")]
    Manifest(#[from] puckage_schema::ManifestError),
}
