//! Package directory management for Puckage.
//!
//! This crate ties together the manifest model and the installer runtime into
//! the `Package` handle, the central API for initializing a package
//! directory, installing and removing dependencies through an external
//! installer, running scripts, and inspecting installed dependencies.

pub mod package;
pub mod paths;

pub use package::{
    InitOptions, InstallOptions, IntoSpecifiers, Package, ReloadOptions, RunOptions,
    UninstallOptions, DEFAULT_SCRIPT,
};
pub use paths::normalize_path;

pub use puckage_runtime::{
    CaptureBuffer, FailureDetail, Installer, MockInstaller, NpmInstaller, PipeConfig,
    RunningScript, Sink,
};
pub use puckage_schema::{normalize, DependencyKey, Manifest, PackageConfig};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("manifest error: {0}")]
    Manifest(#[from] puckage_schema::ManifestError),
    #[error("runtime error: {0}")]
    Runtime(#[from] puckage_runtime::RuntimeError),
    #[error("package.json already exists: {}", .0.display())]
    ManifestAlreadyExists(PathBuf),
    #[error("failed to link dependency directory '{}': {source}", link.display())]
    SymlinkFailure {
        link: PathBuf,
        source: std::io::Error,
    },
    #[error("dependency does not exist: {0}")]
    DependencyNotFound(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// The manifest could not be read from disk (absent or malformed).
    pub fn is_manifest_read_failure(&self) -> bool {
        match self {
            Self::Manifest(e) | Self::Runtime(puckage_runtime::RuntimeError::Manifest(e)) => {
                e.is_read_failure()
            }
            _ => false,
        }
    }

    /// Exit code and stderr (or spawn error) of a failed installer process.
    pub fn failure_detail(&self) -> Option<&FailureDetail> {
        use puckage_runtime::RuntimeError;
        match self {
            Self::Runtime(
                RuntimeError::InstallerFailure(detail) | RuntimeError::UninstallerFailure(detail),
            ) => Some(detail),
            _ => None,
        }
    }
}
