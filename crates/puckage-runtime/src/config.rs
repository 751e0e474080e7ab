use crate::RuntimeError;
use puckage_schema::{PackageLayout, DEPENDENCY_DIR, MANIFEST_FILE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding the installer program.
pub const INSTALLER_ENV: &str = "PUCKAGE_INSTALLER";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct InstallerConfig {
    /// Installer executable, looked up on `PATH`.
    pub program: String,
    pub dependency_dir: String,
    pub manifest_file: String,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            program: "npm".to_owned(),
            dependency_dir: DEPENDENCY_DIR.to_owned(),
            manifest_file: MANIFEST_FILE.to_owned(),
        }
    }
}

impl InstallerConfig {
    /// Defaults, with the program taken from `PUCKAGE_INSTALLER` when set.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(program) = std::env::var(INSTALLER_ENV) {
            let program = program.trim();
            if !program.is_empty() {
                program.clone_into(&mut config.program);
            }
        }
        config
    }

    #[must_use]
    pub fn with_program(mut self, program: &str) -> Self {
        program.clone_into(&mut self.program);
        self
    }

    pub fn load(path: &Path) -> Result<Self, RuntimeError> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| RuntimeError::Config(format!("invalid installer config: {e}")))
    }

    pub fn save(&self, path: &Path) -> Result<(), RuntimeError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| RuntimeError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Package layout rooted at `root` using this config's file names.
    pub fn layout(&self, root: impl Into<PathBuf>) -> PackageLayout {
        PackageLayout::with_names(root, &self.manifest_file, &self.dependency_dir)
    }
}
