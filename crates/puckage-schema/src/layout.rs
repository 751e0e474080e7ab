use crate::types::DependencyKey;
use std::path::{Path, PathBuf};

pub const MANIFEST_FILE: &str = "package.json";
pub const DEPENDENCY_DIR: &str = "node_modules";

/// Directory layout of a package: its manifest, dependency directory, and
/// the per-dependency sharing links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageLayout {
    root: PathBuf,
    manifest_file: String,
    dependency_dir: String,
}

impl PackageLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_names(root, MANIFEST_FILE, DEPENDENCY_DIR)
    }

    pub fn with_names(root: impl Into<PathBuf>, manifest_file: &str, dependency_dir: &str) -> Self {
        Self {
            root: root.into(),
            manifest_file: manifest_file.to_owned(),
            dependency_dir: dependency_dir.to_owned(),
        }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(&self.manifest_file)
    }

    #[inline]
    pub fn dependency_dir(&self) -> PathBuf {
        self.root.join(&self.dependency_dir)
    }

    /// Directory a dependency is installed into. Only the key's plain
    /// segments are joined, so the result never leaves the dependency
    /// directory.
    pub fn dependency_path(&self, key: &DependencyKey) -> PathBuf {
        key.components()
            .fold(self.dependency_dir(), |path, part| path.join(part))
    }

    /// Where the sharing link for `key` lives: the dependency's own
    /// dependency directory.
    #[inline]
    pub fn dependency_link(&self, key: &DependencyKey) -> PathBuf {
        self.dependency_path(key).join(&self.dependency_dir)
    }

    /// Link target for [`dependency_link`](Self::dependency_link), relative to
    /// the directory holding the link, so it resolves to this package's
    /// dependency directory wherever the package is mounted.
    pub fn link_target(key: &DependencyKey) -> PathBuf {
        (0..key.depth()).fold(PathBuf::new(), |path, _| path.join(".."))
    }

    /// Layout for a package installed under this one.
    pub fn child(&self, key: &DependencyKey) -> Self {
        Self {
            root: self.dependency_path(key),
            manifest_file: self.manifest_file.clone(),
            dependency_dir: self.dependency_dir.clone(),
        }
    }
}
