use crate::paths::normalize_path;
use crate::CoreError;
use puckage_runtime::{
    Installer, InstallerCommand, Invocation, NpmInstaller, PipeConfig, RunningScript, SaveFlag,
    Sink,
};
use puckage_schema::{normalize, DependencyKey, Manifest, PackageConfig, PackageLayout};
use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Script started by [`Package::run`] when none is named.
pub const DEFAULT_SCRIPT: &str = "start";

#[derive(Debug, Clone, Copy, Default)]
pub struct InitOptions {
    /// Install the configured dependencies and dev dependencies, saving them.
    pub install_dependencies: bool,
    /// Fill omitted fields with npm's `init` defaults.
    pub fill_empty: bool,
    /// Replace an existing manifest.
    pub overwrite: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InstallOptions {
    pub save: bool,
    /// Record in `devDependencies`. Only has an effect with `save`.
    pub dev: bool,
    /// Link each installed dependency's own dependency directory back to
    /// this package's, so it resolves its dependencies from here.
    pub symlink: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UninstallOptions {
    pub save: bool,
    pub dev: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReloadOptions {
    /// Cache an empty manifest instead of failing when the file cannot be read.
    pub return_empty_on_err: bool,
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub script: String,
    /// Complete environment of the script. `None` passes only the caller's
    /// `PATH`.
    pub env: Option<BTreeMap<String, String>>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            script: DEFAULT_SCRIPT.to_owned(),
            env: None,
        }
    }
}

impl RunOptions {
    pub fn script(name: &str) -> Self {
        Self {
            script: name.to_owned(),
            ..Self::default()
        }
    }
}

/// One or several dependency specifiers.
pub trait IntoSpecifiers {
    fn into_specifiers(self) -> Vec<String>;
}

impl IntoSpecifiers for &str {
    fn into_specifiers(self) -> Vec<String> {
        vec![self.to_owned()]
    }
}

impl IntoSpecifiers for String {
    fn into_specifiers(self) -> Vec<String> {
        vec![self]
    }
}

impl IntoSpecifiers for Vec<String> {
    fn into_specifiers(self) -> Vec<String> {
        self
    }
}

impl IntoSpecifiers for Vec<&str> {
    fn into_specifiers(self) -> Vec<String> {
        self.into_iter().map(str::to_owned).collect()
    }
}

impl IntoSpecifiers for &[String] {
    fn into_specifiers(self) -> Vec<String> {
        self.to_vec()
    }
}

impl IntoSpecifiers for &[&str] {
    fn into_specifiers(self) -> Vec<String> {
        self.iter().map(|s| (*s).to_owned()).collect()
    }
}

impl<const N: usize> IntoSpecifiers for [&str; N] {
    fn into_specifiers(self) -> Vec<String> {
        self.iter().map(|s| (*s).to_owned()).collect()
    }
}

/// Handle on a package directory.
///
/// Holds the normalized directory path, the manifest as last loaded or
/// written (`None` until then), the output pipe configuration, and the
/// installer used for install, uninstall, and run. Calls on one handle are
/// serialized by `&mut self`; independent handles share nothing but the
/// installer.
pub struct Package {
    layout: PackageLayout,
    manifest: Option<Manifest>,
    pipe: PipeConfig,
    installer: Arc<dyn Installer>,
}

impl fmt::Debug for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Package")
            .field("path", &self.layout.root())
            .field("manifest", &self.manifest)
            .field("pipe", &self.pipe)
            .field("installer", &self.installer.name())
            .finish()
    }
}

impl Package {
    /// Handle on `directory` using `npm`. Does not touch the filesystem.
    pub fn new(directory: impl AsRef<Path>) -> Self {
        Self::with_installer(directory, Arc::new(NpmInstaller::default()))
    }

    pub fn with_installer(directory: impl AsRef<Path>, installer: Arc<dyn Installer>) -> Self {
        let root = normalize_path(directory.as_ref());
        Self {
            layout: installer.config().layout(root),
            manifest: None,
            pipe: PipeConfig::default(),
            installer,
        }
    }

    /// Create `directory` (and missing parents) and return a handle on it.
    pub fn create(directory: impl AsRef<Path>) -> Result<Self, CoreError> {
        Self::create_with_installer(directory, Arc::new(NpmInstaller::default()))
    }

    pub fn create_with_installer(
        directory: impl AsRef<Path>,
        installer: Arc<dyn Installer>,
    ) -> Result<Self, CoreError> {
        let package = Self::with_installer(directory, installer);
        std::fs::create_dir_all(package.path())?;
        debug!("created package directory {}", package.path().display());
        Ok(package)
    }

    pub fn path(&self) -> &Path {
        self.layout.root()
    }

    pub fn layout(&self) -> &PackageLayout {
        &self.layout
    }

    /// Manifest as of the last initialize or reload.
    pub fn manifest(&self) -> Option<&Manifest> {
        self.manifest.as_ref()
    }

    pub fn pipe_config(&self) -> &PipeConfig {
        &self.pipe
    }

    pub fn installer(&self) -> &dyn Installer {
        self.installer.as_ref()
    }

    /// Stream installer output of the next invocation to the given sinks, or
    /// of every invocation when `persistent`. Replaces any earlier
    /// configuration.
    pub fn pipe(&mut self, stdout: Option<Sink>, stderr: Option<Sink>, persistent: bool) -> &mut Self {
        self.pipe = PipeConfig::new(stdout, stderr, persistent);
        self
    }

    /// Write a new manifest built from `config`, optionally installing its
    /// dependencies.
    ///
    /// Production dependencies are installed first, then dev dependencies,
    /// each saved to the manifest.
    pub fn initialize(
        &mut self,
        config: &PackageConfig,
        options: InitOptions,
    ) -> Result<&mut Self, CoreError> {
        info!("initializing package in {}", self.path().display());

        if !self.path().is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("package directory does not exist: {}", self.path().display()),
            )
            .into());
        }

        let manifest_path = self.layout.manifest_path();
        if manifest_path.exists() {
            if !options.overwrite {
                return Err(CoreError::ManifestAlreadyExists(manifest_path));
            }
            debug!("overwriting {}", manifest_path.display());
        }

        let manifest = Manifest::build(config, options.fill_empty, self.path())?;
        manifest.save(&manifest_path)?;
        debug!("saved {}", manifest_path.display());
        self.manifest = Some(manifest);

        if options.install_dependencies {
            for (specifiers, dev) in [(&config.dependencies, false), (&config.dev_dependencies, true)] {
                if specifiers.is_empty() {
                    continue;
                }
                self.install(
                    specifiers.as_slice(),
                    InstallOptions {
                        save: true,
                        dev,
                        symlink: false,
                    },
                )?;
            }
        }

        Ok(self)
    }

    /// Re-read the manifest from disk into the cache.
    ///
    /// On a failed read the cache is cleared and the error returned, unless
    /// `return_empty_on_err` asks for an empty manifest instead.
    pub fn reload_manifest(&mut self, options: ReloadOptions) -> Result<&mut Self, CoreError> {
        match Manifest::load(self.layout.manifest_path()) {
            Ok(manifest) => {
                self.manifest = Some(manifest);
                Ok(self)
            }
            Err(e) if options.return_empty_on_err => {
                warn!("using empty manifest for {}: {e}", self.path().display());
                self.manifest = Some(Manifest::default());
                Ok(self)
            }
            Err(e) => {
                self.manifest = None;
                Err(e.into())
            }
        }
    }

    /// Install `specifiers` with a single installer invocation.
    ///
    /// With no specifiers, installs whatever the manifest declares. The
    /// manifest cache is reloaded after a saving install.
    pub fn install(
        &mut self,
        specifiers: impl IntoSpecifiers,
        options: InstallOptions,
    ) -> Result<&mut Self, CoreError> {
        let specifiers = specifiers.into_specifiers();
        info!(
            "installing [{}] in {}",
            specifiers.join(", "),
            self.path().display()
        );

        let save = SaveFlag::from_options(options.save, options.dev);
        self.execute(InstallerCommand::install(self.path(), &specifiers, save))?;

        if options.symlink {
            for specifier in &specifiers {
                self.link_dependency(&normalize(specifier))?;
            }
        }
        if options.save {
            self.reload_manifest(ReloadOptions::default())?;
        }

        info!("installation successful for {}", self.path().display());
        Ok(self)
    }

    /// Remove `specifiers` with a single installer invocation.
    pub fn uninstall(
        &mut self,
        specifiers: impl IntoSpecifiers,
        options: UninstallOptions,
    ) -> Result<&mut Self, CoreError> {
        let specifiers = specifiers.into_specifiers();
        info!(
            "uninstalling [{}] from {}",
            specifiers.join(", "),
            self.path().display()
        );

        let save = SaveFlag::from_options(options.save, options.dev);
        self.execute(InstallerCommand::uninstall(self.path(), &specifiers, save))?;

        if options.save {
            self.reload_manifest(ReloadOptions::default())?;
        }

        info!("uninstall successful for {}", self.path().display());
        Ok(self)
    }

    /// Start a manifest script and return the live process.
    ///
    /// Streams with a configured sink are forwarded; the others are left on
    /// the returned handle. A non-persistent pipe configuration is consumed by
    /// this call.
    pub fn run(&mut self, options: RunOptions) -> Result<RunningScript, CoreError> {
        let env = options.env.unwrap_or_else(default_env);
        info!("running script '{}' in {}", options.script, self.path().display());

        let command = InstallerCommand::run(self.path(), &options.script, env);
        let started = Invocation::new(command, self.pipe.clone()).start(self.installer.as_ref());
        self.reset_pipe();
        let script = started?;
        debug!("script '{}' started (pid {:?})", script.script(), script.id());
        Ok(script)
    }

    /// Whether `specifier` is recorded in the manifest on disk.
    pub fn has_dependency(&self, specifier: &str, dev: bool) -> Result<bool, CoreError> {
        let key = normalize(specifier);
        let manifest = Manifest::load(self.layout.manifest_path())?;
        Ok(manifest.has_dependency(key.as_str(), dev))
    }

    /// Handle on an installed dependency.
    ///
    /// The handle inherits this handle's installer and a snapshot of its pipe
    /// configuration, made persistent when any sink is set. Nothing is
    /// installed; a dependency without a directory is `DependencyNotFound`.
    pub fn get_dependency(&self, specifier: &str) -> Result<Package, CoreError> {
        let key = normalize(specifier);
        let layout = self.layout.child(&key);
        if key.components().next().is_none() || !layout.root().exists() {
            debug!("no dependency directory at {}", layout.root().display());
            return Err(CoreError::DependencyNotFound(key.into_inner()));
        }

        Ok(Package {
            layout,
            manifest: None,
            pipe: self.pipe.inherited(),
            installer: Arc::clone(&self.installer),
        })
    }

    fn execute(&mut self, command: InstallerCommand) -> Result<(), CoreError> {
        let mut invocation = Invocation::new(command, self.pipe.clone());
        let result = invocation.complete(self.installer.as_ref());
        self.reset_pipe();
        result?;
        Ok(())
    }

    fn reset_pipe(&mut self) {
        if !self.pipe.persistent && !self.pipe.is_empty() {
            debug!("clearing non-persistent output pipe for {}", self.path().display());
        }
        self.pipe = self.pipe.after_exit();
    }

    fn link_dependency(&self, key: &DependencyKey) -> Result<(), CoreError> {
        let link = self.layout.dependency_link(key);
        if key.components().next().is_none() {
            return Err(CoreError::SymlinkFailure {
                link,
                source: io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("'{key}' does not name a dependency directory"),
                ),
            });
        }
        let target = PackageLayout::link_target(key);

        if std::fs::read_link(&link).is_ok_and(|existing| existing == target) {
            debug!("link {} already in place", link.display());
            return Ok(());
        }

        debug!("linking {} -> {}", link.display(), target.display());
        symlink_dir(&target, &link).map_err(|source| CoreError::SymlinkFailure { link, source })
    }
}

fn default_env() -> BTreeMap<String, String> {
    std::env::var_os("PATH")
        .map(|path| BTreeMap::from([("PATH".to_owned(), path.to_string_lossy().into_owned())]))
        .unwrap_or_default()
}

#[cfg(unix)]
fn symlink_dir(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink_dir(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_dir(target, link)
}

#[cfg(test)]
mod tests {
    use super::*;
    use puckage_runtime::MockInstaller;
    use std::path::PathBuf;

    #[test]
    fn new_normalizes_path_without_io() {
        let package = Package::new("/nonexistent//puckage/./app/../pkg");
        assert_eq!(package.path(), Path::new("/nonexistent/puckage/pkg"));
        assert!(package.manifest().is_none());
        assert!(package.pipe_config().is_empty());
        assert!(!package.pipe_config().persistent);
    }

    #[test]
    fn create_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a/b/c");
        let installer: Arc<dyn Installer> = Arc::new(MockInstaller::new());
        Package::create_with_installer(&target, Arc::clone(&installer)).unwrap();
        let package = Package::create_with_installer(&target, installer).unwrap();
        assert!(package.path().is_dir());
    }

    #[test]
    fn specifier_conversions() {
        assert_eq!("a".into_specifiers(), ["a"]);
        assert_eq!(String::from("a").into_specifiers(), ["a"]);
        assert_eq!(["a", "b"].into_specifiers(), ["a", "b"]);
        assert_eq!(vec!["a", "b"].into_specifiers(), ["a", "b"]);
        let owned = vec!["a".to_owned()];
        assert_eq!(owned.as_slice().into_specifiers(), ["a"]);
        assert!(Vec::<String>::new().into_specifiers().is_empty());
    }

    #[test]
    fn run_options_default_to_start() {
        assert_eq!(RunOptions::default().script, DEFAULT_SCRIPT);
        assert_eq!(RunOptions::script("foo").script, "foo");
        assert!(RunOptions::script("foo").env.is_none());
    }

    #[test]
    fn default_env_only_carries_path() {
        let env = default_env();
        assert!(env.keys().all(|k| k == "PATH"));
    }

    #[test]
    fn pipe_replaces_configuration() {
        let mut package = Package::with_installer("/w", Arc::new(MockInstaller::new()));
        package.pipe(Some(Sink::new(io::sink())), None, true);
        package.pipe(None, None, false);
        assert!(package.pipe_config().is_empty());
        assert!(!package.pipe_config().persistent);
    }

    #[test]
    fn debug_shows_path_and_installer() {
        let package = Package::with_installer(PathBuf::from("/w/app"), Arc::new(MockInstaller::new()));
        let debug = format!("{package:?}");
        assert!(debug.contains("/w/app"));
        assert!(debug.contains("mock"));
    }
}
