use crate::repository::{Repository, RepositoryDescriptor};
use serde::de::DeserializeOwned;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_VERSION: &str = "1.0.0";
pub const DEFAULT_MAIN: &str = "index.js";
pub const DEFAULT_LICENSE: &str = "ISC";
pub const DEFAULT_TEST_SCRIPT: &str = "echo \"Error: no test specified\" && exit 1";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse manifest '{}': {source}", path.display())]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to write manifest '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to serialize manifest: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("unsupported repository url '{0}', expected a git url")]
    UnsupportedRepositoryScheme(String),
}

impl ManifestError {
    /// True for failures to obtain a manifest from disk (absent or malformed).
    pub fn is_read_failure(&self) -> bool {
        matches!(self, Self::Read { .. } | Self::Malformed { .. })
    }
}

/// `author` as npm accepts it: a plain string or a person object.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Author {
    Name(String),
    Person {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        email: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },
}

/// In-memory `package.json`.
///
/// Known fields are typed when their value has the expected shape; anything
/// else, including a known field of another shape, is kept verbatim in
/// `extra` and written back after the typed fields. A key present in `extra`
/// replaces the typed field of the same name on output. Dependency maps are
/// always written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    pub name: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
    pub main: Option<String>,
    pub scripts: Option<BTreeMap<String, String>>,
    pub repository: Option<Repository>,
    pub keywords: Option<Vec<String>>,
    pub author: Option<Author>,
    pub license: Option<String>,
    pub dependencies: BTreeMap<String, String>,
    pub dev_dependencies: BTreeMap<String, String>,
    pub extra: Map<String, Value>,
}

impl Serialize for Manifest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let extra = &self.extra;
        let mut map = serializer.serialize_map(None)?;
        typed_entry(&mut map, extra, "name", self.name.as_ref())?;
        typed_entry(&mut map, extra, "version", self.version.as_ref())?;
        typed_entry(&mut map, extra, "description", self.description.as_ref())?;
        typed_entry(&mut map, extra, "main", self.main.as_ref())?;
        typed_entry(&mut map, extra, "scripts", self.scripts.as_ref())?;
        typed_entry(&mut map, extra, "repository", self.repository.as_ref())?;
        typed_entry(&mut map, extra, "keywords", self.keywords.as_ref())?;
        typed_entry(&mut map, extra, "author", self.author.as_ref())?;
        typed_entry(&mut map, extra, "license", self.license.as_ref())?;
        typed_entry(&mut map, extra, "dependencies", Some(&self.dependencies))?;
        typed_entry(&mut map, extra, "devDependencies", Some(&self.dev_dependencies))?;
        for (key, value) in extra {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Manifest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Map::<String, Value>::deserialize(deserializer).map(Self::from_object)
    }
}

fn typed_entry<M: SerializeMap, T: Serialize>(
    map: &mut M,
    extra: &Map<String, Value>,
    key: &str,
    value: Option<&T>,
) -> Result<(), M::Error> {
    match value {
        Some(value) if !extra.contains_key(key) => map.serialize_entry(key, value),
        _ => Ok(()),
    }
}

/// Remove `key` from `object` if its value deserializes as `T`.
fn take<T: DeserializeOwned>(object: &mut Map<String, Value>, key: &str) -> Option<T> {
    let typed = T::deserialize(object.get(key)?).ok()?;
    object.remove(key);
    Some(typed)
}

/// Caller input for initializing a package.
///
/// `dependencies`/`dev_dependencies` are specifiers to install, not version
/// maps; `custom` is merged into the written manifest last.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct PackageConfig {
    pub name: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
    pub main: Option<String>,
    pub scripts: Option<BTreeMap<String, String>>,
    pub repository: Option<String>,
    pub keywords: Option<Vec<String>>,
    pub author: Option<String>,
    pub license: Option<String>,
    pub dependencies: Vec<String>,
    pub dev_dependencies: Vec<String>,
    pub custom: Map<String, Value>,
}

impl Manifest {
    /// Build the manifest written by initialization.
    ///
    /// With `fill_defaults`, omitted (or empty) fields get npm's `init`
    /// defaults and the name falls back to the last segment of `directory`.
    /// Custom fields are merged last and win over computed ones.
    pub fn build(
        config: &PackageConfig,
        fill_defaults: bool,
        directory: &Path,
    ) -> Result<Self, ManifestError> {
        let repository = config
            .repository
            .as_deref()
            .map(RepositoryDescriptor::from_specifier)
            .transpose()?
            .map(Repository::Descriptor);

        let mut manifest = Self {
            name: config.name.clone(),
            version: config.version.clone(),
            description: config.description.clone(),
            main: config.main.clone(),
            scripts: config.scripts.clone(),
            repository,
            keywords: config.keywords.clone(),
            author: config.author.clone().map(Author::Name),
            license: config.license.clone(),
            dependencies: BTreeMap::new(),
            dev_dependencies: BTreeMap::new(),
            extra: Map::new(),
        };

        if fill_defaults {
            manifest.fill_defaults(directory);
        }

        manifest.merge(config.custom.clone())?;
        Ok(manifest)
    }

    fn fill_defaults(&mut self, directory: &Path) {
        fill(&mut self.name, || directory_name(directory));
        fill(&mut self.version, || DEFAULT_VERSION.to_owned());
        fill(&mut self.description, String::new);
        fill(&mut self.main, || DEFAULT_MAIN.to_owned());
        fill(&mut self.license, || DEFAULT_LICENSE.to_owned());
        self.scripts
            .get_or_insert_with(BTreeMap::new)
            .entry("test".to_owned())
            .or_insert_with(|| DEFAULT_TEST_SCRIPT.to_owned());
        self.keywords.get_or_insert_with(Vec::new);
        if self.author.is_none() {
            self.author = Some(Author::Name(String::new()));
        }
    }

    /// Split a JSON object into typed fields and `extra`. Never fails: a
    /// value that does not fit its typed field stays in `extra`.
    pub fn from_object(mut object: Map<String, Value>) -> Self {
        Self {
            name: take(&mut object, "name"),
            version: take(&mut object, "version"),
            description: take(&mut object, "description"),
            main: take(&mut object, "main"),
            scripts: take(&mut object, "scripts"),
            repository: take(&mut object, "repository"),
            keywords: take(&mut object, "keywords"),
            author: take(&mut object, "author"),
            license: take(&mut object, "license"),
            dependencies: take(&mut object, "dependencies").unwrap_or_default(),
            dev_dependencies: take(&mut object, "devDependencies").unwrap_or_default(),
            extra: object,
        }
    }

    /// Apply extra fields on top of the current ones. Same-named keys
    /// override typed fields whatever the value's type (last write wins).
    pub fn merge(&mut self, custom: Map<String, Value>) -> Result<(), ManifestError> {
        if custom.is_empty() {
            return Ok(());
        }
        let mut object = self.to_object()?;
        object.extend(custom);
        *self = Self::from_object(object);
        Ok(())
    }

    /// Flat JSON object as written to disk.
    pub fn to_object(&self) -> Result<Map<String, Value>, ManifestError> {
        match serde_json::to_value(self)? {
            Value::Object(object) => Ok(object),
            _ => Err(ManifestError::Serialize(serde::ser::Error::custom(
                "manifest did not serialize to an object",
            ))),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ManifestError::Malformed {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Replace the file at `path` with this manifest.
    ///
    /// Written to a temp file in the same directory and renamed into place.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ManifestError> {
        let path = path.as_ref();
        let mut content = serde_json::to_string_pretty(self)?;
        content.push('\n');

        let write_err = |source: std::io::Error| ManifestError::Write {
            path: path.to_path_buf(),
            source,
        };
        let dir = path.parent().unwrap_or(Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
        std::io::Write::write_all(&mut tmp, content.as_bytes()).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(path).map_err(|e| write_err(e.error))?;
        Ok(())
    }

    pub fn dependency_map(&self, dev: bool) -> &BTreeMap<String, String> {
        if dev {
            &self.dev_dependencies
        } else {
            &self.dependencies
        }
    }

    pub fn dependency_map_mut(&mut self, dev: bool) -> &mut BTreeMap<String, String> {
        if dev {
            &mut self.dev_dependencies
        } else {
            &mut self.dependencies
        }
    }

    pub fn has_dependency(&self, key: &str, dev: bool) -> bool {
        self.dependency_map(dev).contains_key(key)
    }

    pub fn dependency_version(&self, key: &str, dev: bool) -> Option<&str> {
        self.dependency_map(dev).get(key).map(String::as_str)
    }

    pub fn script(&self, name: &str) -> Option<&str> {
        self.scripts.as_ref()?.get(name).map(String::as_str)
    }
}

fn fill(field: &mut Option<String>, default: impl FnOnce() -> String) {
    if field.as_deref().map_or(true, str::is_empty) {
        *field = Some(default());
    }
}

fn directory_name(directory: &Path) -> String {
    directory
        .components()
        .next_back()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .unwrap_or_default()
}
