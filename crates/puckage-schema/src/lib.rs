//! `package.json` model, dependency specifier normalization, and package
//! directory layout for Puckage.
//!
//! This crate defines the schema layer: the `Manifest` record with its
//! extension map (`Manifest::build`, `Manifest::load`, `Manifest::save`),
//! repository descriptors derived from a single repository string, the
//! `normalize` function mapping specifiers onto canonical `node_modules`
//! keys, and `PackageLayout` for on-disk paths.

pub mod layout;
pub mod manifest;
pub mod repository;
pub mod specifier;
pub mod types;

pub use layout::{PackageLayout, DEPENDENCY_DIR, MANIFEST_FILE};
pub use manifest::{Author, Manifest, ManifestError, PackageConfig, DEFAULT_TEST_SCRIPT};
pub use repository::{Repository, RepositoryDescriptor};
pub use specifier::{normalize, Specifier};
pub use types::DependencyKey;
