//! Newtype wrapper for canonical dependency keys.
//!
//! Serializes/deserializes as a plain string.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;
use std::path::{Component, Path};

/// Canonical `node_modules` directory name of a dependency, e.g. `lodash` or
/// `@scope/name`. Produced by [`normalize`](crate::normalize).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DependencyKey(String);

impl DependencyKey {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    /// Plain path segments of the key. Root, prefix, `.` and `..` components
    /// are dropped so the key always names a directory below `node_modules`.
    pub fn components(&self) -> impl Iterator<Item = &str> + '_ {
        Path::new(&self.0).components().filter_map(|c| match c {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
    }

    /// Number of directories the key spans below `node_modules` (2 for
    /// scoped names).
    pub fn depth(&self) -> usize {
        self.components().count().max(1)
    }
}

impl Deref for DependencyKey {
    type Target = str;
    fn deref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DependencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DependencyKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for DependencyKey {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for DependencyKey {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl PartialEq<String> for DependencyKey {
    fn eq(&self, other: &String) -> bool {
        self.0 == *other
    }
}

impl From<String> for DependencyKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DependencyKey {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_as_ref() {
        let key = DependencyKey::new("node-foo");
        assert_eq!(key.to_string(), "node-foo");
        assert_eq!(key.as_str(), "node-foo");
        assert_eq!(AsRef::<str>::as_ref(&key), "node-foo");
    }

    #[test]
    fn serde_as_plain_string() {
        let key = DependencyKey::new("@scope/foo");
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"@scope/foo\"");
        let back: DependencyKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }

    #[test]
    fn depth_counts_scope() {
        assert_eq!(DependencyKey::new("foo").depth(), 1);
        assert_eq!(DependencyKey::new("@scope/foo").depth(), 2);
    }

    #[test]
    fn components_skip_root_and_dots() {
        let parts = |key: &str| {
            DependencyKey::new(key)
                .components()
                .map(str::to_owned)
                .collect::<Vec<_>>()
        };
        assert_eq!(parts("./vendor/bar"), ["vendor", "bar"]);
        assert_eq!(parts("/abs/x"), ["abs", "x"]);
        assert_eq!(parts("../up//x"), ["up", "x"]);
        assert!(parts("/").is_empty());
        assert_eq!(DependencyKey::new("./vendor/bar").depth(), 2);
        assert_eq!(DependencyKey::new("/abs/x").depth(), 2);
    }
}
