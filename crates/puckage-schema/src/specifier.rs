use crate::types::DependencyKey;

const GIT_SUFFIX: &str = ".git";
const ARCHIVE_SUFFIXES: [&str; 3] = [".tar.gz", ".tgz", ".tar"];

/// A dependency specifier as accepted by `npm install`, classified by shape.
///
/// Shapes are tried in order: git URL (`.git` suffix, optionally followed by
/// a `#committish`), tarball (archive extension), then registry name with an
/// optional `@scope/` prefix and `@version-or-tag` suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Specifier {
    Git {
        url: String,
        name: String,
        committish: Option<String>,
    },
    Tarball {
        location: String,
        stem: String,
    },
    Registry {
        scope: Option<String>,
        name: String,
        version: Option<String>,
    },
}

impl Specifier {
    pub fn parse(input: &str) -> Self {
        let spec = input.trim();

        let (base, committish) = match spec.split_once('#') {
            Some((base, fragment)) if base.ends_with(GIT_SUFFIX) => {
                (base, Some(fragment.to_owned()))
            }
            _ => (spec, None),
        };
        if let Some(stem) = base.strip_suffix(GIT_SUFFIX) {
            let name = stem.rsplit(|c: char| c == '/' || c == ':').next().unwrap_or(stem);
            return Self::Git {
                url: base.to_owned(),
                name: name.to_owned(),
                committish,
            };
        }

        for suffix in ARCHIVE_SUFFIXES {
            if let Some(stem) = spec.strip_suffix(suffix) {
                return Self::Tarball {
                    location: spec.to_owned(),
                    stem: stem.to_owned(),
                };
            }
        }

        let (scope, rest) = match spec.strip_prefix('@').and_then(|s| s.split_once('/')) {
            Some((scope, rest)) => (Some(scope.to_owned()), rest),
            None => (None, spec),
        };
        let (name, version) = match version_separator(rest) {
            Some(i) => (&rest[..i], Some(rest[i + 1..].to_owned())),
            None => (rest, None),
        };
        Self::Registry {
            scope,
            name: name.to_owned(),
            version,
        }
    }

    /// Canonical `node_modules` key for this specifier.
    pub fn key(&self) -> DependencyKey {
        match self {
            Self::Git { name, .. } => DependencyKey::new(name.as_str()),
            Self::Tarball { stem, .. } => DependencyKey::new(stem.as_str()),
            Self::Registry {
                scope: Some(scope),
                name,
                ..
            } => DependencyKey::new(format!("@{scope}/{name}")),
            Self::Registry { name, .. } => DependencyKey::new(name.as_str()),
        }
    }
}

/// Byte offset of the `@` that opens a version, tag or alias suffix.
///
/// A leading `@` that did not open a scope is part of the name, and so is an
/// `@` followed by a path (the scope segment of a registry URL). An alias such
/// as `npm:@scope/bar@1` counts as a suffix since its scheme comes before the
/// first `/`.
fn version_separator(rest: &str) -> Option<usize> {
    rest.match_indices('@')
        .map(|(i, _)| i)
        .filter(|&i| i > 0)
        .find(|&i| {
            let tail = &rest[i + 1..];
            match (tail.find('/'), tail.find(':')) {
                (None, _) => true,
                (Some(slash), Some(colon)) => colon < slash,
                (Some(_), None) => false,
            }
        })
}

/// Map a specifier onto the directory key it is installed under.
///
/// Pure and idempotent: `normalize(normalize(s)) == normalize(s)`.
pub fn normalize(specifier: &str) -> DependencyKey {
    Specifier::parse(specifier).key()
}
