use crate::manifest::ManifestError;
use serde::{Deserialize, Serialize};

const VCS_MARKER: &str = "git";
const SSH_PREFIX: &str = "git+ssh://";

/// `repository` object of a manifest.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RepositoryDescriptor {
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
}

/// The `repository` field as found on disk: either a descriptor or the
/// `github:user/repo` style shorthand npm also accepts.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Repository {
    Descriptor(RepositoryDescriptor),
    Shorthand(String),
}

impl RepositoryDescriptor {
    /// Compile a repository string into a git descriptor.
    ///
    /// Any string containing `git` is accepted. SSH-style strings (containing
    /// `@`) get an explicit `git+ssh://` transport; otherwise the first
    /// `http`/`https` token is rewritten to `git`.
    pub fn from_specifier(spec: &str) -> Result<Self, ManifestError> {
        if !spec.contains(VCS_MARKER) {
            return Err(ManifestError::UnsupportedRepositoryScheme(spec.to_owned()));
        }

        let url = if spec.contains('@') {
            format!("{SSH_PREFIX}{spec}")
        } else {
            replace_http_token(spec)
        };

        Ok(Self {
            kind: VCS_MARKER.to_owned(),
            url,
            directory: None,
        })
    }
}

fn replace_http_token(spec: &str) -> String {
    let Some(start) = spec.find("http") else {
        return spec.to_owned();
    };
    let mut end = start + "http".len();
    if spec[end..].starts_with('s') {
        end += 1;
    }
    format!("{}{VCS_MARKER}{}", &spec[..start], &spec[end..])
}
