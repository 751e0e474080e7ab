use std::path::{Component, Path, PathBuf};

/// Lexically normalize `path`: drop `.` segments and repeated separators, and
/// resolve `..` against the preceding segment. The filesystem is not
/// consulted, so symlinks are not resolved.
///
/// `..` that would climb above a relative path's start is kept; above the
/// root it is dropped. An empty result becomes `.`.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    let mut segments = 0usize;

    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if segments > 0 {
                    out.pop();
                    segments -= 1;
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            Component::Normal(part) => {
                out.push(part);
                segments += 1;
            }
        }
    }

    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(s: &str) -> PathBuf {
        normalize_path(Path::new(s))
    }

    #[test]
    fn removes_dot_and_duplicate_separators() {
        assert_eq!(norm("/work//app/./pkg/"), Path::new("/work/app/pkg"));
        assert_eq!(norm("./app"), Path::new("app"));
    }

    #[test]
    fn resolves_parent_segments() {
        assert_eq!(norm("/work/app/../lib"), Path::new("/work/lib"));
        assert_eq!(norm("a/b/../../c"), Path::new("c"));
    }

    #[test]
    fn keeps_leading_parents_of_relative_paths() {
        assert_eq!(norm("../a/../../b"), Path::new("../../b"));
    }

    #[test]
    fn cannot_climb_above_root() {
        assert_eq!(norm("/../a"), Path::new("/a"));
    }

    #[test]
    fn empty_becomes_current_dir() {
        assert_eq!(norm(""), Path::new("."));
        assert_eq!(norm("a/.."), Path::new("."));
    }
}
