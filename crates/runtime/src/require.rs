//! The host bridge (spec §5): the VM never touches a filesystem or stdout
//! directly, it calls out through a [`Host`] implementation. `oyc-cli`
//! supplies the real one (`FsHost`); tests can supply an in-memory one.

use std::path::{Path, PathBuf};

use crate::error::RuntimeError;

/// Everything the runtime needs from its embedding environment.
pub trait Host {
    /// Reads a source file's contents, resolving `path` relative to
    /// `relative_to` (the directory of the file that's calling `require`,
    /// or the process cwd for the top-level script). Returns the resolved
    /// absolute path alongside the source text so the compiler can tag
    /// diagnostics with it.
    fn load(&self, path: &str, relative_to: &Path) -> Result<(PathBuf, String), String>;

    /// `trace(...)`'s destination.
    fn write_line(&self, line: &str);

    /// Where an uncaught runtime error's diagnostic goes.
    fn stderr_line(&self, line: &str);
}

/// Resolves a `require` path (spec §5, "Path resolution"): absolute paths
/// are used as-is; anything else is joined to `relative_to` and normalized.
/// This is pure path arithmetic, kept separate from `Host::load` so the VM
/// can test it without a filesystem.
pub fn resolve_require_path(path: &str, relative_to: &Path) -> PathBuf {
    let raw = Path::new(path);
    let joined = if raw.is_absolute() {
        raw.to_path_buf()
    } else {
        relative_to.join(raw)
    };
    normalize(&joined)
}

fn normalize(path: &Path) -> PathBuf {
    use std::path::Component;
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

pub fn not_found_error(path: &str, at: crate::loc::SourceLocation) -> RuntimeError {
    RuntimeError::require_error(format!("cannot load '{path}'"), at, Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_path_is_used_as_is() {
        let resolved = resolve_require_path("/lib/util.oyc", Path::new("/home/proj"));
        assert_eq!(resolved, PathBuf::from("/lib/util.oyc"));
    }

    #[test]
    fn relative_path_joins_caller_dir() {
        let resolved = resolve_require_path("util.oyc", Path::new("/home/proj"));
        assert_eq!(resolved, PathBuf::from("/home/proj/util.oyc"));
    }

    #[test]
    fn parent_segments_normalize() {
        let resolved = resolve_require_path("../lib/util.oyc", Path::new("/home/proj/src"));
        assert_eq!(resolved, PathBuf::from("/home/proj/lib/util.oyc"));
    }
}
