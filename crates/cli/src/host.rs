//! [`FsHost`]: the real, filesystem-backed [`oyc_runtime::Host`] the `oyc`
//! binary runs programs with.

use std::path::{Path, PathBuf};

use oyc_runtime::Host;

/// Filesystem-backed host. `require_root`, when set, confines every
/// `require` resolution (including the top-level script) to that directory
/// or its descendants — a path that normalizes outside of it is rejected
/// rather than read.
pub struct FsHost {
    pub require_root: Option<PathBuf>,
}

impl Host for FsHost {
    fn load(&self, path: &str, relative_to: &Path) -> Result<(PathBuf, String), String> {
        let resolved = oyc_runtime::require::resolve_require_path(path, relative_to);
        if let Some(root) = &self.require_root {
            if !resolved.starts_with(root) {
                return Err(format!(
                    "'{}' resolves outside the sandbox root '{}'",
                    resolved.display(),
                    root.display()
                ));
            }
        }
        let text = std::fs::read_to_string(&resolved)
            .map_err(|e| format!("{}: {e}", resolved.display()))?;
        Ok((resolved, text))
    }

    fn write_line(&self, line: &str) {
        println!("{line}");
    }

    fn stderr_line(&self, line: &str) {
        eprintln!("{line}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_a_file_inside_the_sandbox_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("lib.oyc"), "trace(1);").unwrap();
        let host = FsHost {
            require_root: Some(dir.path().to_path_buf()),
        };
        let (_, text) = host.load("lib.oyc", dir.path()).unwrap();
        assert_eq!(text, "trace(1);");
    }

    #[test]
    fn rejects_a_path_that_escapes_the_sandbox_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("project");
        std::fs::create_dir(&root).unwrap();
        let host = FsHost {
            require_root: Some(root.clone()),
        };
        assert!(host.load("../secrets.oyc", &root).is_err());
    }
}
