//! Project configuration (`oyc.toml`), grounded on the teacher's
//! `CompilerConfig`/extensibility pattern but trimmed to the knobs this
//! language actually has.

use std::path::{Path, PathBuf};

use serde::Deserialize;

fn default_max_registers() -> u16 {
    4096
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Upper bound on registers a single function body may allocate,
    /// guarding against runaway codegen on pathological input rather than
    /// any real program (spec's register machine has no hard limit of its
    /// own). A function that would need more is a semantic error.
    #[serde(default = "default_max_registers")]
    pub max_registers: u16,
    /// Sandbox root for `require` resolution: when set, the CLI host
    /// refuses to load any resolved `require` path that falls outside this
    /// directory (or its descendants), regardless of how many `require`
    /// hops it took to get there. `None` means no sandboxing.
    pub require_root: Option<PathBuf>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            max_registers: default_max_registers(),
            require_root: None,
        }
    }
}

impl CompilerConfig {
    /// Loads `oyc.toml` from `dir` if present, otherwise returns defaults.
    pub fn load_from_dir(dir: &Path) -> Result<Self, String> {
        let path = dir.join("oyc.toml");
        if !path.exists() {
            return Ok(CompilerConfig::default());
        }
        let text = std::fs::read_to_string(&path)
            .map_err(|e| format!("reading {}: {e}", path.display()))?;
        toml::from_str(&text).map_err(|e| format!("parsing {}: {e}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_no_file_present() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = CompilerConfig::load_from_dir(dir.path()).unwrap();
        assert_eq!(cfg.max_registers, 4096);
        assert!(cfg.require_root.is_none());
    }

    #[test]
    fn parses_overrides_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("oyc.toml"),
            "max_registers = 256\nrequire_root = \"lib\"\n",
        )
        .unwrap();
        let cfg = CompilerConfig::load_from_dir(dir.path()).unwrap();
        assert_eq!(cfg.max_registers, 256);
        assert_eq!(cfg.require_root, Some(PathBuf::from("lib")));
    }
}
