use std::path::{Path, PathBuf};

use crate::error::Error;

/// Project configuration loaded from `rebind.toml`.
/// All paths are relative to the project root the tool runs in.
pub struct Config {
    /// Directory generated bindings land in, under `src_dir`.
    pub bindings_dir: String,
    /// Seconds before a toolchain invocation is killed.
    pub compiler_timeout_secs: u64,
    /// Directory of ready-made bindings files, one `<Module>.res` per module.
    pub known_bindings_dir: PathBuf,
    /// Cap on convergence rounds. Absent means run to fixed point.
    pub max_rounds: Option<u32>,
    /// Milliseconds between convergence rounds.
    pub poll_interval_ms: u64,
    /// Glob matched against source file names for change detection.
    pub source_pattern: String,
    /// ReScript source directory.
    pub src_dir: PathBuf,
}

/// Raw TOML structure for `rebind.toml`.
#[derive(serde::Deserialize)]
struct RebindTomlConfig {
    #[serde(default = "default_bindings_dir")]
    bindings_dir: String,
    #[serde(default = "default_compiler_timeout_secs")]
    compiler_timeout_secs: u64,
    #[serde(default = "default_known_bindings_dir")]
    known_bindings_dir: PathBuf,
    #[serde(default)]
    max_rounds: Option<u32>,
    #[serde(default = "default_poll_interval_ms")]
    poll_interval_ms: u64,
    #[serde(default = "default_source_pattern")]
    source_pattern: String,
    #[serde(default = "default_src_dir")]
    src_dir: PathBuf,
}

impl Config {
    /// Load config from `rebind.toml` in the given project root.
    /// Returns defaults if the file doesn't exist. Returns an error if the
    /// file exists but is malformed — never silently falls back to defaults
    /// when the user wrote a config file.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if reading fails (other than not-found),
    /// or `Error::TomlDe` if the TOML is malformed.
    pub fn load(root: &Path) -> Result<Self, Error> {
        let path = root.join("rebind.toml");
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::defaults()),
            Err(e) => return Err(Error::Io(e)),
        };

        let raw: RebindTomlConfig = toml::from_str(&content)?;
        Ok(Self::from_raw(raw))
    }

    /// Full path of the generated-bindings directory.
    pub fn bindings_path(&self) -> PathBuf {
        self.src_dir.join(&self.bindings_dir)
    }

    /// Built-in defaults, used when no `rebind.toml` exists.
    fn defaults() -> Self {
        Self {
            bindings_dir: default_bindings_dir(),
            compiler_timeout_secs: default_compiler_timeout_secs(),
            known_bindings_dir: default_known_bindings_dir(),
            max_rounds: None,
            poll_interval_ms: default_poll_interval_ms(),
            source_pattern: default_source_pattern(),
            src_dir: default_src_dir(),
        }
    }

    /// Convert the raw TOML structure into the public config.
    fn from_raw(raw: RebindTomlConfig) -> Self {
        Self {
            bindings_dir: raw.bindings_dir,
            compiler_timeout_secs: raw.compiler_timeout_secs,
            known_bindings_dir: raw.known_bindings_dir,
            max_rounds: raw.max_rounds,
            poll_interval_ms: raw.poll_interval_ms,
            source_pattern: raw.source_pattern,
            src_dir: raw.src_dir,
        }
    }
}

/// Default generated-bindings directory name.
fn default_bindings_dir() -> String {
    "autobindings".to_string()
}

/// Default toolchain deadline. A development convenience, not a tuned value.
fn default_compiler_timeout_secs() -> u64 {
    120
}

/// Default ready-made bindings directory.
fn default_known_bindings_dir() -> PathBuf {
    PathBuf::from("bindings")
}

/// Default pause between convergence rounds.
fn default_poll_interval_ms() -> u64 {
    1000
}

/// Default source-file glob.
fn default_source_pattern() -> String {
    "*.res".to_string()
}

/// Default ReScript source directory.
fn default_src_dir() -> PathBuf {
    PathBuf::from("src")
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.src_dir, PathBuf::from("src"));
        assert_eq!(config.bindings_dir, "autobindings");
        assert_eq!(config.source_pattern, "*.res");
        assert_eq!(config.max_rounds, None);
        assert_eq!(config.bindings_path(), PathBuf::from("src/autobindings"));
    }

    #[test]
    fn explicit_fields_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("rebind.toml"),
            "src_dir = \"lib\"\nmax_rounds = 40\npoll_interval_ms = 250\n",
        )
        .unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.src_dir, PathBuf::from("lib"));
        assert_eq!(config.max_rounds, Some(40));
        assert_eq!(config.poll_interval_ms, 250);
        assert_eq!(config.bindings_dir, "autobindings");
    }

    #[test]
    fn malformed_file_is_an_error_not_a_fallback() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("rebind.toml"), "src_dir = [not toml").unwrap();
        assert!(matches!(Config::load(dir.path()), Err(Error::TomlDe(_))));
    }
}
