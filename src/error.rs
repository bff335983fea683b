/// Crate-level error types for rebind.
use std::path::PathBuf;

/// All errors in rebind carry enough context to produce a useful diagnostic
/// without a debugger. Each variant names the path, command, or reason for
/// the failure.
#[allow(clippy::error_impl_error, reason = "crate-internal error type in binary")]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Write to an existing managed file without the overwrite flag.
    #[error("file already exists (overwrite not set): {}", path.display())]
    AlreadyExists {
        /// Path of the existing managed file.
        path: PathBuf,
    },

    /// A glob pattern in the configuration does not parse.
    #[error("bad glob pattern: {0}")]
    BadPattern(
        /// The wrapped pattern error.
        #[from]
        glob::PatternError,
    ),

    /// A toolchain invocation exceeded its deadline and was killed.
    #[error("compiler timed out after {timeout_secs}s: {command}")]
    CompilerTimeout {
        /// The command line that was killed.
        command: String,
        /// Configured timeout in seconds.
        timeout_secs: u64,
    },

    /// A file expected on disk does not exist.
    #[error("file not found: {}", path.display())]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// Underlying I/O error from the filesystem or a subprocess.
    #[error("io: {0}")]
    Io(
        /// The wrapped I/O error.
        #[from]
        std::io::Error,
    ),

    /// Mutation attempted on a file that does not carry the ownership cookie.
    #[error("not created by rebind, refusing to touch: {}", path.display())]
    NotManaged {
        /// Path of the foreign file.
        path: PathBuf,
    },

    /// Operation on a path outside the managed source root.
    #[error("outside the source root {}: {}", root.display(), path.display())]
    OutOfBounds {
        /// The offending path, lexically normalized.
        path: PathBuf,
        /// The configured source root.
        root: PathBuf,
    },

    /// Malformed or truncated parse-tree dump.
    #[error("parse-tree dump: {reason}")]
    Parse {
        /// Description of the parse failure.
        reason: String,
    },

    /// TOML deserialization failed.
    #[error("toml deserialize: {0}")]
    TomlDe(
        /// The wrapped TOML deserialization error.
        #[from]
        toml::de::Error,
    ),
}
