//! Managed-file guard: the mutation discipline for every file rebind touches.
//!
//! Files rebind creates begin with a one-line ownership cookie. A file
//! lacking that cookie is foreign and is never overwritten or deleted.
//! Ownership is re-derived from the file's first line on every call. It is
//! checked, never trusted from cached state.

use std::path::{Component, Path, PathBuf};

use crate::error::Error;

/// First-line marker identifying files rebind created. The full cookie is
/// this prefix followed by a generation timestamp.
pub const COOKIE_PREFIX: &str = "// rebind ";

/// Guarded access to the files under one source root. All operations
/// bounds-check their path before touching the filesystem.
pub struct SourceGuard {
    /// Lexically normalized root every operation must stay inside.
    root: PathBuf,
}

impl SourceGuard {
    /// Create a guard scoped to `root`.
    pub fn new(root: &Path) -> Self {
        return Self {
            root: normalize_path(root),
        };
    }

    /// Delete a managed file. Deleting a missing file is a no-op; the return
    /// value reports whether a file was actually removed.
    ///
    /// # Errors
    ///
    /// `OutOfBounds` outside the root, `NotManaged` for an existing foreign
    /// file, `Io` otherwise.
    pub fn delete(&self, path: &Path) -> Result<bool, Error> {
        let path = self.contained(path)?;
        if !path.exists() {
            return Ok(false);
        }
        if !self.is_managed(&path)? {
            return Err(Error::NotManaged { path });
        }
        std::fs::remove_file(&path)?;
        tracing::debug!(path = %path.display(), "deleted managed file");
        return Ok(true);
    }

    /// True when the file exists and begins with the ownership cookie.
    ///
    /// # Errors
    ///
    /// `OutOfBounds` outside the root, `Io` if an existing file cannot be
    /// read.
    pub fn is_managed(&self, path: &Path) -> Result<bool, Error> {
        let path = self.contained(path)?;
        if !path.exists() {
            return Ok(false);
        }
        let content = std::fs::read_to_string(&path)?;
        return Ok(content.starts_with(COOKIE_PREFIX));
    }

    /// Read a file under the root, stripping the cookie line if present.
    /// Callers never see the cookie.
    ///
    /// # Errors
    ///
    /// `OutOfBounds` outside the root, `FileNotFound` if absent, `Io`
    /// otherwise.
    pub fn read(&self, path: &Path) -> Result<String, Error> {
        let path = self.contained(path)?;
        if !path.exists() {
            return Err(Error::FileNotFound { path });
        }
        let content = std::fs::read_to_string(&path)?;
        return Ok(strip_cookie(&content));
    }

    /// The root this guard is scoped to.
    pub fn root(&self) -> &Path {
        return &self.root;
    }

    /// Write `content` behind a fresh cookie line, creating parent
    /// directories as needed. Refuses to touch an existing file rebind did
    /// not create, and refuses to replace a managed file unless `overwrite`
    /// is set.
    ///
    /// # Errors
    ///
    /// `OutOfBounds`, `NotManaged`, `AlreadyExists`, or `Io`.
    pub fn write(&self, path: &Path, content: &str, overwrite: bool) -> Result<(), Error> {
        let path = self.contained(path)?;
        if path.exists() {
            if !self.is_managed(&path)? {
                return Err(Error::NotManaged { path });
            }
            if !overwrite {
                return Err(Error::AlreadyExists { path });
            }
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let stamped = with_cookie(content);
        std::fs::write(&path, &stamped)?;
        tracing::debug!(path = %path.display(), bytes = stamped.len(), "wrote managed file");
        return Ok(());
    }

    /// Normalize and bounds-check a path, before any filesystem access.
    fn contained(&self, path: &Path) -> Result<PathBuf, Error> {
        let normalized = normalize_path(path);
        if normalized.starts_with(&self.root) {
            return Ok(normalized);
        }
        return Err(Error::OutOfBounds {
            path: normalized,
            root: self.root.clone(),
        });
    }
}

/// Collapse `.` and `..` components without touching the filesystem.
/// Preserves leading `..` when there is nothing left to pop.
fn normalize_path(path: &Path) -> PathBuf {
    let mut parts: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {},
            Component::ParentDir => match parts.last() {
                Some(Component::Normal(_)) => {
                    parts.pop();
                },
                _ => parts.push(component),
            },
            other => parts.push(other),
        }
    }
    return parts.iter().collect();
}

/// Drop the cookie line from file content, when present.
fn strip_cookie(content: &str) -> String {
    if !content.starts_with(COOKIE_PREFIX) {
        return content.to_string();
    }
    return content
        .split_once('\n')
        .map_or(String::new(), |(_, rest)| return rest.to_string());
}

/// Prepend a cookie line carrying the generation timestamp.
fn with_cookie(content: &str) -> String {
    let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
    return format!("{COOKIE_PREFIX}{timestamp}\n{content}");
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc)]
mod tests {
    use super::*;

    #[test]
    fn out_of_root_paths_fail_before_any_io() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("src");
        std::fs::create_dir_all(&root).unwrap();
        let guard = SourceGuard::new(&root);

        let outside = dir.path().join("escape.res");
        assert!(matches!(
            guard.write(&outside, "anything", true),
            Err(Error::OutOfBounds { .. })
        ));

        let traversal = root.join("..").join("escape.res");
        assert!(matches!(
            guard.write(&traversal, "anything", true),
            Err(Error::OutOfBounds { .. })
        ));
        assert!(!outside.exists());
    }

    #[test]
    fn foreign_files_are_never_overwritten_or_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let guard = SourceGuard::new(dir.path());

        let foreign = dir.path().join("theirs.res");
        std::fs::write(&foreign, "let precious = 1\n").unwrap();

        assert!(!guard.is_managed(&foreign).unwrap());
        assert!(matches!(
            guard.write(&foreign, "mine now", true),
            Err(Error::NotManaged { .. })
        ));
        assert!(matches!(guard.delete(&foreign), Err(Error::NotManaged { .. })));
        assert_eq!(std::fs::read_to_string(&foreign).unwrap(), "let precious = 1\n");
    }

    #[test]
    fn write_read_round_trip_hides_the_cookie() {
        let dir = tempfile::tempdir().unwrap();
        let guard = SourceGuard::new(dir.path());
        let path = dir.path().join("autobindings").join("Lodash.res");

        guard.write(&path, "type t\n", false).unwrap();
        assert!(guard.is_managed(&path).unwrap());
        assert_eq!(guard.read(&path).unwrap(), "type t\n");

        let on_disk = std::fs::read_to_string(&path).unwrap();
        assert!(on_disk.starts_with(COOKIE_PREFIX));
    }

    #[test]
    fn second_write_requires_the_overwrite_flag() {
        let dir = tempfile::tempdir().unwrap();
        let guard = SourceGuard::new(dir.path());
        let path = dir.path().join("Lodash.res");

        guard.write(&path, "first\n", false).unwrap();
        assert!(matches!(
            guard.write(&path, "second\n", false),
            Err(Error::AlreadyExists { .. })
        ));

        guard.write(&path, "second\n", true).unwrap();
        assert_eq!(guard.read(&path).unwrap(), "second\n");
    }

    #[test]
    fn deleting_a_missing_file_is_a_quiet_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let guard = SourceGuard::new(dir.path());
        assert!(!guard.delete(&dir.path().join("ghost.res")).unwrap());
    }

    #[test]
    fn managed_files_can_be_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let guard = SourceGuard::new(dir.path());
        let path = dir.path().join("Lodash.res");

        guard.write(&path, "type t\n", false).unwrap();
        assert!(guard.delete(&path).unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn reading_a_foreign_file_passes_content_through() {
        let dir = tempfile::tempdir().unwrap();
        let guard = SourceGuard::new(dir.path());
        let foreign = dir.path().join("theirs.res");
        std::fs::write(&foreign, "let a = 1\nlet b = 2\n").unwrap();
        assert_eq!(guard.read(&foreign).unwrap(), "let a = 1\nlet b = 2\n");
    }
}
