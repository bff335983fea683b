//! Content-hash change detection over a source tree.
//!
//! Advisory only: it exists to avoid redundant recompilation, not to
//! guarantee correctness. A spurious recompile is harmless.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use sha2::{Digest as _, Sha256};
use walkdir::WalkDir;

use crate::error::Error;

/// Polling change detector: hashes every matching file under a root and
/// diffs the result against the previous snapshot. Owned by exactly one
/// caller; the snapshot is never shared.
pub struct ChangeDetector {
    /// Glob matched against file names.
    pattern: glob::Pattern,
    /// Directory tree under watch.
    root: PathBuf,
    /// Previous snapshot: path to SHA-256 hex digest.
    snapshot: HashMap<PathBuf, String>,
}

impl ChangeDetector {
    /// Create a detector for `root`, watching files whose names match
    /// `pattern`.
    ///
    /// # Errors
    ///
    /// Returns `Error::BadPattern` if the glob does not parse.
    pub fn new(root: &Path, pattern: &str) -> Result<Self, Error> {
        return Ok(Self {
            pattern: glob::Pattern::new(pattern)?,
            root: root.to_path_buf(),
            snapshot: HashMap::new(),
        });
    }

    /// Re-hash the tree and report whether anything changed since the last
    /// call. A differing hash, a new file, and a vanished file all count.
    ///
    /// The snapshot is replaced unconditionally, changed or not, so drift
    /// cannot accumulate across calls.
    pub fn has_changed(&mut self) -> bool {
        let fresh = self.hash_tree();
        let changed = snapshots_differ(&self.snapshot, &fresh);
        self.snapshot = fresh;
        return changed;
    }

    /// Hash every matching regular file under the root. Files that vanish or
    /// become unreadable mid-walk simply drop out of the snapshot.
    fn hash_tree(&self) -> HashMap<PathBuf, String> {
        let mut hashes = HashMap::new();
        for entry in WalkDir::new(&self.root)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| return e.file_type().is_file())
        {
            if !self.matches(entry.path()) {
                continue;
            }
            let Ok(bytes) = std::fs::read(entry.path()) else {
                continue;
            };
            let digest = Sha256::digest(&bytes);
            hashes.insert(entry.path().to_path_buf(), format!("{digest:x}"));
        }
        return hashes;
    }

    /// Match the glob against the file name alone.
    fn matches(&self, path: &Path) -> bool {
        return path
            .file_name()
            .and_then(|name| return name.to_str())
            .is_some_and(|name| return self.pattern.matches(name));
    }
}

/// True when the two snapshots differ in any key or value. Compared both
/// ways so additions and removals are both caught.
fn snapshots_differ(old: &HashMap<PathBuf, String>, new: &HashMap<PathBuf, String>) -> bool {
    for (path, hash) in new {
        if old.get(path) != Some(hash) {
            return true;
        }
    }
    for (path, hash) in old {
        if new.get(path) != Some(hash) {
            return true;
        }
    }
    return false;
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc)]
mod tests {
    use super::*;

    #[test]
    fn reports_change_once_then_settles() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.res"), "let a = 1").unwrap();

        let mut detector = ChangeDetector::new(dir.path(), "*.res").unwrap();
        assert!(detector.has_changed());
        assert!(!detector.has_changed());
    }

    #[test]
    fn edits_additions_and_removals_all_count() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("a.res");
        std::fs::write(&first, "let a = 1").unwrap();

        let mut detector = ChangeDetector::new(dir.path(), "*.res").unwrap();
        let _ = detector.has_changed();

        std::fs::write(&first, "let a = 2").unwrap();
        assert!(detector.has_changed());

        std::fs::write(dir.path().join("b.res"), "let b = 1").unwrap();
        assert!(detector.has_changed());

        std::fs::remove_file(&first).unwrap();
        assert!(detector.has_changed());

        assert!(!detector.has_changed());
    }

    #[test]
    fn non_matching_files_are_invisible() {
        let dir = tempfile::tempdir().unwrap();
        let mut detector = ChangeDetector::new(dir.path(), "*.res").unwrap();
        let _ = detector.has_changed();

        std::fs::write(dir.path().join("notes.md"), "scratch").unwrap();
        assert!(!detector.has_changed());
    }

    #[test]
    fn subdirectories_are_walked() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("deep").join("deeper");
        std::fs::create_dir_all(&nested).unwrap();

        let mut detector = ChangeDetector::new(dir.path(), "*.res").unwrap();
        let _ = detector.has_changed();

        std::fs::write(nested.join("c.res"), "let c = 3").unwrap();
        assert!(detector.has_changed());
    }
}
