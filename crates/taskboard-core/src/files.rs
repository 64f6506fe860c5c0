//! External collaborator seams: file resolution and problem markers
//!
//! The host environment (an IDE, an editor plugin, the headless runner)
//! supplies these. The engine only requires that "not found" and a missing
//! sink are tolerated everywhere.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::diagnostic::Severity;

/// Maps a task noun or diagnostic filename to an on-disk file, if any.
///
/// Implementations should cache: the same nouns recur on every re-run.
pub trait FileResolver: Send + Sync {
    fn resolve(&self, noun: &str) -> Option<PathBuf>;
}

/// Resolver that never finds anything. Used by tests and by hosts that do
/// their own lookup.
#[derive(Debug, Default)]
pub struct NullResolver;

impl FileResolver for NullResolver {
    fn resolve(&self, _noun: &str) -> Option<PathBuf> {
        None
    }
}

/// Filesystem-backed resolver rooted at a workspace directory.
///
/// Tries the noun as a direct path, then under the conventional `src/` and
/// `tmp/` roots of the workspace. Results (including misses) are cached.
pub struct WorkspaceResolver {
    root: PathBuf,
    cache: Mutex<HashMap<String, Option<PathBuf>>>,
}

impl WorkspaceResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn resolve_uncached(&self, noun: &str) -> Option<PathBuf> {
        let direct = Path::new(noun);
        if direct.is_absolute() && direct.is_file() {
            return Some(direct.to_path_buf());
        }

        for candidate in [
            self.root.join(noun),
            self.root.join("src").join(noun),
            self.root.join("tmp").join(noun),
        ] {
            if candidate.is_file() {
                return Some(candidate);
            }
        }

        None
    }
}

impl FileResolver for WorkspaceResolver {
    fn resolve(&self, noun: &str) -> Option<PathBuf> {
        let mut cache = self.cache.lock().expect("resolver cache poisoned");
        if let Some(cached) = cache.get(noun) {
            return cached.clone();
        }

        let resolved = self.resolve_uncached(noun);
        cache.insert(noun.to_string(), resolved.clone());
        resolved
    }
}

/// One editor-annotatable problem extracted from a diagnostic line.
///
/// Only produced for Error/Warning lines whose filename resolved to a real
/// file and that carried a line number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Problem {
    pub file: PathBuf,
    pub line: u32,
    pub severity: Severity,
    pub message: String,
}

/// Receives problem offers so a host can create and clear editor markers.
///
/// Optional collaborator; delivery failures must be handled internally by
/// the implementation — the engine never treats them as fatal.
pub trait ProblemSink: Send + Sync {
    /// A new problem was parsed out of a task's log.
    fn offer(&self, problem: &Problem);

    /// A previously offered problem is no longer current (the task was
    /// deleted, re-scheduled, or the whole tree was cleared).
    fn retract(&self, problem: &Problem);
}
