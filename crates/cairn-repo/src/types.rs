//! Data carried across the repository boundary.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

/// Node kind of a versioned path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Directory,
}

impl NodeKind {
    #[must_use]
    pub const fn is_directory(self) -> bool {
        matches!(self, Self::Directory)
    }
}

/// Stat result for one versioned path.
#[derive(Debug, Clone)]
pub struct NodeInfo {
    pub kind: NodeKind,
    /// Content byte length; zero for directories.
    pub size: u64,
    /// Revision the node last changed in.
    pub created_rev: u64,
    pub created_date: Option<DateTime<Utc>>,
    pub author: Option<String>,
    /// Hex content checksum, files only.
    pub checksum: Option<String>,
}

/// One directory child.
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub kind: NodeKind,
}

/// How a changed path changed in a revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeAction {
    Added,
    Modified,
    Deleted,
    Replaced,
}

/// One changed path inside a log entry.
#[derive(Debug, Clone)]
pub struct ChangedPath {
    pub path: String,
    pub action: ChangeAction,
    pub copyfrom: Option<(String, u64)>,
}

/// One revision yielded by a log query.
///
/// A `revision` of `None` is the sentinel closing the most recent run of
/// merged-from child revisions.
#[derive(Debug, Clone, Default)]
pub struct LogEntry {
    pub revision: Option<u64>,
    pub author: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub message: Option<String>,
    pub changed_paths: Vec<ChangedPath>,
    /// Merged-from child entries follow, closed by a sentinel entry.
    pub has_children: bool,
}

/// One location of a path's line of history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathLocation {
    pub path: String,
    pub revision: u64,
}

/// One interesting revision of a file's history.
#[derive(Debug, Clone)]
pub struct FileRevision {
    pub path: String,
    pub revision: u64,
    pub rev_props: BTreeMap<String, Vec<u8>>,
    /// Property changes against the previous file revision; `None` values
    /// are removals.
    pub prop_diffs: Vec<(String, Option<Vec<u8>>)>,
}

/// A path lock, read-only from the protocol layer's perspective.
#[derive(Debug, Clone)]
pub struct LockInfo {
    pub path: String,
    pub token: String,
    pub owner: String,
    /// Raw comment bytes; may not be XML-safe.
    pub comment: Option<Vec<u8>>,
    pub created: DateTime<Utc>,
    pub expires: Option<DateTime<Utc>>,
}

/// Result of committing a transaction.
///
/// The revision exists whenever this value is produced; a post-commit
/// hook failure rides along as a warning and is never a commit failure.
#[derive(Debug, Clone)]
pub struct CommitOutcome {
    pub revision: u64,
    pub post_commit_error: Option<String>,
}

/// One mergeinfo catalog entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeinfoEntry {
    pub path: String,
    pub info: String,
}

/// The working-copy state a client reported for an update drive.
#[derive(Debug, Clone, Default)]
pub struct ReportedState {
    pub entries: Vec<StateEntry>,
    pub missing: Vec<String>,
}

impl ReportedState {
    /// The base revision reported for the drive root, if any.
    #[must_use]
    pub fn base_revision(&self) -> Option<u64> {
        self.entries
            .iter()
            .find(|entry| entry.path.is_empty())
            .and_then(|entry| entry.revision)
    }

    /// Whether the root entry asked to be treated as empty.
    #[must_use]
    pub fn start_empty(&self) -> bool {
        self.entries
            .iter()
            .find(|entry| entry.path.is_empty())
            .is_some_and(|entry| entry.start_empty)
    }
}

/// One reported working-copy path.
#[derive(Debug, Clone)]
pub struct StateEntry {
    pub path: String,
    pub revision: Option<u64>,
    pub start_empty: bool,
}
