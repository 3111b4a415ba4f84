//! The repository read/query and transaction traits.

#![expect(
    clippy::missing_errors_doc,
    reason = "Storage failure modes are the implementation's to document"
)]

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use cairn_proto::dav::core::Depth;
use cairn_proto::dav::parse::MergeinfoInheritance;

use crate::edit::EditSink;
use crate::error::RepoResult;
use crate::types::{
    CommitOutcome, DirEntry, FileRevision, LockInfo, LogEntry, MergeinfoEntry, NodeInfo,
    PathLocation, ReportedState,
};

/// Options of a log query.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogOptions {
    pub discover_changed_paths: bool,
    pub strict_node_history: bool,
    pub include_merged_revisions: bool,
    pub omit_log_text: bool,
    pub limit: Option<u64>,
}

/// Receives one file-revisions drive.
pub trait FileRevSink {
    fn open_revision(&mut self, revision: &FileRevision) -> RepoResult<()>;
    fn delta_chunk(&mut self, chunk: &[u8]) -> RepoResult<()>;
    fn close_revision(&mut self) -> RepoResult<()>;
}

/// Read and query access to the revision store.
///
/// Entries yielded through callbacks arrive in the store's own order;
/// callers must not reorder them. A callback returning an error aborts
/// the query with that error.
pub trait Repository: Send + Sync {
    /// Stable identifier of the repository.
    fn uuid(&self) -> String;

    /// The newest committed revision.
    fn latest_revision(&self) -> RepoResult<u64>;

    /// Stats a path at a revision (`None` = head). `Ok(None)` means the
    /// path does not exist there.
    fn stat(&self, path: &str, revision: Option<u64>) -> RepoResult<Option<NodeInfo>>;

    /// Lists the immediate children of a directory.
    fn list_dir(&self, path: &str, revision: Option<u64>) -> RepoResult<Vec<DirEntry>>;

    /// Full content of a file.
    fn file_content(&self, path: &str, revision: Option<u64>) -> RepoResult<Vec<u8>>;

    /// Versioned properties of a node.
    fn node_properties(
        &self,
        path: &str,
        revision: Option<u64>,
    ) -> RepoResult<BTreeMap<String, Vec<u8>>>;

    /// Unversioned properties of a revision (log message, author, date).
    fn revision_properties(&self, revision: u64) -> RepoResult<BTreeMap<String, Vec<u8>>>;

    /// The youngest revision committed at or before the given time.
    fn revision_for_date(&self, date: DateTime<Utc>) -> RepoResult<u64>;

    /// Drives a log query over `start..=end`, ascending when
    /// `start <= end` and descending otherwise.
    fn log(
        &self,
        paths: &[String],
        start: u64,
        end: u64,
        options: &LogOptions,
        receiver: &mut dyn FnMut(&LogEntry) -> RepoResult<()>,
    ) -> RepoResult<()>;

    /// Locates a path (pegged at `peg_revision`) in other revisions.
    fn trace_locations(
        &self,
        path: &str,
        peg_revision: u64,
        revisions: &[u64],
        receiver: &mut dyn FnMut(&PathLocation) -> RepoResult<()>,
    ) -> RepoResult<()>;

    /// Drives the interesting revisions of one file oldest-first.
    fn file_revisions(
        &self,
        path: &str,
        start: u64,
        end: u64,
        sink: &mut dyn FileRevSink,
    ) -> RepoResult<()>;

    /// All locks at or below a path.
    fn get_locks(&self, path: &str) -> RepoResult<Vec<LockInfo>>;

    /// Takes out a path lock.
    fn lock(
        &self,
        path: &str,
        owner: &str,
        comment: Option<&[u8]>,
        steal: bool,
    ) -> RepoResult<LockInfo>;

    /// Releases a path lock.
    fn unlock(&self, path: &str, token: Option<&str>, break_lock: bool) -> RepoResult<()>;

    /// Mergeinfo recorded for the given paths.
    fn mergeinfo(
        &self,
        paths: &[String],
        revision: Option<u64>,
        inheritance: MergeinfoInheritance,
    ) -> RepoResult<Vec<MergeinfoEntry>>;

    /// Replays one revision as an ordered edit drive.
    fn replay(
        &self,
        revision: u64,
        low_water_mark: u64,
        send_deltas: bool,
        sink: &mut dyn EditSink,
    ) -> RepoResult<()>;

    /// Drives the difference between a reported working-copy state and a
    /// target revision.
    fn drive_update(
        &self,
        state: &ReportedState,
        target_revision: u64,
        target_path: &str,
        depth: Depth,
        send_deltas: bool,
        sink: &mut dyn EditSink,
    ) -> RepoResult<()>;

    /// Opens a new transaction staged against `base_revision`.
    fn begin_txn(&self, base_revision: u64, author: Option<&str>) -> RepoResult<String>;

    /// Re-opens an existing transaction by name.
    fn open_txn(&self, name: &str) -> RepoResult<Box<dyn Transaction>>;
}

/// The mutable staging area of one in-progress commit.
///
/// A transaction is referenced by name and never owned by the protocol
/// layer; any number of requests may re-open it until it is committed or
/// aborted.
pub trait Transaction {
    fn name(&self) -> &str;

    fn base_revision(&self) -> RepoResult<u64>;

    /// Stats a path inside the staged tree.
    fn stat(&self, path: &str) -> RepoResult<Option<NodeInfo>>;

    /// Sets or removes a versioned property on a staged node.
    fn change_node_prop(
        &mut self,
        path: &str,
        name: &str,
        value: Option<Vec<u8>>,
    ) -> RepoResult<()>;

    /// Replaces the full text of a staged file, creating it if needed.
    fn put_file(&mut self, path: &str, content: Vec<u8>) -> RepoResult<()>;

    fn make_dir(&mut self, path: &str) -> RepoResult<()>;

    fn delete(&mut self, path: &str) -> RepoResult<()>;

    /// Stages a copy of `from_path@from_revision` at `to_path`.
    fn copy(&mut self, from_path: &str, from_revision: u64, to_path: &str) -> RepoResult<()>;

    /// Sets an unversioned property on the pending revision.
    fn set_rev_prop(&mut self, name: &str, value: Vec<u8>) -> RepoResult<()>;

    /// Commits the staged tree. Lock tokens are (path, token) pairs
    /// authorizing changes under locked paths.
    fn commit(self: Box<Self>, lock_tokens: &[(String, String)]) -> RepoResult<CommitOutcome>;

    /// Abandons the staged tree.
    fn abort(self: Box<Self>) -> RepoResult<()>;
}
