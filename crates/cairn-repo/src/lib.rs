//! Repository access boundary.
//!
//! The protocol layer consumes the repository through the traits in this
//! crate: `Repository` for reads and queries, `Transaction` for the
//! mutable staging area of one commit, `ActivityStore` for the durable
//! activity-id→transaction mapping, and `EditSink` for streamed tree-edit
//! drives. `MemoryRepository` is the in-process implementation used by
//! tests and single-process deployments.

pub mod activity;
pub mod edit;
pub mod error;
pub mod memory;
pub mod repo;
pub mod types;

pub use activity::{ActivityStore, FsActivityStore, MemoryActivityStore};
pub use edit::EditSink;
pub use error::{RepoError, RepoResult};
pub use memory::MemoryRepository;
pub use repo::{FileRevSink, LogOptions, Repository, Transaction};
pub use types::{
    ChangeAction, ChangedPath, CommitOutcome, DirEntry, FileRevision, LockInfo, LogEntry,
    MergeinfoEntry, NodeInfo, NodeKind, PathLocation, ReportedState, StateEntry,
};
