//! The tree-edit consumer driven by replay, update and diff queries.

#![expect(
    clippy::missing_errors_doc,
    reason = "Every sink method shares the abort contract documented on the trait"
)]

use crate::error::RepoResult;

/// Receives one ordered drive of tree-edit operations.
///
/// Every method may abort the drive by returning an error; drivers must
/// stop immediately and propagate it. Text content arrives framed between
/// `apply_textdelta` and `close_textdelta` as one or more raw chunks in
/// the storage engine's delta format.
pub trait EditSink {
    fn target_revision(&mut self, revision: u64) -> RepoResult<()>;
    fn open_root(&mut self, base_revision: Option<u64>) -> RepoResult<()>;
    fn delete_entry(&mut self, path: &str, revision: Option<u64>) -> RepoResult<()>;
    fn add_directory(&mut self, path: &str, copyfrom: Option<(&str, u64)>) -> RepoResult<()>;
    fn open_directory(&mut self, path: &str, base_revision: Option<u64>) -> RepoResult<()>;
    fn change_dir_prop(&mut self, name: &str, value: Option<&[u8]>) -> RepoResult<()>;
    fn close_directory(&mut self) -> RepoResult<()>;
    fn add_file(&mut self, path: &str, copyfrom: Option<(&str, u64)>) -> RepoResult<()>;
    fn open_file(&mut self, path: &str, base_revision: Option<u64>) -> RepoResult<()>;
    fn change_file_prop(&mut self, name: &str, value: Option<&[u8]>) -> RepoResult<()>;
    fn apply_textdelta(&mut self, base_checksum: Option<&str>) -> RepoResult<()>;
    fn delta_chunk(&mut self, chunk: &[u8]) -> RepoResult<()>;
    fn close_textdelta(&mut self) -> RepoResult<()>;
    fn close_file(&mut self, checksum: Option<&str>) -> RepoResult<()>;
    fn close_edit(&mut self) -> RepoResult<()>;
}
