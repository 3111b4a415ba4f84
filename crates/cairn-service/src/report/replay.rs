//! The `replay-report` handler: a faithful, order-preserving XML
//! linearization of one revision's edit drive.

use std::io::Write;

use cairn_core::cancel::CancelToken;
use cairn_proto::dav::build::{XmlWriter, base64_encode};
use cairn_proto::dav::parse::ReplayReport;
use cairn_repo::{EditSink, RepoError, Repository};

use super::{check_cancel, close_report_root, open_report_root, write_err};
use crate::error::{ServiceError, ServiceResult};

/// Serializes edit operations into `editor-report` elements, one per
/// operation, in drive order.
pub struct EditorReportWriter<'w, 'c, W: Write> {
    writer: &'w mut XmlWriter<W>,
    cancel: &'c CancelToken,
}

impl<'w, 'c, W: Write> EditorReportWriter<'w, 'c, W> {
    pub fn new(writer: &'w mut XmlWriter<W>, cancel: &'c CancelToken) -> Self {
        Self { writer, cancel }
    }
}

impl<W: Write> EditSink for EditorReportWriter<'_, '_, W> {
    fn target_revision(&mut self, revision: u64) -> Result<(), RepoError> {
        let rev = revision.to_string();
        self.writer
            .empty_with_attrs("S:target-revision", &[("rev", rev.as_str())])
            .map_err(write_err)
    }

    fn open_root(&mut self, base_revision: Option<u64>) -> Result<(), RepoError> {
        let rev = base_revision.unwrap_or(0).to_string();
        self.writer
            .empty_with_attrs("S:open-root", &[("rev", rev.as_str())])
            .map_err(write_err)
    }

    fn delete_entry(&mut self, path: &str, revision: Option<u64>) -> Result<(), RepoError> {
        check_cancel(self.cancel)?;
        let rev = revision.unwrap_or(0).to_string();
        self.writer
            .empty_with_attrs("S:delete-entry", &[("name", path), ("rev", rev.as_str())])
            .map_err(write_err)
    }

    fn add_directory(&mut self, path: &str, copyfrom: Option<(&str, u64)>) -> Result<(), RepoError> {
        check_cancel(self.cancel)?;
        match copyfrom {
            Some((from_path, from_rev)) => {
                let from_rev = from_rev.to_string();
                self.writer.empty_with_attrs(
                    "S:add-directory",
                    &[
                        ("name", path),
                        ("copyfrom-path", from_path),
                        ("copyfrom-rev", from_rev.as_str()),
                    ],
                )
            }
            None => self
                .writer
                .empty_with_attrs("S:add-directory", &[("name", path)]),
        }
        .map_err(write_err)
    }

    fn open_directory(&mut self, path: &str, base_revision: Option<u64>) -> Result<(), RepoError> {
        check_cancel(self.cancel)?;
        let rev = base_revision.unwrap_or(0).to_string();
        self.writer
            .empty_with_attrs("S:open-directory", &[("name", path), ("rev", rev.as_str())])
            .map_err(write_err)
    }

    fn change_dir_prop(&mut self, name: &str, value: Option<&[u8]>) -> Result<(), RepoError> {
        write_prop_change(self.writer, "S:change-dir-prop", name, value)
    }

    fn close_directory(&mut self) -> Result<(), RepoError> {
        self.writer.empty("S:close-directory").map_err(write_err)
    }

    fn add_file(&mut self, path: &str, copyfrom: Option<(&str, u64)>) -> Result<(), RepoError> {
        check_cancel(self.cancel)?;
        match copyfrom {
            Some((from_path, from_rev)) => {
                let from_rev = from_rev.to_string();
                self.writer.empty_with_attrs(
                    "S:add-file",
                    &[
                        ("name", path),
                        ("copyfrom-path", from_path),
                        ("copyfrom-rev", from_rev.as_str()),
                    ],
                )
            }
            None => self.writer.empty_with_attrs("S:add-file", &[("name", path)]),
        }
        .map_err(write_err)
    }

    fn open_file(&mut self, path: &str, base_revision: Option<u64>) -> Result<(), RepoError> {
        check_cancel(self.cancel)?;
        let rev = base_revision.unwrap_or(0).to_string();
        self.writer
            .empty_with_attrs("S:open-file", &[("name", path), ("rev", rev.as_str())])
            .map_err(write_err)
    }

    fn change_file_prop(&mut self, name: &str, value: Option<&[u8]>) -> Result<(), RepoError> {
        write_prop_change(self.writer, "S:change-file-prop", name, value)
    }

    fn apply_textdelta(&mut self, base_checksum: Option<&str>) -> Result<(), RepoError> {
        match base_checksum {
            Some(checksum) => self
                .writer
                .open_with_attrs("S:apply-textdelta", &[("checksum", checksum)]),
            None => self.writer.open("S:apply-textdelta"),
        }
        .map_err(write_err)
    }

    fn delta_chunk(&mut self, chunk: &[u8]) -> Result<(), RepoError> {
        self.writer.raw(&base64_encode(chunk)).map_err(write_err)
    }

    fn close_textdelta(&mut self) -> Result<(), RepoError> {
        self.writer.close("S:apply-textdelta").map_err(write_err)
    }

    fn close_file(&mut self, checksum: Option<&str>) -> Result<(), RepoError> {
        match checksum {
            Some(checksum) => self
                .writer
                .empty_with_attrs("S:close-file", &[("checksum", checksum)]),
            None => self.writer.empty("S:close-file"),
        }
        .map_err(write_err)
    }

    fn close_edit(&mut self) -> Result<(), RepoError> {
        Ok(())
    }
}

/// Property changes always travel base64-encoded; deletions carry a
/// `del` marker and no body.
fn write_prop_change<W: Write>(
    writer: &mut XmlWriter<W>,
    tag: &str,
    name: &str,
    value: Option<&[u8]>,
) -> Result<(), RepoError> {
    match value {
        Some(value) => {
            writer
                .open_with_attrs(tag, &[("name", name)])
                .map_err(write_err)?;
            writer.raw(&base64_encode(value)).map_err(write_err)?;
            writer.close(tag).map_err(write_err)
        }
        None => writer
            .empty_with_attrs(tag, &[("name", name), ("del", "true")])
            .map_err(write_err),
    }
}

/// Runs a `replay-report`.
///
/// ## Errors
/// Propagates repository and write errors; `Cancelled` between
/// operations.
pub fn handle<W: Write>(
    repo: &dyn Repository,
    request: &ReplayReport,
    writer: &mut XmlWriter<W>,
    cancel: &CancelToken,
) -> ServiceResult<()> {
    open_report_root(writer, "editor-report", &[])?;
    let mut sink = EditorReportWriter::new(writer, cancel);
    repo.replay(
        request.revision,
        request.low_water_mark,
        request.send_deltas,
        &mut sink,
    )
    .map_err(ServiceError::from)?;
    close_report_root(writer, "editor-report")?;
    Ok(())
}
