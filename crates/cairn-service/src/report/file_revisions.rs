//! The `file-revs-report` handler: every interesting revision of one
//! file, with property deltas and base64-framed content.

use std::io::Write;

use cairn_core::cancel::CancelToken;
use cairn_proto::dav::build::{XmlWriter, base64_encode};
use cairn_proto::dav::parse::FileRevisionsReport;
use cairn_repo::{FileRevSink, FileRevision, RepoError, Repository};

use super::{check_cancel, close_report_root, join_path, open_report_root, write_err};
use crate::error::{ServiceError, ServiceResult};
use crate::resource::Resource;

struct FileRevXml<'w, 'c, W: Write> {
    writer: &'w mut XmlWriter<W>,
    cancel: &'c CancelToken,
}

impl<W: Write> FileRevSink for FileRevXml<'_, '_, W> {
    fn open_revision(&mut self, revision: &FileRevision) -> Result<(), RepoError> {
        check_cancel(self.cancel)?;
        let rev = revision.revision.to_string();
        self.writer
            .open_with_attrs(
                "S:file-rev",
                &[("path", revision.path.as_str()), ("rev", rev.as_str())],
            )
            .map_err(write_err)?;

        for (name, value) in &revision.rev_props {
            self.writer
                .value_element("S:rev-prop", &[("name", name.as_str())], value)
                .map_err(write_err)?;
        }
        for (name, value) in &revision.prop_diffs {
            match value {
                Some(value) => self
                    .writer
                    .value_element("S:set-prop", &[("name", name.as_str())], value)
                    .map_err(write_err)?,
                None => self
                    .writer
                    .empty_with_attrs("S:remove-prop", &[("name", name.as_str())])
                    .map_err(write_err)?,
            }
        }
        self.writer.open("S:txdelta").map_err(write_err)
    }

    fn delta_chunk(&mut self, chunk: &[u8]) -> Result<(), RepoError> {
        self.writer.raw(&base64_encode(chunk)).map_err(write_err)
    }

    fn close_revision(&mut self) -> Result<(), RepoError> {
        self.writer.close("S:txdelta").map_err(write_err)?;
        self.writer.close("S:file-rev").map_err(write_err)
    }
}

/// Runs a `file-revs-report`.
///
/// ## Errors
/// Propagates repository and write errors; `Cancelled` between items.
pub fn handle<W: Write>(
    repo: &dyn Repository,
    resource: &Resource,
    request: &FileRevisionsReport,
    writer: &mut XmlWriter<W>,
    cancel: &CancelToken,
) -> ServiceResult<()> {
    let path = join_path(resource.path(), &request.path);
    let head = repo.latest_revision()?;
    let start = request.start_revision.unwrap_or(0);
    let end = request.end_revision.unwrap_or(head);

    open_report_root(writer, "file-revs-report", &[])?;
    let mut sink = FileRevXml {
        writer: &mut *writer,
        cancel,
    };
    repo.file_revisions(&path, start, end, &mut sink)
        .map_err(ServiceError::from)?;
    close_report_root(writer, "file-revs-report")?;
    Ok(())
}
