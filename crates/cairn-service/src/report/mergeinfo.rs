//! The `mergeinfo-report` handler.

use std::io::Write;

use cairn_core::cancel::CancelToken;
use cairn_proto::dav::build::XmlWriter;
use cairn_proto::dav::parse::MergeinfoReport;
use cairn_repo::Repository;

use super::{close_report_root, join_path, open_report_root};
use crate::error::{ServiceError, ServiceResult};
use crate::resource::Resource;

/// Runs a `mergeinfo-report`.
///
/// ## Errors
/// Propagates repository and write errors; `Cancelled` between items.
pub fn handle<W: Write>(
    repo: &dyn Repository,
    resource: &Resource,
    request: &MergeinfoReport,
    writer: &mut XmlWriter<W>,
    cancel: &CancelToken,
) -> ServiceResult<()> {
    let paths: Vec<String> = if request.paths.is_empty() {
        vec![resource.path().to_string()]
    } else {
        request
            .paths
            .iter()
            .map(|path| join_path(resource.path(), path))
            .collect()
    };
    let entries = repo.mergeinfo(&paths, request.revision, request.inherit)?;

    open_report_root(writer, "mergeinfo-report", &[])?;
    for entry in entries {
        if cancel.is_cancelled() {
            return Err(ServiceError::Cancelled);
        }
        writer.open("S:mergeinfo-item")?;
        writer.text_element("S:mergeinfo-path", &entry.path)?;
        writer.value_element("S:mergeinfo-info", &[], entry.info.as_bytes())?;
        writer.close("S:mergeinfo-item")?;
    }
    close_report_root(writer, "mergeinfo-report")?;
    Ok(())
}
