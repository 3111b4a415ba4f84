//! The `dated-rev-report` handler: timestamp to revision.

use std::io::Write;

use cairn_proto::dav::build::XmlWriter;
use cairn_proto::dav::parse::DatedRevReport;
use cairn_repo::Repository;

use super::{close_report_root, open_report_root};
use crate::error::ServiceResult;

/// Resolves the report's timestamp to the youngest revision at or before
/// it.
///
/// ## Errors
/// Propagates repository and write errors.
pub fn handle<W: Write>(
    repo: &dyn Repository,
    request: &DatedRevReport,
    writer: &mut XmlWriter<W>,
) -> ServiceResult<()> {
    let revision = repo.revision_for_date(request.date)?;
    open_report_root(writer, "dated-rev-report", &[])?;
    writer.text_element("D:version-name", &revision.to_string())?;
    close_report_root(writer, "dated-rev-report")?;
    Ok(())
}
