//! The `get-locations` handler: where a line of history lived at other
//! revisions.

use std::io::Write;

use cairn_core::cancel::CancelToken;
use cairn_proto::dav::build::XmlWriter;
use cairn_proto::dav::parse::GetLocationsReport;
use cairn_repo::Repository;

use super::{check_cancel, close_report_root, join_path, open_report_root, write_err};
use crate::error::{ServiceError, ServiceResult};
use crate::resource::Resource;

/// Runs a `get-locations` report.
///
/// ## Errors
/// Propagates repository and write errors; `Cancelled` between items.
pub fn handle<W: Write>(
    repo: &dyn Repository,
    resource: &Resource,
    request: &GetLocationsReport,
    writer: &mut XmlWriter<W>,
    cancel: &CancelToken,
) -> ServiceResult<()> {
    let path = join_path(resource.path(), &request.path);

    open_report_root(writer, "get-locations", &[])?;
    repo.trace_locations(
        &path,
        request.peg_revision,
        &request.location_revisions,
        &mut |location| {
            check_cancel(cancel)?;
            let display = format!("/{}", location.path);
            let revision = location.revision.to_string();
            writer
                .empty_with_attrs(
                    "S:location",
                    &[("path", display.as_str()), ("rev", revision.as_str())],
                )
                .map_err(write_err)
        },
    )
    .map_err(ServiceError::from)?;
    close_report_root(writer, "get-locations")?;
    Ok(())
}
