//! The report dispatch engine.
//!
//! One handler per report kind. Every handler writes a namespaced root
//! element, runs exactly one repository query with a per-item callback,
//! streams each item as its kind's XML fragment, and closes the root.
//! Items go out in the exact order the repository yields them, and the
//! host cancellation signal is polled between items.

pub mod dated_rev;
pub mod file_revisions;
pub mod locations;
pub mod locks;
pub mod log;
pub mod mergeinfo;
pub mod replay;
pub mod update;

use std::io::Write;

use cairn_core::cancel::CancelToken;
use cairn_proto::dav::build::XmlWriter;
use cairn_proto::dav::core::{DAV_NS, SVN_DAV_PROP_NS, SVN_NS};
use cairn_proto::dav::parse::ReportRequest;
use cairn_repo::{RepoError, Repository};

use crate::error::ServiceResult;
use crate::resource::Resource;

/// Routes a parsed report to its handler.
///
/// ## Errors
/// Propagates handler errors; `Cancelled` when the client went away
/// mid-stream (the document is left incomplete on purpose).
#[tracing::instrument(skip_all, fields(report = request.root_element()))]
pub fn dispatch<W: Write>(
    repo: &dyn Repository,
    resource: &Resource,
    request: &ReportRequest,
    context: &str,
    writer: &mut XmlWriter<W>,
    cancel: &CancelToken,
) -> ServiceResult<()> {
    match request {
        ReportRequest::DatedRev(req) => dated_rev::handle(repo, req, writer),
        ReportRequest::Log(req) => log::handle(repo, resource, req, writer, cancel),
        ReportRequest::GetLocations(req) => locations::handle(repo, resource, req, writer, cancel),
        ReportRequest::FileRevisions(req) => {
            file_revisions::handle(repo, resource, req, writer, cancel)
        }
        ReportRequest::GetLocks(_) => locks::handle(repo, resource, writer, cancel),
        ReportRequest::Replay(req) => replay::handle(repo, req, writer, cancel),
        ReportRequest::Mergeinfo(req) => mergeinfo::handle(repo, resource, req, writer, cancel),
        ReportRequest::Update(req) => update::handle(repo, req, context, writer, cancel),
    }
}

/// Opens a report root element with the protocol namespaces declared.
pub(crate) fn open_report_root<W: Write>(
    writer: &mut XmlWriter<W>,
    root: &str,
    extra_attrs: &[(&str, &str)],
) -> Result<(), quick_xml::Error> {
    writer.declaration()?;
    let mut attrs: Vec<(&str, &str)> = vec![
        ("xmlns:S", SVN_NS),
        ("xmlns:D", DAV_NS),
        ("xmlns:V", SVN_DAV_PROP_NS),
    ];
    attrs.extend_from_slice(extra_attrs);
    writer.open_with_attrs(&format!("S:{root}"), &attrs)
}

/// Closes a report root element.
pub(crate) fn close_report_root<W: Write>(
    writer: &mut XmlWriter<W>,
    root: &str,
) -> Result<(), quick_xml::Error> {
    writer.close(&format!("S:{root}"))
}

/// Maps an XML write failure into the repository error channel so
/// per-item callbacks can abort a drive.
pub(crate) fn write_err(err: quick_xml::Error) -> RepoError {
    RepoError::Storage(format!("XML write failed: {err}"))
}

/// Aborts a drive when the host signalled cancellation.
pub(crate) fn check_cancel(cancel: &CancelToken) -> Result<(), RepoError> {
    if cancel.is_cancelled() {
        Err(RepoError::Cancelled)
    } else {
        Ok(())
    }
}

/// Joins a request-supplied path onto the addressed resource's path.
/// Absolute paths are taken as repository-absolute.
pub(crate) fn join_path(base: &str, rel: &str) -> String {
    let rel = rel.trim();
    if let Some(absolute) = rel.strip_prefix('/') {
        return absolute.trim_matches('/').to_string();
    }
    if rel.is_empty() {
        return base.to_string();
    }
    if base.is_empty() {
        rel.to_string()
    } else {
        format!("{base}/{rel}")
    }
}

/// Reduces a client-supplied URL (or absolute path) to a
/// repository-relative path under the context prefix.
pub(crate) fn repo_relative(url_or_path: &str, context: &str) -> String {
    let path = match url_or_path.find("://") {
        Some(scheme_end) => {
            let after_scheme = &url_or_path[scheme_end + 3..];
            match after_scheme.find('/') {
                Some(host_end) => &after_scheme[host_end..],
                None => "",
            }
        }
        None => url_or_path,
    };
    let path = path.strip_prefix(context).unwrap_or(path);
    path.trim_matches('/').to_string()
}
