//! REPORT method dispatcher.

use salvo::http::StatusCode;
use salvo::{Depot, Request, Response, handler};

use cairn_core::cancel::CancelToken;
use cairn_proto::dav::build::XmlWriter;
use cairn_proto::dav::parse::ReportRequest;
use cairn_service::{ServiceError, report as report_svc, resolve};

use super::super::{respond_error, write_xml_body};
use crate::app::api::dav::extract::body_bytes;
use crate::state::state_from_depot;

/// ## Summary
/// Parses the report body, resolves the addressed resource and streams
/// the report kind's XML. A cancelled stream is aborted without
/// completing the document and never reported as success.
#[handler]
#[tracing::instrument(skip_all, fields(path = %req.uri().path()))]
pub async fn report(req: &mut Request, res: &mut Response, depot: &Depot) {
    let Ok(state) = state_from_depot(depot) else {
        res.status_code(StatusCode::INTERNAL_SERVER_ERROR);
        return;
    };
    let uri = state.relative_uri(req.uri().path()).to_string();

    let Ok(body) = body_bytes(req).await else {
        res.status_code(StatusCode::BAD_REQUEST);
        return;
    };
    let request = match ReportRequest::parse(&body) {
        Ok(request) => request,
        Err(err) => {
            respond_error(res, &err.into());
            return;
        }
    };

    let resource = match resolve(state.repo.as_ref(), state.activities.as_ref(), &uri, None) {
        Ok(resource) => resource,
        Err(err) => {
            respond_error(res, &err);
            return;
        }
    };

    // Cancellation is host-supplied; one token per request worker.
    let cancel = CancelToken::new();
    let mut writer = XmlWriter::new(Vec::new());
    let outcome = report_svc::dispatch(
        state.repo.as_ref(),
        &resource,
        &request,
        &state.context,
        &mut writer,
        &cancel,
    );

    match outcome {
        Ok(()) => match String::from_utf8(writer.into_inner()) {
            Ok(xml) => {
                res.status_code(StatusCode::OK);
                write_xml_body(res, xml);
            }
            Err(err) => {
                tracing::error!(error = %err, "report produced invalid UTF-8");
                res.status_code(StatusCode::INTERNAL_SERVER_ERROR);
            }
        },
        Err(ServiceError::Cancelled) => {
            respond_error(res, &ServiceError::Cancelled);
        }
        Err(err) => respond_error(res, &err),
    }
}
