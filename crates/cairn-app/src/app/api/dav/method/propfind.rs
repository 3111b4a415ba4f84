//! PROPFIND method handler.

use salvo::http::StatusCode;
use salvo::{Depot, Request, Response, handler};

use cairn_proto::dav::build::serialize_multistatus;
use cairn_proto::dav::parse::parse_propfind;
use cairn_service::{prop, resolve};

use super::super::{respond_error, write_xml_body};
use crate::app::api::dav::extract::{body_bytes, depth_of, label_of};
use crate::state::state_from_depot;

/// ## Summary
/// Resolves the addressed resource, parses the PROPFIND body and
/// answers with a 207 multistatus.
#[handler]
#[tracing::instrument(skip_all, fields(path = %req.uri().path()))]
pub async fn propfind(req: &mut Request, res: &mut Response, depot: &Depot) {
    let Ok(state) = state_from_depot(depot) else {
        res.status_code(StatusCode::INTERNAL_SERVER_ERROR);
        return;
    };
    let depth = depth_of(req);
    let label = label_of(req);
    let uri = state.relative_uri(req.uri().path()).to_string();

    let Ok(body) = body_bytes(req).await else {
        res.status_code(StatusCode::BAD_REQUEST);
        return;
    };
    let request = match parse_propfind(&body) {
        Ok(request) => request,
        Err(err) => {
            respond_error(res, &err.into());
            return;
        }
    };

    let resource = match resolve(
        state.repo.as_ref(),
        state.activities.as_ref(),
        &uri,
        label.as_deref(),
    ) {
        Ok(resource) => resource,
        Err(err) => {
            respond_error(res, &err);
            return;
        }
    };

    let multistatus = match prop::propfind(
        state.repo.as_ref(),
        &resource,
        &request,
        depth,
        &state.context,
    ) {
        Ok(multistatus) => multistatus,
        Err(err) => {
            respond_error(res, &err);
            return;
        }
    };

    match serialize_multistatus(&multistatus) {
        Ok(xml) => {
            res.status_code(StatusCode::MULTI_STATUS);
            write_xml_body(res, xml);
        }
        Err(err) => {
            tracing::error!(error = %err, "failed to serialize multistatus");
            res.status_code(StatusCode::INTERNAL_SERVER_ERROR);
        }
    }
}
