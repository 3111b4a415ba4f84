//! PROPPATCH method handler.

use salvo::http::StatusCode;
use salvo::{Depot, Request, Response, handler};

use cairn_proto::dav::build::serialize_multistatus;
use cairn_proto::dav::parse::parse_proppatch;
use cairn_service::{prop, resolve};

use super::super::{respond_error, write_xml_body};
use crate::app::api::dav::extract::body_bytes;
use crate::state::state_from_depot;

/// ## Summary
/// Stages property changes into the working resource's transaction and
/// answers with a 207 multistatus. Never finalizes the commit.
#[handler]
#[tracing::instrument(skip_all, fields(path = %req.uri().path()))]
pub async fn proppatch(req: &mut Request, res: &mut Response, depot: &Depot) {
    let Ok(state) = state_from_depot(depot) else {
        res.status_code(StatusCode::INTERNAL_SERVER_ERROR);
        return;
    };
    let uri = state.relative_uri(req.uri().path()).to_string();

    let Ok(body) = body_bytes(req).await else {
        res.status_code(StatusCode::BAD_REQUEST);
        return;
    };
    let request = match parse_proppatch(&body) {
        Ok(request) => request,
        Err(err) => {
            respond_error(res, &err.into());
            return;
        }
    };

    let outcome = resolve(state.repo.as_ref(), state.activities.as_ref(), &uri, None)
        .and_then(|resource| prop::proppatch(state.repo.as_ref(), &resource, &request));
    match outcome {
        Ok(multistatus) => match serialize_multistatus(&multistatus) {
            Ok(xml) => {
                res.status_code(StatusCode::MULTI_STATUS);
                write_xml_body(res, xml);
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to serialize multistatus");
                res.status_code(StatusCode::INTERNAL_SERVER_ERROR);
            }
        },
        Err(err) => respond_error(res, &err),
    }
}
