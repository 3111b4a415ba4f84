//! OPTIONS method handler.

use salvo::http::{HeaderValue, StatusCode};
use salvo::{Depot, Request, Response, handler};

use cairn_core::constants::DAV_COMPLIANCE;
use cairn_proto::dav::parse::parse_options;
use cairn_service::Location;

use super::super::{respond_error, write_xml_body};
use crate::app::api::dav::extract::body_bytes;
use crate::state::state_from_depot;

/// ## Summary
/// Advertises the method surface and `DeltaV` compliance; when the body
/// asks for the activity collection, answers with its href.
///
/// ## Side Effects
/// Sets the `Allow` and `DAV` headers on the response.
#[handler]
#[tracing::instrument(skip_all, fields(path = %req.uri().path()))]
pub async fn options(req: &mut Request, res: &mut Response, depot: &Depot) {
    let Ok(state) = state_from_depot(depot) else {
        res.status_code(StatusCode::INTERNAL_SERVER_ERROR);
        return;
    };

    let Ok(body) = body_bytes(req).await else {
        res.status_code(StatusCode::BAD_REQUEST);
        return;
    };
    let request = match parse_options(&body) {
        Ok(request) => request,
        Err(err) => {
            respond_error(res, &err.into());
            return;
        }
    };

    let allow = "OPTIONS, GET, HEAD, PUT, DELETE, PROPFIND, PROPPATCH, REPORT, \
                 MKACTIVITY, CHECKOUT, MERGE, COPY, MOVE, LOCK, UNLOCK";
    #[expect(
        clippy::let_underscore_must_use,
        reason = "Header addition failure is non-fatal"
    )]
    let _ = res.add_header("Allow", HeaderValue::from_static(allow), true);
    #[expect(
        clippy::let_underscore_must_use,
        reason = "Header addition failure is non-fatal"
    )]
    let _ = res.add_header("DAV", HeaderValue::from_static(DAV_COMPLIANCE), true);
    res.status_code(StatusCode::OK);

    if request.activity_collection_set {
        let href = Location::ActivityCollection.href(&state.context);
        let body = format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
             <D:options-response xmlns:D=\"DAV:\">\
             <D:activity-collection-set><D:href>{href}</D:href>\
             </D:activity-collection-set></D:options-response>"
        );
        write_xml_body(res, body);
    }
}
