//! CHECKOUT method handler: step two of the commit saga.

use salvo::http::{HeaderValue, StatusCode};
use salvo::{Depot, Request, Response, handler};

use cairn_proto::dav::parse::parse_checkout;
use cairn_service::commit;
use cairn_service::resolve;

use super::super::respond_error;
use crate::app::api::dav::extract::{body_bytes, label_of};
use crate::state::state_from_depot;

/// ## Summary
/// Checks a version or regular resource out into an activity and
/// answers 201 with the working resource's location.
#[handler]
#[tracing::instrument(skip_all, fields(path = %req.uri().path()))]
pub async fn checkout(req: &mut Request, res: &mut Response, depot: &Depot) {
    let Ok(state) = state_from_depot(depot) else {
        res.status_code(StatusCode::INTERNAL_SERVER_ERROR);
        return;
    };
    let uri = state.relative_uri(req.uri().path()).to_string();
    let label = label_of(req);

    let Ok(body) = body_bytes(req).await else {
        res.status_code(StatusCode::BAD_REQUEST);
        return;
    };
    let request = match parse_checkout(&body) {
        Ok(request) => request,
        Err(err) => {
            respond_error(res, &err.into());
            return;
        }
    };
    if request.apply_to_version && label.is_some() {
        respond_error(
            res,
            &cairn_service::ServiceError::conflict(
                "DAV:apply-to-version cannot be used in conjunction with a Label header",
            ),
        );
        return;
    }

    let result = resolve(
        state.repo.as_ref(),
        state.activities.as_ref(),
        &uri,
        label.as_deref(),
    )
    .and_then(|resource| {
        commit::checkout(
            state.repo.as_ref(),
            state.activities.as_ref(),
            &resource,
            &request,
        )
    });

    match result {
        Ok(outcome) => {
            let location = outcome.working.href(&state.context);
            res.status_code(StatusCode::CREATED);
            if let Ok(value) = HeaderValue::from_str(&location) {
                #[expect(
                    clippy::let_underscore_must_use,
                    reason = "Header addition failure is non-fatal"
                )]
                let _ = res.add_header("Location", value, true);
            }
        }
        Err(err) => respond_error(res, &err),
    }
}
