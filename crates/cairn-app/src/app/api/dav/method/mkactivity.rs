//! MKACTIVITY method handler: step one of the commit saga.

use salvo::http::{HeaderValue, StatusCode};
use salvo::{Depot, Request, Response, handler};

use cairn_service::commit::make_activity;
use cairn_service::resolve;

use super::super::respond_error;
use crate::state::state_from_depot;

/// ## Summary
/// Allocates a transaction against head and records the activity
/// mapping. Fails when the id exists or the target is not an activity
/// location.
#[handler]
#[tracing::instrument(skip_all, fields(path = %req.uri().path()))]
pub async fn mkactivity(req: &mut Request, res: &mut Response, depot: &Depot) {
    let Ok(state) = state_from_depot(depot) else {
        res.status_code(StatusCode::INTERNAL_SERVER_ERROR);
        return;
    };
    let uri = state.relative_uri(req.uri().path()).to_string();

    let result = resolve(state.repo.as_ref(), state.activities.as_ref(), &uri, None)
        .and_then(|resource| make_activity(state.repo.as_ref(), state.activities.as_ref(), &resource));

    match result {
        Ok(()) => {
            res.status_code(StatusCode::CREATED);
            #[expect(
                clippy::let_underscore_must_use,
                reason = "Header addition failure is non-fatal"
            )]
            let _ = res.add_header("Cache-Control", HeaderValue::from_static("no-cache"), true);
        }
        Err(err) => respond_error(res, &err),
    }
}
