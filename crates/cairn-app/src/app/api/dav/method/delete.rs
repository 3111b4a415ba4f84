//! DELETE method handler.

use salvo::http::StatusCode;
use salvo::{Depot, Request, Response, handler};

use cairn_repo::{Repository as _, Transaction as _};
use cairn_service::commit::delete_activity;
use cairn_service::{Location, ServiceError, resolve};

use super::super::respond_error;
use crate::state::state_from_depot;

/// ## Summary
/// Deletes an activity (aborting its transaction) or a checked-out path
/// inside its transaction. Public resources are immutable outside the
/// commit saga.
#[handler]
#[tracing::instrument(skip_all, fields(path = %req.uri().path()))]
pub async fn delete(req: &mut Request, res: &mut Response, depot: &Depot) {
    let Ok(state) = state_from_depot(depot) else {
        res.status_code(StatusCode::INTERNAL_SERVER_ERROR);
        return;
    };
    let uri = state.relative_uri(req.uri().path()).to_string();

    let result = resolve(state.repo.as_ref(), state.activities.as_ref(), &uri, None).and_then(
        |resource| match &resource.location {
            Location::Activity { activity_id } => {
                delete_activity(state.repo.as_ref(), state.activities.as_ref(), activity_id)
            }
            Location::Working { path, .. } => {
                let txn_name = resource.txn_name.as_deref().ok_or_else(|| {
                    ServiceError::conflict("working resource has no bound transaction")
                })?;
                let mut txn = state.repo.open_txn(txn_name)?;
                txn.delete(path)?;
                Ok(())
            }
            _ => Err(ServiceError::method_not_allowed(
                "DELETE applies to activities and working resources",
            )),
        },
    );

    match result {
        Ok(()) => {
            res.status_code(StatusCode::NO_CONTENT);
        }
        Err(err) => respond_error(res, &err),
    }
}
