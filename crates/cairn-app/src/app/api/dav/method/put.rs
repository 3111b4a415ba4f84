//! PUT method handler: stages file content into a working resource's
//! transaction.

use salvo::http::StatusCode;
use salvo::{Depot, Request, Response, handler};

use cairn_repo::{Repository as _, Transaction as _};
use cairn_service::{ServiceError, resolve};

use super::super::respond_error;
use crate::app::api::dav::extract::body_bytes;
use crate::state::state_from_depot;

/// ## Summary
/// Writes the request body as the full text of a checked-out file.
/// Collections reject PUT; nothing is finalized until MERGE.
#[handler]
#[tracing::instrument(skip_all, fields(path = %req.uri().path()))]
pub async fn put(req: &mut Request, res: &mut Response, depot: &Depot) {
    let Ok(state) = state_from_depot(depot) else {
        res.status_code(StatusCode::INTERNAL_SERVER_ERROR);
        return;
    };
    let uri = state.relative_uri(req.uri().path()).to_string();

    let Ok(body) = body_bytes(req).await else {
        res.status_code(StatusCode::BAD_REQUEST);
        return;
    };

    let result = resolve(state.repo.as_ref(), state.activities.as_ref(), &uri, None).and_then(
        |resource| {
            if !resource.is_working() {
                return Err(ServiceError::method_not_allowed(
                    "PUT requires a checked-out working resource",
                ));
            }
            if resource.is_collection() {
                return Err(ServiceError::conflict("cannot PUT to a collection"));
            }
            let created = !resource.exists;
            let txn_name = resource.txn_name.as_deref().ok_or_else(|| {
                ServiceError::conflict("working resource has no bound transaction")
            })?;
            let mut txn = state.repo.open_txn(txn_name)?;
            txn.put_file(resource.path(), body)?;
            tracing::debug!(txn = %txn_name, "file content staged");
            Ok(created)
        },
    );

    match result {
        Ok(true) => {
            res.status_code(StatusCode::CREATED);
        }
        Ok(false) => {
            res.status_code(StatusCode::NO_CONTENT);
        }
        Err(err) => respond_error(res, &err),
    }
}
