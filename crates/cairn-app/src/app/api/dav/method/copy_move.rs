//! COPY and MOVE method handlers: staged copies inside a transaction.

use salvo::http::StatusCode;
use salvo::{Depot, Request, Response, handler};

use cairn_repo::{Repository as _, Transaction as _};
use cairn_service::{Location, Resource, ServiceError, resolve};

use super::super::respond_error;
use crate::app::api::dav::extract::destination_of;
use crate::state::{ServerState, state_from_depot};

/// ## Summary
/// Stages a copy of a version/regular source at a working destination.
#[handler]
#[tracing::instrument(skip_all, fields(path = %req.uri().path()))]
pub async fn copy(req: &mut Request, res: &mut Response, depot: &Depot) {
    run(req, res, depot, false);
}

/// ## Summary
/// MOVE is a staged copy plus a staged delete of the source path.
#[handler]
#[tracing::instrument(skip_all, fields(path = %req.uri().path()))]
pub async fn r#move(req: &mut Request, res: &mut Response, depot: &Depot) {
    run(req, res, depot, true);
}

fn run(req: &Request, res: &mut Response, depot: &Depot, delete_source: bool) {
    let Ok(state) = state_from_depot(depot) else {
        res.status_code(StatusCode::INTERNAL_SERVER_ERROR);
        return;
    };
    let uri = state.relative_uri(req.uri().path()).to_string();
    let Some(destination) = destination_of(req) else {
        respond_error(
            res,
            &ServiceError::Malformed(cairn_proto::dav::parse::ParseError::missing_element(
                "Destination header",
            )),
        );
        return;
    };
    let dest_uri = state.relative_uri(&destination).to_string();

    match stage(state, &uri, &dest_uri, delete_source) {
        Ok(()) => {
            res.status_code(StatusCode::CREATED);
        }
        Err(err) => respond_error(res, &err),
    }
}

fn stage(
    state: &ServerState,
    source_uri: &str,
    dest_uri: &str,
    delete_source: bool,
) -> Result<(), ServiceError> {
    let source = resolve(state.repo.as_ref(), state.activities.as_ref(), source_uri, None)?;
    let dest = resolve(state.repo.as_ref(), state.activities.as_ref(), dest_uri, None)?;

    if !source.exists {
        return Err(ServiceError::NotFound(format!(
            "copy source '{}' does not exist",
            source.path()
        )));
    }
    let source_rev = match &source.location {
        Location::Regular { .. } | Location::Version { .. } => source.revision.ok_or_else(|| {
            ServiceError::conflict("copy source has no resolved revision")
        })?,
        _ => {
            return Err(ServiceError::method_not_allowed(
                "copy source must be a regular or version resource",
            ));
        }
    };
    let Resource {
        location: Location::Working { path: dest_path, .. },
        txn_name: Some(txn_name),
        ..
    } = &dest
    else {
        return Err(ServiceError::conflict(
            "copy destination must be a working resource with a bound transaction",
        ));
    };

    let mut txn = state.repo.open_txn(txn_name)?;
    txn.copy(source.path(), source_rev, dest_path)?;
    if delete_source {
        txn.delete(source.path())?;
    }
    tracing::debug!(txn = %txn_name, "copy staged");
    Ok(())
}
