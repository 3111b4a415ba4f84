//! LOCK and UNLOCK method handlers: path locks pass through to the
//! repository lock API.

use salvo::http::{HeaderValue, StatusCode};
use salvo::{Depot, Request, Response, handler};

use cairn_proto::dav::core::QName;
use cairn_repo::Repository as _;
use cairn_proto::dav::parse::{ElementNode, parse_tree};
use cairn_service::{ServiceError, resolve};

use super::super::{respond_error, write_xml_body};
use crate::app::api::dav::extract::{body_bytes, client_options, lock_token, working_revision};
use crate::state::state_from_depot;

/// ## Summary
/// Takes out a path lock; `lock-steal` in the capability header allows
/// replacing someone else's lock. Answers with the `D:lockdiscovery`
/// body and the `Lock-Token` header.
#[handler]
#[tracing::instrument(skip_all, fields(path = %req.uri().path()))]
pub async fn lock(req: &mut Request, res: &mut Response, depot: &Depot) {
    let Ok(state) = state_from_depot(depot) else {
        res.status_code(StatusCode::INTERNAL_SERVER_ERROR);
        return;
    };
    let uri = state.relative_uri(req.uri().path()).to_string();
    let options = client_options(req);

    let Ok(body) = body_bytes(req).await else {
        res.status_code(StatusCode::BAD_REQUEST);
        return;
    };
    let owner = match lock_owner(&body) {
        Ok(owner) => owner,
        Err(err) => {
            respond_error(res, &err.into());
            return;
        }
    };

    let result = resolve(state.repo.as_ref(), state.activities.as_ref(), &uri, None).and_then(
        |resource| {
            if !resource.exists {
                return Err(ServiceError::NotFound(format!(
                    "cannot lock nonexistent path '{}'",
                    resource.path()
                )));
            }
            // A stale working revision means the client's view predates
            // the locked path's newest change.
            if let (Some(reported), Some(info)) = (
                working_revision(req),
                state.repo.stat(resource.path(), None)?,
            ) && reported < info.created_rev
            {
                return Err(ServiceError::conflict(format!(
                    "lock refused: '{}' is out of date (r{} < r{})",
                    resource.path(),
                    reported,
                    info.created_rev
                )));
            }
            Ok(state.repo.lock(
                resource.path(),
                owner.as_deref().unwrap_or("anonymous"),
                None,
                options.lock_steal,
            )?)
        },
    );

    match result {
        Ok(info) => {
            res.status_code(StatusCode::OK);
            if let Ok(value) = HeaderValue::from_str(&format!("<{}>", info.token)) {
                #[expect(
                    clippy::let_underscore_must_use,
                    reason = "Header addition failure is non-fatal"
                )]
                let _ = res.add_header("Lock-Token", value, true);
            }
            let owner_text = quick_xml::escape::escape(&info.owner).into_owned();
            let body = format!(
                "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
                 <D:prop xmlns:D=\"DAV:\"><D:lockdiscovery><D:activelock>\
                 <D:locktype><D:write/></D:locktype>\
                 <D:lockscope><D:exclusive/></D:lockscope>\
                 <D:depth>0</D:depth>\
                 <D:owner>{owner_text}</D:owner>\
                 <D:timeout>Infinite</D:timeout>\
                 <D:locktoken><D:href>{token}</D:href></D:locktoken>\
                 </D:activelock></D:lockdiscovery></D:prop>",
                token = info.token
            );
            write_xml_body(res, body);
        }
        Err(err) => respond_error(res, &err),
    }
}

/// ## Summary
/// Releases a path lock; `lock-break` in the capability header skips
/// the token check.
#[handler]
#[tracing::instrument(skip_all, fields(path = %req.uri().path()))]
pub async fn unlock(req: &mut Request, res: &mut Response, depot: &Depot) {
    let Ok(state) = state_from_depot(depot) else {
        res.status_code(StatusCode::INTERNAL_SERVER_ERROR);
        return;
    };
    let uri = state.relative_uri(req.uri().path()).to_string();
    let options = client_options(req);
    let token = lock_token(req);

    let result = resolve(state.repo.as_ref(), state.activities.as_ref(), &uri, None).and_then(
        |resource| {
            state
                .repo
                .unlock(resource.path(), token.as_deref(), options.lock_break)
                .map_err(ServiceError::from)
        },
    );

    match result {
        Ok(()) => {
            res.status_code(StatusCode::NO_CONTENT);
        }
        Err(err) => respond_error(res, &err),
    }
}

/// Pulls the owner out of a `D:lockinfo` body, tolerating an absent
/// body entirely.
fn lock_owner(body: &[u8]) -> Result<Option<String>, cairn_proto::dav::parse::ParseError> {
    if body.is_empty() {
        return Ok(None);
    }
    let tree = parse_tree(body)?;
    Ok(tree
        .child(&QName::dav("owner"))
        .and_then(ElementNode::first_value)
        .map(str::to_string))
}
