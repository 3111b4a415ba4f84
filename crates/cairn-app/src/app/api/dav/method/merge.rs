//! MERGE method handler: the commit saga's final step.

use salvo::http::{HeaderValue, StatusCode};
use salvo::{Depot, Request, Response, handler};

use cairn_proto::dav::parse::parse_merge;
use cairn_service::commit::{merge as run_merge, write_merge_response};
use cairn_service::resolve;

use super::super::{respond_error, write_xml_body};
use crate::app::api::dav::extract::{body_bytes, client_options};
use crate::state::state_from_depot;

/// ## Summary
/// Resolves the merge source (which must be an activity), commits its
/// transaction, and reports the new baseline. A post-commit hook
/// failure is part of the success response, never a commit failure.
#[handler]
#[tracing::instrument(skip_all, fields(path = %req.uri().path()))]
pub async fn merge(req: &mut Request, res: &mut Response, depot: &Depot) {
    let Ok(state) = state_from_depot(depot) else {
        res.status_code(StatusCode::INTERNAL_SERVER_ERROR);
        return;
    };
    let options = client_options(req);

    let Ok(body) = body_bytes(req).await else {
        res.status_code(StatusCode::BAD_REQUEST);
        return;
    };
    let request = match parse_merge(&body) {
        Ok(request) => request,
        Err(err) => {
            respond_error(res, &err.into());
            return;
        }
    };

    let source_uri = source_path(&request.source_href, &state.context);
    let result = resolve(
        state.repo.as_ref(),
        state.activities.as_ref(),
        &source_uri,
        None,
    )
    .and_then(|source| {
        run_merge(
            state.repo.as_ref(),
            state.activities.as_ref(),
            &source,
            &request,
            options,
        )
    })
    .and_then(|outcome| write_merge_response(state.repo.as_ref(), &state.context, &outcome, options));

    match result {
        Ok(body) => {
            res.status_code(StatusCode::OK);
            #[expect(
                clippy::let_underscore_must_use,
                reason = "Header addition failure is non-fatal"
            )]
            let _ = res.add_header("Cache-Control", HeaderValue::from_static("no-cache"), true);
            write_xml_body(res, body);
        }
        Err(err) => respond_error(res, &err),
    }
}

/// Reduces the merge source href to the repository-relative URI.
fn source_path(href: &str, context: &str) -> String {
    let path = match href.find("://") {
        Some(scheme_end) => {
            let after = &href[scheme_end + 3..];
            match after.find('/') {
                Some(host_end) => &after[host_end..],
                None => "",
            }
        }
        None => href,
    };
    path.strip_prefix(context).unwrap_or(path).to_string()
}
