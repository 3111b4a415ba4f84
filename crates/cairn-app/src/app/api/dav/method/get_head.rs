//! GET and HEAD method handlers.

use salvo::http::{HeaderValue, StatusCode};
use salvo::{Depot, Request, Response, handler};

use cairn_repo::Repository as _;
use cairn_service::{ServiceError, resolve};

use super::super::respond_error;
use crate::app::api::dav::extract::label_of;
use crate::state::{ServerState, state_from_depot};

/// ## Summary
/// Serves file content (with the `svn:mime-type` property as content
/// type) or a plain-text listing for collections.
#[handler]
#[tracing::instrument(skip_all, fields(path = %req.uri().path()))]
pub async fn get(req: &mut Request, res: &mut Response, depot: &Depot) {
    serve(req, res, depot, true);
}

/// ## Summary
/// HEAD variant of [`get`]: headers only.
#[handler]
#[tracing::instrument(skip_all, fields(path = %req.uri().path()))]
pub async fn head(req: &mut Request, res: &mut Response, depot: &Depot) {
    serve(req, res, depot, false);
}

fn serve(req: &Request, res: &mut Response, depot: &Depot, with_body: bool) {
    let Ok(state) = state_from_depot(depot) else {
        res.status_code(StatusCode::INTERNAL_SERVER_ERROR);
        return;
    };
    let uri = state.relative_uri(req.uri().path());
    let label = label_of(req);

    match fetch(state, uri, label.as_deref()) {
        Ok((content_type, body)) => {
            #[expect(
                clippy::let_underscore_must_use,
                reason = "Header addition failure is non-fatal"
            )]
            let _ = res.add_header(
                "Content-Type",
                HeaderValue::from_str(&content_type)
                    .unwrap_or(HeaderValue::from_static("text/plain")),
                true,
            );
            res.status_code(StatusCode::OK);
            if with_body {
                #[expect(
                    clippy::let_underscore_must_use,
                    reason = "Write body failure is non-fatal"
                )]
                let _ = res.write_body(body);
            }
        }
        Err(err) => respond_error(res, &err),
    }
}

fn fetch(
    state: &ServerState,
    uri: &str,
    label: Option<&str>,
) -> Result<(String, Vec<u8>), ServiceError> {
    let resource = resolve(state.repo.as_ref(), state.activities.as_ref(), uri, label)?;
    if !resource.exists {
        return Err(ServiceError::NotFound(format!(
            "no such resource '{}'",
            resource.path()
        )));
    }

    if resource.is_collection() {
        let mut listing = String::new();
        for entry in state.repo.list_dir(resource.path(), resource.revision)? {
            listing.push_str(&entry.name);
            if entry.kind.is_directory() {
                listing.push('/');
            }
            listing.push('\n');
        }
        return Ok(("text/plain".to_string(), listing.into_bytes()));
    }

    let content = state.repo.file_content(resource.path(), resource.revision)?;
    let content_type = state
        .repo
        .node_properties(resource.path(), resource.revision)?
        .get("svn:mime-type")
        .map_or_else(
            || "text/plain".to_string(),
            |bytes| String::from_utf8_lossy(bytes).into_owned(),
        );
    Ok((content_type, content))
}
