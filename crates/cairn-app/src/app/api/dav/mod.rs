// Shared WebDAV/DeltaV mechanics: routing, header extraction and the
// structured error response body.

use salvo::Router;
use salvo::http::StatusCode;

pub mod extract;
pub mod method;

#[must_use]
pub fn routes() -> Router {
    Router::with_path("{**rest}")
        .options(method::options::options)
        .get(method::get_head::get)
        .head(method::get_head::head)
        .put(method::put::put)
        .delete(method::delete::delete)
        .push(
            // PROPFIND method
            Router::new()
                .filter_fn(|req, _| req.method().as_str() == "PROPFIND")
                .goal(method::propfind::propfind),
        )
        .push(
            // PROPPATCH method
            Router::new()
                .filter_fn(|req, _| req.method().as_str() == "PROPPATCH")
                .goal(method::proppatch::proppatch),
        )
        .push(
            // REPORT method
            Router::new()
                .filter_fn(|req, _| req.method().as_str() == "REPORT")
                .goal(method::report::report),
        )
        .push(
            // MKACTIVITY method
            Router::new()
                .filter_fn(|req, _| req.method().as_str() == "MKACTIVITY")
                .goal(method::mkactivity::mkactivity),
        )
        .push(
            // CHECKOUT method
            Router::new()
                .filter_fn(|req, _| req.method().as_str() == "CHECKOUT")
                .goal(method::checkout::checkout),
        )
        .push(
            // MERGE method
            Router::new()
                .filter_fn(|req, _| req.method().as_str() == "MERGE")
                .goal(method::merge::merge),
        )
        .push(
            // COPY method
            Router::new()
                .filter_fn(|req, _| req.method().as_str() == "COPY")
                .goal(method::copy_move::copy),
        )
        .push(
            // MOVE method
            Router::new()
                .filter_fn(|req, _| req.method().as_str() == "MOVE")
                .goal(method::copy_move::r#move),
        )
        .push(
            // LOCK method
            Router::new()
                .filter_fn(|req, _| req.method().as_str() == "LOCK")
                .goal(method::lock::lock),
        )
        .push(
            // UNLOCK method
            Router::new()
                .filter_fn(|req, _| req.method().as_str() == "UNLOCK")
                .goal(method::lock::unlock),
        )
}

/// Writes a structured error response: status plus a `D:error` body
/// carrying the human-readable message.
pub(crate) fn respond_error(res: &mut salvo::Response, err: &cairn_service::ServiceError) {
    if matches!(err, cairn_service::ServiceError::Cancelled) {
        // The stream was aborted mid-document; there is no status left
        // to change that the client would trust.
        tracing::debug!("request cancelled mid-stream");
        res.status_code(StatusCode::INTERNAL_SERVER_ERROR);
        return;
    }

    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    tracing::debug!(status = %status, error = %err, "request failed");
    res.status_code(status);

    let message = quick_xml::escape::escape(&err.to_string()).into_owned();
    let body = format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
         <D:error xmlns:D=\"DAV:\" xmlns:m=\"http://apache.org/dav/xmlns\">\
         <m:human-readable errcode=\"0\">{message}</m:human-readable></D:error>"
    );
    write_xml_body(res, body);
}

/// Sets the XML content type and writes a body.
pub(crate) fn write_xml_body(res: &mut salvo::Response, body: String) {
    #[expect(
        clippy::let_underscore_must_use,
        reason = "Header addition failure is non-fatal"
    )]
    let _ = res.add_header(
        "Content-Type",
        salvo::http::HeaderValue::from_static(cairn_core::constants::XML_CONTENT_TYPE),
        true,
    );
    #[expect(
        clippy::let_underscore_must_use,
        reason = "Write body failure is non-fatal"
    )]
    let _ = res.write_body(body);
}
