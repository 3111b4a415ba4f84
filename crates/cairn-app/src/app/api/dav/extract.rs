//! Protocol header extraction.

use salvo::Request;
use salvo::http::StatusCode;

use cairn_core::constants::{
    DEPTH_HEADER, DESTINATION_HEADER, LABEL_HEADER, LOCK_TOKEN_HEADER, OPTIONS_HEADER,
    VERSION_NAME_HEADER,
};
use cairn_proto::dav::core::Depth;
use cairn_service::commit::ClientOptions;

fn header<'r>(req: &'r Request, name: &str) -> Option<&'r str> {
    req.headers().get(name).and_then(|value| value.to_str().ok())
}

/// The `Depth` header, defaulting to infinity per the protocol.
#[must_use]
pub fn depth_of(req: &Request) -> Depth {
    header(req, DEPTH_HEADER)
        .and_then(Depth::from_header)
        .unwrap_or_default()
}

/// The `Label` header.
#[must_use]
pub fn label_of(req: &Request) -> Option<String> {
    header(req, LABEL_HEADER).map(str::to_string)
}

/// The `Destination` header's path component.
#[must_use]
pub fn destination_of(req: &Request) -> Option<String> {
    let raw = header(req, DESTINATION_HEADER)?;
    let path = match raw.find("://") {
        Some(scheme_end) => {
            let after = &raw[scheme_end + 3..];
            after.find('/').map(|host_end| &after[host_end..])?
        }
        None => raw,
    };
    Some(path.to_string())
}

/// The client capability flags header.
#[must_use]
pub fn client_options(req: &Request) -> ClientOptions {
    header(req, OPTIONS_HEADER).map_or_else(ClientOptions::default, ClientOptions::parse)
}

/// The working-revision header.
#[must_use]
pub fn working_revision(req: &Request) -> Option<u64> {
    header(req, VERSION_NAME_HEADER).and_then(|value| value.trim().parse().ok())
}

/// The `Lock-Token` header, stripped of its angle brackets.
#[must_use]
pub fn lock_token(req: &Request) -> Option<String> {
    header(req, LOCK_TOKEN_HEADER)
        .map(|value| value.trim().trim_matches(['<', '>']).to_string())
}

/// Reads the request body.
///
/// ## Errors
/// Returns `BAD_REQUEST` if the payload cannot be read.
pub async fn body_bytes(req: &mut Request) -> Result<Vec<u8>, StatusCode> {
    match req.payload().await {
        Ok(bytes) => Ok(bytes.to_vec()),
        Err(err) => {
            tracing::error!(error = %err, "failed to read request body");
            Err(StatusCode::BAD_REQUEST)
        }
    }
}
