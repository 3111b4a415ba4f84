//! Multistatus response envelope types.

use super::property::DavProperty;

/// HTTP status carried by a propstat block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    NotFound,
    Forbidden,
    Conflict,
    UnprocessableEntity,
    FailedDependency,
}

impl Status {
    /// Returns the full status line for the XML body.
    #[must_use]
    pub const fn status_line(self) -> &'static str {
        match self {
            Self::Ok => "HTTP/1.1 200 OK",
            Self::NotFound => "HTTP/1.1 404 Not Found",
            Self::Forbidden => "HTTP/1.1 403 Forbidden",
            Self::Conflict => "HTTP/1.1 409 Conflict",
            Self::UnprocessableEntity => "HTTP/1.1 422 Unprocessable Entity",
            Self::FailedDependency => "HTTP/1.1 424 Failed Dependency",
        }
    }
}

/// One group of properties sharing a status.
#[derive(Debug, Clone)]
pub struct Propstat {
    pub properties: Vec<DavProperty>,
    pub status: Status,
    pub description: Option<String>,
}

/// Per-resource response inside a multistatus.
#[derive(Debug, Clone)]
pub struct PropstatResponse {
    pub href: String,
    pub propstats: Vec<Propstat>,
    pub description: Option<String>,
}

impl PropstatResponse {
    /// Creates a response whose properties all resolved.
    #[must_use]
    pub fn ok(href: impl Into<String>, properties: Vec<DavProperty>) -> Self {
        Self {
            href: href.into(),
            propstats: vec![Propstat {
                properties,
                status: Status::Ok,
                description: None,
            }],
            description: None,
        }
    }

    /// Creates a two-tier response: resolved properties under 200, each
    /// unresolved property under 404 in the same response.
    #[must_use]
    pub fn two_tier(
        href: impl Into<String>,
        found: Vec<DavProperty>,
        missing: Vec<DavProperty>,
    ) -> Self {
        let mut propstats = Vec::new();
        if !found.is_empty() {
            propstats.push(Propstat {
                properties: found,
                status: Status::Ok,
                description: None,
            });
        }
        if !missing.is_empty() {
            propstats.push(Propstat {
                properties: missing,
                status: Status::NotFound,
                description: None,
            });
        }
        Self {
            href: href.into(),
            propstats,
            description: None,
        }
    }
}

/// The whole 207 response body.
#[derive(Debug, Clone, Default)]
pub struct Multistatus {
    pub responses: Vec<PropstatResponse>,
    pub description: Option<String>,
}

impl Multistatus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_response(&mut self, response: PropstatResponse) {
        self.responses.push(response);
    }
}
