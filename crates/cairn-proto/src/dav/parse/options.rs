//! OPTIONS request XML parsing.

use super::error::{ParseError, ParseResult};
use super::tree::parse_tree;
use crate::dav::core::QName;

/// A parsed OPTIONS request body.
#[derive(Debug, Clone, Copy, Default)]
pub struct OptionsRequest {
    /// The client asked where activities may be created.
    pub activity_collection_set: bool,
}

/// Parses an OPTIONS request body.
///
/// ## Summary
/// An empty body is a plain capability probe. A body must be a
/// `D:options` element, optionally asking for the activity collection.
///
/// ## Errors
/// Returns an error on malformed XML or a non-`options` root.
#[tracing::instrument(skip(xml), fields(xml_len = xml.len()))]
pub fn parse_options(xml: &[u8]) -> ParseResult<OptionsRequest> {
    if xml.is_empty() {
        return Ok(OptionsRequest::default());
    }

    let tree = parse_tree(xml)?;
    if tree.name() != &QName::dav("options") {
        return Err(ParseError::unexpected_element(tree.name().local_name()));
    }

    Ok(OptionsRequest {
        activity_collection_set: tree.has_child(&QName::dav("activity-collection-set")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_probes_capabilities() {
        let req = parse_options(b"").unwrap();
        assert!(!req.activity_collection_set);
    }

    #[test]
    fn activity_collection_set_is_detected() {
        let xml = br#"<D:options xmlns:D="DAV:">
  <D:activity-collection-set/>
</D:options>"#;
        let req = parse_options(xml).unwrap();
        assert!(req.activity_collection_set);
    }
}
