//! CHECKOUT request XML parsing.

use super::error::{ParseError, ParseResult};
use super::tree::parse_tree;
use crate::dav::core::QName;

/// A parsed CHECKOUT request body.
#[derive(Debug, Clone, Default)]
pub struct CheckoutRequest {
    /// Activity hrefs named in `activity-set`.
    pub activity_hrefs: Vec<String>,
    /// `activity-set` contained `new`: create a fresh activity.
    pub new_activity: bool,
    /// `apply-to-version` was present.
    pub apply_to_version: bool,
    /// `unreserved` was present.
    pub unreserved: bool,
    /// `fork-ok` was present.
    pub fork_ok: bool,
}

/// Parses a CHECKOUT request body.
///
/// ## Summary
/// An absent body is a valid auto-checkout; callers handle that before
/// parsing. Within `activity-set`, either `new` or at least one `href`
/// must be given.
///
/// ## Errors
/// Returns an error on malformed XML or an empty `activity-set`.
#[tracing::instrument(skip(xml), fields(xml_len = xml.len()))]
pub fn parse_checkout(xml: &[u8]) -> ParseResult<CheckoutRequest> {
    let tree = parse_tree(xml)?;
    if tree.name() != &QName::dav("checkout") {
        return Err(ParseError::unexpected_element(tree.name().local_name()));
    }

    let mut request = CheckoutRequest {
        apply_to_version: tree.has_child(&QName::dav("apply-to-version")),
        unreserved: tree.has_child(&QName::dav("unreserved")),
        fork_ok: tree.has_child(&QName::dav("fork-ok")),
        ..CheckoutRequest::default()
    };

    if let Some(activity_set) = tree.child(&QName::dav("activity-set")) {
        if activity_set.has_child(&QName::dav("new")) {
            request.new_activity = true;
        } else {
            request.activity_hrefs = activity_set
                .child_values(&QName::dav("href"))
                .into_iter()
                .map(str::to_string)
                .collect();
            if request.activity_hrefs.is_empty() {
                return Err(ParseError::invalid_value(
                    "within the DAV:activity-set element, the DAV:new element must be used, \
                     or at least one DAV:href must be specified",
                ));
            }
        }
    }

    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_activity_href() {
        let xml = br#"<D:checkout xmlns:D="DAV:">
  <D:activity-set>
    <D:href>/repos/!svn/act/abc-123</D:href>
  </D:activity-set>
</D:checkout>"#;

        let req = parse_checkout(xml).unwrap();
        assert_eq!(req.activity_hrefs, vec!["/repos/!svn/act/abc-123"]);
        assert!(!req.new_activity);
    }

    #[test]
    fn parses_new_activity() {
        let xml = br#"<D:checkout xmlns:D="DAV:">
  <D:activity-set><D:new/></D:activity-set>
  <D:apply-to-version/>
</D:checkout>"#;

        let req = parse_checkout(xml).unwrap();
        assert!(req.new_activity);
        assert!(req.apply_to_version);
    }

    #[test]
    fn empty_activity_set_is_rejected() {
        let xml = br#"<D:checkout xmlns:D="DAV:"><D:activity-set/></D:checkout>"#;
        assert!(parse_checkout(xml).is_err());
    }
}
