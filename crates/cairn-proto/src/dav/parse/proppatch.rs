//! PROPPATCH request XML parsing.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use super::error::{ParseError, ParseResult};
use super::tree::{ElementNode, parse_tree};
use crate::dav::core::{DavProperty, PropertyValue, QName};

/// One property operation, in document order.
#[derive(Debug, Clone)]
pub enum PatchOperation {
    Set(DavProperty),
    Remove(QName),
}

/// A parsed PROPPATCH request.
#[derive(Debug, Clone, Default)]
pub struct ProppatchRequest {
    pub operations: Vec<PatchOperation>,
}

impl ProppatchRequest {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// Parses a PROPPATCH request body.
///
/// ## Summary
/// Walks the `propertyupdate` tree, collecting `set` and `remove`
/// operations in document order. Property values carrying an
/// `encoding="base64"` attribute are decoded back to raw bytes.
///
/// ## Errors
/// Returns an error on malformed XML, a missing `prop` container or an
/// undecodable base64 value.
#[tracing::instrument(skip(xml), fields(xml_len = xml.len()))]
pub fn parse_proppatch(xml: &[u8]) -> ParseResult<ProppatchRequest> {
    let tree = parse_tree(xml)?;
    if tree.name() != &QName::dav("propertyupdate") {
        return Err(ParseError::unexpected_element(tree.name().local_name()));
    }

    let mut request = ProppatchRequest::default();
    let set = QName::dav("set");
    let remove = QName::dav("remove");
    let prop = QName::dav("prop");

    for operation in tree.children() {
        let is_set = operation.name() == &set;
        if !is_set && operation.name() != &remove {
            continue;
        }
        let container = operation
            .child(&prop)
            .ok_or_else(|| ParseError::missing_element("prop"))?;

        for property in container.children() {
            if is_set {
                request
                    .operations
                    .push(PatchOperation::Set(parse_set_value(property)?));
            } else {
                request
                    .operations
                    .push(PatchOperation::Remove(property.name().clone()));
            }
        }
    }

    Ok(request)
}

fn parse_set_value(property: &ElementNode) -> ParseResult<DavProperty> {
    let name = property.name().clone();
    let text = property.values().join("");

    if property.attribute("encoding") == Some("base64") {
        let decoded = STANDARD
            .decode(text.trim())
            .map_err(|_| ParseError::invalid_value_for(name.local_name(), "base64 value"))?;
        return Ok(DavProperty::binary(name, decoded));
    }

    if text.is_empty() {
        return Ok(DavProperty {
            name,
            value: Some(PropertyValue::Empty),
        });
    }

    Ok(DavProperty::text(name, text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_set_and_remove_in_order() {
        let xml = br#"<?xml version="1.0" encoding="utf-8"?>
<D:propertyupdate xmlns:D="DAV:" xmlns:S="http://subversion.tigris.org/xmlns/svn/"
                  xmlns:C="http://subversion.tigris.org/xmlns/custom/">
  <D:set>
    <D:prop><S:eol-style>native</S:eol-style></D:prop>
  </D:set>
  <D:remove>
    <D:prop><C:review-notes/></D:prop>
  </D:remove>
</D:propertyupdate>"#;

        let req = parse_proppatch(xml).unwrap();
        assert_eq!(req.operations.len(), 2);
        match &req.operations[0] {
            PatchOperation::Set(prop) => {
                assert_eq!(prop.name.local_name(), "eol-style");
                assert_eq!(prop.value, Some(PropertyValue::Text("native".to_string())));
            }
            PatchOperation::Remove(_) => panic!("expected set first"),
        }
        match &req.operations[1] {
            PatchOperation::Remove(name) => assert_eq!(name.local_name(), "review-notes"),
            PatchOperation::Set(_) => panic!("expected remove second"),
        }
    }

    #[test]
    fn base64_value_is_decoded() {
        let xml = br#"<D:propertyupdate xmlns:D="DAV:" xmlns:C="http://subversion.tigris.org/xmlns/custom/">
  <D:set>
    <D:prop><C:blob encoding="base64">bnVsAGJ5dGU=</C:blob></D:prop>
  </D:set>
</D:propertyupdate>"#;

        let req = parse_proppatch(xml).unwrap();
        match &req.operations[0] {
            PatchOperation::Set(prop) => {
                assert_eq!(
                    prop.value,
                    Some(PropertyValue::Binary(b"nul\x00byte".to_vec()))
                );
            }
            PatchOperation::Remove(_) => panic!("expected set"),
        }
    }

    #[test]
    fn wrong_root_is_rejected() {
        let xml = br#"<D:propfind xmlns:D="DAV:"/>"#;
        assert!(parse_proppatch(xml).is_err());
    }
}
