//! PROPFIND request XML parsing.

use super::error::ParseResult;
use super::tree::{ElementNode, parse_tree};
use crate::dav::core::{PropertyName, QName};

/// The kind of PROPFIND being made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropfindType {
    /// Specific properties requested.
    Prop(Vec<PropertyName>),
    /// All properties, optionally with extra included ones.
    AllProp { include: Vec<PropertyName> },
    /// Property names only.
    PropName,
}

/// A parsed PROPFIND request.
#[derive(Debug, Clone)]
pub struct PropfindRequest {
    pub propfind_type: PropfindType,
}

impl PropfindRequest {
    #[must_use]
    pub fn allprop() -> Self {
        Self {
            propfind_type: PropfindType::AllProp {
                include: Vec::new(),
            },
        }
    }

    #[must_use]
    pub fn propname() -> Self {
        Self {
            propfind_type: PropfindType::PropName,
        }
    }

    #[must_use]
    pub fn prop(properties: Vec<PropertyName>) -> Self {
        Self {
            propfind_type: PropfindType::Prop(properties),
        }
    }

    #[must_use]
    pub fn is_allprop(&self) -> bool {
        matches!(self.propfind_type, PropfindType::AllProp { .. })
    }

    #[must_use]
    pub fn is_propname(&self) -> bool {
        matches!(self.propfind_type, PropfindType::PropName)
    }

    /// Returns requested property names for a `prop` request.
    #[must_use]
    pub fn requested_properties(&self) -> Option<&[PropertyName]> {
        match &self.propfind_type {
            PropfindType::Prop(props) => Some(props),
            PropfindType::AllProp { .. } | PropfindType::PropName => None,
        }
    }
}

/// Parses a PROPFIND request body.
///
/// ## Summary
/// An empty body means `allprop`; otherwise the tree must carry exactly
/// one of `prop`, `allprop` (with optional `include`) or `propname`.
///
/// ## Errors
/// Returns an error if the XML is malformed.
#[tracing::instrument(skip(xml), fields(xml_len = xml.len()))]
pub fn parse_propfind(xml: &[u8]) -> ParseResult<PropfindRequest> {
    if xml.is_empty() {
        tracing::debug!("Empty PROPFIND body, returning allprop");
        return Ok(PropfindRequest::allprop());
    }

    let tree = parse_tree(xml)?;

    if tree.has_child(&QName::dav("propname")) {
        return Ok(PropfindRequest::propname());
    }

    if tree.has_child(&QName::dav("allprop")) {
        let include = match tree.child(&QName::dav("include")) {
            Some(include) => include
                .children()
                .map(|child| PropertyName::new(child.name().clone()))
                .collect(),
            None => Vec::new(),
        };
        return Ok(PropfindRequest {
            propfind_type: PropfindType::AllProp { include },
        });
    }

    match tree.child(&QName::dav("prop")) {
        Some(prop) => Ok(PropfindRequest::prop(
            prop.children()
                .map(|child| PropertyName::new(child.name().clone()))
                .collect(),
        )),
        None => Ok(PropfindRequest::allprop()),
    }
}
